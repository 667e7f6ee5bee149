//! Graph inputs and outputs of the emitted model.
//!
//! Outside the graph tensors keep their channel-last layout: rank 4 inputs
//! get a transpose to channel-first, rank 4 and rank 3 outputs a transpose
//! back.

use tfl2onnx_onnx::ModelBuilder;

use crate::graph::tensor_name;
use crate::internal::*;
use crate::ops::onnx_datum_type;

pub fn input_transpose_name(name: &str) -> String {
    format!("transpose_node_input_{name}")
}

pub fn output_transpose_name(name: &str) -> String {
    format!("transpose_node_output_{name}")
}

pub fn output_identity_name(name: &str) -> String {
    format!("identity_node_output_{name}")
}

pub fn output_name(name: &str) -> String {
    format!("out_{name}")
}

/// Declare the graph inputs and bind them in the translation table.
pub fn insert_inputs(
    model: &SourceModel,
    boundary: bool,
    builder: &mut ModelBuilder,
    table: &mut TranslationTable,
) -> Result<()> {
    for &input in &model.inputs {
        let tensor = model.catalog.tensor(input)?;
        let name = tensor_name(&model.catalog, input)?;
        let elem_type = onnx_datum_type(tensor.datum_type)?;
        builder.inputs.push(ValueInfoProto::tensor(&name, elem_type, &layout::as_i64(&tensor.shape)));
        if boundary && tensor.rank() == 4 {
            let transpose = input_transpose_name(&name);
            builder.nodes.push(
                NodeProto::named("Transpose", &transpose)
                    .with_input(&name)
                    .with_ints("perm", layout::as_i64(&NHWC_TO_NCHW)),
            );
            let shape = layout::to_channel_first_shape(&tensor.shape)?;
            builder.value_infos.push(ValueInfoProto::tensor(&transpose, elem_type, &layout::as_i64(&shape)));
            trace!("Input {name} goes through {transpose}");
            table.insert(name.clone(), vec![name, transpose]);
        } else {
            table.insert(name.clone(), vec![name]);
        }
    }
    Ok(())
}

/// Expose the values of the graph output nodes as `out_<name>`.
pub fn insert_outputs(
    model: &SourceModel,
    graph: &Graph,
    boundary: bool,
    builder: &mut ModelBuilder,
    table: &TranslationTable,
) -> Result<()> {
    for &id in &graph.outputs {
        let node = graph.node(id);
        let tensor = model.catalog.tensor(graph.represented_tensor(id)?)?;
        let elem_type = onnx_datum_type(tensor.datum_type)?;
        let value = table
            .binding(&node.name)
            .with_context(|| format!("Graph output {node} was not lowered"))?
            .to_string();
        let exposed = output_name(&node.name);

        let perm: Option<Vec<usize>> = match tensor.rank() {
            4 if boundary => Some(NCHW_TO_NHWC.to_vec()),
            3 if boundary => Some(vec![0, 2, 1]),
            _ => None,
        };
        let shape = if let Some(perm) = perm {
            builder.nodes.push(
                NodeProto::named("Transpose", output_transpose_name(&node.name))
                    .with_input(&value)
                    .with_output(&exposed)
                    .with_ints("perm", layout::as_i64(&perm)),
            );
            // the emitted value is channel-first for rank 4, as is for rank 3
            let emitted = layout::declared_shape(&tensor.shape);
            layout::permute_shape(&emitted, &perm)
        } else if builder.nodes.iter().any(|n| n.input.contains(&value)) {
            builder.nodes.push(
                NodeProto::named("Identity", output_identity_name(&node.name))
                    .with_input(&value)
                    .with_output(&exposed),
            );
            tensor.shape.clone()
        } else {
            let producer = builder
                .nodes
                .iter_mut()
                .find(|n| n.output.contains(&value))
                .with_context(|| format!("No node produces {value}, the value of {node}"))?;
            for output in producer.output.iter_mut().filter(|o| **o == value) {
                *output = exposed.clone();
            }
            builder.value_infos.retain(|vi| vi.name != value);
            tensor.shape.clone()
        };
        debug!("Exposing {node} as {exposed} {shape:?}");
        builder.outputs.push(ValueInfoProto::tensor(&exposed, elem_type, &layout::as_i64(&shape)));
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    fn model(shape: &[usize], ops: usize) -> SourceModel {
        let mut catalog = TensorCatalog::default();
        let mut last = catalog.add_activation("x", shape, DatumType::F32);
        let mut operators = vec![];
        for ix in 0..ops {
            let out = catalog.add_activation(format!("r{ix}"), shape, DatumType::F32);
            operators.push(OperatorRecord::new(Op::Relu, tvec!(last as i32), tvec!(out as i32)));
            last = out;
        }
        SourceModel { catalog, operators, inputs: tvec!(0), outputs: tvec!(last), description: None }
    }

    fn lowered(model: &SourceModel, boundary: bool, outputs: &[usize]) -> ModelBuilder {
        let graph = Graph::build(&model.operators, &model.catalog, &model.inputs, outputs).unwrap();
        let mut builder = ModelBuilder::new("test");
        let mut table = TranslationTable::default();
        insert_inputs(model, boundary, &mut builder, &mut table).unwrap();
        for &id in &graph.order {
            let lowered = crate::ops::lower(&LoweringContext::new(model, &graph, &table), id).unwrap();
            table.insert(graph.node(id).name.clone(), lowered.output_names());
            builder.nodes.extend(lowered.nodes);
            builder.value_infos.extend(lowered.value_infos);
        }
        insert_outputs(model, &graph, boundary, &mut builder, &table).unwrap();
        builder
    }

    #[test]
    fn rank_4_boundary() {
        let model = model(&[1, 5, 6, 3], 1);
        let builder = lowered(&model, true, &[1]);
        let ops = builder.nodes.iter().map(|n| n.op_type.as_str()).collect_vec();
        assert_eq!(ops, vec!["Transpose", "Relu", "Transpose"]);
        assert_eq!(builder.nodes[0].name, "transpose_node_input_x");
        assert_eq!(builder.nodes[1].input, vec!["transpose_node_input_x"]);
        assert_eq!(builder.nodes[2].name, "transpose_node_output_r0");
        assert_eq!(builder.nodes[2].output, vec!["out_r0"]);
        assert_eq!(builder.inputs[0].shape(), Some(vec![1, 5, 6, 3]));
        assert_eq!(builder.outputs[0].shape(), Some(vec![1, 5, 6, 3]));
        tfl2onnx_onnx::check_model(&builder.make_model()).unwrap();
    }

    #[test]
    fn rank_3_output_is_transposed() {
        let model = model(&[2, 5, 7], 1);
        let builder = lowered(&model, true, &[1]);
        let ops = builder.nodes.iter().map(|n| n.op_type.as_str()).collect_vec();
        assert_eq!(ops, vec!["Relu", "Transpose"]);
        assert_eq!(builder.nodes[0].input, vec!["x"]);
        assert_eq!(builder.outputs[0].shape(), Some(vec![2, 7, 5]));
    }

    #[test]
    fn release_mode_renames() {
        let model = model(&[1, 5, 6, 3], 1);
        let builder = lowered(&model, false, &[1]);
        assert_eq!(builder.nodes.len(), 1);
        assert_eq!(builder.nodes[0].name, "r0");
        assert_eq!(builder.nodes[0].output, vec!["out_r0"]);
        assert!(builder.value_infos.iter().all(|vi| vi.name != "r0"));
        assert_eq!(builder.inputs[0].shape(), Some(vec![1, 5, 6, 3]));
        assert_eq!(builder.outputs[0].shape(), Some(vec![1, 5, 6, 3]));
        tfl2onnx_onnx::check_model(&builder.make_model()).unwrap();
    }

    #[test]
    fn consumed_output_goes_through_identity() {
        let model = model(&[4, 4], 2);
        let builder = lowered(&model, true, &[1, 2]);
        let ops = builder.nodes.iter().map(|n| n.op_type.as_str()).collect_vec();
        assert_eq!(ops, vec!["Relu", "Relu", "Identity"]);
        assert_eq!(builder.nodes[2].name, "identity_node_output_r0");
        assert_eq!(builder.nodes[1].input, vec!["r0"]);
        assert_eq!(builder.nodes[1].output, vec!["out_r1"]);
        tfl2onnx_onnx::check_model(&builder.make_model()).unwrap();
    }
}
