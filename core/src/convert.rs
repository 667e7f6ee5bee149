use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tfl2onnx_onnx::pb::ModelProto;
use tfl2onnx_onnx::{check_model, ModelBuilder};

use crate::boundary;
use crate::defuse::defuse;
use crate::internal::*;
use crate::ops;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConvertOptions {
    /// Keep graph inputs and outputs channel-last by wrapping the graph in
    /// transposes.
    pub boundary_transpose: bool,
    /// Split fused ReLU / ReLU6 into their own nodes.
    pub defuse: bool,
}

impl Default for ConvertOptions {
    fn default() -> ConvertOptions {
        ConvertOptions { boundary_transpose: true, defuse: false }
    }
}

pub fn convert(model: &SourceModel, options: &ConvertOptions) -> Result<ModelProto> {
    let mut graph = Graph::build(&model.operators, &model.catalog, &model.inputs, &model.outputs)
        .context("Building operator graph")?;
    if options.defuse {
        defuse(&mut graph, &model.operators).context("De-fusing activations")?;
    }

    let name = model.description.clone().unwrap_or_else(|| "main".to_string());
    let mut builder = ModelBuilder::new(name);
    let mut table = TranslationTable::default();
    boundary::insert_inputs(model, options.boundary_transpose, &mut builder, &mut table)?;
    for &id in &graph.order {
        let lowered = {
            let ctx = LoweringContext::new(model, &graph, &table);
            ops::lower(&ctx, id).with_context(|| {
                let kind = graph.record(id, &model.operators).map(|r| r.op.name()).unwrap_or("?");
                format!("Lowering {} ({kind})", graph.node(id))
            })?
        };
        table.insert(graph.node(id).name.clone(), lowered.output_names());
        builder.nodes.extend(lowered.nodes);
        builder.value_infos.extend(lowered.value_infos);
        builder.initializers.extend(lowered.constants);
    }
    boundary::insert_outputs(model, &graph, options.boundary_transpose, &mut builder, &table)?;

    let initializer_inputs = builder
        .initializers
        .iter()
        .map(|init| {
            ValueInfoProto::tensor(&init.name, init.data_type(), &init.dims)
        })
        .collect_vec();
    builder.inputs.extend(initializer_inputs);
    let now = OffsetDateTime::now_utc().format(&Rfc3339)?;
    builder.metadata.push(("Generated Time".to_string(), now));

    let onnx = builder.make_model();
    check_model(&onnx).context("Checking converted model")?;
    info!(
        "Converted {} operators into {} nodes and {} initializers",
        model.operators.len(),
        builder.nodes.len(),
        builder.initializers.len()
    );
    Ok(onnx)
}
