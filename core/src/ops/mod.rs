use std::collections::HashMap;

use crate::graph::tensor_name;
use crate::internal::*;

pub mod activations;
pub mod array;
pub mod binary;
pub mod cnn;
pub mod nn;
pub mod resize;

/// Graph node name → names of the ONNX values emitted for it. The last one
/// is what consumers of the node wire to.
#[derive(Clone, Debug, Default)]
pub struct TranslationTable(HashMap<String, Vec<String>>);

impl TranslationTable {
    pub fn insert(&mut self, name: impl Into<String>, emitted: Vec<String>) {
        self.0.insert(name.into(), emitted);
    }

    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.0.get(name).map(|v| &**v)
    }

    pub fn binding(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(|v| v.last()).map(|s| s.as_str())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Operand {
    /// A value computed at runtime, by its ONNX name.
    Wire(String),
    /// A constant tensor of the catalog.
    Constant(usize),
    Absent,
}

#[derive(Clone, Debug, Default)]
pub struct Lowered {
    pub nodes: Vec<NodeProto>,
    pub value_infos: Vec<ValueInfoProto>,
    pub constants: Vec<TensorProto>,
}

impl Lowered {
    pub fn output_names(&self) -> Vec<String> {
        self.nodes.iter().flat_map(|n| n.output.iter().cloned()).collect()
    }
}

#[derive(Clone, Copy, Debug, new)]
pub struct LoweringContext<'a> {
    pub model: &'a SourceModel,
    pub graph: &'a Graph,
    pub table: &'a TranslationTable,
}

impl<'a> LoweringContext<'a> {
    pub fn wire(&self, name: &str) -> Result<String> {
        self.table
            .binding(name)
            .map(|s| s.to_string())
            .with_context(|| format!("{name:?} is consumed before it was lowered"))
    }

    /// Resolve a tensor consumed by `node`: the producing node first, then
    /// graph inputs, then constants.
    pub fn operand(&self, node: &GraphNode, tensor: usize) -> Result<Operand> {
        for &input in &node.inputs {
            if self.graph.represented_tensor(input)? == tensor {
                return Ok(Operand::Wire(self.wire(&self.graph.node(input).name)?));
            }
        }
        let catalog = &self.model.catalog;
        if self.model.inputs.contains(&tensor) {
            return Ok(Operand::Wire(self.wire(&tensor_name(catalog, tensor)?)?));
        }
        if catalog.is_constant(tensor) {
            return Ok(Operand::Constant(tensor));
        }
        bail!(
            "Node {node} consumes tensor #{tensor} {:?}, which is neither produced, constant nor a graph input",
            catalog.tensor(tensor)?.name
        )
    }
}

pub fn onnx_datum_type(dt: DatumType) -> Result<DataType> {
    Ok(match dt {
        DatumType::F32 => DataType::Float,
        DatumType::F16 => DataType::Float16,
        DatumType::F64 => DataType::Double,
        DatumType::I8 => DataType::Int8,
        DatumType::U8 => DataType::Uint8,
        DatumType::I16 => DataType::Int16,
        DatumType::I32 => DataType::Int32,
        DatumType::I64 => DataType::Int64,
        DatumType::Bool => DataType::Bool,
        DatumType::String => DataType::String,
        DatumType::Complex64 => DataType::Complex64,
    })
}

/// State of the lowering of one graph node.
pub struct LowerOp<'a> {
    pub ctx: &'a LoweringContext<'a>,
    pub node: &'a GraphNode,
    pub record: &'a OperatorRecord,
    pub prefix: &'a str,
    pub lowered: Lowered,
}

impl<'a> LowerOp<'a> {
    pub fn new(ctx: &'a LoweringContext<'a>, id: NodeId) -> Result<LowerOp<'a>> {
        let node = ctx.graph.node(id);
        let record = ctx.graph.record(id, &ctx.model.operators)?;
        Ok(LowerOp { ctx, node, record, prefix: &node.name, lowered: Lowered::default() })
    }

    pub fn catalog(&self) -> &'a TensorCatalog {
        &self.ctx.model.catalog
    }

    pub fn input(&self, slot: usize) -> Result<Operand> {
        match self.record.input(slot) {
            Some(t) => self.ctx.operand(self.node, t),
            None => Ok(Operand::Absent),
        }
    }

    pub fn wire(&self, slot: usize) -> Result<String> {
        match self.input(slot)? {
            Operand::Wire(wire) => Ok(wire),
            other => bail!("{} expects a dynamic input in slot {slot}, got {other:?}", self.record.op),
        }
    }

    pub fn constant(&self, slot: usize) -> Result<&'a TensorDescriptor> {
        match self.input(slot)? {
            Operand::Constant(t) => self.catalog().tensor(t),
            other => bail!("{} expects a constant in slot {slot}, got {other:?}", self.record.op),
        }
    }

    pub fn input_tensor(&self, slot: usize) -> Result<&'a TensorDescriptor> {
        let t = self
            .record
            .input(slot)
            .with_context(|| format!("{} has no input in slot {slot}", self.record.op))?;
        self.catalog().tensor(t)
    }

    pub fn output_tensor(&self) -> Result<&'a TensorDescriptor> {
        self.catalog().tensor(self.ctx.graph.represented_tensor(self.node.id)?)
    }

    pub fn datum_type(&self) -> Result<DataType> {
        onnx_datum_type(self.output_tensor()?.datum_type)
    }

    pub fn name(&self, role: &str) -> String {
        format!("{}_{role}", self.prefix)
    }

    /// Emit a node along with the shape annotation of its output.
    pub fn push(&mut self, node: NodeProto, shape: &[usize]) -> Result<String> {
        let output = node
            .output
            .first()
            .cloned()
            .with_context(|| format!("{} node {} has no output", node.op_type, node.name))?;
        let elem_type = self.datum_type()?;
        self.lowered.value_infos.push(ValueInfoProto::tensor(&output, elem_type, &layout::as_i64(shape)));
        self.lowered.nodes.push(node);
        Ok(output)
    }

    /// Emit the node carrying the graph node name, with the declared output
    /// shape.
    pub fn push_final(&mut self, node: NodeProto) -> Result<String> {
        let shape = layout::declared_shape(&self.output_tensor()?.shape);
        self.push(node.with_output(self.prefix), &shape)
    }

    pub fn f32_constant(&mut self, name: String, shape: &[usize], data: Vec<f32>) -> Result<String> {
        self.lowered.constants.push(TensorProto::from_f32(name.clone(), shape, data)?);
        Ok(name)
    }

    pub fn i64_constant(&mut self, name: String, shape: &[usize], data: Vec<i64>) -> Result<String> {
        self.lowered.constants.push(TensorProto::from_i64(name.clone(), shape, data)?);
        Ok(name)
    }

    /// Constant operand converted to the channel-first layout of its consumer.
    /// Rank 4 constants are transposed. Lower ranks against a rank 4 operand
    /// are padded to `(1, H, W, C)` and emitted as `(C, H, W)`.
    pub fn layout_constant(
        &mut self,
        tensor: &TensorDescriptor,
        name: String,
        against_rank: usize,
    ) -> Result<String> {
        let data = self
            .catalog()
            .f32_data(tensor.index)
            .with_context(|| format!("Reading constant {:?} for {}", tensor.name, self.prefix))?;
        match (tensor.rank(), against_rank) {
            (4, _) => {
                let data = layout::permute(data, &tensor.shape, &NHWC_TO_NCHW)?;
                self.f32_constant(name, &layout::to_channel_first_shape(&tensor.shape)?, data)
            }
            (1..=3, 4) => {
                let mut padded = tvec![1; 4 - tensor.rank()];
                padded.extend(tensor.shape.iter().copied());
                let data = layout::permute(data, &padded, &NHWC_TO_NCHW)?;
                let shape = layout::to_channel_first_shape(&padded)?;
                self.f32_constant(name, &shape[1..], data)
            }
            _ => self.f32_constant(name, &tensor.shape, data),
        }
    }

    pub fn last_output(&self) -> Option<(&str, &ValueInfoProto)> {
        let vi = self.lowered.value_infos.last()?;
        Some((vi.name.as_str(), vi))
    }
}

/// Lower one graph node to its ONNX translation.
pub fn lower(ctx: &LoweringContext, id: NodeId) -> Result<Lowered> {
    let mut op = LowerOp::new(ctx, id)?;
    let (node, record) = (op.node, op.record);
    match node.kind {
        NodeKind::Defused { origin, activation } => {
            activations::defused(&mut op, origin, activation)?
        }
        NodeKind::Operator { .. } => {
            match &record.op {
                Op::Add { .. } => binary::add(&mut op)?,
                Op::AveragePool2D(pool) => cnn::average_pool(&mut op, pool)?,
                Op::Concatenation { axis, .. } => array::concat(&mut op, *axis)?,
                Op::Conv2D(conv) => cnn::conv(&mut op, conv)?,
                Op::DepthwiseConv2D(conv) => cnn::depthwise_conv(&mut op, conv)?,
                Op::FullyConnected { .. } => nn::fully_connected(&mut op)?,
                Op::L2Normalization { .. } => nn::l2_normalization(&mut op)?,
                Op::Logistic => activations::logistic(&mut op)?,
                Op::MaxPool2D(pool) => cnn::max_pool(&mut op, pool)?,
                Op::Mean { keep_dims } => nn::mean(&mut op, *keep_dims)?,
                Op::Mul { .. } => binary::mul(&mut op)?,
                Op::Pad => array::pad(&mut op)?,
                Op::PRelu => activations::prelu(&mut op)?,
                Op::Relu => activations::relu(&mut op)?,
                Op::Relu6 => activations::relu6(&mut op)?,
                Op::Reshape { .. } => array::reshape(&mut op)?,
                Op::ResizeBilinear { align_corners, half_pixel_centers } => {
                    resize::upsample(&mut op, "linear", *align_corners, *half_pixel_centers)?
                }
                Op::ResizeNearestNeighbor { align_corners, half_pixel_centers } => {
                    resize::upsample(&mut op, "nearest", *align_corners, *half_pixel_centers)?
                }
                Op::Softmax { beta } => nn::softmax(&mut op, *beta)?,
                Op::Squeeze { squeeze_dims } => array::squeeze(&mut op, squeeze_dims)?,
                Op::TransposeConv(conv) => cnn::transpose_conv(&mut op, conv)?,
            }
            if !node.activation_extracted {
                if let Some(activation) = record.op.fused_activation() {
                    activations::inline_fused(&mut op, activation)?;
                }
            }
        }
    }
    debug!(
        "Lowered {} ({}) to [{}]",
        node,
        record.op,
        op.lowered.nodes.iter().map(|n| n.op_type.as_str()).join(", ")
    );
    Ok(op.lowered)
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use tfl2onnx_tflite::ops::{Conv2D, Pool2D};

    /// Lower every node of `model` with graph inputs bound to their own name.
    pub fn lower_all(model: &SourceModel) -> Result<(Graph, Vec<Lowered>)> {
        let graph = Graph::build(&model.operators, &model.catalog, &model.inputs, &model.outputs)?;
        lower_graph(model, graph)
    }

    pub fn lower_graph(model: &SourceModel, graph: Graph) -> Result<(Graph, Vec<Lowered>)> {
        let mut table = TranslationTable::default();
        for &input in &model.inputs {
            let name = tensor_name(&model.catalog, input)?;
            table.insert(name.clone(), vec![name]);
        }
        let mut all = vec![];
        for &id in &graph.order {
            let lowered = {
                let ctx = LoweringContext::new(model, &graph, &table);
                lower(&ctx, id)?
            };
            table.insert(graph.node(id).name.clone(), lowered.output_names());
            all.push(lowered);
        }
        Ok((graph, all))
    }

    pub fn single(model: &SourceModel) -> Lowered {
        let (_, mut lowered) = lower_all(model).unwrap();
        lowered.pop().unwrap()
    }

    pub fn op_types(lowered: &Lowered) -> Vec<&str> {
        lowered.nodes.iter().map(|n| n.op_type.as_str()).collect()
    }

    pub fn shape_of(lowered: &Lowered, name: &str) -> Vec<i64> {
        lowered.value_infos.iter().find(|vi| vi.name == name).unwrap().shape().unwrap()
    }

    pub fn constant<'l>(lowered: &'l Lowered, name: &str) -> &'l TensorProto {
        lowered.constants.iter().find(|c| c.name == name).unwrap()
    }

    /// `x -> op -> y` with `x` and `y` of the given shapes, extra constant
    /// inputs appended after `x`.
    pub fn unary(
        op: Op,
        input: &[usize],
        output: &[usize],
        constants: &[(&[usize], Vec<f32>)],
    ) -> SourceModel {
        let mut catalog = TensorCatalog::default();
        let x = catalog.add_activation("x", input, DatumType::F32);
        let mut inputs = tvec!(x as i32);
        for (ix, (shape, data)) in constants.iter().enumerate() {
            inputs.push(catalog.add_f32_constant(format!("c{ix}"), shape, data) as i32);
        }
        let y = catalog.add_activation("y", output, DatumType::F32);
        SourceModel {
            catalog,
            operators: vec![OperatorRecord::new(op, inputs, tvec!(y as i32))],
            inputs: tvec!(x),
            outputs: tvec!(y),
            description: None,
        }
    }

    #[test]
    fn translation_table_binding() {
        let mut table = TranslationTable::default();
        table.insert("a", vec!["a_transpose".into(), "a".into()]);
        assert_eq!(table.binding("a"), Some("a"));
        assert_eq!(table.get("a").unwrap().len(), 2);
        assert_eq!(table.binding("b"), None);
    }

    #[test]
    fn operands_resolve_through_the_table() {
        let mut catalog = TensorCatalog::default();
        let x = catalog.add_activation("x", &[1, 2, 2, 1], DatumType::F32);
        let w = catalog.add_f32_constant("w", &[1, 1, 1, 1], &[2.0]);
        let a = catalog.add_activation("a", &[1, 2, 2, 1], DatumType::F32);
        let pool = Pool2D::new(Padding::Valid, 1, 1, 1, 1, FusedActivation::None);
        let conv = Conv2D::new(Padding::Valid, 1, 1, 1, 1, FusedActivation::None);
        let b = catalog.add_activation("b", &[1, 2, 2, 1], DatumType::F32);
        let model = SourceModel {
            catalog,
            operators: vec![
                OperatorRecord::new(Op::MaxPool2D(pool), tvec!(x as i32), tvec!(a as i32)),
                OperatorRecord::new(Op::Conv2D(conv), tvec!(a as i32, w as i32, -1), tvec!(b as i32)),
            ],
            inputs: tvec!(x),
            outputs: tvec!(b),
            description: None,
        };
        let graph = Graph::build(&model.operators, &model.catalog, &model.inputs, &model.outputs).unwrap();
        let mut table = TranslationTable::default();
        table.insert("x", vec!["transpose_node_input_x".into()]);
        table.insert("a", vec!["a".into()]);
        let ctx = LoweringContext::new(&model, &graph, &table);
        let op = LowerOp::new(&ctx, 1).unwrap();
        assert_eq!(op.input(0).unwrap(), Operand::Wire("a".into()));
        assert_eq!(op.input(1).unwrap(), Operand::Constant(w));
        assert_eq!(op.input(2).unwrap(), Operand::Absent);
        assert_eq!(op.input(7).unwrap(), Operand::Absent);
        let first = LowerOp::new(&ctx, 0).unwrap();
        assert_eq!(first.input(0).unwrap(), Operand::Wire("transpose_node_input_x".into()));
        assert!(first.constant(0).is_err());
    }

    #[test]
    fn unsupported_constant_type() {
        let mut model = unary(Op::PRelu, &[1, 4], &[1, 4], &[]);
        let slope = model.catalog.add_i32_constant("slope", &[4], &[1, 1, 1, 1]);
        model.operators[0].inputs.push(slope as i32);
        assert!(lower_all(&model).is_err());
    }
}
