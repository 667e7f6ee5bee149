//! Minimal TFLite writer, enough to produce fixture models.

use flatbuffers::{FlatBufferBuilder, UnionWIPOffset, WIPOffset};

use crate::internal::*;
use crate::tflite::{self, builtin_options as bopt};

#[derive(Clone, Debug)]
struct TensorSpec {
    name: String,
    shape: TVec<i32>,
    datum_type: DatumType,
    buffer: u32,
}

#[derive(Clone, Debug)]
enum OpSpec {
    Builtin(Op),
    Raw(i32),
}

#[derive(Clone, Debug)]
struct OperatorSpec {
    op: OpSpec,
    inputs: TVec<i32>,
    outputs: TVec<i32>,
}

#[derive(Clone, Debug, Default)]
pub struct ModelWriter {
    tensors: Vec<TensorSpec>,
    buffers: Vec<Vec<u8>>,
    operators: Vec<OperatorSpec>,
    inputs: TVec<i32>,
    outputs: TVec<i32>,
}

impl ModelWriter {
    pub fn activation(&mut self, name: &str, shape: &[usize]) -> i32 {
        self.tensor(name, shape, DatumType::F32, 0)
    }

    pub fn f32_constant(&mut self, name: &str, shape: &[usize], data: &[f32]) -> i32 {
        let bytes = data.iter().flat_map(|x| x.to_le_bytes()).collect();
        let buffer = self.buffer(bytes);
        self.tensor(name, shape, DatumType::F32, buffer)
    }

    pub fn i32_constant(&mut self, name: &str, shape: &[usize], data: &[i32]) -> i32 {
        let bytes = data.iter().flat_map(|x| x.to_le_bytes()).collect();
        let buffer = self.buffer(bytes);
        self.tensor(name, shape, DatumType::I32, buffer)
    }

    fn buffer(&mut self, bytes: Vec<u8>) -> u32 {
        // slot 0 stays the empty sentinel
        self.buffers.push(bytes);
        self.buffers.len() as u32
    }

    fn tensor(&mut self, name: &str, shape: &[usize], datum_type: DatumType, buffer: u32) -> i32 {
        self.tensors.push(TensorSpec {
            name: name.to_string(),
            shape: shape.iter().map(|d| *d as i32).collect(),
            datum_type,
            buffer,
        });
        self.tensors.len() as i32 - 1
    }

    pub fn operator(&mut self, op: Op, inputs: &[i32], outputs: &[i32]) {
        self.operators.push(OperatorSpec {
            op: OpSpec::Builtin(op),
            inputs: inputs.into(),
            outputs: outputs.into(),
        });
    }

    /// An operator with an arbitrary builtin code and no options.
    pub fn raw_operator(&mut self, code: i32, inputs: &[i32], outputs: &[i32]) {
        self.operators.push(OperatorSpec {
            op: OpSpec::Raw(code),
            inputs: inputs.into(),
            outputs: outputs.into(),
        });
    }

    pub fn inputs(&mut self, inputs: &[i32]) {
        self.inputs = inputs.into();
    }

    pub fn outputs(&mut self, outputs: &[i32]) {
        self.outputs = outputs.into();
    }

    pub fn finish(&self) -> Vec<u8> {
        let mut fbb = FlatBufferBuilder::new();

        let mut codes: Vec<i32> = vec![];
        let mut operators = vec![];
        for spec in &self.operators {
            let code = match &spec.op {
                OpSpec::Builtin(op) => op.builtin_code(),
                OpSpec::Raw(code) => *code,
            };
            let opcode_index = codes.iter().position(|c| *c == code).unwrap_or_else(|| {
                codes.push(code);
                codes.len() - 1
            });
            let (options_type, options) = match &spec.op {
                OpSpec::Builtin(op) => write_options(&mut fbb, op),
                OpSpec::Raw(_) => (bopt::NONE, None),
            };
            let inputs = fbb.create_vector(&spec.inputs);
            let outputs = fbb.create_vector(&spec.outputs);
            let start = fbb.start_table();
            fbb.push_slot::<u32>(tflite::Operator::VT_OPCODE_INDEX, opcode_index as u32, 0);
            fbb.push_slot_always(tflite::Operator::VT_INPUTS, inputs);
            fbb.push_slot_always(tflite::Operator::VT_OUTPUTS, outputs);
            fbb.push_slot::<u8>(tflite::Operator::VT_BUILTIN_OPTIONS_TYPE, options_type, 0);
            if let Some(options) = options {
                fbb.push_slot_always(tflite::Operator::VT_BUILTIN_OPTIONS, options);
            }
            let end = fbb.end_table(start);
            operators.push(WIPOffset::<tflite::Operator>::new(end.value()));
        }

        let mut tensors = vec![];
        for spec in &self.tensors {
            let shape = fbb.create_vector(&spec.shape);
            let name = fbb.create_string(&spec.name);
            let start = fbb.start_table();
            fbb.push_slot_always(tflite::Tensor::VT_SHAPE, shape);
            fbb.push_slot::<i8>(tflite::Tensor::VT_TYPE_, spec.datum_type.code(), 0);
            fbb.push_slot::<u32>(tflite::Tensor::VT_BUFFER, spec.buffer, 0);
            fbb.push_slot_always(tflite::Tensor::VT_NAME, name);
            let end = fbb.end_table(start);
            tensors.push(WIPOffset::<tflite::Tensor>::new(end.value()));
        }

        let tensors = fbb.create_vector(&tensors);
        let inputs = fbb.create_vector(&self.inputs);
        let outputs = fbb.create_vector(&self.outputs);
        let operators = fbb.create_vector(&operators);
        let name = fbb.create_string("main");
        let start = fbb.start_table();
        fbb.push_slot_always(tflite::SubGraph::VT_TENSORS, tensors);
        fbb.push_slot_always(tflite::SubGraph::VT_INPUTS, inputs);
        fbb.push_slot_always(tflite::SubGraph::VT_OUTPUTS, outputs);
        fbb.push_slot_always(tflite::SubGraph::VT_OPERATORS, operators);
        fbb.push_slot_always(tflite::SubGraph::VT_NAME, name);
        let end = fbb.end_table(start);
        let subgraph = WIPOffset::<tflite::SubGraph>::new(end.value());

        let mut buffers = vec![];
        for bytes in std::iter::once(&vec![]).chain(self.buffers.iter()) {
            let data = (!bytes.is_empty()).then(|| fbb.create_vector(bytes));
            let start = fbb.start_table();
            if let Some(data) = data {
                fbb.push_slot_always(tflite::Buffer::VT_DATA, data);
            }
            let end = fbb.end_table(start);
            buffers.push(WIPOffset::<tflite::Buffer>::new(end.value()));
        }

        let mut operator_codes = vec![];
        for code in codes {
            let start = fbb.start_table();
            fbb.push_slot::<i8>(
                tflite::OperatorCode::VT_DEPRECATED_BUILTIN_CODE,
                code.min(127) as i8,
                0,
            );
            fbb.push_slot::<i32>(tflite::OperatorCode::VT_VERSION, 1, 1);
            fbb.push_slot::<i32>(tflite::OperatorCode::VT_BUILTIN_CODE, code, 0);
            let end = fbb.end_table(start);
            operator_codes.push(WIPOffset::<tflite::OperatorCode>::new(end.value()));
        }

        let operator_codes = fbb.create_vector(&operator_codes);
        let subgraphs = fbb.create_vector(&[subgraph]);
        let buffers = fbb.create_vector(&buffers);
        let description = fbb.create_string("tfl2onnx fixture");
        let start = fbb.start_table();
        fbb.push_slot::<u32>(tflite::Model::VT_VERSION, 3, 0);
        fbb.push_slot_always(tflite::Model::VT_OPERATOR_CODES, operator_codes);
        fbb.push_slot_always(tflite::Model::VT_SUBGRAPHS, subgraphs);
        fbb.push_slot_always(tflite::Model::VT_DESCRIPTION, description);
        fbb.push_slot_always(tflite::Model::VT_BUFFERS, buffers);
        let end = fbb.end_table(start);
        let model = WIPOffset::<tflite::Model>::new(end.value());
        fbb.finish(model, Some(tflite::FILE_IDENTIFIER));
        fbb.finished_data().to_vec()
    }
}

fn options_table(
    fbb: &mut FlatBufferBuilder,
    fill: impl FnOnce(&mut FlatBufferBuilder),
) -> Option<WIPOffset<UnionWIPOffset>> {
    let start = fbb.start_table();
    fill(fbb);
    let end = fbb.end_table(start);
    Some(WIPOffset::new(end.value()))
}

fn write_options(fbb: &mut FlatBufferBuilder, op: &Op) -> (u8, Option<WIPOffset<UnionWIPOffset>>) {
    match op {
        Op::Add { fused } => (bopt::ADD_OPTIONS, options_table(fbb, |f| f.push_slot(4, fused.code(), 0))),
        Op::Mul { fused } => (bopt::MUL_OPTIONS, options_table(fbb, |f| f.push_slot(4, fused.code(), 0))),
        Op::L2Normalization { fused } => {
            (bopt::L2_NORM_OPTIONS, options_table(fbb, |f| f.push_slot(4, fused.code(), 0)))
        }
        Op::AveragePool2D(p) | Op::MaxPool2D(p) => (
            bopt::POOL_2D_OPTIONS,
            options_table(fbb, |f| {
                f.push_slot(4, p.padding.code(), 0);
                f.push_slot(6, p.stride_w as i32, 0);
                f.push_slot(8, p.stride_h as i32, 0);
                f.push_slot(10, p.filter_w as i32, 0);
                f.push_slot(12, p.filter_h as i32, 0);
                f.push_slot(14, p.fused.code(), 0);
            }),
        ),
        Op::Concatenation { axis, fused } => (
            bopt::CONCATENATION_OPTIONS,
            options_table(fbb, |f| {
                f.push_slot(4, *axis, 0);
                f.push_slot(6, fused.code(), 0);
            }),
        ),
        Op::Conv2D(c) => (
            bopt::CONV_2D_OPTIONS,
            options_table(fbb, |f| {
                f.push_slot(4, c.padding.code(), 0);
                f.push_slot(6, c.stride_w as i32, 0);
                f.push_slot(8, c.stride_h as i32, 0);
                f.push_slot(10, c.fused.code(), 0);
                f.push_slot(12, c.dilation_w as i32, 1);
                f.push_slot(14, c.dilation_h as i32, 1);
            }),
        ),
        Op::DepthwiseConv2D(c) => (
            bopt::DEPTHWISE_CONV_2D_OPTIONS,
            options_table(fbb, |f| {
                f.push_slot(4, c.padding.code(), 0);
                f.push_slot(6, c.stride_w as i32, 0);
                f.push_slot(8, c.stride_h as i32, 0);
                f.push_slot(10, c.depth_multiplier as i32, 0);
                f.push_slot(12, c.fused.code(), 0);
                f.push_slot(14, c.dilation_w as i32, 1);
                f.push_slot(16, c.dilation_h as i32, 1);
            }),
        ),
        Op::TransposeConv(c) => (
            bopt::TRANSPOSE_CONV_OPTIONS,
            options_table(fbb, |f| {
                f.push_slot(4, c.padding.code(), 0);
                f.push_slot(6, c.stride_w as i32, 0);
                f.push_slot(8, c.stride_h as i32, 0);
                f.push_slot(10, c.fused.code(), 0);
            }),
        ),
        Op::FullyConnected { fused, keep_num_dims } => (
            bopt::FULLY_CONNECTED_OPTIONS,
            options_table(fbb, |f| {
                f.push_slot(4, fused.code(), 0);
                f.push_slot(8, *keep_num_dims, false);
            }),
        ),
        Op::Mean { keep_dims } => {
            (bopt::REDUCER_OPTIONS, options_table(fbb, |f| f.push_slot(4, *keep_dims, false)))
        }
        Op::Softmax { beta } => {
            (bopt::SOFTMAX_OPTIONS, options_table(fbb, |f| f.push_slot(4, *beta, 0.0f32)))
        }
        Op::ResizeBilinear { align_corners, half_pixel_centers } => (
            bopt::RESIZE_BILINEAR_OPTIONS,
            options_table(fbb, |f| {
                f.push_slot(8, *align_corners, false);
                f.push_slot(10, *half_pixel_centers, false);
            }),
        ),
        Op::ResizeNearestNeighbor { align_corners, half_pixel_centers } => (
            bopt::RESIZE_NEAREST_NEIGHBOR_OPTIONS,
            options_table(fbb, |f| {
                f.push_slot(4, *align_corners, false);
                f.push_slot(6, *half_pixel_centers, false);
            }),
        ),
        Op::Reshape { new_shape: Some(shape) } => {
            let shape = fbb.create_vector(shape);
            (bopt::RESHAPE_OPTIONS, options_table(fbb, |f| f.push_slot_always(4, shape)))
        }
        Op::Squeeze { squeeze_dims } => {
            let dims = fbb.create_vector(squeeze_dims);
            (bopt::SQUEEZE_OPTIONS, options_table(fbb, |f| f.push_slot_always(4, dims)))
        }
        Op::Pad => (bopt::PAD_OPTIONS, options_table(fbb, |_| ())),
        Op::Reshape { new_shape: None } | Op::Logistic | Op::PRelu | Op::Relu | Op::Relu6 => {
            (bopt::NONE, None)
        }
    }
}
