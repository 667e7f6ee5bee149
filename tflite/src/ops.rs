use std::fmt;

use crate::internal::*;
use crate::tflite::{builtin_operator as bo, Operator};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FusedActivation {
    None,
    Relu,
    ReluN1To1,
    Relu6,
    Tanh,
    SignBit,
    Unknown(i8),
}

impl FusedActivation {
    pub fn from_code(code: i8) -> FusedActivation {
        match code {
            0 => FusedActivation::None,
            1 => FusedActivation::Relu,
            2 => FusedActivation::ReluN1To1,
            3 => FusedActivation::Relu6,
            4 => FusedActivation::Tanh,
            5 => FusedActivation::SignBit,
            other => FusedActivation::Unknown(other),
        }
    }

    pub fn code(&self) -> i8 {
        match self {
            FusedActivation::None => 0,
            FusedActivation::Relu => 1,
            FusedActivation::ReluN1To1 => 2,
            FusedActivation::Relu6 => 3,
            FusedActivation::Tanh => 4,
            FusedActivation::SignBit => 5,
            FusedActivation::Unknown(code) => *code,
        }
    }

    pub fn is_none(&self) -> bool {
        *self == FusedActivation::None
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Padding {
    Same,
    Valid,
    Other(i8),
}

impl Padding {
    pub fn from_code(code: i8) -> Padding {
        match code {
            0 => Padding::Same,
            1 => Padding::Valid,
            other => Padding::Other(other),
        }
    }

    pub fn code(&self) -> i8 {
        match self {
            Padding::Same => 0,
            Padding::Valid => 1,
            Padding::Other(code) => *code,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, new)]
pub struct Conv2D {
    pub padding: Padding,
    pub stride_h: usize,
    pub stride_w: usize,
    pub dilation_h: usize,
    pub dilation_w: usize,
    pub fused: FusedActivation,
}

#[derive(Clone, Copy, Debug, PartialEq, new)]
pub struct DepthwiseConv2D {
    pub padding: Padding,
    pub stride_h: usize,
    pub stride_w: usize,
    pub depth_multiplier: usize,
    pub dilation_h: usize,
    pub dilation_w: usize,
    pub fused: FusedActivation,
}

#[derive(Clone, Copy, Debug, PartialEq, new)]
pub struct Pool2D {
    pub padding: Padding,
    pub stride_h: usize,
    pub stride_w: usize,
    pub filter_h: usize,
    pub filter_w: usize,
    pub fused: FusedActivation,
}

#[derive(Clone, Copy, Debug, PartialEq, new)]
pub struct TransposeConv {
    pub padding: Padding,
    pub stride_h: usize,
    pub stride_w: usize,
    pub fused: FusedActivation,
}

/// Operator kind along with its decoded builtin options.
#[derive(Clone, Debug, PartialEq)]
pub enum Op {
    Add { fused: FusedActivation },
    AveragePool2D(Pool2D),
    Concatenation { axis: i32, fused: FusedActivation },
    Conv2D(Conv2D),
    DepthwiseConv2D(DepthwiseConv2D),
    FullyConnected { fused: FusedActivation, keep_num_dims: bool },
    L2Normalization { fused: FusedActivation },
    Logistic,
    MaxPool2D(Pool2D),
    Mean { keep_dims: bool },
    Mul { fused: FusedActivation },
    Pad,
    PRelu,
    Relu,
    Relu6,
    Reshape { new_shape: Option<TVec<i32>> },
    ResizeBilinear { align_corners: bool, half_pixel_centers: bool },
    ResizeNearestNeighbor { align_corners: bool, half_pixel_centers: bool },
    Softmax { beta: f32 },
    Squeeze { squeeze_dims: TVec<i32> },
    TransposeConv(TransposeConv),
}

impl Op {
    pub fn name(&self) -> &'static str {
        match self {
            Op::Add { .. } => "ADD",
            Op::AveragePool2D(_) => "AVERAGE_POOL_2D",
            Op::Concatenation { .. } => "CONCATENATION",
            Op::Conv2D(_) => "CONV_2D",
            Op::DepthwiseConv2D(_) => "DEPTHWISE_CONV_2D",
            Op::FullyConnected { .. } => "FULLY_CONNECTED",
            Op::L2Normalization { .. } => "L2_NORMALIZATION",
            Op::Logistic => "LOGISTIC",
            Op::MaxPool2D(_) => "MAX_POOL_2D",
            Op::Mean { .. } => "MEAN",
            Op::Mul { .. } => "MUL",
            Op::Pad => "PAD",
            Op::PRelu => "PRELU",
            Op::Relu => "RELU",
            Op::Relu6 => "RELU6",
            Op::Reshape { .. } => "RESHAPE",
            Op::ResizeBilinear { .. } => "RESIZE_BILINEAR",
            Op::ResizeNearestNeighbor { .. } => "RESIZE_NEAREST_NEIGHBOR",
            Op::Softmax { .. } => "SOFTMAX",
            Op::Squeeze { .. } => "SQUEEZE",
            Op::TransposeConv(_) => "TRANSPOSE_CONV",
        }
    }

    pub fn builtin_code(&self) -> i32 {
        match self {
            Op::Add { .. } => bo::ADD,
            Op::AveragePool2D(_) => bo::AVERAGE_POOL_2D,
            Op::Concatenation { .. } => bo::CONCATENATION,
            Op::Conv2D(_) => bo::CONV_2D,
            Op::DepthwiseConv2D(_) => bo::DEPTHWISE_CONV_2D,
            Op::FullyConnected { .. } => bo::FULLY_CONNECTED,
            Op::L2Normalization { .. } => bo::L2_NORMALIZATION,
            Op::Logistic => bo::LOGISTIC,
            Op::MaxPool2D(_) => bo::MAX_POOL_2D,
            Op::Mean { .. } => bo::MEAN,
            Op::Mul { .. } => bo::MUL,
            Op::Pad => bo::PAD,
            Op::PRelu => bo::PRELU,
            Op::Relu => bo::RELU,
            Op::Relu6 => bo::RELU6,
            Op::Reshape { .. } => bo::RESHAPE,
            Op::ResizeBilinear { .. } => bo::RESIZE_BILINEAR,
            Op::ResizeNearestNeighbor { .. } => bo::RESIZE_NEAREST_NEIGHBOR,
            Op::Softmax { .. } => bo::SOFTMAX,
            Op::Squeeze { .. } => bo::SQUEEZE,
            Op::TransposeConv(_) => bo::TRANSPOSE_CONV,
        }
    }

    /// The activation embedded in the operator, for the kinds that carry one.
    pub fn fused_activation(&self) -> Option<FusedActivation> {
        match self {
            Op::Add { fused }
            | Op::Concatenation { fused, .. }
            | Op::FullyConnected { fused, .. }
            | Op::L2Normalization { fused }
            | Op::Mul { fused } => Some(*fused),
            Op::AveragePool2D(p) | Op::MaxPool2D(p) => Some(p.fused),
            Op::Conv2D(c) => Some(c.fused),
            Op::DepthwiseConv2D(c) => Some(c.fused),
            Op::TransposeConv(c) => Some(c.fused),
            _ => None,
        }
    }

    pub fn decode(code: i32, flat: &Operator) -> Result<Op> {
        macro_rules! options {
            ($getter:ident) => {
                flat.$getter().with_context(|| {
                    format!("Missing {} for operator code {code}", stringify!($getter))
                })?
            };
        }
        let fused = |code: i8| FusedActivation::from_code(code);
        let op = match code {
            bo::ADD => Op::Add {
                fused: fused(
                    flat.builtin_options_as_add_options()
                        .map(|o| o.fused_activation_function())
                        .unwrap_or(0),
                ),
            },
            bo::AVERAGE_POOL_2D | bo::MAX_POOL_2D => {
                let o = options!(builtin_options_as_pool_2d_options);
                let pool = Pool2D::new(
                    Padding::from_code(o.padding()),
                    positive(o.stride_h(), "stride_h")?,
                    positive(o.stride_w(), "stride_w")?,
                    positive(o.filter_height(), "filter_height")?,
                    positive(o.filter_width(), "filter_width")?,
                    fused(o.fused_activation_function()),
                );
                if code == bo::MAX_POOL_2D {
                    Op::MaxPool2D(pool)
                } else {
                    Op::AveragePool2D(pool)
                }
            }
            bo::CONCATENATION => {
                let o = options!(builtin_options_as_concatenation_options);
                Op::Concatenation { axis: o.axis(), fused: fused(o.fused_activation_function()) }
            }
            bo::CONV_2D => {
                let o = options!(builtin_options_as_conv_2d_options);
                Op::Conv2D(Conv2D::new(
                    Padding::from_code(o.padding()),
                    positive(o.stride_h(), "stride_h")?,
                    positive(o.stride_w(), "stride_w")?,
                    positive(o.dilation_h_factor(), "dilation_h_factor")?,
                    positive(o.dilation_w_factor(), "dilation_w_factor")?,
                    fused(o.fused_activation_function()),
                ))
            }
            bo::DEPTHWISE_CONV_2D => {
                let o = options!(builtin_options_as_depthwise_conv_2d_options);
                Op::DepthwiseConv2D(DepthwiseConv2D::new(
                    Padding::from_code(o.padding()),
                    positive(o.stride_h(), "stride_h")?,
                    positive(o.stride_w(), "stride_w")?,
                    o.depth_multiplier().max(1) as usize,
                    positive(o.dilation_h_factor(), "dilation_h_factor")?,
                    positive(o.dilation_w_factor(), "dilation_w_factor")?,
                    fused(o.fused_activation_function()),
                ))
            }
            bo::FULLY_CONNECTED => {
                let o = flat.builtin_options_as_fully_connected_options();
                ensure!(
                    o.map(|o| o.weights_format()).unwrap_or(0) == 0,
                    "Only default weights format is supported for FULLY_CONNECTED"
                );
                Op::FullyConnected {
                    fused: fused(o.map(|o| o.fused_activation_function()).unwrap_or(0)),
                    keep_num_dims: o.map(|o| o.keep_num_dims()).unwrap_or(false),
                }
            }
            bo::L2_NORMALIZATION => Op::L2Normalization {
                fused: fused(
                    flat.builtin_options_as_l2_norm_options()
                        .map(|o| o.fused_activation_function())
                        .unwrap_or(0),
                ),
            },
            bo::LOGISTIC => Op::Logistic,
            bo::MEAN => Op::Mean {
                keep_dims: flat
                    .builtin_options_as_reducer_options()
                    .map(|o| o.keep_dims())
                    .unwrap_or(false),
            },
            bo::MUL => Op::Mul {
                fused: fused(
                    flat.builtin_options_as_mul_options()
                        .map(|o| o.fused_activation_function())
                        .unwrap_or(0),
                ),
            },
            bo::PAD => Op::Pad,
            bo::PRELU => Op::PRelu,
            bo::RELU => Op::Relu,
            bo::RELU6 => Op::Relu6,
            bo::RESHAPE => Op::Reshape {
                new_shape: flat
                    .builtin_options_as_reshape_options()
                    .and_then(|o| o.new_shape())
                    .map(|s| s.iter().collect()),
            },
            bo::RESIZE_BILINEAR => {
                let o = flat.builtin_options_as_resize_bilinear_options();
                Op::ResizeBilinear {
                    align_corners: o.map(|o| o.align_corners()).unwrap_or(false),
                    half_pixel_centers: o.map(|o| o.half_pixel_centers()).unwrap_or(false),
                }
            }
            bo::RESIZE_NEAREST_NEIGHBOR => {
                let o = flat.builtin_options_as_resize_nearest_neighbor_options();
                Op::ResizeNearestNeighbor {
                    align_corners: o.map(|o| o.align_corners()).unwrap_or(false),
                    half_pixel_centers: o.map(|o| o.half_pixel_centers()).unwrap_or(false),
                }
            }
            bo::SOFTMAX => Op::Softmax {
                beta: flat.builtin_options_as_softmax_options().map(|o| o.beta()).unwrap_or(1.0),
            },
            bo::SQUEEZE => Op::Squeeze {
                squeeze_dims: flat
                    .builtin_options_as_squeeze_options()
                    .and_then(|o| o.squeeze_dims())
                    .map(|s| s.iter().collect())
                    .unwrap_or_default(),
            },
            bo::TRANSPOSE_CONV => {
                let o = options!(builtin_options_as_transpose_conv_options);
                Op::TransposeConv(TransposeConv::new(
                    Padding::from_code(o.padding()),
                    positive(o.stride_h(), "stride_h")?,
                    positive(o.stride_w(), "stride_w")?,
                    fused(o.fused_activation_function()),
                ))
            }
            bo::CUSTOM => bail!("Custom operators are not supported"),
            _ => bail!("Unsupported operator code {code}"),
        };
        Ok(op)
    }
}

fn positive(value: i32, what: &str) -> Result<usize> {
    ensure!(value > 0, "Expected a positive {what}, got {value}");
    Ok(value as usize)
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One operator of the source subgraph, in source order.
///
/// Inputs keep the `-1` marker of absent optional tensors.
#[derive(Clone, Debug, PartialEq, new)]
pub struct OperatorRecord {
    pub op: Op,
    pub inputs: TVec<i32>,
    pub outputs: TVec<i32>,
}

impl OperatorRecord {
    pub fn output(&self) -> Result<usize> {
        ensure!(self.outputs.len() == 1, "{} has {} outputs", self.op, self.outputs.len());
        ensure!(self.outputs[0] >= 0, "{} has an invalid output tensor", self.op);
        Ok(self.outputs[0] as usize)
    }

    /// Tensor index of input `slot`, `None` if the slot is absent or optional.
    pub fn input(&self, slot: usize) -> Option<usize> {
        self.inputs.get(slot).filter(|ix| **ix >= 0).map(|ix| *ix as usize)
    }
}
