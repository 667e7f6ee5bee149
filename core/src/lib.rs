//! # tfl2onnx-core
//!
//! Graph IR engine of the converter: links the TFLite operator list into a
//! graph, rewrites it (activation de-fusion, layout boundaries) and lowers
//! every node to ONNX operators.
//!
//! ```no_run
//! # fn main() -> anyhow::Result<()> {
//! let source = tfl2onnx_tflite::for_path("mobilenet.tflite")?;
//! let model = tfl2onnx_core::convert(&source, &tfl2onnx_core::ConvertOptions::default())?;
//! tfl2onnx_onnx::save(&model, "mobilenet.onnx")?;
//! # Ok(())
//! # }
//! ```

#[macro_use]
extern crate derive_new;
#[macro_use]
extern crate log;

pub mod boundary;
pub mod convert;
pub mod defuse;
pub mod graph;
pub mod layout;
pub mod ops;
pub mod padding;

pub use convert::{convert, ConvertOptions};
pub use defuse::{defuse, DefuseOutcome};
pub use graph::{Graph, GraphNode, NodeId, NodeKind};

pub mod internal {
    pub use crate::graph::{Graph, GraphNode, NodeId, NodeKind};
    pub use crate::layout::{self, NCHW_TO_NHWC, NHWC_TO_NCHW};
    pub use crate::ops::{Lowered, LoweringContext, Operand, TranslationTable};
    pub use crate::padding::compute_padding;
    pub use itertools::Itertools;
    pub use tfl2onnx_onnx::pb::tensor_proto::DataType;
    pub use tfl2onnx_onnx::pb::{NodeProto, TensorProto, ValueInfoProto};
    pub use tfl2onnx_tflite::internal::*;
}
