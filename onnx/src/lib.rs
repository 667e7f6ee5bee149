#[macro_use]
extern crate log;

pub mod model;
pub mod pb_helpers;
pub mod tensor;

#[allow(clippy::all)]
pub mod pb {
    include!("prost/onnx.rs");
}

pub use self::model::{check_model, for_path, save, ModelBuilder, OPSET_VERSION};
