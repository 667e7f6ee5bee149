#[macro_use]
extern crate derive_new;
#[macro_use]
extern crate log;

#[macro_use]
mod macros;
pub mod model;
pub mod ops;
pub mod ser;
pub mod tensors;
pub mod tflite;

pub use model::{SourceModel, TfliteProtoModel};
pub use ops::{FusedActivation, Op, OperatorRecord, Padding};
pub use tensors::{DatumType, TensorCatalog, TensorDescriptor};

pub type TVec<T> = smallvec::SmallVec<[T; 4]>;

pub fn for_path(p: impl AsRef<std::path::Path>) -> anyhow::Result<SourceModel> {
    TfliteProtoModel::for_path(p)?.decode()
}

pub mod internal {
    pub use crate::model::SourceModel;
    pub use crate::ops::{FusedActivation, Op, OperatorRecord, Padding};
    pub use crate::tensors::{DatumType, TensorCatalog, TensorDescriptor};
    pub use crate::{tvec, TVec};
    pub use anyhow::{bail, ensure, format_err, Context, Result};
}
