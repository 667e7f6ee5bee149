use anyhow::{bail, ensure, Result};

use crate::pb::tensor_proto::DataType;
use crate::pb::TensorProto;

impl TensorProto {
    pub fn from_f32(name: impl Into<String>, dims: &[usize], data: Vec<f32>) -> Result<TensorProto> {
        check_volume(dims, data.len())?;
        Ok(TensorProto {
            name: name.into(),
            dims: dims.iter().map(|&d| d as i64).collect(),
            data_type: DataType::Float as i32,
            float_data: data,
            ..TensorProto::default()
        })
    }

    pub fn from_i64(name: impl Into<String>, dims: &[usize], data: Vec<i64>) -> Result<TensorProto> {
        check_volume(dims, data.len())?;
        Ok(TensorProto {
            name: name.into(),
            dims: dims.iter().map(|&d| d as i64).collect(),
            data_type: DataType::Int64 as i32,
            int64_data: data,
            ..TensorProto::default()
        })
    }

    pub fn shape(&self) -> Vec<usize> {
        self.dims.iter().map(|&d| d as usize).collect()
    }

    pub fn as_f32(&self) -> Result<Vec<f32>> {
        ensure!(self.data_type() == DataType::Float, "Tensor {} is not f32", self.name);
        if !self.raw_data.is_empty() {
            return Ok(self
                .raw_data
                .chunks_exact(4)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect());
        }
        Ok(self.float_data.clone())
    }

    pub fn as_i64(&self) -> Result<Vec<i64>> {
        match self.data_type() {
            DataType::Int64 => Ok(self.int64_data.clone()),
            DataType::Int32 => Ok(self.int32_data.iter().map(|&i| i as i64).collect()),
            other => bail!("Tensor {} is {:?}, expected an integer type", self.name, other),
        }
    }
}

fn check_volume(dims: &[usize], len: usize) -> Result<()> {
    let volume: usize = dims.iter().product();
    ensure!(volume == len, "Shape {dims:?} expects {volume} values, got {len}");
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn f32_tensor() {
        let t = TensorProto::from_f32("w", &[2, 1, 1], vec![1.0, 2.0]).unwrap();
        assert_eq!(t.shape(), vec![2, 1, 1]);
        assert_eq!(t.as_f32().unwrap(), vec![1.0, 2.0]);
        assert!(t.as_i64().is_err());
    }

    #[test]
    fn element_type_follows_constructor() {
        let t = TensorProto::from_i64("shape", &[2], vec![-1, 12]).unwrap();
        assert_eq!(t.data_type(), DataType::Int64);
        assert_eq!(t.as_i64().unwrap(), vec![-1, 12]);
        assert!(t.as_f32().is_err());
        assert_eq!(TensorProto::from_f32("w", &[1], vec![1.0]).unwrap().data_type(), DataType::Float);
    }

    #[test]
    fn volume_mismatch() {
        assert!(TensorProto::from_i64("s", &[3], vec![1, 2]).is_err());
    }

    #[test]
    fn scalar_tensor() {
        let t = TensorProto::from_f32("beta", &[], vec![0.5]).unwrap();
        assert!(t.dims.is_empty());
        assert_eq!(t.as_f32().unwrap(), vec![0.5]);
    }
}
