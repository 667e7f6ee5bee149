use std::collections::HashMap;
use std::fmt;

use crate::internal::*;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DatumType {
    F32,
    F16,
    I32,
    U8,
    I64,
    String,
    Bool,
    I16,
    Complex64,
    I8,
    F64,
}

impl DatumType {
    pub fn from_code(code: i8) -> Result<DatumType> {
        use DatumType::*;
        Ok(match code {
            0 => F32,
            1 => F16,
            2 => I32,
            3 => U8,
            4 => I64,
            5 => String,
            6 => Bool,
            7 => I16,
            8 => Complex64,
            9 => I8,
            10 => F64,
            _ => bail!("Unknown tensor type code {code}"),
        })
    }

    pub fn code(&self) -> i8 {
        use DatumType::*;
        match self {
            F32 => 0,
            F16 => 1,
            I32 => 2,
            U8 => 3,
            I64 => 4,
            String => 5,
            Bool => 6,
            I16 => 7,
            Complex64 => 8,
            I8 => 9,
            F64 => 10,
        }
    }

    pub fn size_of(&self) -> Option<usize> {
        use DatumType::*;
        match self {
            U8 | I8 | Bool => Some(1),
            F16 | I16 => Some(2),
            F32 | I32 => Some(4),
            I64 | F64 | Complex64 => Some(8),
            String => None,
        }
    }
}

impl fmt::Display for DatumType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

#[derive(Clone, Debug, PartialEq, new)]
pub struct TensorDescriptor {
    pub index: usize,
    pub name: String,
    pub shape: TVec<usize>,
    pub datum_type: DatumType,
    pub buffer: usize,
}

impl TensorDescriptor {
    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    pub fn volume(&self) -> usize {
        self.shape.iter().product()
    }
}

/// Immutable view over every tensor of the converted subgraph, along with the
/// raw bytes of constant buffers.
///
/// Buffer 0 is the empty sentinel every TFLite writer emits, tensors pointing
/// at an empty buffer are activations.
#[derive(Clone, Debug)]
pub struct TensorCatalog {
    tensors: Vec<TensorDescriptor>,
    buffers: Vec<Vec<u8>>,
    by_name: HashMap<String, usize>,
}

impl Default for TensorCatalog {
    fn default() -> TensorCatalog {
        TensorCatalog { tensors: vec![], buffers: vec![vec![]], by_name: HashMap::default() }
    }
}

impl TensorCatalog {
    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TensorDescriptor> {
        self.tensors.iter()
    }

    pub fn tensor(&self, index: usize) -> Result<&TensorDescriptor> {
        self.tensors.get(index).with_context(|| {
            format!("Tensor #{index} requested, catalog holds {} tensors", self.tensors.len())
        })
    }

    pub fn by_name(&self, name: &str) -> Option<&TensorDescriptor> {
        self.by_name.get(name).map(|&ix| &self.tensors[ix])
    }

    pub fn push_buffer(&mut self, data: Vec<u8>) -> usize {
        self.buffers.push(data);
        self.buffers.len() - 1
    }

    pub fn push_tensor(
        &mut self,
        name: impl Into<String>,
        shape: &[usize],
        datum_type: DatumType,
        buffer: usize,
    ) -> Result<usize> {
        ensure!(
            buffer < self.buffers.len(),
            "Tensor refers to buffer #{buffer}, only {} buffers loaded",
            self.buffers.len()
        );
        let index = self.tensors.len();
        let name = name.into();
        if !name.is_empty() {
            self.by_name.entry(name.clone()).or_insert(index);
        }
        self.tensors.push(TensorDescriptor::new(index, name, shape.into(), datum_type, buffer));
        Ok(index)
    }

    pub fn add_activation(
        &mut self,
        name: impl Into<String>,
        shape: &[usize],
        datum_type: DatumType,
    ) -> usize {
        let index = self.tensors.len();
        let name = name.into();
        if !name.is_empty() {
            self.by_name.entry(name.clone()).or_insert(index);
        }
        self.tensors.push(TensorDescriptor::new(index, name, shape.into(), datum_type, 0));
        index
    }

    pub fn add_f32_constant(&mut self, name: impl Into<String>, shape: &[usize], data: &[f32]) -> usize {
        let bytes = data.iter().flat_map(|x| x.to_le_bytes()).collect();
        self.add_constant(name, shape, DatumType::F32, bytes)
    }

    pub fn add_i32_constant(&mut self, name: impl Into<String>, shape: &[usize], data: &[i32]) -> usize {
        let bytes = data.iter().flat_map(|x| x.to_le_bytes()).collect();
        self.add_constant(name, shape, DatumType::I32, bytes)
    }

    fn add_constant(
        &mut self,
        name: impl Into<String>,
        shape: &[usize],
        datum_type: DatumType,
        bytes: Vec<u8>,
    ) -> usize {
        let buffer = self.push_buffer(bytes);
        let index = self.add_activation(name, shape, datum_type);
        self.tensors[index].buffer = buffer;
        index
    }

    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    pub fn data(&self, index: usize) -> Result<&[u8]> {
        let tensor = self.tensor(index)?;
        self.buffers
            .get(tensor.buffer)
            .map(|b| &**b)
            .with_context(|| format!("Buffer #{} of tensor {:?} is missing", tensor.buffer, tensor.name))
    }

    /// Tensors backed by a buffer other than the sentinel. Converters also
    /// give activations their own empty buffer, so an empty one only counts
    /// when the tensor holds no element.
    pub fn is_constant(&self, index: usize) -> bool {
        match (self.tensor(index), self.data(index)) {
            (Ok(tensor), Ok(data)) => {
                tensor.buffer != 0 && (!data.is_empty() || tensor.volume() == 0)
            }
            _ => false,
        }
    }

    fn typed_data(&self, index: usize, expected: &[DatumType]) -> Result<(&TensorDescriptor, &[u8])> {
        let tensor = self.tensor(index)?;
        ensure!(
            expected.contains(&tensor.datum_type),
            "Tensor {:?} is {}, expected one of {:?}",
            tensor.name,
            tensor.datum_type,
            expected
        );
        let data = self.data(index)?;
        ensure!(
            !data.is_empty() || (tensor.buffer != 0 && tensor.volume() == 0),
            "Tensor {:?} has no constant data",
            tensor.name
        );
        let size = tensor.datum_type.size_of().unwrap_or(1);
        ensure!(
            data.len() == tensor.volume() * size,
            "Tensor {:?} of shape {:?} holds {} bytes",
            tensor.name,
            tensor.shape,
            data.len()
        );
        Ok((tensor, data))
    }

    pub fn f32_data(&self, index: usize) -> Result<Vec<f32>> {
        let (_, data) = self.typed_data(index, &[DatumType::F32])?;
        Ok(data
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect())
    }

    /// Integer constants (shapes, paddings, axes) come as i32 or i64.
    pub fn int_data(&self, index: usize) -> Result<Vec<i64>> {
        let (tensor, data) = self.typed_data(index, &[DatumType::I32, DatumType::I64])?;
        Ok(if tensor.datum_type == DatumType::I32 {
            data.chunks_exact(4).map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]) as i64).collect()
        } else {
            data.chunks_exact(8)
                .map(|c| i64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
                .collect()
        })
    }
}
