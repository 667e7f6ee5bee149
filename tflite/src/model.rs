use std::path::Path;

use itertools::Itertools;

use crate::internal::*;
use crate::tflite::{self, Model};

#[derive(Clone, Debug)]
pub struct TfliteProtoModel(Vec<u8>);

impl TfliteProtoModel {
    pub fn new(buf: Vec<u8>) -> Result<TfliteProtoModel> {
        tflite::root_as_model(&buf).context("Failed to read flat buffer model")?;
        Ok(TfliteProtoModel(buf))
    }

    pub fn for_path(p: impl AsRef<Path>) -> Result<TfliteProtoModel> {
        let buf = fs_err::read(p.as_ref())?;
        TfliteProtoModel::new(buf)
            .with_context(|| format!("Loading TFLite model from {:?}", p.as_ref()))
    }

    pub fn root(&self) -> Model {
        unsafe { tflite::root_as_model_unchecked(&self.0) }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Load the first subgraph into a catalog and its operator list.
    pub fn decode(&self) -> Result<SourceModel> {
        let root = self.root();
        let subgraphs = root.subgraphs().context("Model has no subgraph")?;
        ensure!(!subgraphs.is_empty(), "Model has no subgraph");
        if subgraphs.len() > 1 {
            warn!("Model has {} subgraphs, only the first one is converted", subgraphs.len());
        }
        let subgraph = subgraphs.get(0);

        let mut catalog = TensorCatalog::default();
        if let Some(buffers) = root.buffers() {
            // buffer 0 is pre-seeded in the catalog
            for (ix, buffer) in buffers.iter().enumerate().skip(1) {
                catalog.push_buffer(self.buffer_bytes(ix, &buffer)?);
            }
        }
        let tensors = subgraph.tensors().map(|t| t.iter().collect_vec()).unwrap_or_default();
        for (ix, tensor) in tensors.into_iter().enumerate() {
            let shape = tensor
                .shape()
                .map(|s| s.iter().collect_vec())
                .unwrap_or_default()
                .into_iter()
                .map(|d| {
                    usize::try_from(d).with_context(|| format!("Tensor #{ix} has dimension {d}"))
                })
                .collect::<Result<TVec<usize>>>()?;
            let datum_type = DatumType::from_code(tensor.type_())
                .with_context(|| format!("Decoding tensor #{ix}"))?;
            catalog.push_tensor(
                tensor.name().unwrap_or(""),
                &shape,
                datum_type,
                tensor.buffer() as usize,
            )?;
        }

        let codes = root.operator_codes().context("Model has no operator codes")?;
        let mut operators = vec![];
        let flat_ops = subgraph.operators().map(|o| o.iter().collect_vec()).unwrap_or_default();
        for (ix, flat) in flat_ops.into_iter().enumerate() {
            let opcode_index = flat.opcode_index() as usize;
            ensure!(
                opcode_index < codes.len(),
                "Operator #{ix} refers to operator code #{opcode_index}, model has {}",
                codes.len()
            );
            let code = codes.get(opcode_index).effective_code();
            let op = Op::decode(code, &flat).with_context(|| format!("Decoding operator #{ix}"))?;
            let inputs: TVec<i32> = flat.inputs().map(|i| i.iter().collect()).unwrap_or_default();
            let outputs: TVec<i32> = flat.outputs().map(|o| o.iter().collect()).unwrap_or_default();
            ensure!(
                outputs.len() == 1,
                "Operator #{ix} ({op}) has {} outputs, only single output operators are supported",
                outputs.len()
            );
            for &t in inputs.iter().chain(outputs.iter()) {
                ensure!(
                    t == -1 || (t >= 0 && (t as usize) < catalog.len()),
                    "Operator #{ix} ({op}) refers to tensor #{t}"
                );
            }
            trace!("Decoded operator #{ix}: {op:?} inputs: {inputs:?} outputs: {outputs:?}");
            operators.push(OperatorRecord::new(op, inputs, outputs));
        }

        let tensor_list = |v: Option<flatbuffers::Vector<i32>>| -> Result<TVec<usize>> {
            v.map(|v| v.iter().collect_vec())
                .unwrap_or_default()
                .into_iter()
                .map(|t| {
                    ensure!(t >= 0 && (t as usize) < catalog.len(), "Invalid tensor index {t}");
                    Ok(t as usize)
                })
                .collect()
        };
        let inputs = tensor_list(subgraph.inputs()).context("Reading subgraph inputs")?;
        let outputs = tensor_list(subgraph.outputs()).context("Reading subgraph outputs")?;
        debug!(
            "Decoded subgraph {:?}: {} tensors, {} operators",
            subgraph.name().unwrap_or(""),
            catalog.len(),
            operators.len()
        );
        Ok(SourceModel {
            catalog,
            operators,
            inputs,
            outputs,
            description: root.description().map(|s| s.to_string()),
        })
    }

    fn buffer_bytes(&self, ix: usize, buffer: &tflite::Buffer) -> Result<Vec<u8>> {
        if let Some(data) = buffer.data() {
            return Ok(data.bytes().to_vec());
        }
        // Models over 2GB store buffers after the flatbuffer itself.
        let (offset, size) = (buffer.offset() as usize, buffer.size() as usize);
        if offset > 1 {
            let bytes = offset
                .checked_add(size)
                .and_then(|end| self.0.get(offset..end))
                .with_context(|| {
                    format!("Buffer #{ix} spans {offset}+{size}, file is {} bytes", self.0.len())
                })?;
            return Ok(bytes.to_vec());
        }
        Ok(vec![])
    }
}

/// Everything the converter needs from the source file.
#[derive(Clone, Debug, Default)]
pub struct SourceModel {
    pub catalog: TensorCatalog,
    pub operators: Vec<OperatorRecord>,
    pub inputs: TVec<usize>,
    pub outputs: TVec<usize>,
    pub description: Option<String>,
}

impl SourceModel {
    pub fn for_bytes(buf: Vec<u8>) -> Result<SourceModel> {
        TfliteProtoModel::new(buf)?.decode()
    }
}
