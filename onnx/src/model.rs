use std::collections::HashSet;
use std::path::Path;

use anyhow::{bail, ensure, Context, Result};
use itertools::Itertools;
use prost::Message;

use crate::pb::*;

/// Operator set the converter emits: attribute-based Pad, Clip, Squeeze and
/// Upsample.
pub const OPSET_VERSION: i64 = 9;
pub const PRODUCER_NAME: &str = "tfl2onnx";

/// Pieces of a graph, collected while converting and assembled at the end.
#[derive(Clone, Debug, Default)]
pub struct ModelBuilder {
    pub name: String,
    pub nodes: Vec<NodeProto>,
    pub inputs: Vec<ValueInfoProto>,
    pub outputs: Vec<ValueInfoProto>,
    pub initializers: Vec<TensorProto>,
    pub value_infos: Vec<ValueInfoProto>,
    pub metadata: Vec<(String, String)>,
}

impl ModelBuilder {
    pub fn new(name: impl Into<String>) -> ModelBuilder {
        ModelBuilder { name: name.into(), ..ModelBuilder::default() }
    }

    pub fn make_graph(&self) -> GraphProto {
        GraphProto {
            node: self.nodes.clone(),
            name: self.name.clone(),
            initializer: self.initializers.clone(),
            input: self.inputs.clone(),
            output: self.outputs.clone(),
            value_info: self.value_infos.clone(),
            ..GraphProto::default()
        }
    }

    pub fn make_model(&self) -> ModelProto {
        ModelProto {
            ir_version: Version::IrVersion2019122 as i64,
            opset_import: vec![OperatorSetIdProto { domain: String::new(), version: OPSET_VERSION }],
            producer_name: PRODUCER_NAME.to_string(),
            producer_version: env!("CARGO_PKG_VERSION").to_string(),
            graph: Some(self.make_graph()),
            metadata_props: self
                .metadata
                .iter()
                .map(|(key, value)| StringStringEntryProto { key: key.clone(), value: value.clone() })
                .collect(),
            ..ModelProto::default()
        }
    }
}

/// Structural sanity check of an assembled model.
///
/// Nodes must come in topological order, every name they consume must be a
/// graph input, an initializer or an earlier node output, and every declared
/// graph output must be produced.
pub fn check_model(model: &ModelProto) -> Result<()> {
    let graph = model.graph.as_ref().context("Model has no graph")?;
    ensure!(!model.opset_import.is_empty(), "Model declares no opset");

    let mut defined: HashSet<&str> = HashSet::new();
    for input in &graph.input {
        ensure!(!input.name.is_empty(), "Graph input with empty name");
        defined.insert(input.name.as_str());
    }
    for init in &graph.initializer {
        ensure!(!init.name.is_empty(), "Initializer with empty name");
        let volume: i64 = init.dims.iter().product();
        let len = init.float_data.len() + init.int64_data.len() + init.int32_data.len();
        ensure!(
            !init.raw_data.is_empty() || len as i64 == volume,
            "Initializer {} of shape {:?} holds {} values",
            init.name,
            init.dims,
            len
        );
        defined.insert(init.name.as_str());
    }
    if let Some(dup) = graph.initializer.iter().map(|i| &i.name).duplicates().next() {
        bail!("Initializer {dup} is defined twice");
    }

    let mut node_names = HashSet::new();
    for node in &graph.node {
        ensure!(!node.name.is_empty(), "{} node without a name", node.op_type);
        ensure!(node_names.insert(&node.name), "Node name {} is used twice", node.name);
        for input in &node.input {
            if input.is_empty() {
                continue;
            }
            ensure!(
                defined.contains(input.as_str()),
                "Node {} ({}) consumes {input}, which is not defined before it",
                node.name,
                node.op_type
            );
        }
        for output in &node.output {
            ensure!(defined.insert(output.as_str()), "Value {output} is produced twice");
        }
    }

    for output in &graph.output {
        ensure!(
            defined.contains(output.name.as_str()),
            "Graph output {} is not produced by any node",
            output.name
        );
    }
    debug!(
        "Checked model: {} nodes, {} initializers, {} inputs, {} outputs",
        graph.node.len(),
        graph.initializer.len(),
        graph.input.len(),
        graph.output.len()
    );
    Ok(())
}

pub fn save(model: &ModelProto, path: impl AsRef<Path>) -> Result<()> {
    let bytes = model.encode_to_vec();
    fs_err::write(path.as_ref(), bytes)
        .with_context(|| format!("Writing ONNX model to {:?}", path.as_ref()))?;
    Ok(())
}

pub fn for_path(path: impl AsRef<Path>) -> Result<ModelProto> {
    let bytes = fs_err::read(path.as_ref())?;
    ModelProto::decode(&*bytes).with_context(|| format!("Decoding ONNX model {:?}", path.as_ref()))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::pb::tensor_proto::DataType;

    fn relu_model() -> ModelBuilder {
        let mut builder = ModelBuilder::new("g");
        builder.inputs.push(ValueInfoProto::tensor("x", DataType::Float, &[1, 4]));
        builder.nodes.push(NodeProto::named("Relu", "y").with_input("x"));
        builder.outputs.push(ValueInfoProto::tensor("y", DataType::Float, &[1, 4]));
        builder
    }

    #[test]
    fn valid_model() {
        let model = relu_model().make_model();
        check_model(&model).unwrap();
        assert_eq!(model.opset_import[0].version, OPSET_VERSION);
        assert_eq!(model.ir_version, 4);
    }

    #[test]
    fn undefined_input() {
        let mut builder = relu_model();
        builder.nodes.push(NodeProto::named("Relu", "z").with_input("nowhere"));
        assert!(check_model(&builder.make_model()).is_err());
    }

    #[test]
    fn duplicate_node_name() {
        let mut builder = relu_model();
        builder.nodes.push(NodeProto::named("Relu", "y").with_input("x").with_output("y2"));
        assert!(check_model(&builder.make_model()).is_err());
    }

    #[test]
    fn missing_output() {
        let mut builder = relu_model();
        builder.outputs.push(ValueInfoProto::tensor("w", DataType::Float, &[1]));
        assert!(check_model(&builder.make_model()).is_err());
    }

    #[test]
    fn save_and_reload() {
        let mut builder = relu_model();
        builder.metadata.push(("Generated Time".into(), "now".into()));
        let model = builder.make_model();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relu.onnx");
        save(&model, &path).unwrap();
        let reloaded = for_path(&path).unwrap();
        assert_eq!(reloaded, model);
    }
}
