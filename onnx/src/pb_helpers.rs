use std::fmt::{self, Display};

use anyhow::{bail, Context, Result};

use crate::pb::attribute_proto::AttributeType;
use crate::pb::tensor_proto::DataType;
use crate::pb::tensor_shape_proto::{dimension, Dimension};
use crate::pb::*;

impl Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            AttributeType::Int => "int",
            AttributeType::Float => "float",
            AttributeType::Tensor => "tensor",
            AttributeType::String => "string",
            AttributeType::Ints => "list of ints",
            AttributeType::Floats => "list of floats",
            AttributeType::Tensors => "list of tensors",
            AttributeType::Strings => "list of strings",
            AttributeType::Graph => "graph",
            AttributeType::Graphs => "graphs",
            _ => "<undefined>",
        })
    }
}

impl AttributeProto {
    pub fn int(name: &str, i: i64) -> AttributeProto {
        AttributeProto {
            name: name.to_string(),
            r#type: AttributeType::Int as i32,
            i,
            ..AttributeProto::default()
        }
    }

    pub fn ints(name: &str, ints: impl IntoIterator<Item = i64>) -> AttributeProto {
        AttributeProto {
            name: name.to_string(),
            r#type: AttributeType::Ints as i32,
            ints: ints.into_iter().collect(),
            ..AttributeProto::default()
        }
    }

    pub fn float(name: &str, f: f32) -> AttributeProto {
        AttributeProto {
            name: name.to_string(),
            r#type: AttributeType::Float as i32,
            f,
            ..AttributeProto::default()
        }
    }

    pub fn string(name: &str, s: &str) -> AttributeProto {
        AttributeProto {
            name: name.to_string(),
            r#type: AttributeType::String as i32,
            s: s.as_bytes().to_vec(),
            ..AttributeProto::default()
        }
    }

    pub fn attribute_type(&self) -> AttributeType {
        AttributeType::from_i32(self.r#type).unwrap_or(AttributeType::Undefined)
    }

    fn expect_type(&self, node: &NodeProto, expected: AttributeType) -> Result<&AttributeProto> {
        if self.attribute_type() != expected {
            bail!(
                "Node {} ({}) expected attribute {:?} to be {}, found {}",
                node.name,
                node.op_type,
                self.name,
                expected,
                self.attribute_type()
            )
        }
        Ok(self)
    }
}

impl NodeProto {
    /// A node producing a single output named after the node.
    pub fn named(op_type: &str, name: impl Into<String>) -> NodeProto {
        let name = name.into();
        NodeProto {
            output: vec![name.clone()],
            name,
            op_type: op_type.to_string(),
            ..NodeProto::default()
        }
    }

    pub fn with_input(mut self, input: impl Into<String>) -> NodeProto {
        self.input.push(input.into());
        self
    }

    pub fn with_inputs<S: Into<String>>(mut self, inputs: impl IntoIterator<Item = S>) -> NodeProto {
        self.input.extend(inputs.into_iter().map(Into::into));
        self
    }

    pub fn with_output(mut self, output: impl Into<String>) -> NodeProto {
        self.output = vec![output.into()];
        self
    }

    pub fn with_attr(mut self, attr: AttributeProto) -> NodeProto {
        self.attribute.push(attr);
        self
    }

    pub fn with_int(self, name: &str, i: i64) -> NodeProto {
        self.with_attr(AttributeProto::int(name, i))
    }

    pub fn with_ints(self, name: &str, ints: impl IntoIterator<Item = i64>) -> NodeProto {
        self.with_attr(AttributeProto::ints(name, ints))
    }

    pub fn with_float(self, name: &str, f: f32) -> NodeProto {
        self.with_attr(AttributeProto::float(name, f))
    }

    pub fn with_string(self, name: &str, s: &str) -> NodeProto {
        self.with_attr(AttributeProto::string(name, s))
    }

    pub fn get_attr_opt(&self, name: &str) -> Option<&AttributeProto> {
        self.attribute.iter().find(|a| a.name == name)
    }

    fn get_attr_with_type(&self, name: &str, ty: AttributeType) -> Result<&AttributeProto> {
        self.get_attr_opt(name)
            .with_context(|| format!("Node {} ({}) has no attribute {name:?}", self.name, self.op_type))?
            .expect_type(self, ty)
    }

    pub fn get_attr_int(&self, name: &str) -> Result<i64> {
        Ok(self.get_attr_with_type(name, AttributeType::Int)?.i)
    }

    pub fn get_attr_ints(&self, name: &str) -> Result<&[i64]> {
        Ok(&self.get_attr_with_type(name, AttributeType::Ints)?.ints)
    }

    pub fn get_attr_float(&self, name: &str) -> Result<f32> {
        Ok(self.get_attr_with_type(name, AttributeType::Float)?.f)
    }

    pub fn get_attr_string(&self, name: &str) -> Result<&str> {
        let bytes = &self.get_attr_with_type(name, AttributeType::String)?.s;
        std::str::from_utf8(bytes).with_context(|| format!("Attribute {name:?} is not utf-8"))
    }
}

impl ValueInfoProto {
    pub fn tensor(name: impl Into<String>, elem_type: DataType, shape: &[i64]) -> ValueInfoProto {
        let dim = shape
            .iter()
            .map(|&d| Dimension { value: Some(dimension::Value::DimValue(d)), ..Dimension::default() })
            .collect();
        ValueInfoProto {
            name: name.into(),
            r#type: Some(TypeProto {
                value: Some(type_proto::Value::TensorType(type_proto::Tensor {
                    elem_type: elem_type as i32,
                    shape: Some(TensorShapeProto { dim }),
                })),
                ..TypeProto::default()
            }),
            ..ValueInfoProto::default()
        }
    }

    fn tensor_type(&self) -> Option<&type_proto::Tensor> {
        match self.r#type.as_ref()?.value.as_ref()? {
            type_proto::Value::TensorType(t) => Some(t),
        }
    }

    pub fn elem_type(&self) -> Option<DataType> {
        self.tensor_type().and_then(|t| DataType::from_i32(t.elem_type))
    }

    /// Concrete dimensions, `None` if the shape is absent or symbolic.
    pub fn shape(&self) -> Option<Vec<i64>> {
        self.tensor_type()?
            .shape
            .as_ref()?
            .dim
            .iter()
            .map(|d| match d.value {
                Some(dimension::Value::DimValue(v)) => Some(v),
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn node_builder() {
        let node = NodeProto::named("Conv", "conv1")
            .with_inputs(["x", "conv1_weight"])
            .with_ints("strides", [2, 2])
            .with_int("group", 1);
        assert_eq!(node.output, vec!["conv1"]);
        assert_eq!(node.input, vec!["x", "conv1_weight"]);
        assert_eq!(node.get_attr_ints("strides").unwrap(), &[2, 2]);
        assert_eq!(node.get_attr_int("group").unwrap(), 1);
        assert!(node.get_attr_int("strides").is_err());
        assert!(node.get_attr_float("alpha").is_err());
    }

    #[test]
    fn string_attribute() {
        let node = NodeProto::named("Pad", "pad").with_string("mode", "constant");
        assert_eq!(node.get_attr_string("mode").unwrap(), "constant");
    }

    #[test]
    fn value_info_shape() {
        let vi = ValueInfoProto::tensor("x", DataType::Float, &[1, 3, 7, 7]);
        assert_eq!(vi.shape(), Some(vec![1, 3, 7, 7]));
        assert_eq!(vi.elem_type(), Some(DataType::Float));
    }
}
