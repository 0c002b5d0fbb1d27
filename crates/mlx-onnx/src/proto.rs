//! ONNX protobuf message definitions.
//!
//! Hand-declared `prost` messages for the subset of `onnx.proto` (IR version 3)
//! the exporter writes and the checker reads. Field tags follow the official
//! schema so the encoded bytes are readable by any ONNX consumer.

use prost::{Enumeration, Message};

/// ONNX Model protobuf message
#[derive(Clone, PartialEq, Message)]
pub struct ModelProto {
    /// The version of the IR this model targets.
    #[prost(int64, optional, tag = "1")]
    pub ir_version: Option<i64>,

    /// The name of the framework or tool used to generate this model.
    #[prost(string, optional, tag = "2")]
    pub producer_name: Option<String>,

    /// The version of the framework or tool used to generate this model.
    #[prost(string, optional, tag = "3")]
    pub producer_version: Option<String>,

    #[prost(string, optional, tag = "4")]
    pub domain: Option<String>,

    #[prost(int64, optional, tag = "5")]
    pub model_version: Option<i64>,

    #[prost(string, optional, tag = "6")]
    pub doc_string: Option<String>,

    /// The parameterized graph that is evaluated to execute the model.
    #[prost(message, optional, tag = "7")]
    pub graph: Option<GraphProto>,

    /// The OperatorSets this model relies on.
    #[prost(message, repeated, tag = "8")]
    pub opset_import: Vec<OperatorSetIdProto>,
}

/// ONNX Graph protobuf message
#[derive(Clone, PartialEq, Message)]
pub struct GraphProto {
    /// The nodes in the graph, topologically sorted.
    #[prost(message, repeated, tag = "1")]
    pub node: Vec<NodeProto>,

    #[prost(string, optional, tag = "2")]
    pub name: Option<String>,

    /// Named constant tensors. Every initializer is also listed in `input`.
    #[prost(message, repeated, tag = "5")]
    pub initializer: Vec<TensorProto>,

    #[prost(string, optional, tag = "10")]
    pub doc_string: Option<String>,

    #[prost(message, repeated, tag = "11")]
    pub input: Vec<ValueInfoProto>,

    #[prost(message, repeated, tag = "12")]
    pub output: Vec<ValueInfoProto>,

    #[prost(message, repeated, tag = "13")]
    pub value_info: Vec<ValueInfoProto>,
}

/// ONNX Node protobuf message
#[derive(Clone, PartialEq, Message)]
pub struct NodeProto {
    #[prost(string, repeated, tag = "1")]
    pub input: Vec<String>,

    #[prost(string, repeated, tag = "2")]
    pub output: Vec<String>,

    #[prost(string, optional, tag = "3")]
    pub name: Option<String>,

    /// The symbolic identifier of the Operator to execute.
    #[prost(string, optional, tag = "4")]
    pub op_type: Option<String>,

    #[prost(message, repeated, tag = "5")]
    pub attribute: Vec<AttributeProto>,

    #[prost(string, optional, tag = "6")]
    pub doc_string: Option<String>,

    #[prost(string, optional, tag = "7")]
    pub domain: Option<String>,
}

/// ONNX Attribute protobuf message
#[derive(Clone, PartialEq, Message)]
pub struct AttributeProto {
    #[prost(string, optional, tag = "1")]
    pub name: Option<String>,

    #[prost(float, optional, tag = "2")]
    pub f: Option<f32>,

    #[prost(int64, optional, tag = "3")]
    pub i: Option<i64>,

    #[prost(bytes, optional, tag = "4")]
    pub s: Option<Vec<u8>>,

    #[prost(message, optional, tag = "5")]
    pub t: Option<TensorProto>,

    #[prost(message, optional, tag = "6")]
    pub g: Option<GraphProto>,

    #[prost(float, repeated, packed = "false", tag = "7")]
    pub floats: Vec<f32>,

    #[prost(int64, repeated, packed = "false", tag = "8")]
    pub ints: Vec<i64>,

    #[prost(bytes, repeated, tag = "9")]
    pub strings: Vec<Vec<u8>>,

    #[prost(message, repeated, tag = "10")]
    pub tensors: Vec<TensorProto>,

    #[prost(message, repeated, tag = "11")]
    pub graphs: Vec<GraphProto>,

    #[prost(string, optional, tag = "13")]
    pub doc_string: Option<String>,

    /// Discriminates which of the value fields above is set.
    #[prost(enumeration = "AttributeType", optional, tag = "20")]
    pub r#type: Option<i32>,
}

/// ONNX Tensor protobuf message
#[derive(Clone, PartialEq, Message)]
pub struct TensorProto {
    #[prost(int64, repeated, packed = "false", tag = "1")]
    pub dims: Vec<i64>,

    #[prost(int32, optional, tag = "2")]
    pub data_type: Option<i32>,

    /// For float values.
    #[prost(float, repeated, packed = "false", tag = "4")]
    pub float_data: Vec<f32>,

    /// For int32, float16 and bfloat16 values (the latter two as raw bits).
    #[prost(int32, repeated, packed = "false", tag = "5")]
    pub int32_data: Vec<i32>,

    #[prost(bytes, repeated, tag = "6")]
    pub string_data: Vec<Vec<u8>>,

    #[prost(int64, repeated, packed = "false", tag = "7")]
    pub int64_data: Vec<i64>,

    #[prost(string, optional, tag = "8")]
    pub name: Option<String>,

    /// Row-major little-endian element bytes.
    #[prost(bytes, optional, tag = "9")]
    pub raw_data: Option<Vec<u8>>,

    #[prost(double, repeated, packed = "false", tag = "10")]
    pub double_data: Vec<f64>,

    #[prost(string, optional, tag = "12")]
    pub doc_string: Option<String>,
}

/// ONNX ValueInfo protobuf message
#[derive(Clone, PartialEq, Message)]
pub struct ValueInfoProto {
    #[prost(string, optional, tag = "1")]
    pub name: Option<String>,

    #[prost(message, optional, tag = "2")]
    pub r#type: Option<TypeProto>,

    #[prost(string, optional, tag = "3")]
    pub doc_string: Option<String>,
}

/// ONNX Type protobuf message
#[derive(Clone, PartialEq, Message)]
pub struct TypeProto {
    #[prost(oneof = "type_proto::Value", tags = "1")]
    pub value: Option<type_proto::Value>,
}

pub mod type_proto {
    use prost::{Message, Oneof};

    #[derive(Clone, PartialEq, Oneof)]
    pub enum Value {
        #[prost(message, tag = "1")]
        TensorType(Tensor),
    }

    #[derive(Clone, PartialEq, Message)]
    pub struct Tensor {
        #[prost(int32, optional, tag = "1")]
        pub elem_type: Option<i32>,

        #[prost(message, optional, tag = "2")]
        pub shape: Option<super::TensorShapeProto>,
    }
}

/// ONNX TensorShape protobuf message
#[derive(Clone, PartialEq, Message)]
pub struct TensorShapeProto {
    #[prost(message, repeated, tag = "1")]
    pub dim: Vec<tensor_shape_proto::Dimension>,
}

pub mod tensor_shape_proto {
    use prost::Message;

    #[derive(Clone, PartialEq, Message)]
    pub struct Dimension {
        #[prost(oneof = "dimension::Value", tags = "1, 2")]
        pub value: Option<dimension::Value>,
    }

    pub mod dimension {
        use prost::Oneof;

        #[derive(Clone, PartialEq, Oneof)]
        pub enum Value {
            #[prost(int64, tag = "1")]
            DimValue(i64),
            #[prost(string, tag = "2")]
            DimParam(String),
        }
    }
}

/// ONNX OperatorSetId protobuf message
#[derive(Clone, PartialEq, Message)]
pub struct OperatorSetIdProto {
    /// Empty or absent for the default `ai.onnx` domain.
    #[prost(string, optional, tag = "1")]
    pub domain: Option<String>,

    #[prost(int64, optional, tag = "2")]
    pub version: Option<i64>,
}

/// ONNX tensor element types (`TensorProto.DataType`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Enumeration)]
#[repr(i32)]
pub enum DataType {
    Undefined = 0,
    Float = 1,
    Uint8 = 2,
    Int8 = 3,
    Uint16 = 4,
    Int16 = 5,
    Int32 = 6,
    Int64 = 7,
    String = 8,
    Bool = 9,
    Float16 = 10,
    Double = 11,
    Uint32 = 12,
    Uint64 = 13,
    Complex64 = 14,
    Complex128 = 15,
    Bfloat16 = 16,
}

/// ONNX attribute value kinds (`AttributeProto.AttributeType`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Enumeration)]
#[repr(i32)]
pub enum AttributeType {
    Undefined = 0,
    Float = 1,
    Int = 2,
    String = 3,
    Tensor = 4,
    Graph = 5,
    Floats = 6,
    Ints = 7,
    Strings = 8,
    Tensors = 9,
    Graphs = 10,
}

impl AttributeType {
    /// Name used by the protobuf text format.
    pub fn text_name(self) -> &'static str {
        match self {
            AttributeType::Undefined => "UNDEFINED",
            AttributeType::Float => "FLOAT",
            AttributeType::Int => "INT",
            AttributeType::String => "STRING",
            AttributeType::Tensor => "TENSOR",
            AttributeType::Graph => "GRAPH",
            AttributeType::Floats => "FLOATS",
            AttributeType::Ints => "INTS",
            AttributeType::Strings => "STRINGS",
            AttributeType::Tensors => "TENSORS",
            AttributeType::Graphs => "GRAPHS",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_roundtrip_keeps_optional_fields() {
        let model = ModelProto {
            ir_version: Some(3),
            producer_name: Some("mlx-onnx".into()),
            graph: Some(GraphProto {
                node: vec![NodeProto {
                    input: vec!["0".into()],
                    output: vec!["1".into()],
                    op_type: Some("Neg".into()),
                    ..Default::default()
                }],
                ..Default::default()
            }),
            opset_import: vec![OperatorSetIdProto {
                domain: None,
                version: Some(6),
            }],
            ..Default::default()
        };
        let bytes = model.encode_to_vec();
        let decoded = ModelProto::decode(bytes.as_slice()).unwrap();
        assert_eq!(decoded, model);
        assert!(decoded.domain.is_none());
    }

    #[test]
    fn test_attribute_type_enum() {
        let attr = AttributeProto {
            name: Some("perm".into()),
            ints: vec![1, 0],
            r#type: Some(AttributeType::Ints as i32),
            ..Default::default()
        };
        assert_eq!(attr.r#type(), AttributeType::Ints);
        assert_eq!(AttributeType::try_from(7).unwrap().text_name(), "INTS");
    }
}
