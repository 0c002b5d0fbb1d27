//! Structural validation of exported models against the opset-6 operator
//! schemas this crate emits.

use std::collections::{HashMap, HashSet};

use crate::error::CheckError;
use crate::proto::{
    AttributeProto, AttributeType, DataType, GraphProto, ModelProto, NodeProto, TensorProto,
    ValueInfoProto, type_proto,
};
use crate::tensor_proto::onnx_to_dtype;

type Result<T> = std::result::Result<T, CheckError>;

const MANY: usize = usize::MAX;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TypeSet {
    Any,
    Float,
    Numeric,
}

impl TypeSet {
    fn allows(self, elem: i32) -> bool {
        let float = [DataType::Float16, DataType::Float, DataType::Double];
        let ints = [DataType::Int32, DataType::Int64];
        let is = |set: &[DataType]| set.iter().any(|&d| d as i32 == elem);
        match self {
            TypeSet::Any => true,
            TypeSet::Float => is(&float),
            TypeSet::Numeric => is(&float) || is(&ints),
        }
    }
}

struct Schema {
    inputs: (usize, usize),
    outputs: (usize, usize),
    /// `(name, kind, required)`
    attrs: &'static [(&'static str, AttributeType, bool)],
    types: TypeSet,
    /// Every input shares one element type.
    homogeneous: bool,
}

const BINARY_ATTRS: &[(&str, AttributeType, bool)] = &[
    ("broadcast", AttributeType::Int, false),
    ("axis", AttributeType::Int, false),
];

const POOL_ATTRS: &[(&str, AttributeType, bool)] = &[
    ("kernel_shape", AttributeType::Ints, true),
    ("strides", AttributeType::Ints, false),
    ("pads", AttributeType::Ints, false),
    ("auto_pad", AttributeType::String, false),
];

fn elementwise(types: TypeSet, inputs: usize, attrs: &'static [(&'static str, AttributeType, bool)]) -> Schema {
    Schema {
        inputs: (inputs, inputs),
        outputs: (1, 1),
        attrs,
        types,
        homogeneous: true,
    }
}

fn schema(op_type: &str) -> Option<Schema> {
    use AttributeType as A;
    let s = match op_type {
        "Add" | "Sub" | "Mul" | "Div" => elementwise(TypeSet::Numeric, 2, BINARY_ATTRS),
        "Neg" => elementwise(TypeSet::Numeric, 1, &[]),
        "Sigmoid" | "Tanh" | "Sqrt" => elementwise(TypeSet::Float, 1, &[]),
        "Constant" => Schema {
            inputs: (0, 0),
            outputs: (1, 1),
            attrs: &[("value", A::Tensor, true)],
            types: TypeSet::Any,
            homogeneous: false,
        },
        "Reshape" => Schema {
            inputs: (2, 2),
            outputs: (1, 1),
            attrs: &[],
            types: TypeSet::Any,
            homogeneous: false,
        },
        "Transpose" => elementwise(TypeSet::Any, 1, &[("perm", A::Ints, false)]),
        "Split" => Schema {
            inputs: (1, 2),
            outputs: (1, MANY),
            attrs: &[("axis", A::Int, false), ("split", A::Ints, false)],
            types: TypeSet::Any,
            homogeneous: false,
        },
        "Concat" => Schema {
            inputs: (1, MANY),
            outputs: (1, 1),
            attrs: &[("axis", A::Int, true)],
            types: TypeSet::Any,
            homogeneous: true,
        },
        "MatMul" => elementwise(TypeSet::Float, 2, &[]),
        "Gemm" => elementwise(
            TypeSet::Float,
            3,
            &[
                ("alpha", A::Float, false),
                ("beta", A::Float, false),
                ("broadcast", A::Int, false),
                ("transA", A::Int, false),
                ("transB", A::Int, false),
            ],
        ),
        "Conv" => Schema {
            inputs: (2, 3),
            outputs: (1, 1),
            attrs: &[
                ("kernel_shape", A::Ints, false),
                ("strides", A::Ints, false),
                ("pads", A::Ints, false),
                ("dilations", A::Ints, false),
                ("group", A::Int, false),
                ("auto_pad", A::String, false),
            ],
            types: TypeSet::Float,
            homogeneous: true,
        },
        "MaxPool" => elementwise(TypeSet::Float, 1, POOL_ATTRS),
        "Pad" => elementwise(
            TypeSet::Float,
            1,
            &[
                ("pads", A::Ints, true),
                ("mode", A::String, false),
                ("value", A::Float, false),
            ],
        ),
        "BatchNormalization" => Schema {
            inputs: (5, 5),
            outputs: (1, 5),
            attrs: &[
                ("epsilon", A::Float, false),
                ("is_test", A::Int, false),
                ("momentum", A::Float, false),
                ("spatial", A::Int, false),
            ],
            types: TypeSet::Float,
            homogeneous: true,
        },
        "ReduceMean" => elementwise(
            TypeSet::Numeric,
            1,
            &[("axes", A::Ints, false), ("keepdims", A::Int, false)],
        ),
        "InstanceNormalization" => elementwise(TypeSet::Float, 3, &[("epsilon", A::Float, false)]),
        "Sum" => Schema {
            inputs: (1, MANY),
            outputs: (1, 1),
            attrs: &[],
            types: TypeSet::Float,
            homogeneous: true,
        },
        _ => return None,
    };
    Some(s)
}

/// Validate `model` structurally.
///
/// Checks header fields, SSA naming, definition-before-use, initializer
/// declarations, per-operator arity, attributes and element types, and
/// that declared graph output types match what the graph produces.
pub fn check_model(model: &ModelProto) -> Result<()> {
    if model.ir_version.is_none() {
        return Err(CheckError::MissingField("ir_version"));
    }
    if model.opset_import.is_empty() {
        return Err(CheckError::MissingField("opset_import"));
    }
    let graph = model
        .graph
        .as_ref()
        .ok_or(CheckError::MissingField("graph"))?;
    check_graph(graph)
}

fn declared_elem_type(info: &ValueInfoProto) -> Result<i32> {
    match info.r#type.as_ref().and_then(|t| t.value.as_ref()) {
        Some(type_proto::Value::TensorType(t)) => Ok(t.elem_type()),
        None => Err(CheckError::MissingField("value_info.type")),
    }
}

fn check_tensor(tensor: &TensorProto, name: &str) -> Result<()> {
    let bad = |detail: String| CheckError::Tensor {
        name: name.to_string(),
        detail,
    };
    let dtype = onnx_to_dtype(tensor.data_type())
        .ok_or_else(|| bad(format!("unsupported element type {}", tensor.data_type())))?;
    let numel: i64 = tensor.dims.iter().product();
    if let Some(raw) = &tensor.raw_data {
        let expected = numel as usize * dtype.size_bytes();
        if raw.len() != expected {
            return Err(bad(format!(
                "raw data holds {} bytes, dims {:?} need {expected}",
                raw.len(),
                tensor.dims
            )));
        }
    }
    Ok(())
}

fn check_graph(graph: &GraphProto) -> Result<()> {
    // Element type of every defined value.
    let mut types: HashMap<&str, i32> = HashMap::new();

    for info in &graph.input {
        let name = info.name.as_deref().ok_or(CheckError::MissingField("input.name"))?;
        if types.insert(name, declared_elem_type(info)?).is_some() {
            return Err(CheckError::DuplicateName(name.to_string()));
        }
    }

    let mut initialized = HashSet::new();
    for init in &graph.initializer {
        let name = init.name.as_deref().ok_or(CheckError::MissingField("initializer.name"))?;
        if !initialized.insert(name) {
            return Err(CheckError::DuplicateName(name.to_string()));
        }
        match types.get(name) {
            Some(&declared) if declared == init.data_type() => {}
            Some(&declared) => {
                return Err(CheckError::OutputType {
                    name: name.to_string(),
                    declared,
                    produced: init.data_type(),
                });
            }
            None => return Err(CheckError::InitializerNotInput(name.to_string())),
        }
        check_tensor(init, name)?;
    }

    for (idx, node) in graph.node.iter().enumerate() {
        let produced = check_node(idx, node, &types)?;
        for out in &node.output {
            if types.insert(out.as_str(), produced).is_some() {
                return Err(CheckError::DuplicateName(out.clone()));
            }
        }
    }

    for info in &graph.output {
        let name = info.name.as_deref().ok_or(CheckError::MissingField("output.name"))?;
        let produced = *types
            .get(name)
            .ok_or_else(|| CheckError::UndefinedOutput(name.to_string()))?;
        let declared = declared_elem_type(info)?;
        if declared != produced {
            return Err(CheckError::OutputType {
                name: name.to_string(),
                declared,
                produced,
            });
        }
    }
    Ok(())
}

fn check_arity(op: &str, what: &'static str, (min, max): (usize, usize), got: usize) -> Result<()> {
    if got < min || got > max {
        return Err(CheckError::Arity {
            op: op.to_string(),
            what,
            min,
            max,
            got,
        });
    }
    Ok(())
}

fn check_attributes(op: &str, schema: &Schema, attrs: &[AttributeProto]) -> Result<()> {
    let mut seen = HashSet::new();
    for attr in attrs {
        let name = attr.name();
        if !seen.insert(name) {
            return Err(CheckError::DuplicateName(format!("{op}.{name}")));
        }
        let Some(&(_, kind, _)) = schema.attrs.iter().find(|(n, _, _)| *n == name) else {
            return Err(CheckError::UnexpectedAttribute {
                op: op.to_string(),
                name: name.to_string(),
            });
        };
        if attr.r#type() != kind {
            return Err(CheckError::AttributeType {
                op: op.to_string(),
                name: name.to_string(),
                expected: kind.text_name(),
                got: attr.r#type().text_name().to_string(),
            });
        }
    }
    for &(name, _, required) in schema.attrs {
        if required && !seen.contains(name) {
            return Err(CheckError::MissingAttribute {
                op: op.to_string(),
                name: name.to_string(),
            });
        }
    }
    Ok(())
}

/// Validate one node and return the element type of its outputs.
fn check_node(idx: usize, node: &NodeProto, types: &HashMap<&str, i32>) -> Result<i32> {
    let op = node.op_type();
    if op.is_empty() {
        return Err(CheckError::MissingField("node.op_type"));
    }
    let schema = schema(op).ok_or_else(|| CheckError::UnknownOperator(op.to_string()))?;
    check_arity(op, "inputs", schema.inputs, node.input.len())?;
    check_arity(op, "outputs", schema.outputs, node.output.len())?;
    check_attributes(op, &schema, &node.attribute)?;

    let input_types = node
        .input
        .iter()
        .map(|name| {
            types.get(name.as_str()).copied().ok_or_else(|| CheckError::UndefinedInput {
                node: idx,
                op: op.to_string(),
                input: name.clone(),
            })
        })
        .collect::<Result<Vec<i32>>>()?;

    for &elem in &input_types {
        if !schema.types.allows(elem) {
            return Err(CheckError::UnsupportedType {
                op: op.to_string(),
                elem,
            });
        }
    }
    if schema.homogeneous && input_types.windows(2).any(|w| w[0] != w[1]) {
        return Err(CheckError::TypeMismatch {
            op: op.to_string(),
            types: input_types,
        });
    }
    if op == "Reshape" && input_types[1] != DataType::Int64 as i32 {
        return Err(CheckError::UnsupportedType {
            op: "Reshape shape".to_string(),
            elem: input_types[1],
        });
    }

    if op == "Constant" {
        let value = node
            .attribute
            .iter()
            .find(|a| a.name() == "value")
            .and_then(|a| a.t.as_ref())
            .ok_or_else(|| CheckError::MissingAttribute {
                op: op.to_string(),
                name: "value".to_string(),
            })?;
        check_tensor(value, node.output.first().map(String::as_str).unwrap_or_default())?;
        return Ok(value.data_type());
    }
    Ok(input_types[0])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::{OperatorSetIdProto, TypeProto};
    use crate::symbolic::{attr_int, attr_ints};

    fn info(name: &str, elem: DataType) -> ValueInfoProto {
        ValueInfoProto {
            name: Some(name.into()),
            r#type: Some(TypeProto {
                value: Some(type_proto::Value::TensorType(type_proto::Tensor {
                    elem_type: Some(elem as i32),
                    shape: None,
                })),
            }),
            ..Default::default()
        }
    }

    fn node(op: &str, inputs: &[&str], outputs: &[&str], attribute: Vec<AttributeProto>) -> NodeProto {
        NodeProto {
            input: inputs.iter().map(|s| s.to_string()).collect(),
            output: outputs.iter().map(|s| s.to_string()).collect(),
            op_type: Some(op.into()),
            attribute,
            ..Default::default()
        }
    }

    fn model(nodes: Vec<NodeProto>, output: &str) -> ModelProto {
        ModelProto {
            ir_version: Some(3),
            graph: Some(GraphProto {
                node: nodes,
                input: vec![info("0", DataType::Float), info("1", DataType::Float)],
                output: vec![info(output, DataType::Float)],
                ..Default::default()
            }),
            opset_import: vec![OperatorSetIdProto {
                domain: None,
                version: Some(6),
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_model() {
        let m = model(
            vec![
                node("Add", &["0", "1"], &["2"], vec![attr_int("broadcast", 1)]),
                node("Sigmoid", &["2"], &["3"], vec![]),
            ],
            "3",
        );
        check_model(&m).unwrap();
    }

    #[test]
    fn test_missing_header() {
        let mut m = model(vec![node("Neg", &["0"], &["2"], vec![])], "2");
        m.ir_version = None;
        assert_eq!(check_model(&m), Err(CheckError::MissingField("ir_version")));
    }

    #[test]
    fn test_dangling_input() {
        let m = model(vec![node("Neg", &["7"], &["2"], vec![])], "2");
        assert!(matches!(check_model(&m), Err(CheckError::UndefinedInput { node: 0, .. })));
    }

    #[test]
    fn test_duplicate_output() {
        let m = model(
            vec![
                node("Neg", &["0"], &["2"], vec![]),
                node("Neg", &["1"], &["2"], vec![]),
            ],
            "2",
        );
        assert_eq!(check_model(&m), Err(CheckError::DuplicateName("2".into())));
    }

    #[test]
    fn test_unknown_operator_and_arity() {
        let m = model(vec![node("Expand", &["0", "1"], &["2"], vec![])], "2");
        assert_eq!(check_model(&m), Err(CheckError::UnknownOperator("Expand".into())));
        let m = model(vec![node("Add", &["0"], &["2"], vec![])], "2");
        assert!(matches!(check_model(&m), Err(CheckError::Arity { .. })));
    }

    #[test]
    fn test_attribute_checks() {
        let m = model(vec![node("Concat", &["0", "1"], &["2"], vec![])], "2");
        assert!(matches!(check_model(&m), Err(CheckError::MissingAttribute { .. })));

        let m = model(
            vec![node("Concat", &["0", "1"], &["2"], vec![attr_ints("axis", &[0])])],
            "2",
        );
        assert!(matches!(check_model(&m), Err(CheckError::AttributeType { .. })));

        let m = model(
            vec![node("Neg", &["0"], &["2"], vec![attr_int("axis", 0)])],
            "2",
        );
        assert!(matches!(check_model(&m), Err(CheckError::UnexpectedAttribute { .. })));
    }

    #[test]
    fn test_mixed_input_types() {
        let mut m = model(vec![node("Add", &["0", "1"], &["2"], vec![])], "2");
        m.graph.as_mut().unwrap().input[1] = info("1", DataType::Int64);
        assert!(matches!(check_model(&m), Err(CheckError::TypeMismatch { .. })));
    }

    #[test]
    fn test_output_type_must_match_producer() {
        let mut m = model(vec![node("Neg", &["0"], &["2"], vec![])], "2");
        m.graph.as_mut().unwrap().output[0] = info("2", DataType::Double);
        assert!(matches!(check_model(&m), Err(CheckError::OutputType { .. })));
    }

    #[test]
    fn test_initializer_must_be_input() {
        let mut m = model(vec![node("Neg", &["0"], &["2"], vec![])], "2");
        m.graph.as_mut().unwrap().initializer.push(TensorProto {
            name: Some("9".into()),
            data_type: Some(DataType::Float as i32),
            ..Default::default()
        });
        assert_eq!(check_model(&m), Err(CheckError::InitializerNotInput("9".into())));
    }

    #[test]
    fn test_float_only_operator_rejects_ints() {
        let mut m = model(vec![node("Sigmoid", &["0"], &["2"], vec![])], "2");
        let graph = m.graph.as_mut().unwrap();
        graph.input[0] = info("0", DataType::Int64);
        graph.output[0] = info("2", DataType::Int64);
        assert!(matches!(check_model(&m), Err(CheckError::UnsupportedType { .. })));
    }
}
