//! Custom calls: user-defined operators that execute through ordinary tensor
//! ops but are recorded as a single opaque node per output.
//!
//! The forward closure runs eagerly to produce reference outputs, which the
//! backend uses when evaluating. How a call is translated for export is not
//! known here; exporters look it up by name in their own rule registry.

use std::sync::Arc;

use smallvec::SmallVec;

use crate::graph::{NodeId, OpKind, TensorMeta};
use crate::value::Structure;
use crate::{MlxError, Result, Tensor, Value};

/// An argument at a custom call site.
#[derive(Clone, Debug)]
pub enum CallArg {
    Value(Value),
    Float(f64),
    Int(i64),
}

impl From<Value> for CallArg {
    fn from(v: Value) -> Self {
        CallArg::Value(v)
    }
}

impl From<&Tensor> for CallArg {
    fn from(t: &Tensor) -> Self {
        CallArg::Value(Value::Tensor(t.clone()))
    }
}

impl From<f64> for CallArg {
    fn from(v: f64) -> Self {
        CallArg::Float(v)
    }
}

impl From<i64> for CallArg {
    fn from(v: i64) -> Self {
        CallArg::Int(v)
    }
}

impl CallArg {
    pub fn as_value(&self) -> Result<&Value> {
        match self {
            CallArg::Value(v) => Ok(v),
            other => Err(MlxError::InvalidArgument(format!(
                "expected a tensor argument, got {other:?}"
            ))),
        }
    }

    pub fn as_tensor(&self) -> Result<&Tensor> {
        self.as_value()?.as_tensor()
    }

    pub fn as_f64(&self) -> Result<f64> {
        match self {
            CallArg::Float(v) => Ok(*v),
            CallArg::Int(v) => Ok(*v as f64),
            CallArg::Value(_) => Err(MlxError::InvalidArgument(
                "expected a scalar argument, got a value".into(),
            )),
        }
    }
}

/// A call-site argument with its tensors reduced to the shape of their
/// value tree.
#[derive(Clone, Debug, PartialEq)]
pub enum ArgSpec {
    Value(Structure),
    Float(f64),
    Int(i64),
}

/// Record of one custom call, shared by every output node of the call.
#[derive(Debug)]
pub struct CustomCall {
    name: String,
    args: Vec<ArgSpec>,
    outputs: Structure,
}

impl CustomCall {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Argument layout at the call site, in call order.
    pub fn args(&self) -> &[ArgSpec] {
        &self.args
    }

    /// Structure of the value the call returned.
    pub fn outputs(&self) -> &Structure {
        &self.outputs
    }

    #[cfg(test)]
    pub(crate) fn for_test(name: &str) -> Self {
        Self {
            name: name.to_string(),
            args: vec![ArgSpec::Value(Structure::Leaf)],
            outputs: Structure::Leaf,
        }
    }
}

/// Invoke `forward` on `args` and record the result as a custom call named
/// `name`.
///
/// The returned value has the structure of the forward result, with every
/// leaf replaced by a `Custom` node that depends on all tensor arguments.
pub fn call_custom<F>(name: &str, args: Vec<CallArg>, forward: F) -> Result<Value>
where
    F: FnOnce(&[CallArg]) -> Result<Value>,
{
    let reference = forward(&args)?;

    let arg_tensors: Vec<Tensor> = args
        .iter()
        .filter_map(|a| match a {
            CallArg::Value(v) => Some(v.flatten()),
            _ => None,
        })
        .flatten()
        .collect();
    let first = arg_tensors.first().ok_or_else(|| {
        MlxError::InvalidArgument(format!("custom call {name} has no tensor arguments"))
    })?;
    let reference_leaves = reference.flatten();
    if arg_tensors
        .iter()
        .chain(reference_leaves.iter())
        .any(|t| !t.same_stream(first))
    {
        return Err(MlxError::StreamMismatch);
    }

    let call = Arc::new(CustomCall {
        name: name.to_string(),
        args: args
            .iter()
            .map(|a| match a {
                CallArg::Value(v) => ArgSpec::Value(v.structure()),
                CallArg::Float(f) => ArgSpec::Float(*f),
                CallArg::Int(i) => ArgSpec::Int(*i),
            })
            .collect(),
        outputs: reference.structure(),
    });

    let stream = first.stream();
    let outputs: Vec<Tensor> = reference_leaves
        .iter()
        .enumerate()
        .map(|(output, r)| {
            let mut inputs: SmallVec<[NodeId; 2]> = arg_tensors.iter().map(Tensor::node_id).collect();
            inputs.push(r.node_id());
            let meta = TensorMeta {
                shape: r.shape().clone(),
                dtype: r.dtype(),
            };
            let id = stream.add_op(
                OpKind::Custom {
                    call: Arc::clone(&call),
                    output,
                },
                inputs,
                meta,
            );
            Tensor::from_node_id(id, r.shape().clone(), r.dtype(), Arc::clone(&stream))
        })
        .collect();

    Value::unflatten(call.outputs(), &mut outputs.into_iter())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Shape;

    fn t(data: &[f32]) -> Tensor {
        Tensor::from_f32(data, &Shape::new(vec![data.len() as i64])).unwrap()
    }

    #[test]
    fn test_custom_call_evaluates_reference() {
        let x = t(&[1.0, 2.0]);
        let y = t(&[3.0, 4.0]);
        let out = call_custom("MyAdd", vec![(&x).into(), (&y).into()], |args| {
            Ok(args[0].as_tensor()?.add(args[1].as_tensor()?)?.into())
        })
        .unwrap();
        let out = out.as_tensor().unwrap();
        assert_eq!(out.to_vec_f32().unwrap(), vec![4.0, 6.0]);

        let node = out.stream().get_node(out.node_id()).unwrap();
        match &node.op {
            OpKind::Custom { call, output } => {
                assert_eq!(call.name(), "MyAdd");
                assert_eq!(*output, 0);
                assert_eq!(call.args(), &[ArgSpec::Value(Structure::Leaf), ArgSpec::Value(Structure::Leaf)]);
            }
            other => panic!("expected custom node, got {other:?}"),
        }
        // two arguments plus the reference output
        assert_eq!(node.inputs.len(), 3);
    }

    #[test]
    fn test_custom_call_keeps_nested_outputs() {
        let x = t(&[1.0]);
        let out = call_custom("Pair", vec![(&x).into(), CallArg::Float(0.5)], |args| {
            let x = args[0].as_tensor()?;
            Ok(Value::tuple([x.neg().into(), Value::tuple([x.sigmoid().into()])]))
        })
        .unwrap();
        assert_eq!(
            out.structure(),
            Structure::Tuple(vec![Structure::Leaf, Structure::Tuple(vec![Structure::Leaf])])
        );
        assert_eq!(out.flatten()[0].to_vec_f32().unwrap(), vec![-1.0]);
    }

    #[test]
    fn test_custom_call_requires_tensor_args() {
        let r = call_custom("Nothing", vec![CallArg::Int(3)], |_| Ok(t(&[1.0]).into()));
        assert!(r.is_err());
    }
}
