//! Nested tensor values.
//!
//! Example inputs and computation outputs are trees of tensors: a single
//! tensor, or a tuple whose elements are themselves values.

use crate::{MlxError, Result, Tensor};

/// A tensor or an arbitrarily nested tuple of tensors.
#[derive(Clone, Debug)]
pub enum Value {
    Tensor(Tensor),
    Tuple(Vec<Value>),
}

/// The shape of a `Value` tree with the tensors removed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Structure {
    Leaf,
    Tuple(Vec<Structure>),
}

impl Structure {
    /// Number of leaves in the tree.
    pub fn leaf_count(&self) -> usize {
        match self {
            Structure::Leaf => 1,
            Structure::Tuple(items) => items.iter().map(Structure::leaf_count).sum(),
        }
    }
}

impl Value {
    pub fn tuple(items: impl IntoIterator<Item = Value>) -> Self {
        Value::Tuple(items.into_iter().collect())
    }

    /// Leaves in depth-first, left-to-right order.
    pub fn flatten(&self) -> Vec<Tensor> {
        let mut out = Vec::new();
        self.flatten_into(&mut out);
        out
    }

    fn flatten_into(&self, out: &mut Vec<Tensor>) {
        match self {
            Value::Tensor(t) => out.push(t.clone()),
            Value::Tuple(items) => {
                for item in items {
                    item.flatten_into(out);
                }
            }
        }
    }

    pub fn structure(&self) -> Structure {
        match self {
            Value::Tensor(_) => Structure::Leaf,
            Value::Tuple(items) => Structure::Tuple(items.iter().map(Value::structure).collect()),
        }
    }

    /// Rebuild a value of the given structure from leaves in flatten order.
    pub fn unflatten(
        structure: &Structure,
        leaves: &mut impl Iterator<Item = Tensor>,
    ) -> Result<Value> {
        match structure {
            Structure::Leaf => leaves.next().map(Value::Tensor).ok_or_else(|| {
                MlxError::InvalidArgument("not enough tensors to rebuild value".into())
            }),
            Structure::Tuple(items) => items
                .iter()
                .map(|s| Value::unflatten(s, leaves))
                .collect::<Result<Vec<_>>>()
                .map(Value::Tuple),
        }
    }

    /// Borrow the tensor of a leaf value.
    pub fn as_tensor(&self) -> Result<&Tensor> {
        match self {
            Value::Tensor(t) => Ok(t),
            Value::Tuple(items) => Err(MlxError::InvalidArgument(format!(
                "expected a tensor, got a tuple of {} values",
                items.len()
            ))),
        }
    }

    /// Borrow the elements of a tuple value.
    pub fn as_tuple(&self) -> Result<&[Value]> {
        match self {
            Value::Tuple(items) => Ok(items),
            Value::Tensor(_) => Err(MlxError::InvalidArgument(
                "expected a tuple, got a tensor".into(),
            )),
        }
    }
}

impl From<Tensor> for Value {
    fn from(t: Tensor) -> Self {
        Value::Tensor(t)
    }
}

impl From<&Tensor> for Value {
    fn from(t: &Tensor) -> Self {
        Value::Tensor(t.clone())
    }
}

impl From<Vec<Tensor>> for Value {
    fn from(items: Vec<Tensor>) -> Self {
        Value::Tuple(items.into_iter().map(Value::Tensor).collect())
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Tuple(items)
    }
}
