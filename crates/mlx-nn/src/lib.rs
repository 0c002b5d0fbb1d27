//! Neural network modules for MLX.
//!
//! Provides the `Module` trait, the closure-backed `FuncModule`, and the
//! layers the operator suite exports: Conv2d, BatchNorm2d, MaxPool1d,
//! ReflectionPad2d and Linear.

pub mod conv;
pub mod func;
pub mod init;
pub mod linear;
pub mod norm;
pub mod padding;
pub mod pool;

pub use conv::Conv2d;
pub use func::FuncModule;
pub use linear::Linear;
pub use norm::BatchNorm2d;
pub use padding::ReflectionPad2d;
pub use pool::MaxPool1d;

use mlx_core::{MlxError, Result, Tensor, Value};

/// Trait for neural network modules.
///
/// Inputs are the positional arguments of one call; each may be a tensor or
/// a nested tuple. Modules with distinct train/eval semantics override
/// `train` and `is_training`.
pub trait Module {
    fn forward(&self, inputs: &[Value]) -> Result<Value>;

    /// Switch between training and evaluation semantics.
    fn train(&mut self, _training: bool) {}

    fn is_training(&self) -> bool {
        false
    }
}

/// Borrow positional argument `idx` as a tensor.
pub fn tensor_arg(inputs: &[Value], idx: usize) -> Result<&Tensor> {
    inputs
        .get(idx)
        .ok_or_else(|| {
            MlxError::InvalidArgument(format!(
                "expected at least {} arguments, got {}",
                idx + 1,
                inputs.len()
            ))
        })?
        .as_tensor()
}

/// Borrow the single tensor argument of a one-input layer.
pub(crate) fn single_input<'a>(inputs: &'a [Value], layer: &str) -> Result<&'a Tensor> {
    if inputs.len() != 1 {
        return Err(MlxError::InvalidArgument(format!(
            "{layer} takes one input, got {}",
            inputs.len()
        )));
    }
    tensor_arg(inputs, 0)
}
