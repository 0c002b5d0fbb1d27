//! A module backed by a closure and a fixed list of parameters.

use mlx_core::{Result, Tensor, Value};

use crate::Module;

type ForwardFn = dyn Fn(&[Value]) -> Result<Value> + Send + Sync;

/// Wraps `f` so that `forward(inputs) == f(inputs ++ params)`.
///
/// Parameters are stored as parameter nodes, so an exporter lists them as
/// initializers rather than traced inputs.
pub struct FuncModule {
    f: Box<ForwardFn>,
    params: Vec<Tensor>,
    training: bool,
}

impl FuncModule {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        Self {
            f: Box::new(f),
            params: Vec::new(),
            training: false,
        }
    }

    /// Wrap `f` with trailing parameter arguments copied from `params`.
    pub fn with_params<F>(f: F, params: &[Tensor]) -> Result<Self>
    where
        F: Fn(&[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        let params = params
            .iter()
            .map(Tensor::to_parameter)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            f: Box::new(f),
            params,
            training: false,
        })
    }

    pub fn params(&self) -> &[Tensor] {
        &self.params
    }
}

impl Module for FuncModule {
    fn forward(&self, inputs: &[Value]) -> Result<Value> {
        let mut args = inputs.to_vec();
        args.extend(self.params.iter().map(Value::from));
        (self.f)(&args)
    }

    fn train(&mut self, training: bool) {
        self.training = training;
    }

    fn is_training(&self) -> bool {
        self.training
    }
}

impl std::fmt::Debug for FuncModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FuncModule")
            .field("params", &self.params.len())
            .finish_non_exhaustive()
    }
}
