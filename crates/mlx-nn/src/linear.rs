//! Linear (fully-connected) layer.

use mlx_core::{Result, Shape, Tensor, Value};
use rand::Rng;

use crate::{Module, init, single_input};

/// A linear (fully-connected) layer: `y = x @ W^T + b`.
///
/// Weight has shape `[out_features, in_features]`. Bias (optional) has shape
/// `[out_features]`.
pub struct Linear {
    weight: Tensor,
    bias: Option<Tensor>,
}

impl Linear {
    /// Create a Linear layer with weights drawn from
    /// `U(-1/sqrt(in_features), 1/sqrt(in_features))`.
    pub fn new(in_features: usize, out_features: usize, bias: bool, rng: &mut impl Rng) -> Result<Self> {
        let bound = 1.0 / (in_features as f32).sqrt();
        let weight = init::uniform(
            rng,
            &Shape::new(vec![out_features as i64, in_features as i64]),
            -bound,
            bound,
        )?;
        let bias = if bias {
            Some(init::uniform(rng, &Shape::new(vec![out_features as i64]), -bound, bound)?)
        } else {
            None
        };
        Ok(Self { weight, bias })
    }

    /// Create a new Linear layer from pre-existing weight and bias tensors.
    pub fn from_weights(weight: Tensor, bias: Option<Tensor>) -> Self {
        Self { weight, bias }
    }

    /// Get a reference to the weight tensor.
    pub fn weight(&self) -> &Tensor {
        &self.weight
    }

    /// Get a reference to the bias tensor (if any).
    pub fn bias(&self) -> Option<&Tensor> {
        self.bias.as_ref()
    }
}

impl Module for Linear {
    fn forward(&self, inputs: &[Value]) -> Result<Value> {
        let x = single_input(inputs, "Linear")?;
        let wt = self.weight.transpose(0, 1)?;
        let y = match &self.bias {
            Some(bias) => bias.addmm(x, &wt)?,
            None => x.matmul(&wt)?,
        };
        Ok(y.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_forward() {
        let w = Tensor::from_f32(&[1.0, 0.0, 0.0, 2.0, 1.0, 1.0], &Shape::new(vec![3, 2])).unwrap();
        let b = Tensor::from_f32(&[0.5, 0.5, 0.5], &Shape::new(vec![3])).unwrap();
        let layer = Linear::from_weights(w, Some(b));
        let x = Tensor::from_f32(&[1.0, 2.0], &Shape::new(vec![1, 2])).unwrap();
        let y = layer.forward(&[x.into()]).unwrap();
        let y = y.as_tensor().unwrap();
        assert_eq!(y.shape(), &Shape::new(vec![1, 3]));
        assert_eq!(y.to_vec_f32().unwrap(), vec![1.5, 4.5, 3.5]);
    }

    #[test]
    fn test_linear_init_bounds() {
        let layer = Linear::new(4, 2, false, &mut init::seeded(0)).unwrap();
        assert!(layer.bias().is_none());
        let w = layer.weight().to_vec_f32().unwrap();
        assert_eq!(w.len(), 8);
        assert!(w.iter().all(|v| v.abs() <= 0.5));
    }
}
