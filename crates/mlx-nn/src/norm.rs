//! Batch normalization.

use mlx_core::{Result, Shape, Tensor, Value};
use rand::Rng;

use crate::{Module, init, single_input};

/// Batch normalization over the channel axis (axis 1).
///
/// In training mode the batch statistics normalize the input; in eval mode
/// the running statistics do. Modules start out in training mode.
pub struct BatchNorm2d {
    weight: Tensor,
    bias: Tensor,
    running_mean: Tensor,
    running_var: Tensor,
    eps: f32,
    momentum: f32,
    training: bool,
}

impl BatchNorm2d {
    /// Weight is drawn from `U(0, 1)`; bias and running mean start at zero,
    /// running variance at one.
    pub fn new(num_features: usize, rng: &mut impl Rng) -> Result<Self> {
        let shape = Shape::new(vec![num_features as i64]);
        Ok(Self {
            weight: init::uniform(rng, &shape, 0.0, 1.0)?,
            bias: init::constant(&shape, 0.0)?,
            running_mean: init::constant(&shape, 0.0)?,
            running_var: init::constant(&shape, 1.0)?,
            eps: 1e-5,
            momentum: 0.1,
            training: true,
        })
    }

    pub fn eps(&self) -> f32 {
        self.eps
    }

    pub fn momentum(&self) -> f32 {
        self.momentum
    }
}

impl Module for BatchNorm2d {
    fn forward(&self, inputs: &[Value]) -> Result<Value> {
        let x = single_input(inputs, "BatchNorm2d")?;
        Ok(x.batch_norm(
            [
                &self.weight,
                &self.bias,
                &self.running_mean,
                &self.running_var,
            ],
            self.training,
            self.momentum,
            self.eps,
        )?
        .into())
    }

    fn train(&mut self, training: bool) {
        self.training = training;
    }

    fn is_training(&self) -> bool {
        self.training
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mlx_core::graph::OpKind;

    #[test]
    fn test_batchnorm_mode_is_recorded() {
        let mut bn = BatchNorm2d::new(2, &mut init::seeded(0)).unwrap();
        assert!(bn.is_training());
        let x = Tensor::from_f32(&[1.0, 1.0, 1.0, 1.0], &Shape::new(vec![2, 2])).unwrap();

        bn.train(false);
        let y = bn.forward(&[x.clone().into()]).unwrap();
        let y = y.as_tensor().unwrap();
        let node = y.stream().get_node(y.node_id()).unwrap();
        assert!(matches!(node.op, OpKind::BatchNorm { training: false, .. }));
        assert_eq!(node.inputs.len(), 5);
    }

    #[test]
    fn test_batchnorm_training_constant_input() {
        let bn = BatchNorm2d::new(2, &mut init::seeded(0)).unwrap();
        let x = Tensor::from_f32(&[1.0, 1.0, 1.0, 1.0], &Shape::new(vec![2, 2])).unwrap();
        let y = bn.forward(&[x.into()]).unwrap();
        // Constant batches normalize to the bias, which starts at zero.
        assert_eq!(y.as_tensor().unwrap().to_vec_f32().unwrap(), vec![0.0; 4]);
    }
}
