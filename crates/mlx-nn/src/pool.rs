//! Max pooling.

use mlx_core::{Result, Value};

use crate::{Module, single_input};

/// 1D max pooling over `[N, C, L]` inputs.
pub struct MaxPool1d {
    kernel: usize,
    stride: usize,
    padding: usize,
}

impl MaxPool1d {
    /// Stride defaults to the kernel size when `None`.
    pub fn new(kernel: usize, stride: Option<usize>) -> Self {
        Self {
            kernel,
            stride: stride.unwrap_or(kernel),
            padding: 0,
        }
    }
}

impl Module for MaxPool1d {
    fn forward(&self, inputs: &[Value]) -> Result<Value> {
        let x = single_input(inputs, "MaxPool1d")?;
        Ok(x.max_pool1d(self.kernel, self.stride, self.padding)?.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mlx_core::{Shape, Tensor};

    #[test]
    fn test_default_stride() {
        let pool = MaxPool1d::new(2, None);
        let x = Tensor::from_f32(&[1.0, 3.0, 2.0, 0.0], &Shape::new(vec![1, 1, 4])).unwrap();
        let y = pool.forward(&[x.into()]).unwrap();
        assert_eq!(y.as_tensor().unwrap().to_vec_f32().unwrap(), vec![3.0, 2.0]);
    }
}
