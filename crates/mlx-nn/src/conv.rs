//! 2D convolution layer.

use mlx_core::{Result, Shape, Tensor, Value};
use rand::Rng;

use crate::{Module, init, single_input};

/// Square-kernel 2D convolution over `[N, C, H, W]` inputs, stride 1 and no
/// padding by default.
pub struct Conv2d {
    weight: Tensor,
    bias: Option<Tensor>,
    stride: [usize; 2],
    padding: [usize; 2],
    dilation: [usize; 2],
    groups: usize,
}

impl Conv2d {
    /// Weights and bias are drawn from `U(-b, b)` with
    /// `b = 1 / sqrt(in_channels * kernel * kernel)`.
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        kernel: usize,
        bias: bool,
        rng: &mut impl Rng,
    ) -> Result<Self> {
        let fan_in = (in_channels * kernel * kernel) as f32;
        let bound = 1.0 / fan_in.sqrt();
        let k = kernel as i64;
        let weight = init::uniform(
            rng,
            &Shape::new(vec![out_channels as i64, in_channels as i64, k, k]),
            -bound,
            bound,
        )?;
        let bias = if bias {
            Some(init::uniform(rng, &Shape::new(vec![out_channels as i64]), -bound, bound)?)
        } else {
            None
        };
        Ok(Self {
            weight,
            bias,
            stride: [1, 1],
            padding: [0, 0],
            dilation: [1, 1],
            groups: 1,
        })
    }

    pub fn with_stride(mut self, stride: usize) -> Self {
        self.stride = [stride, stride];
        self
    }

    pub fn with_padding(mut self, padding: usize) -> Self {
        self.padding = [padding, padding];
        self
    }

    pub fn weight(&self) -> &Tensor {
        &self.weight
    }
}

impl Module for Conv2d {
    fn forward(&self, inputs: &[Value]) -> Result<Value> {
        let x = single_input(inputs, "Conv2d")?;
        Ok(x.conv2d(
            &self.weight,
            self.bias.as_ref(),
            self.stride,
            self.padding,
            self.dilation,
            self.groups,
        )?
        .into())
    }
}
