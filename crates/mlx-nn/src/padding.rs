//! Reflection padding.

use mlx_core::{Result, Value};

use crate::{Module, single_input};

/// Pads the last two dimensions by mirroring the input at its edges.
pub struct ReflectionPad2d {
    padding: [i64; 4],
}

impl ReflectionPad2d {
    /// `padding` is `(left, right, top, bottom)`.
    pub fn new(padding: (i64, i64, i64, i64)) -> Self {
        let (left, right, top, bottom) = padding;
        Self {
            padding: [left, right, top, bottom],
        }
    }
}

impl Module for ReflectionPad2d {
    fn forward(&self, inputs: &[Value]) -> Result<Value> {
        let x = single_input(inputs, "ReflectionPad2d")?;
        Ok(x.reflection_pad2d(self.padding)?.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mlx_core::{Shape, Tensor};

    #[test]
    fn test_pad_shape() {
        let pad = ReflectionPad2d::new((3, 4, 1, 2));
        let x = Tensor::from_f32(
            &[0.0, 1.0, 1.0, 1.0, 2.0, 3.0, 7.0, 7.0],
            &Shape::new(vec![1, 1, 2, 4]),
        )
        .unwrap();
        let y = pad.forward(&[x.into()]).unwrap();
        let y = y.as_tensor().unwrap();
        assert_eq!(y.shape(), &Shape::new(vec![1, 1, 5, 11]));
        // First row mirrors the second input row.
        assert_eq!(
            &y.to_vec_f32().unwrap()[..11],
            &[7.0, 7.0, 3.0, 2.0, 3.0, 7.0, 7.0, 7.0, 3.0, 2.0, 3.0]
        );
    }
}
