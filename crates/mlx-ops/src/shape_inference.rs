//! Shape inference for graph ops.
//!
//! Given an `OpKind` and input shapes, computes the output shape. The
//! exporter uses it to cross-check the metadata recorded during tracing
//! before a node is translated.

use mlx_core::Shape;
use mlx_core::graph::OpKind;

/// Error returned when shapes are incompatible for an op.
#[derive(Debug, thiserror::Error)]
pub enum ShapeError {
    #[error("shape mismatch: {0}")]
    Mismatch(String),

    #[error("invalid axis {axis} for ndim {ndim}")]
    InvalidAxis { axis: usize, ndim: usize },

    #[error("matmul inner dimensions mismatch: {k1} vs {k2}")]
    MatmulMismatch { k1: i64, k2: i64 },
}

fn input<'a>(inputs: &[&'a Shape], idx: usize) -> Result<&'a Shape, ShapeError> {
    inputs
        .get(idx)
        .copied()
        .ok_or_else(|| ShapeError::Mismatch(format!("missing input {idx}")))
}

fn check_axis(axis: usize, ndim: usize) -> Result<(), ShapeError> {
    if axis >= ndim {
        return Err(ShapeError::InvalidAxis { axis, ndim });
    }
    Ok(())
}

fn matmul(a: &Shape, b: &Shape) -> Result<Shape, ShapeError> {
    if a.ndim() != 2 || b.ndim() != 2 {
        return Err(ShapeError::Mismatch("matmul requires 2D tensors".into()));
    }
    let k1 = a.0[1];
    let k2 = b.0[0];
    if k1 != k2 {
        return Err(ShapeError::MatmulMismatch { k1, k2 });
    }
    Ok(Shape::new(vec![a.0[0], b.0[1]]))
}

/// Infer the output shape for a given op and input shapes.
///
/// Source nodes have no inputs to infer from and are rejected.
pub fn infer_shape(op: &OpKind, inputs: &[&Shape]) -> Result<Shape, ShapeError> {
    match op {
        OpKind::Constant | OpKind::Parameter => Err(ShapeError::Mismatch(
            "source nodes carry their own shape".into(),
        )),

        OpKind::Add | OpKind::Sub | OpKind::Mul | OpKind::Div => {
            let a = input(inputs, 0)?;
            let b = input(inputs, 1)?;
            crate::broadcast_shapes(a, b)
                .ok_or_else(|| ShapeError::Mismatch(format!("cannot broadcast {a} with {b}")))
        }

        OpKind::Neg | OpKind::Sigmoid | OpKind::Tanh | OpKind::Sqrt => {
            Ok(input(inputs, 0)?.clone())
        }

        OpKind::Mean { axis } => {
            let a = input(inputs, 0)?;
            check_axis(*axis, a.ndim())?;
            let mut dims = a.0.clone();
            dims.remove(*axis);
            Ok(Shape::new(dims))
        }

        OpKind::MatMul => matmul(input(inputs, 0)?, input(inputs, 1)?),

        OpKind::Addmm { .. } => {
            let bias = input(inputs, 0)?;
            let out = matmul(input(inputs, 1)?, input(inputs, 2)?)?;
            match crate::broadcast_shapes(bias, &out) {
                Some(s) if s == out => Ok(out),
                _ => Err(ShapeError::Mismatch(format!(
                    "bias {bias} does not broadcast to {out}"
                ))),
            }
        }

        OpKind::Reshape { new_shape } => {
            let a = input(inputs, 0)?;
            if a.numel() != new_shape.numel() {
                return Err(ShapeError::Mismatch(format!(
                    "cannot reshape {a} to {new_shape}"
                )));
            }
            Ok(new_shape.clone())
        }

        OpKind::Transpose { axes } => {
            let a = input(inputs, 0)?;
            if axes.len() != a.ndim() {
                return Err(ShapeError::Mismatch(format!(
                    "permutation {axes:?} does not match rank of {a}"
                )));
            }
            for &ax in axes {
                check_axis(ax, a.ndim())?;
            }
            Ok(Shape::new(axes.iter().map(|&ax| a.0[ax]).collect::<Vec<_>>()))
        }

        OpKind::Broadcast { target_shape } => {
            let a = input(inputs, 0)?;
            match crate::broadcast_shapes(a, target_shape) {
                Some(s) if &s == target_shape => Ok(s),
                _ => Err(ShapeError::Mismatch(format!(
                    "cannot expand {a} to {target_shape}"
                ))),
            }
        }

        OpKind::Split { axis, sizes, index } => {
            let a = input(inputs, 0)?;
            check_axis(*axis, a.ndim())?;
            if sizes.iter().sum::<i64>() != a.0[*axis] {
                return Err(ShapeError::Mismatch(format!(
                    "split sizes {sizes:?} do not cover axis {axis} of {a}"
                )));
            }
            let size = sizes
                .get(*index)
                .ok_or_else(|| ShapeError::Mismatch(format!("split piece {index} out of range")))?;
            let mut dims = a.0.clone();
            dims[*axis] = *size;
            Ok(Shape::new(dims))
        }

        OpKind::Concat { axis } => {
            let first = input(inputs, 0)?;
            check_axis(*axis, first.ndim())?;
            let mut dims = first.0.clone();
            for s in &inputs[1..] {
                let compatible = s.ndim() == first.ndim()
                    && (0..first.ndim()).all(|d| d == *axis || s.0[d] == first.0[d]);
                if !compatible {
                    return Err(ShapeError::Mismatch(format!(
                        "cannot concatenate {first} with {s} along axis {axis}"
                    )));
                }
                dims[*axis] += s.0[*axis];
            }
            Ok(Shape::new(dims))
        }

        OpKind::ReflectionPad { pads } => {
            let a = input(inputs, 0)?;
            let ndim = a.ndim();
            if pads.len() != 2 * ndim {
                return Err(ShapeError::Mismatch(format!(
                    "pads {pads:?} do not match rank of {a}"
                )));
            }
            Ok(Shape::new(
                (0..ndim)
                    .map(|d| a.0[d] + pads[d] + pads[ndim + d])
                    .collect::<Vec<_>>(),
            ))
        }

        OpKind::Conv2d {
            stride,
            padding,
            dilation,
            groups,
        } => {
            let x = input(inputs, 0)?;
            let w = input(inputs, 1)?;
            if x.ndim() != 4 || w.ndim() != 4 || *groups == 0 {
                return Err(ShapeError::Mismatch(format!(
                    "conv2d expects 4D input and weight, got {x} and {w}"
                )));
            }
            if x.0[1] != w.0[1] * *groups as i64 {
                return Err(ShapeError::Mismatch(format!(
                    "conv2d channels of {x} do not match weight {w}"
                )));
            }
            let mut dims = vec![x.0[0], w.0[0]];
            for i in 0..2 {
                let extent =
                    x.0[2 + i] + 2 * padding[i] as i64 - dilation[i] as i64 * (w.0[2 + i] - 1) - 1;
                dims.push(extent / stride[i] as i64 + 1);
            }
            Ok(Shape::new(dims))
        }

        OpKind::MaxPool1d {
            kernel,
            stride,
            padding,
        } => {
            let x = input(inputs, 0)?;
            if x.ndim() != 3 {
                return Err(ShapeError::Mismatch(format!(
                    "max_pool1d expects a 3D input, got {x}"
                )));
            }
            let extent = x.0[2] + 2 * *padding as i64 - *kernel as i64;
            Ok(Shape::new(vec![x.0[0], x.0[1], extent / *stride as i64 + 1]))
        }

        OpKind::BatchNorm { .. } => Ok(input(inputs, 0)?.clone()),

        // The reference output is the last input.
        OpKind::Custom { .. } => inputs
            .last()
            .map(|s| (*s).clone())
            .ok_or_else(|| ShapeError::Mismatch("custom node without inputs".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(dims: &[i64]) -> Shape {
        Shape::new(dims.to_vec())
    }

    #[test]
    fn test_binary_broadcast() {
        let result = infer_shape(&OpKind::Mul, &[&s(&[2, 1]), &s(&[1, 3])]).unwrap();
        assert_eq!(result, s(&[2, 3]));
        assert!(infer_shape(&OpKind::Add, &[&s(&[2, 3]), &s(&[2, 4])]).is_err());
    }

    #[test]
    fn test_unary_preserves_shape() {
        let a = s(&[3, 4]);
        assert_eq!(infer_shape(&OpKind::Sigmoid, &[&a]).unwrap(), a);
    }

    #[test]
    fn test_mean_removes_axis() {
        let result = infer_shape(&OpKind::Mean { axis: 1 }, &[&s(&[2, 3, 4])]).unwrap();
        assert_eq!(result, s(&[2, 4]));
        assert!(infer_shape(&OpKind::Mean { axis: 3 }, &[&s(&[2, 3, 4])]).is_err());
    }

    #[test]
    fn test_matmul_mismatch() {
        assert!(infer_shape(&OpKind::MatMul, &[&s(&[2, 3]), &s(&[4, 5])]).is_err());
    }

    #[test]
    fn test_addmm() {
        let op = OpKind::Addmm {
            beta: 1.0,
            alpha: 1.0,
        };
        let out = infer_shape(&op, &[&s(&[5]), &s(&[3, 4]), &s(&[4, 5])]).unwrap();
        assert_eq!(out, s(&[3, 5]));
        assert!(infer_shape(&op, &[&s(&[4]), &s(&[3, 4]), &s(&[4, 5])]).is_err());
    }

    #[test]
    fn test_transpose() {
        let op = OpKind::Transpose {
            axes: vec![2, 0, 1],
        };
        assert_eq!(infer_shape(&op, &[&s(&[2, 3, 4])]).unwrap(), s(&[4, 2, 3]));
    }

    #[test]
    fn test_reshape_checks_numel() {
        let op = OpKind::Reshape {
            new_shape: s(&[3, 2]),
        };
        assert_eq!(infer_shape(&op, &[&s(&[2, 3])]).unwrap(), s(&[3, 2]));
        assert!(infer_shape(&op, &[&s(&[2, 2])]).is_err());
    }

    #[test]
    fn test_split_piece() {
        let op = OpKind::Split {
            axis: 0,
            sizes: vec![2, 1],
            index: 1,
        };
        assert_eq!(infer_shape(&op, &[&s(&[3])]).unwrap(), s(&[1]));
    }

    #[test]
    fn test_concat() {
        let op = OpKind::Concat { axis: 1 };
        let out = infer_shape(&op, &[&s(&[2, 1]), &s(&[2, 3])]).unwrap();
        assert_eq!(out, s(&[2, 4]));
    }

    #[test]
    fn test_reflection_pad() {
        let op = OpKind::ReflectionPad {
            pads: vec![0, 0, 2, 1, 0, 0, 3, 0],
        };
        let out = infer_shape(&op, &[&s(&[1, 1, 4, 4])]).unwrap();
        assert_eq!(out, s(&[1, 1, 9, 5]));
    }

    #[test]
    fn test_conv_and_pool() {
        let conv = OpKind::Conv2d {
            stride: [2, 2],
            padding: [1, 1],
            dilation: [1, 1],
            groups: 1,
        };
        let out = infer_shape(&conv, &[&s(&[1, 3, 8, 8]), &s(&[4, 3, 3, 3])]).unwrap();
        assert_eq!(out, s(&[1, 4, 4, 4]));

        let pool = OpKind::MaxPool1d {
            kernel: 3,
            stride: 2,
            padding: 0,
        };
        assert_eq!(infer_shape(&pool, &[&s(&[20, 16, 50])]).unwrap(), s(&[20, 16, 24]));
    }
}
