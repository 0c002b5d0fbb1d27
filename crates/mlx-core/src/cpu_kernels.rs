//! Built-in CPU reference backend, the correctness oracle for every op.
//!
//! This is an intentionally simple, safe Rust implementation of every op.
//! It prioritizes correctness and readability over performance.

use crate::backend::{Backend, NodeInput};
use crate::graph::{OpKind, TensorMeta};
use crate::{MlxError, Result, Shape};

/// Reference CPU backend.
pub struct CpuRefBackend;

impl Backend for CpuRefBackend {
    fn eval_node(
        &self,
        op: &OpKind,
        inputs: &[NodeInput<'_>],
        output_meta: &TensorMeta,
    ) -> Result<Vec<f32>> {
        match op {
            OpKind::Constant | OpKind::Parameter => Err(MlxError::InvalidArgument(
                "Constant/Parameter nodes should be pre-materialized".into(),
            )),
            OpKind::Add => binary_elementwise(inputs, output_meta, |a, b| a + b),
            OpKind::Sub => binary_elementwise(inputs, output_meta, |a, b| a - b),
            OpKind::Mul => binary_elementwise(inputs, output_meta, |a, b| a * b),
            OpKind::Div => binary_elementwise(inputs, output_meta, |a, b| a / b),
            OpKind::Neg => unary(inputs, |x| -x),
            OpKind::Sigmoid => unary(inputs, sigmoid),
            OpKind::Tanh => unary(inputs, f32::tanh),
            OpKind::Sqrt => unary(inputs, f32::sqrt),
            OpKind::Mean { axis } => reduce_mean(inputs, *axis),
            OpKind::MatMul => {
                let a = require_input(inputs, 0)?;
                let b = require_input(inputs, 1)?;
                matmul(a, b)
            }
            OpKind::Addmm { beta, alpha } => addmm(inputs, output_meta, *beta, *alpha),
            OpKind::Reshape { .. } => {
                let a = require_input(inputs, 0)?;
                Ok(a.data.to_vec())
            }
            OpKind::Transpose { axes } => transpose(inputs, axes),
            OpKind::Broadcast { target_shape } => {
                let a = require_input(inputs, 0)?;
                broadcast(a, target_shape)
            }
            OpKind::Split { axis, sizes, index } => split(inputs, *axis, sizes, *index),
            OpKind::Concat { axis } => concat(inputs, *axis),
            OpKind::ReflectionPad { pads } => reflection_pad(inputs, pads, output_meta),
            OpKind::Conv2d {
                stride,
                padding,
                dilation,
                groups,
            } => conv2d(inputs, output_meta, *stride, *padding, *dilation, *groups),
            OpKind::MaxPool1d {
                kernel,
                stride,
                padding,
            } => max_pool1d(inputs, output_meta, *kernel, *stride, *padding),
            OpKind::BatchNorm { eps, training, .. } => batch_norm(inputs, *eps, *training),
            // The last input is the reference output computed by the forward.
            OpKind::Custom { .. } => {
                let reference = inputs.last().ok_or_else(|| {
                    MlxError::InvalidArgument("custom node without reference output".into())
                })?;
                Ok(reference.data.to_vec())
            }
        }
    }
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

fn require_input<'a>(inputs: &'a [NodeInput<'_>], idx: usize) -> Result<&'a NodeInput<'a>> {
    inputs
        .get(idx)
        .ok_or_else(|| MlxError::InvalidArgument(format!("expected input at index {idx}")))
}

fn unary(inputs: &[NodeInput<'_>], f: fn(f32) -> f32) -> Result<Vec<f32>> {
    let a = require_input(inputs, 0)?;
    Ok(a.data.iter().map(|&x| f(x)).collect())
}

fn binary_elementwise(
    inputs: &[NodeInput<'_>],
    meta: &TensorMeta,
    f: fn(f32, f32) -> f32,
) -> Result<Vec<f32>> {
    let a = require_input(inputs, 0)?;
    let b = require_input(inputs, 1)?;
    if a.shape == b.shape {
        return Ok(a
            .data
            .iter()
            .zip(b.data.iter())
            .map(|(&x, &y)| f(x, y))
            .collect());
    }
    let lhs = broadcast(a, &meta.shape)?;
    let rhs = broadcast(b, &meta.shape)?;
    Ok(lhs.iter().zip(rhs.iter()).map(|(&x, &y)| f(x, y)).collect())
}

fn reduce_mean(inputs: &[NodeInput<'_>], ax: usize) -> Result<Vec<f32>> {
    let a = require_input(inputs, 0)?;
    let ndim = a.shape.ndim();
    if ax >= ndim {
        return Err(MlxError::InvalidArgument(format!(
            "axis {ax} out of range for ndim {ndim}"
        )));
    }

    let outer: usize = a.shape.0[..ax].iter().product::<i64>() as usize;
    let dim: usize = a.shape.0[ax] as usize;
    let inner: usize = a.shape.0[ax + 1..].iter().product::<i64>() as usize;

    let mut result = Vec::with_capacity(outer * inner);
    for o in 0..outer {
        for i in 0..inner {
            let mut sum = 0.0f32;
            for d in 0..dim {
                sum += a.data[o * dim * inner + d * inner + i];
            }
            result.push(sum / dim as f32);
        }
    }
    Ok(result)
}

fn matmul(a: &NodeInput<'_>, b: &NodeInput<'_>) -> Result<Vec<f32>> {
    if a.shape.ndim() != 2 || b.shape.ndim() != 2 {
        return Err(MlxError::InvalidArgument(
            "matmul requires 2D tensors".into(),
        ));
    }

    let m = a.shape.0[0] as usize;
    let k = a.shape.0[1] as usize;
    let k2 = b.shape.0[0] as usize;
    let n = b.shape.0[1] as usize;

    if k != k2 {
        return Err(MlxError::ShapeMismatch {
            expected: vec![m as i64, k as i64],
            got: vec![k2 as i64, n as i64],
        });
    }

    let mut data = vec![0.0f32; m * n];
    for i in 0..m {
        for j in 0..n {
            let mut sum = 0.0f32;
            for p in 0..k {
                sum += a.data[i * k + p] * b.data[p * n + j];
            }
            data[i * n + j] = sum;
        }
    }
    Ok(data)
}

fn addmm(inputs: &[NodeInput<'_>], meta: &TensorMeta, beta: f32, alpha: f32) -> Result<Vec<f32>> {
    let bias = require_input(inputs, 0)?;
    let product = matmul(require_input(inputs, 1)?, require_input(inputs, 2)?)?;
    let bias = broadcast(bias, &meta.shape)?;
    Ok(bias
        .iter()
        .zip(product.iter())
        .map(|(&c, &p)| beta * c + alpha * p)
        .collect())
}

fn transpose(inputs: &[NodeInput<'_>], perm: &[usize]) -> Result<Vec<f32>> {
    let a = require_input(inputs, 0)?;
    let ndim = a.shape.ndim();

    if perm.len() != ndim {
        return Err(MlxError::InvalidArgument(
            "transpose axes length must match ndim".into(),
        ));
    }

    let old_shape: Vec<usize> = a.shape.0.iter().map(|&d| d as usize).collect();
    let new_shape: Vec<usize> = perm.iter().map(|&ax| old_shape[ax]).collect();
    let old_strides = a.shape.strides();

    let total = a.data.len();
    let mut result = vec![0.0f32; total];

    for (flat, out) in result.iter_mut().enumerate() {
        // Convert flat index → multi-index in NEW shape.
        let mut remaining = flat;
        let mut old_flat = 0;
        for dim_idx in 0..ndim {
            let new_dim_size: usize = new_shape[dim_idx + 1..].iter().product::<usize>().max(1);
            let coord = remaining / new_dim_size;
            remaining %= new_dim_size;
            // This coord in the new tensor corresponds to perm[dim_idx] axis in old tensor.
            old_flat += coord * old_strides[perm[dim_idx]];
        }
        *out = a.data[old_flat];
    }

    Ok(result)
}

fn broadcast(a: &NodeInput<'_>, target_shape: &Shape) -> Result<Vec<f32>> {
    let in_shape = &a.shape.0;
    let out_shape = &target_shape.0;
    let out_ndim = out_shape.len();
    let in_ndim = in_shape.len();
    if in_ndim > out_ndim {
        return Err(MlxError::ShapeMismatch {
            expected: out_shape.clone(),
            got: in_shape.clone(),
        });
    }
    let pad = out_ndim - in_ndim;
    let total: usize = out_shape.iter().product::<i64>() as usize;

    let mut result = vec![0.0f32; total];
    for (out_flat, out) in result.iter_mut().enumerate() {
        let mut remaining = out_flat;
        let mut in_flat = 0usize;
        let mut in_stride = 1usize;

        for d in (0..out_ndim).rev() {
            let out_dim = out_shape[d] as usize;
            let coord = remaining % out_dim;
            remaining /= out_dim;

            if d >= pad {
                let in_d = d - pad;
                let in_dim = in_shape[in_d] as usize;
                let in_coord = if in_dim == 1 { 0 } else { coord };
                in_flat += in_coord * in_stride;
                in_stride *= in_dim;
            }
        }
        *out = a.data[in_flat];
    }
    Ok(result)
}

/// Split `[outer, dim, inner]` views of the input and keep piece `index`.
fn split(inputs: &[NodeInput<'_>], axis: usize, sizes: &[i64], index: usize) -> Result<Vec<f32>> {
    let a = require_input(inputs, 0)?;
    if axis >= a.shape.ndim() || index >= sizes.len() {
        return Err(MlxError::InvalidArgument(format!(
            "split piece {index} along axis {axis} out of range"
        )));
    }
    let outer: usize = a.shape.0[..axis].iter().product::<i64>() as usize;
    let dim = a.shape.0[axis] as usize;
    let inner: usize = a.shape.0[axis + 1..].iter().product::<i64>() as usize;
    let start: usize = sizes[..index].iter().sum::<i64>() as usize;
    let len = sizes[index] as usize;

    let mut result = Vec::with_capacity(outer * len * inner);
    for o in 0..outer {
        let base = o * dim * inner + start * inner;
        result.extend_from_slice(&a.data[base..base + len * inner]);
    }
    Ok(result)
}

fn concat(inputs: &[NodeInput<'_>], axis: usize) -> Result<Vec<f32>> {
    let first = require_input(inputs, 0)?;
    if axis >= first.shape.ndim() {
        return Err(MlxError::InvalidArgument(format!(
            "concat axis {axis} out of range for ndim {}",
            first.shape.ndim()
        )));
    }
    let outer: usize = first.shape.0[..axis].iter().product::<i64>() as usize;
    let inner: usize = first.shape.0[axis + 1..].iter().product::<i64>() as usize;

    let total: usize = inputs.iter().map(|i| i.data.len()).sum();
    let mut result = Vec::with_capacity(total);
    for o in 0..outer {
        for input in inputs {
            let chunk = input.shape.0[axis] as usize * inner;
            result.extend_from_slice(&input.data[o * chunk..(o + 1) * chunk]);
        }
    }
    Ok(result)
}

/// Mirror an out-of-range coordinate back into `[0, n)` without repeating the
/// edge element. Pads wider than the input keep bouncing between the edges.
fn reflect(coord: i64, n: i64) -> usize {
    if n == 1 {
        return 0;
    }
    let period = 2 * (n - 1);
    let m = coord.rem_euclid(period);
    (if m >= n { period - m } else { m }) as usize
}

fn reflection_pad(inputs: &[NodeInput<'_>], pads: &[i64], meta: &TensorMeta) -> Result<Vec<f32>> {
    let a = require_input(inputs, 0)?;
    let ndim = a.shape.ndim();
    if pads.len() != 2 * ndim {
        return Err(MlxError::InvalidArgument(format!(
            "pads length {} does not match rank {ndim}",
            pads.len()
        )));
    }
    let in_strides = a.shape.strides();
    let out_strides = meta.shape.strides();
    let total = meta.shape.numel() as usize;

    let mut result = vec![0.0f32; total];
    for (flat, out) in result.iter_mut().enumerate() {
        let mut in_flat = 0usize;
        for d in 0..ndim {
            let coord = ((flat / out_strides[d]) % meta.shape.0[d] as usize) as i64 - pads[d];
            in_flat += reflect(coord, a.shape.0[d]) * in_strides[d];
        }
        *out = a.data[in_flat];
    }
    Ok(result)
}

fn conv2d(
    inputs: &[NodeInput<'_>],
    meta: &TensorMeta,
    stride: [usize; 2],
    padding: [usize; 2],
    dilation: [usize; 2],
    groups: usize,
) -> Result<Vec<f32>> {
    let x = require_input(inputs, 0)?;
    let w = require_input(inputs, 1)?;
    let bias = inputs.get(2);
    if x.shape.ndim() != 4 || w.shape.ndim() != 4 || meta.shape.ndim() != 4 {
        return Err(MlxError::InvalidArgument("conv2d expects 4D tensors".into()));
    }
    let [n, c, h, wd] = [x.shape.0[0], x.shape.0[1], x.shape.0[2], x.shape.0[3]].map(|d| d as usize);
    let [o, cg, kh, kw] = [w.shape.0[0], w.shape.0[1], w.shape.0[2], w.shape.0[3]].map(|d| d as usize);
    let (oh, ow) = (meta.shape.0[2] as usize, meta.shape.0[3] as usize);
    let og = o / groups;

    let mut result = vec![0.0f32; n * o * oh * ow];
    for b in 0..n {
        for oc in 0..o {
            let g = oc / og;
            let init = bias.map(|bias| bias.data[oc]).unwrap_or(0.0);
            for y in 0..oh {
                for xo in 0..ow {
                    let mut sum = init;
                    for icg in 0..cg {
                        let ic = g * cg + icg;
                        for ky in 0..kh {
                            let iy = (y * stride[0] + ky * dilation[0]) as i64 - padding[0] as i64;
                            if iy < 0 || iy >= h as i64 {
                                continue;
                            }
                            for kx in 0..kw {
                                let ix =
                                    (xo * stride[1] + kx * dilation[1]) as i64 - padding[1] as i64;
                                if ix < 0 || ix >= wd as i64 {
                                    continue;
                                }
                                let xv = x.data[((b * c + ic) * h + iy as usize) * wd + ix as usize];
                                let wv = w.data[((oc * cg + icg) * kh + ky) * kw + kx];
                                sum += xv * wv;
                            }
                        }
                    }
                    result[((b * o + oc) * oh + y) * ow + xo] = sum;
                }
            }
        }
    }
    Ok(result)
}

fn max_pool1d(
    inputs: &[NodeInput<'_>],
    meta: &TensorMeta,
    kernel: usize,
    stride: usize,
    padding: usize,
) -> Result<Vec<f32>> {
    let x = require_input(inputs, 0)?;
    if x.shape.ndim() != 3 {
        return Err(MlxError::InvalidArgument("max_pool1d expects a 3D input".into()));
    }
    let rows = (x.shape.0[0] * x.shape.0[1]) as usize;
    let len = x.shape.0[2] as usize;
    let out_len = meta.shape.0[2] as usize;

    let mut result = Vec::with_capacity(rows * out_len);
    for r in 0..rows {
        let row = &x.data[r * len..(r + 1) * len];
        for i in 0..out_len {
            let start = (i * stride) as i64 - padding as i64;
            let best = (start..start + kernel as i64)
                .filter(|&p| p >= 0 && p < len as i64)
                .map(|p| row[p as usize])
                .fold(f32::NEG_INFINITY, f32::max);
            result.push(best);
        }
    }
    Ok(result)
}

/// Inputs: `[x, weight, bias, running_mean, running_var]`, normalized over
/// axis 1. Training mode uses the (biased) batch statistics.
fn batch_norm(inputs: &[NodeInput<'_>], eps: f32, training: bool) -> Result<Vec<f32>> {
    let x = require_input(inputs, 0)?;
    let weight = require_input(inputs, 1)?;
    let bias = require_input(inputs, 2)?;
    let running_mean = require_input(inputs, 3)?;
    let running_var = require_input(inputs, 4)?;
    if x.shape.ndim() < 2 {
        return Err(MlxError::InvalidArgument(
            "batch_norm expects at least 2 dimensions".into(),
        ));
    }
    let n = x.shape.0[0] as usize;
    let c = x.shape.0[1] as usize;
    let inner: usize = x.shape.0[2..].iter().product::<i64>() as usize;

    let mut result = vec![0.0f32; x.data.len()];
    for ch in 0..c {
        let indices = || (0..n).flat_map(move |b| (0..inner).map(move |i| (b * c + ch) * inner + i));
        let (mean, var) = if training {
            let count = (n * inner) as f32;
            let mean = indices().map(|i| x.data[i]).sum::<f32>() / count;
            let var = indices()
                .map(|i| (x.data[i] - mean) * (x.data[i] - mean))
                .sum::<f32>()
                / count;
            (mean, var)
        } else {
            (running_mean.data[ch], running_var.data[ch])
        };
        let scale = weight.data[ch] / (var + eps).sqrt();
        for i in indices() {
            result[i] = (x.data[i] - mean) * scale + bias.data[ch];
        }
    }
    Ok(result)
}
