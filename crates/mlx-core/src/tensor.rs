//! Tensor type: a lazy handle to a node in the computation graph.
//!
//! Operations on tensors record nodes in the graph. Actual computation is
//! deferred until `eval()` (or `to_vec_f32()`) is called, at which point the
//! stream topologically sorts the subgraph and dispatches to the backend.

use std::sync::Arc;

use smallvec::SmallVec;

use crate::backend::{Stream, default_stream};
use crate::graph::{OpKind, TensorMeta};
use crate::{DType, MlxError, NodeId, Result, Shape};

/// A tensor handle.
///
/// In the lazy graph model a `Tensor` is a lightweight reference to a node in
/// the computation graph. Operations build up the graph; actual computation
/// happens when `eval()` is called (or implicitly via `to_vec_f32()`).
#[derive(Clone)]
pub struct Tensor {
    node_id: NodeId,
    shape: Shape,
    dtype: DType,
    stream: Arc<Stream>,
}

impl Tensor {
    // ── Constructors ────────────────────────────────────────────────────

    /// Create a tensor filled with zeros.
    pub fn zeros(shape: &Shape, dtype: DType) -> Result<Self> {
        Self::full(shape, 0.0, dtype)
    }

    /// Create a tensor filled with ones.
    pub fn ones(shape: &Shape, dtype: DType) -> Result<Self> {
        Self::full(shape, 1.0, dtype)
    }

    /// Create a tensor with every element set to `value`.
    pub fn full(shape: &Shape, value: f32, dtype: DType) -> Result<Self> {
        let n = shape.numel() as usize;
        Self::from_data_with_dtype(vec![value; n], shape, dtype)
    }

    /// Create a tensor from f32 data.
    pub fn from_f32(data: &[f32], shape: &Shape) -> Result<Self> {
        Self::from_data_with_dtype(data.to_vec(), shape, DType::F32)
    }

    /// Create a constant tensor on the default stream.
    pub fn from_data_with_dtype(data: Vec<f32>, shape: &Shape, dtype: DType) -> Result<Self> {
        Self::constant_on(&default_stream(), data, shape, dtype)
    }

    /// Create a parameter tensor on the default stream.
    ///
    /// Parameters behave like constants when evaluated, but exporters treat
    /// them as learned weights rather than inlined values.
    pub fn new_parameter(data: Vec<f32>, shape: &Shape, dtype: DType) -> Result<Self> {
        check_data(&data, shape, dtype)?;
        let stream = default_stream();
        let node_id = stream.add_parameter(data, meta(shape, dtype));
        Ok(Self::from_node_id(node_id, shape.clone(), dtype, stream))
    }

    /// Copy this tensor's current value into a new parameter.
    pub fn to_parameter(&self) -> Result<Tensor> {
        let data = self.to_vec_f32()?;
        let node_id = self
            .stream
            .add_parameter(data, meta(&self.shape, self.dtype));
        Ok(Self::from_node_id(
            node_id,
            self.shape.clone(),
            self.dtype,
            Arc::clone(&self.stream),
        ))
    }

    /// Create a constant tensor on a specific stream.
    pub fn constant_on(
        stream: &Arc<Stream>,
        data: Vec<f32>,
        shape: &Shape,
        dtype: DType,
    ) -> Result<Self> {
        check_data(&data, shape, dtype)?;
        let node_id = stream.add_constant(data, meta(shape, dtype));
        Ok(Self::from_node_id(
            node_id,
            shape.clone(),
            dtype,
            Arc::clone(stream),
        ))
    }

    fn scalar_like(&self, value: f64) -> Result<Tensor> {
        Self::constant_on(&self.stream, vec![value as f32], &Shape::scalar(), self.dtype)
    }

    fn lazy_op(
        &self,
        op: OpKind,
        inputs: SmallVec<[NodeId; 2]>,
        shape: Shape,
        dtype: DType,
    ) -> Self {
        let node_id = self.stream.add_op(op, inputs, meta(&shape, dtype));
        Tensor {
            node_id,
            shape,
            dtype,
            stream: Arc::clone(&self.stream),
        }
    }

    fn check_compatible(&self, rhs: &Tensor) -> Result<()> {
        if !self.same_stream(rhs) {
            return Err(MlxError::StreamMismatch);
        }
        if self.dtype != rhs.dtype {
            return Err(MlxError::DTypeMismatch {
                lhs: self.dtype,
                rhs: rhs.dtype,
            });
        }
        Ok(())
    }

    fn resolve_axis(&self, axis: i32) -> Result<usize> {
        self.shape.resolve_axis(axis).ok_or_else(|| {
            MlxError::InvalidArgument(format!(
                "axis {axis} out of range for ndim {}",
                self.shape.ndim()
            ))
        })
    }

    // ── Elementwise ops ─────────────────────────────────────────────────

    fn binary(&self, op: OpKind, rhs: &Tensor) -> Result<Tensor> {
        self.check_compatible(rhs)?;
        let shape =
            Shape::broadcast_shapes(&self.shape, &rhs.shape).ok_or_else(|| MlxError::ShapeMismatch {
                expected: self.shape.0.clone(),
                got: rhs.shape.0.clone(),
            })?;
        Ok(self.lazy_op(
            op,
            SmallVec::from_slice(&[self.node_id, rhs.node_id]),
            shape,
            self.dtype,
        ))
    }

    /// Element-wise addition with numpy-style broadcasting.
    pub fn add(&self, rhs: &Tensor) -> Result<Tensor> {
        self.binary(OpKind::Add, rhs)
    }

    /// Element-wise subtraction with numpy-style broadcasting.
    pub fn sub(&self, rhs: &Tensor) -> Result<Tensor> {
        self.binary(OpKind::Sub, rhs)
    }

    /// Element-wise multiplication with numpy-style broadcasting.
    pub fn mul(&self, rhs: &Tensor) -> Result<Tensor> {
        self.binary(OpKind::Mul, rhs)
    }

    /// Element-wise division with numpy-style broadcasting.
    pub fn div(&self, rhs: &Tensor) -> Result<Tensor> {
        self.binary(OpKind::Div, rhs)
    }

    /// Add a scalar, recorded as a rank-0 constant operand.
    pub fn add_scalar(&self, value: f64) -> Result<Tensor> {
        self.add(&self.scalar_like(value)?)
    }

    /// Multiply by a scalar, recorded as a rank-0 constant operand.
    pub fn mul_scalar(&self, value: f64) -> Result<Tensor> {
        self.mul(&self.scalar_like(value)?)
    }

    fn unary(&self, op: OpKind) -> Tensor {
        self.lazy_op(
            op,
            SmallVec::from_slice(&[self.node_id]),
            self.shape.clone(),
            self.dtype,
        )
    }

    /// Element-wise negation.
    pub fn neg(&self) -> Tensor {
        self.unary(OpKind::Neg)
    }

    /// Logistic sigmoid.
    pub fn sigmoid(&self) -> Tensor {
        self.unary(OpKind::Sigmoid)
    }

    /// Hyperbolic tangent.
    pub fn tanh(&self) -> Tensor {
        self.unary(OpKind::Tanh)
    }

    /// Element-wise square root.
    pub fn sqrt(&self) -> Tensor {
        self.unary(OpKind::Sqrt)
    }

    // ── Reductions ──────────────────────────────────────────────────────

    /// Mean along an axis; the axis is removed.
    pub fn mean(&self, axis: i32) -> Result<Tensor> {
        let ax = self.resolve_axis(axis)?;
        let mut dims = self.shape.0.clone();
        dims.remove(ax);
        Ok(self.lazy_op(
            OpKind::Mean { axis: ax },
            SmallVec::from_slice(&[self.node_id]),
            Shape::new(dims),
            self.dtype,
        ))
    }

    // ── Linear algebra ──────────────────────────────────────────────────

    fn matmul_shape(&self, rhs: &Tensor) -> Result<Shape> {
        if self.shape.ndim() != 2 || rhs.shape.ndim() != 2 {
            return Err(MlxError::InvalidArgument(
                "matmul requires 2D tensors".to_string(),
            ));
        }
        if self.shape.0[1] != rhs.shape.0[0] {
            return Err(MlxError::ShapeMismatch {
                expected: self.shape.0.clone(),
                got: rhs.shape.0.clone(),
            });
        }
        Ok(Shape::new(vec![self.shape.0[0], rhs.shape.0[1]]))
    }

    /// Matrix multiplication (2D only).
    pub fn matmul(&self, rhs: &Tensor) -> Result<Tensor> {
        self.check_compatible(rhs)?;
        let shape = self.matmul_shape(rhs)?;
        Ok(self.lazy_op(
            OpKind::MatMul,
            SmallVec::from_slice(&[self.node_id, rhs.node_id]),
            shape,
            self.dtype,
        ))
    }

    /// `self + m1 @ m2`, with `self` broadcast to the product's shape.
    pub fn addmm(&self, m1: &Tensor, m2: &Tensor) -> Result<Tensor> {
        self.check_compatible(m1)?;
        m1.check_compatible(m2)?;
        let shape = m1.matmul_shape(m2)?;
        match Shape::broadcast_shapes(&self.shape, &shape) {
            Some(s) if s == shape => {}
            _ => {
                return Err(MlxError::ShapeMismatch {
                    expected: shape.0.clone(),
                    got: self.shape.0.clone(),
                });
            }
        }
        Ok(self.lazy_op(
            OpKind::Addmm {
                beta: 1.0,
                alpha: 1.0,
            },
            SmallVec::from_slice(&[self.node_id, m1.node_id, m2.node_id]),
            shape,
            self.dtype,
        ))
    }

    // ── Shape manipulation ──────────────────────────────────────────────

    /// Reshape the tensor.
    pub fn reshape(&self, new_shape: &Shape) -> Result<Tensor> {
        if self.shape.numel() != new_shape.numel() {
            return Err(MlxError::ShapeMismatch {
                expected: self.shape.0.clone(),
                got: new_shape.0.clone(),
            });
        }
        Ok(self.lazy_op(
            OpKind::Reshape {
                new_shape: new_shape.clone(),
            },
            SmallVec::from_slice(&[self.node_id]),
            new_shape.clone(),
            self.dtype,
        ))
    }

    /// Reshape with at most one inferred (`-1`) dimension.
    pub fn view(&self, dims: &[i64]) -> Result<Tensor> {
        let inferred: Vec<usize> = dims
            .iter()
            .enumerate()
            .filter(|&(_, &d)| d == -1)
            .map(|(i, _)| i)
            .collect();
        let mut resolved = dims.to_vec();
        match inferred.as_slice() {
            [] => {}
            [idx] => {
                let known: i64 = dims.iter().filter(|&&d| d != -1).product();
                if known == 0 || self.shape.numel() % known != 0 {
                    return Err(MlxError::ShapeMismatch {
                        expected: self.shape.0.clone(),
                        got: dims.to_vec(),
                    });
                }
                resolved[*idx] = self.shape.numel() / known;
            }
            _ => {
                return Err(MlxError::InvalidArgument(
                    "only one dimension can be inferred".into(),
                ));
            }
        }
        self.reshape(&Shape::new(resolved))
    }

    /// Permute dimensions.
    pub fn permute(&self, axes: &[usize]) -> Result<Tensor> {
        let ndim = self.shape.ndim();
        let mut seen = vec![false; ndim];
        if axes.len() != ndim {
            return Err(MlxError::InvalidArgument(
                "permute axes length must match ndim".into(),
            ));
        }
        for &ax in axes {
            if ax >= ndim || seen[ax] {
                return Err(MlxError::InvalidArgument(format!(
                    "invalid permutation {axes:?}"
                )));
            }
            seen[ax] = true;
        }
        let new_dims: Vec<i64> = axes.iter().map(|&ax| self.shape.0[ax]).collect();
        Ok(self.lazy_op(
            OpKind::Transpose {
                axes: axes.to_vec(),
            },
            SmallVec::from_slice(&[self.node_id]),
            Shape::new(new_dims),
            self.dtype,
        ))
    }

    /// Swap two dimensions.
    pub fn transpose(&self, dim0: usize, dim1: usize) -> Result<Tensor> {
        let ndim = self.shape.ndim();
        if dim0 >= ndim || dim1 >= ndim {
            return Err(MlxError::InvalidArgument(format!(
                "transpose dims ({dim0}, {dim1}) out of range for ndim {ndim}"
            )));
        }
        let mut axes: Vec<usize> = (0..ndim).collect();
        axes.swap(dim0, dim1);
        self.permute(&axes)
    }

    /// Broadcast this tensor to the target shape (numpy-style rules).
    pub fn broadcast_to(&self, target: &Shape) -> Result<Tensor> {
        if &self.shape == target {
            return Ok(self.clone());
        }
        // Dimensions are compared from the right.
        let in_ndim = self.shape.ndim();
        let out_ndim = target.ndim();
        if in_ndim > out_ndim {
            return Err(MlxError::InvalidArgument(format!(
                "cannot broadcast shape {} to {}",
                self.shape, target
            )));
        }
        let pad = out_ndim - in_ndim;
        for i in 0..in_ndim {
            let in_dim = self.shape.0[i];
            let out_dim = target.0[pad + i];
            if in_dim != 1 && in_dim != out_dim {
                return Err(MlxError::InvalidArgument(format!(
                    "cannot broadcast shape {} to {}",
                    self.shape, target
                )));
            }
        }
        Ok(self.lazy_op(
            OpKind::Broadcast {
                target_shape: target.clone(),
            },
            SmallVec::from_slice(&[self.node_id]),
            target.clone(),
            self.dtype,
        ))
    }

    /// Split into pieces of the given sizes along `dim`.
    pub fn split_with_sizes(&self, sizes: &[i64], dim: usize) -> Result<Vec<Tensor>> {
        if dim >= self.shape.ndim() {
            return Err(MlxError::InvalidArgument(format!(
                "split dim {dim} out of range for ndim {}",
                self.shape.ndim()
            )));
        }
        if sizes.iter().sum::<i64>() != self.shape.0[dim] || sizes.iter().any(|&s| s <= 0) {
            return Err(MlxError::InvalidArgument(format!(
                "split sizes {sizes:?} do not cover dimension of size {}",
                self.shape.0[dim]
            )));
        }
        Ok(sizes
            .iter()
            .enumerate()
            .map(|(index, &size)| {
                let mut dims = self.shape.0.clone();
                dims[dim] = size;
                self.lazy_op(
                    OpKind::Split {
                        axis: dim,
                        sizes: sizes.to_vec(),
                        index,
                    },
                    SmallVec::from_slice(&[self.node_id]),
                    Shape::new(dims),
                    self.dtype,
                )
            })
            .collect())
    }

    /// Split into `chunks` pieces of equal size along `dim`; the last piece
    /// may be smaller.
    pub fn chunk(&self, chunks: usize, dim: usize) -> Result<Vec<Tensor>> {
        if chunks == 0 {
            return Err(MlxError::InvalidArgument("chunk count must be positive".into()));
        }
        let len = self
            .shape
            .0
            .get(dim)
            .copied()
            .ok_or_else(|| MlxError::InvalidArgument(format!("chunk dim {dim} out of range")))?;
        let chunk_size = (len + chunks as i64 - 1) / chunks as i64;
        let mut sizes = Vec::new();
        let mut remaining = len;
        while remaining > 0 {
            let size = remaining.min(chunk_size);
            sizes.push(size);
            remaining -= size;
        }
        self.split_with_sizes(&sizes, dim)
    }

    /// Concatenate tensors along `dim`.
    pub fn cat(tensors: &[Tensor], dim: usize) -> Result<Tensor> {
        let first = tensors
            .first()
            .ok_or_else(|| MlxError::InvalidArgument("cat requires at least one tensor".into()))?;
        if dim >= first.shape.ndim() {
            return Err(MlxError::InvalidArgument(format!(
                "cat dim {dim} out of range for ndim {}",
                first.shape.ndim()
            )));
        }
        let mut dims = first.shape.0.clone();
        dims[dim] = 0;
        for t in tensors {
            first.check_compatible(t)?;
            let compatible = t.shape.ndim() == first.shape.ndim()
                && t.shape
                    .0
                    .iter()
                    .zip(first.shape.0.iter())
                    .enumerate()
                    .all(|(i, (a, b))| i == dim || a == b);
            if !compatible {
                return Err(MlxError::ShapeMismatch {
                    expected: first.shape.0.clone(),
                    got: t.shape.0.clone(),
                });
            }
            dims[dim] += t.shape.0[dim];
        }
        Ok(first.lazy_op(
            OpKind::Concat { axis: dim },
            tensors.iter().map(|t| t.node_id).collect(),
            Shape::new(dims),
            first.dtype,
        ))
    }

    /// Reflection-pad the last two dimensions by `(left, right, top, bottom)`.
    pub fn reflection_pad2d(&self, padding: [i64; 4]) -> Result<Tensor> {
        let ndim = self.shape.ndim();
        if ndim < 2 || padding.iter().any(|&p| p < 0) {
            return Err(MlxError::InvalidArgument(format!(
                "reflection_pad2d needs rank >= 2 and non-negative padding, got {} and {padding:?}",
                self.shape
            )));
        }
        let [left, right, top, bottom] = padding;
        let mut pads = vec![0i64; ndim * 2];
        pads[ndim - 2] = top;
        pads[ndim - 1] = left;
        pads[2 * ndim - 2] = bottom;
        pads[2 * ndim - 1] = right;
        let mut dims = self.shape.0.clone();
        dims[ndim - 2] += top + bottom;
        dims[ndim - 1] += left + right;
        Ok(self.lazy_op(
            OpKind::ReflectionPad { pads },
            SmallVec::from_slice(&[self.node_id]),
            Shape::new(dims),
            self.dtype,
        ))
    }

    // ── Convolution and pooling ─────────────────────────────────────────

    /// 2D convolution over `[N, C, H, W]` with weight `[O, C / groups, KH, KW]`.
    pub fn conv2d(
        &self,
        weight: &Tensor,
        bias: Option<&Tensor>,
        stride: [usize; 2],
        padding: [usize; 2],
        dilation: [usize; 2],
        groups: usize,
    ) -> Result<Tensor> {
        self.check_compatible(weight)?;
        let x = &self.shape.0;
        let w = &weight.shape.0;
        if x.len() != 4 || w.len() != 4 || groups == 0 {
            return Err(MlxError::InvalidArgument(format!(
                "conv2d expects 4D input and weight, got {} and {}",
                self.shape, weight.shape
            )));
        }
        if x[1] != w[1] * groups as i64 || w[0] % groups as i64 != 0 {
            return Err(MlxError::ShapeMismatch {
                expected: x.clone(),
                got: w.clone(),
            });
        }
        let mut out = vec![x[0], w[0]];
        for i in 0..2 {
            let extent = x[2 + i] + 2 * padding[i] as i64 - dilation[i] as i64 * (w[2 + i] - 1) - 1;
            if extent < 0 || stride[i] == 0 {
                return Err(MlxError::InvalidArgument(format!(
                    "conv2d kernel {} does not fit input {}",
                    weight.shape, self.shape
                )));
            }
            out.push(extent / stride[i] as i64 + 1);
        }
        let mut inputs: SmallVec<[NodeId; 2]> = SmallVec::from_slice(&[self.node_id, weight.node_id]);
        if let Some(b) = bias {
            self.check_compatible(b)?;
            if b.shape.0 != [w[0]] {
                return Err(MlxError::ShapeMismatch {
                    expected: vec![w[0]],
                    got: b.shape.0.clone(),
                });
            }
            inputs.push(b.node_id);
        }
        Ok(self.lazy_op(
            OpKind::Conv2d {
                stride,
                padding,
                dilation,
                groups,
            },
            inputs,
            Shape::new(out),
            self.dtype,
        ))
    }

    /// 1D max pooling over `[N, C, L]`.
    pub fn max_pool1d(&self, kernel: usize, stride: usize, padding: usize) -> Result<Tensor> {
        let x = &self.shape.0;
        if x.len() != 3 || kernel == 0 || stride == 0 {
            return Err(MlxError::InvalidArgument(format!(
                "max_pool1d expects a 3D input and positive kernel/stride, got {}",
                self.shape
            )));
        }
        let extent = x[2] + 2 * padding as i64 - kernel as i64;
        if extent < 0 {
            return Err(MlxError::InvalidArgument(format!(
                "max_pool1d kernel {kernel} larger than input {}",
                self.shape
            )));
        }
        Ok(self.lazy_op(
            OpKind::MaxPool1d {
                kernel,
                stride,
                padding,
            },
            SmallVec::from_slice(&[self.node_id]),
            Shape::new(vec![x[0], x[1], extent / stride as i64 + 1]),
            self.dtype,
        ))
    }

    // ── Normalization ───────────────────────────────────────────────────

    /// Batch normalization over axis 1.
    ///
    /// `params` holds `[weight, bias, running_mean, running_var]`, each of
    /// length `C`. In training mode the batch statistics are used.
    pub fn batch_norm(
        &self,
        params: [&Tensor; 4],
        training: bool,
        momentum: f32,
        eps: f32,
    ) -> Result<Tensor> {
        if self.shape.ndim() < 2 {
            return Err(MlxError::InvalidArgument(format!(
                "batch_norm expects at least 2 dimensions, got {}",
                self.shape
            )));
        }
        let channels = self.shape.0[1];
        let mut inputs: SmallVec<[NodeId; 2]> = SmallVec::from_slice(&[self.node_id]);
        for p in params {
            self.check_compatible(p)?;
            if p.shape.0 != [channels] {
                return Err(MlxError::ShapeMismatch {
                    expected: vec![channels],
                    got: p.shape.0.clone(),
                });
            }
            inputs.push(p.node_id);
        }
        Ok(self.lazy_op(
            OpKind::BatchNorm {
                eps,
                momentum,
                training,
            },
            inputs,
            self.shape.clone(),
            self.dtype,
        ))
    }

    // ── Materialization ─────────────────────────────────────────────────

    /// Materialize the tensor, triggering evaluation of the computation graph.
    pub fn eval(&self) -> Result<()> {
        self.stream.eval(self.node_id)
    }

    /// Copy data out as Vec<f32>. Triggers evaluation if needed.
    pub fn to_vec_f32(&self) -> Result<Vec<f32>> {
        self.eval()?;
        self.stream
            .get_buffer(self.node_id)
            .ok_or_else(|| MlxError::InvalidArgument("buffer not found after eval".into()))
    }

    // ── Accessors ───────────────────────────────────────────────────────

    /// Get the tensor shape.
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Size of one dimension.
    pub fn size(&self, dim: usize) -> Result<i64> {
        self.shape.0.get(dim).copied().ok_or_else(|| {
            MlxError::InvalidArgument(format!(
                "dim {dim} out of range for ndim {}",
                self.shape.ndim()
            ))
        })
    }

    /// Get the tensor dtype.
    pub fn dtype(&self) -> DType {
        self.dtype
    }

    /// Number of elements.
    pub fn numel(&self) -> i64 {
        self.shape.numel()
    }

    /// Get the graph node ID.
    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    /// Get the stream this tensor belongs to.
    pub fn stream(&self) -> Arc<Stream> {
        Arc::clone(&self.stream)
    }

    /// Whether both tensors record into the same stream.
    pub fn same_stream(&self, other: &Tensor) -> bool {
        Arc::ptr_eq(&self.stream, &other.stream)
    }

    /// Reconstruct a tensor handle from a node ID and metadata.
    pub fn from_node_id(node_id: NodeId, shape: Shape, dtype: DType, stream: Arc<Stream>) -> Self {
        Self {
            node_id,
            shape,
            dtype,
            stream,
        }
    }
}

impl std::fmt::Debug for Tensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tensor")
            .field("node", &self.node_id)
            .field("shape", &self.shape)
            .field("dtype", &self.dtype)
            .finish()
    }
}

fn meta(shape: &Shape, dtype: DType) -> TensorMeta {
    TensorMeta {
        shape: shape.clone(),
        dtype,
    }
}

fn check_data(data: &[f32], shape: &Shape, dtype: DType) -> Result<()> {
    let expected = shape.numel() as usize;
    if data.len() != expected {
        return Err(MlxError::InvalidArgument(format!(
            "data length {} does not match shape {} (expected {})",
            data.len(),
            shape,
            expected,
        )));
    }
    if let Some(v) = data.iter().find(|&&v| !dtype.holds_exactly(v)) {
        return Err(MlxError::InvalidArgument(format!(
            "value {v} cannot be held exactly as {dtype}"
        )));
    }
    Ok(())
}

impl std::ops::Add for &Tensor {
    type Output = Result<Tensor>;
    fn add(self, rhs: &Tensor) -> Self::Output {
        Tensor::add(self, rhs)
    }
}

impl std::ops::Sub for &Tensor {
    type Output = Result<Tensor>;
    fn sub(self, rhs: &Tensor) -> Self::Output {
        Tensor::sub(self, rhs)
    }
}

impl std::ops::Mul for &Tensor {
    type Output = Result<Tensor>;
    fn mul(self, rhs: &Tensor) -> Self::Output {
        Tensor::mul(self, rhs)
    }
}

impl std::ops::Neg for &Tensor {
    type Output = Tensor;
    fn neg(self) -> Self::Output {
        Tensor::neg(self)
    }
}
