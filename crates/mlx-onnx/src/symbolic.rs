//! Symbolic translation: the graph under construction and the builtin
//! per-operator rules that append to it.

use std::collections::HashMap;

use mlx_core::graph::{OpKind, TensorMeta};
use mlx_core::{DType, Shape};
use mlx_ops::{LegacyBroadcast, legacy_broadcast};

use crate::error::{ExportError, Result};
use crate::proto::{AttributeProto, AttributeType, NodeProto, TensorProto};
use crate::tensor_proto::{int64_proto, values_to_proto};

/// A symbolic value: the name of a graph value, or a tuple of them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Sym {
    Value(String),
    Tuple(Vec<Sym>),
}

impl Sym {
    /// Name of a single value.
    pub fn name(&self) -> Result<&str> {
        match self {
            Sym::Value(name) => Ok(name),
            Sym::Tuple(items) => Err(ExportError::SymbolicArgument(format!(
                "expected a single value, got a tuple of {}",
                items.len()
            ))),
        }
    }

    pub fn as_tuple(&self) -> Result<&[Sym]> {
        match self {
            Sym::Tuple(items) => Ok(items),
            Sym::Value(name) => Err(ExportError::SymbolicArgument(format!(
                "expected a tuple, got value {name}"
            ))),
        }
    }

    /// Leaf names in depth-first order.
    pub fn flatten(&self) -> Vec<String> {
        match self {
            Sym::Value(name) => vec![name.clone()],
            Sym::Tuple(items) => items.iter().flat_map(Sym::flatten).collect(),
        }
    }
}

impl From<String> for Sym {
    fn from(name: String) -> Self {
        Sym::Value(name)
    }
}

/// Argument handed to a custom translation rule.
#[derive(Clone, Debug, PartialEq)]
pub enum SymArg {
    Value(Sym),
    Float(f64),
    Int(i64),
}

impl SymArg {
    pub fn sym(&self) -> Result<&Sym> {
        match self {
            SymArg::Value(s) => Ok(s),
            other => Err(ExportError::SymbolicArgument(format!(
                "expected a value argument, got {other:?}"
            ))),
        }
    }

    /// Name of a single-value argument.
    pub fn name(&self) -> Result<&str> {
        self.sym()?.name()
    }

    pub fn as_f64(&self) -> Result<f64> {
        match self {
            SymArg::Float(v) => Ok(*v),
            SymArg::Int(v) => Ok(*v as f64),
            SymArg::Value(_) => Err(ExportError::SymbolicArgument(
                "expected a scalar argument, got a value".into(),
            )),
        }
    }
}

/// One traced node as seen by a builtin rule.
#[derive(Debug)]
pub struct TracedNode<'a> {
    pub op: &'a OpKind,
    /// Names of the node's inputs in the exported graph.
    pub inputs: &'a [String],
    pub input_shapes: &'a [Shape],
    pub meta: &'a TensorMeta,
}

impl TracedNode<'_> {
    fn input(&self, idx: usize) -> Result<&str> {
        self.inputs.get(idx).map(String::as_str).ok_or_else(|| {
            ExportError::SymbolicArgument(format!(
                "{} expects input {idx}, got {}",
                self.op.name(),
                self.inputs.len()
            ))
        })
    }

    fn input_shape(&self, idx: usize) -> Result<&Shape> {
        self.input_shapes.get(idx).ok_or_else(|| {
            ExportError::SymbolicArgument(format!("{} has no input {idx}", self.op.name()))
        })
    }
}

/// The node list under construction plus the value-name counter.
#[derive(Debug)]
pub struct GraphContext {
    nodes: Vec<NodeProto>,
    next_name: usize,
    doc_string: Option<String>,
    memo: HashMap<String, Vec<String>>,
}

impl GraphContext {
    /// Start naming node outputs at `first_name`.
    pub fn new(first_name: usize) -> Self {
        Self {
            nodes: Vec::new(),
            next_name: first_name,
            doc_string: None,
            memo: HashMap::new(),
        }
    }

    /// Allocate the next value name.
    pub fn fresh_name(&mut self) -> String {
        let name = self.next_name.to_string();
        self.next_name += 1;
        name
    }

    /// Doc string attached to every node appended until the next call.
    pub fn set_doc_string(&mut self, doc: Option<String>) {
        self.doc_string = doc;
    }

    /// Append a single-output node and return its output name.
    pub fn op(&mut self, op_type: &str, inputs: &[&str], attrs: Vec<AttributeProto>) -> String {
        let mut outputs = self.op_multi(op_type, inputs, attrs, 1);
        outputs.swap_remove(0)
    }

    /// Append a node with `n` outputs.
    pub fn op_multi(
        &mut self,
        op_type: &str,
        inputs: &[&str],
        attrs: Vec<AttributeProto>,
        n: usize,
    ) -> Vec<String> {
        let outputs: Vec<String> = (0..n.max(1)).map(|_| self.fresh_name()).collect();
        self.nodes.push(NodeProto {
            input: inputs.iter().map(|s| s.to_string()).collect(),
            output: outputs.clone(),
            op_type: Some(op_type.to_string()),
            attribute: attrs,
            doc_string: self.doc_string.clone(),
            ..Default::default()
        });
        outputs
    }

    /// Append a `Constant` node holding `value`.
    pub fn constant(&mut self, value: TensorProto) -> String {
        self.op("Constant", &[], vec![attr_tensor("value", value)])
    }

    /// Return the outputs cached under `key`, or build and cache them.
    pub fn memoized<F>(&mut self, key: String, build: F) -> Result<Vec<String>>
    where
        F: FnOnce(&mut GraphContext) -> Result<Vec<String>>,
    {
        if let Some(hit) = self.memo.get(&key) {
            return Ok(hit.clone());
        }
        let outputs = build(self)?;
        self.memo.insert(key, outputs.clone());
        Ok(outputs)
    }

    pub fn nodes(&self) -> &[NodeProto] {
        &self.nodes
    }

    pub fn into_nodes(self) -> Vec<NodeProto> {
        self.nodes
    }
}

// ── Attribute builders ──────────────────────────────────────────────────

fn attr(name: &str, kind: AttributeType) -> AttributeProto {
    AttributeProto {
        name: Some(name.to_string()),
        r#type: Some(kind as i32),
        ..Default::default()
    }
}

pub fn attr_int(name: &str, value: i64) -> AttributeProto {
    AttributeProto {
        i: Some(value),
        ..attr(name, AttributeType::Int)
    }
}

pub fn attr_ints(name: &str, values: &[i64]) -> AttributeProto {
    AttributeProto {
        ints: values.to_vec(),
        ..attr(name, AttributeType::Ints)
    }
}

pub fn attr_float(name: &str, value: f32) -> AttributeProto {
    AttributeProto {
        f: Some(value),
        ..attr(name, AttributeType::Float)
    }
}

pub fn attr_floats(name: &str, values: &[f32]) -> AttributeProto {
    AttributeProto {
        floats: values.to_vec(),
        ..attr(name, AttributeType::Floats)
    }
}

pub fn attr_string(name: &str, value: &str) -> AttributeProto {
    AttributeProto {
        s: Some(value.as_bytes().to_vec()),
        ..attr(name, AttributeType::String)
    }
}

pub fn attr_tensor(name: &str, value: TensorProto) -> AttributeProto {
    AttributeProto {
        t: Some(value),
        ..attr(name, AttributeType::Tensor)
    }
}

// ── Builtin rules ───────────────────────────────────────────────────────

/// Translation of one builtin graph node; returns the name of the value that
/// stands for the node's output.
pub type BuiltinRule = fn(&mut GraphContext, &TracedNode<'_>) -> Result<String>;

fn binary(ctx: &mut GraphContext, node: &TracedNode<'_>, op_type: &str) -> Result<String> {
    let lhs = node.input_shape(0)?;
    let rhs = node.input_shape(1)?;
    let attrs = match legacy_broadcast(lhs, rhs) {
        Some(LegacyBroadcast::Same) => Vec::new(),
        Some(LegacyBroadcast::Suffix) => vec![attr_int("broadcast", 1)],
        None => {
            return Err(ExportError::Broadcast {
                op: op_type.to_string(),
                lhs: lhs.clone(),
                rhs: rhs.clone(),
            });
        }
    };
    Ok(ctx.op(op_type, &[node.input(0)?, node.input(1)?], attrs))
}

pub(crate) fn add(ctx: &mut GraphContext, node: &TracedNode<'_>) -> Result<String> {
    binary(ctx, node, "Add")
}

pub(crate) fn sub(ctx: &mut GraphContext, node: &TracedNode<'_>) -> Result<String> {
    binary(ctx, node, "Sub")
}

pub(crate) fn mul(ctx: &mut GraphContext, node: &TracedNode<'_>) -> Result<String> {
    binary(ctx, node, "Mul")
}

pub(crate) fn div(ctx: &mut GraphContext, node: &TracedNode<'_>) -> Result<String> {
    binary(ctx, node, "Div")
}

fn unary(ctx: &mut GraphContext, node: &TracedNode<'_>, op_type: &str) -> Result<String> {
    Ok(ctx.op(op_type, &[node.input(0)?], Vec::new()))
}

pub(crate) fn neg(ctx: &mut GraphContext, node: &TracedNode<'_>) -> Result<String> {
    unary(ctx, node, "Neg")
}

pub(crate) fn sigmoid(ctx: &mut GraphContext, node: &TracedNode<'_>) -> Result<String> {
    unary(ctx, node, "Sigmoid")
}

pub(crate) fn tanh(ctx: &mut GraphContext, node: &TracedNode<'_>) -> Result<String> {
    unary(ctx, node, "Tanh")
}

pub(crate) fn sqrt(ctx: &mut GraphContext, node: &TracedNode<'_>) -> Result<String> {
    unary(ctx, node, "Sqrt")
}

pub(crate) fn mean(ctx: &mut GraphContext, node: &TracedNode<'_>) -> Result<String> {
    let OpKind::Mean { axis } = node.op else {
        return Err(mismatched_rule(node, "mean"));
    };
    Ok(ctx.op(
        "ReduceMean",
        &[node.input(0)?],
        vec![attr_ints("axes", &[*axis as i64]), attr_int("keepdims", 0)],
    ))
}

pub(crate) fn mm(ctx: &mut GraphContext, node: &TracedNode<'_>) -> Result<String> {
    Ok(ctx.op("MatMul", &[node.input(0)?, node.input(1)?], Vec::new()))
}

pub(crate) fn addmm(ctx: &mut GraphContext, node: &TracedNode<'_>) -> Result<String> {
    let OpKind::Addmm { beta, alpha } = node.op else {
        return Err(mismatched_rule(node, "addmm"));
    };
    // Gemm takes C last; the traced node stores the bias first.
    Ok(ctx.op(
        "Gemm",
        &[node.input(1)?, node.input(2)?, node.input(0)?],
        vec![
            attr_float("alpha", *alpha),
            attr_float("beta", *beta),
            attr_int("broadcast", 1),
        ],
    ))
}

pub(crate) fn view(ctx: &mut GraphContext, node: &TracedNode<'_>) -> Result<String> {
    let OpKind::Reshape { new_shape } = node.op else {
        return Err(mismatched_rule(node, "view"));
    };
    let shape = ctx.constant(int64_proto(&new_shape.0, vec![new_shape.ndim() as i64]));
    Ok(ctx.op("Reshape", &[node.input(0)?, &shape], Vec::new()))
}

pub(crate) fn permute(ctx: &mut GraphContext, node: &TracedNode<'_>) -> Result<String> {
    let OpKind::Transpose { axes } = node.op else {
        return Err(mismatched_rule(node, "permute"));
    };
    let perm: Vec<i64> = axes.iter().map(|&a| a as i64).collect();
    Ok(ctx.op("Transpose", &[node.input(0)?], vec![attr_ints("perm", &perm)]))
}

/// Sibling pieces of one split share a single `Split` node.
pub(crate) fn split(ctx: &mut GraphContext, node: &TracedNode<'_>) -> Result<String> {
    let OpKind::Split { axis, sizes, index } = node.op else {
        return Err(mismatched_rule(node, "split"));
    };
    let input = node.input(0)?.to_string();
    let key = format!("split:{input}:{axis}:{sizes:?}");
    let outputs = ctx.memoized(key, |ctx| {
        Ok(ctx.op_multi(
            "Split",
            &[&input],
            vec![attr_int("axis", *axis as i64), attr_ints("split", sizes)],
            sizes.len(),
        ))
    })?;
    outputs
        .get(*index)
        .cloned()
        .ok_or_else(|| ExportError::SymbolicArgument(format!("split piece {index} out of range")))
}

pub(crate) fn cat(ctx: &mut GraphContext, node: &TracedNode<'_>) -> Result<String> {
    let OpKind::Concat { axis } = node.op else {
        return Err(mismatched_rule(node, "cat"));
    };
    let inputs: Vec<&str> = node.inputs.iter().map(String::as_str).collect();
    Ok(ctx.op("Concat", &inputs, vec![attr_int("axis", *axis as i64)]))
}

pub(crate) fn reflection_pad(ctx: &mut GraphContext, node: &TracedNode<'_>) -> Result<String> {
    let OpKind::ReflectionPad { pads } = node.op else {
        return Err(mismatched_rule(node, "reflection_pad"));
    };
    Ok(ctx.op(
        "Pad",
        &[node.input(0)?],
        vec![attr_string("mode", "reflect"), attr_ints("pads", pads)],
    ))
}

pub(crate) fn conv2d(ctx: &mut GraphContext, node: &TracedNode<'_>) -> Result<String> {
    let OpKind::Conv2d {
        stride,
        padding,
        dilation,
        groups,
    } = node.op
    else {
        return Err(mismatched_rule(node, "conv2d"));
    };
    let weight = node.input_shape(1)?;
    if weight.ndim() != 4 {
        return Err(ExportError::SymbolicArgument(format!(
            "conv2d weight must be 4D, got {weight}"
        )));
    }
    let to_i64 = |v: &[usize; 2]| [v[0] as i64, v[1] as i64];
    let pads = to_i64(padding);
    let inputs: Vec<&str> = node.inputs.iter().map(String::as_str).collect();
    Ok(ctx.op(
        "Conv",
        &inputs,
        vec![
            attr_ints("kernel_shape", &weight.0[2..]),
            attr_ints("strides", &to_i64(stride)),
            attr_ints("pads", &[pads[0], pads[1], pads[0], pads[1]]),
            attr_ints("dilations", &to_i64(dilation)),
            attr_int("group", *groups as i64),
        ],
    ))
}

pub(crate) fn max_pool1d(ctx: &mut GraphContext, node: &TracedNode<'_>) -> Result<String> {
    let OpKind::MaxPool1d {
        kernel,
        stride,
        padding,
    } = node.op
    else {
        return Err(mismatched_rule(node, "max_pool1d"));
    };
    let pad = *padding as i64;
    Ok(ctx.op(
        "MaxPool",
        &[node.input(0)?],
        vec![
            attr_ints("kernel_shape", &[*kernel as i64]),
            attr_ints("pads", &[pad, pad]),
            attr_ints("strides", &[*stride as i64]),
        ],
    ))
}

/// In training the node also produces updated running statistics and the
/// saved batch statistics; only the normalized output is used downstream.
pub(crate) fn batch_norm(ctx: &mut GraphContext, node: &TracedNode<'_>) -> Result<String> {
    let OpKind::BatchNorm {
        eps,
        momentum,
        training,
    } = node.op
    else {
        return Err(mismatched_rule(node, "batch_norm"));
    };
    let inputs: Vec<&str> = node.inputs.iter().map(String::as_str).collect();
    let outputs = ctx.op_multi(
        "BatchNormalization",
        &inputs,
        vec![
            attr_float("epsilon", *eps),
            attr_int("is_test", i64::from(!*training)),
            attr_float("momentum", 1.0 - *momentum),
        ],
        if *training { 5 } else { 1 },
    );
    Ok(outputs.into_iter().next().unwrap_or_default())
}

/// Inline a non-input constant tensor.
pub(crate) fn inline_constant(
    ctx: &mut GraphContext,
    values: &[f32],
    shape: &Shape,
    dtype: DType,
) -> String {
    ctx.constant(values_to_proto(values, shape, dtype, None))
}

fn mismatched_rule(node: &TracedNode<'_>, rule: &str) -> ExportError {
    ExportError::SymbolicArgument(format!(
        "rule {rule} cannot translate operator {}",
        node.op.name()
    ))
}
