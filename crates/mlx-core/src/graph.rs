//! Lazy computation graph IR.
//!
//! Tensors are handles to nodes in this graph. Every operation appends a node;
//! nothing is computed until `eval()` is called, at which point the stream
//! topologically sorts the subgraph and dispatches to the backend. The same
//! recorded graph is what the exporter walks to emit interchange nodes.

use std::collections::HashSet;
use std::sync::Arc;

use smallvec::SmallVec;

use crate::custom::CustomCall;
use crate::types::{DType, Shape};

/// Unique identifier for a node in the computation graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u64);

impl NodeId {
    pub fn index(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// Metadata about a tensor (known before materialization).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TensorMeta {
    pub shape: Shape,
    pub dtype: DType,
}

/// A node in the lazy computation graph.
#[derive(Clone, Debug)]
pub struct Node {
    pub id: NodeId,
    pub op: OpKind,
    pub inputs: SmallVec<[NodeId; 2]>,
    pub meta: TensorMeta,
}

/// The set of operations supported by the graph IR.
#[derive(Clone, Debug)]
pub enum OpKind {
    // ── Sources ─────────────────────────────────────────────────────────
    /// Constant tensor (data already materialized).
    Constant,
    /// Parameter (learned weight registered by a module, data materialized).
    Parameter,

    // ── Elementwise ─────────────────────────────────────────────────────
    /// Binary ops broadcast numpy-style; the recorded meta holds the result.
    Add,
    Sub,
    Mul,
    Div,
    Neg,
    Sigmoid,
    Tanh,
    Sqrt,

    // ── Reductions ──────────────────────────────────────────────────────
    /// Mean over one axis, which is removed from the output.
    Mean {
        axis: usize,
    },

    // ── Linear algebra ──────────────────────────────────────────────────
    MatMul,
    /// `beta * bias + alpha * (a @ b)`; inputs are `[bias, a, b]`.
    Addmm {
        beta: f32,
        alpha: f32,
    },

    // ── Shape manipulation ──────────────────────────────────────────────
    Reshape {
        new_shape: Shape,
    },
    Transpose {
        axes: Vec<usize>,
    },
    /// Broadcast a tensor to a target shape (numpy-style rules).
    Broadcast {
        target_shape: Shape,
    },
    /// One piece of a split along `axis`. Sibling pieces share the input and
    /// differ only in `index`.
    Split {
        axis: usize,
        sizes: Vec<i64>,
        index: usize,
    },
    Concat {
        axis: usize,
    },
    /// Reflection padding; `pads` holds all begin values then all end values.
    ReflectionPad {
        pads: Vec<i64>,
    },

    // ── Convolution and pooling ─────────────────────────────────────────
    /// Inputs: `[x, weight]` or `[x, weight, bias]`.
    Conv2d {
        stride: [usize; 2],
        padding: [usize; 2],
        dilation: [usize; 2],
        groups: usize,
    },
    MaxPool1d {
        kernel: usize,
        stride: usize,
        padding: usize,
    },

    // ── Normalization ───────────────────────────────────────────────────
    /// Inputs: `[x, weight, bias, running_mean, running_var]`.
    BatchNorm {
        eps: f32,
        momentum: f32,
        training: bool,
    },

    // ── Custom calls ────────────────────────────────────────────────────
    /// Output `output` of a custom call. Inputs are the call's tensor
    /// arguments followed by the reference output computed by its forward.
    Custom {
        call: Arc<CustomCall>,
        output: usize,
    },
}

impl OpKind {
    /// Stable operator name used to look up translation rules.
    pub fn name(&self) -> &str {
        match self {
            OpKind::Constant => "constant",
            OpKind::Parameter => "parameter",
            OpKind::Add => "add",
            OpKind::Sub => "sub",
            OpKind::Mul => "mul",
            OpKind::Div => "div",
            OpKind::Neg => "neg",
            OpKind::Sigmoid => "sigmoid",
            OpKind::Tanh => "tanh",
            OpKind::Sqrt => "sqrt",
            OpKind::Mean { .. } => "mean",
            OpKind::MatMul => "mm",
            OpKind::Addmm { .. } => "addmm",
            OpKind::Reshape { .. } => "view",
            OpKind::Transpose { .. } => "permute",
            OpKind::Broadcast { .. } => "expand",
            OpKind::Split { .. } => "split",
            OpKind::Concat { .. } => "cat",
            OpKind::ReflectionPad { .. } => "reflection_pad",
            OpKind::Conv2d { .. } => "conv2d",
            OpKind::MaxPool1d { .. } => "max_pool1d",
            OpKind::BatchNorm { .. } => "batch_norm",
            OpKind::Custom { call, .. } => call.name(),
        }
    }

    /// Whether the node holds materialized data instead of computing it.
    pub fn is_source(&self) -> bool {
        matches!(self, OpKind::Constant | OpKind::Parameter)
    }
}

/// The computation graph arena.
///
/// Node ids are dense indices into `nodes`.
#[derive(Debug, Default)]
pub struct Graph {
    nodes: Vec<Node>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node and return its ID.
    pub fn add_node(
        &mut self,
        op: OpKind,
        inputs: SmallVec<[NodeId; 2]>,
        meta: TensorMeta,
    ) -> NodeId {
        let id = NodeId(self.nodes.len() as u64);
        self.nodes.push(Node {
            id,
            op,
            inputs,
            meta,
        });
        id
    }

    /// Get a node by ID.
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0 as usize)
    }

    /// Topological sort of the graph rooted at `outputs`.
    pub fn topo_sort(&self, outputs: &[NodeId]) -> Vec<NodeId> {
        let mut visited = HashSet::new();
        let mut order = Vec::new();

        for &out in outputs {
            self.topo_visit(out, &mut visited, &mut order);
        }

        order
    }

    fn topo_visit(&self, id: NodeId, visited: &mut HashSet<NodeId>, order: &mut Vec<NodeId>) {
        if !visited.insert(id) {
            return;
        }
        if let Some(node) = self.get(id) {
            for &input in &node.inputs {
                self.topo_visit(input, visited, order);
            }
        }
        order.push(id);
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph is empty.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(dims: &[i64]) -> TensorMeta {
        TensorMeta {
            shape: Shape::new(dims.to_vec()),
            dtype: DType::F32,
        }
    }

    #[test]
    fn test_graph_topo_sort() {
        let mut g = Graph::new();
        let a = g.add_node(OpKind::Constant, SmallVec::new(), meta(&[2, 3]));
        let b = g.add_node(OpKind::Constant, SmallVec::new(), meta(&[2, 3]));
        let c = g.add_node(OpKind::Add, SmallVec::from_slice(&[a, b]), meta(&[2, 3]));

        let order = g.topo_sort(&[c]);
        assert_eq!(order.len(), 3);
        let pos_a = order.iter().position(|&id| id == a).unwrap();
        let pos_b = order.iter().position(|&id| id == b).unwrap();
        let pos_c = order.iter().position(|&id| id == c).unwrap();
        assert!(pos_a < pos_c);
        assert!(pos_b < pos_c);
    }

    #[test]
    fn test_graph_ids_are_dense() {
        let mut g = Graph::new();
        let a = g.add_node(OpKind::Constant, SmallVec::new(), meta(&[1]));
        let b = g.add_node(OpKind::Neg, SmallVec::from_slice(&[a]), meta(&[1]));
        assert_eq!(a.index(), 0);
        assert_eq!(b.index(), 1);
        assert!(matches!(g.get(b).unwrap().op, OpKind::Neg));
        assert!(g.get(NodeId(7)).is_none());
    }

    #[test]
    fn test_op_names() {
        assert_eq!(OpKind::MatMul.name(), "mm");
        assert_eq!(
            OpKind::Reshape {
                new_shape: Shape::new(vec![1])
            }
            .name(),
            "view"
        );
        assert!(OpKind::Parameter.is_source());
        assert!(!OpKind::Add.is_source());
    }
}
