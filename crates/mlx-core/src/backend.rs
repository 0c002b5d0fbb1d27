//! Backend trait and Stream: the pluggable engine that evaluates tensors.
//!
//! A `Backend` knows how to execute a single graph node (op + inputs → output).
//! A `Stream` binds a `Backend` to a lazy computation `Graph`, managing
//! materialized buffers and evaluation scheduling.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock, Mutex, MutexGuard};

use smallvec::SmallVec;

use crate::graph::{Graph, Node, NodeId, OpKind, TensorMeta};
use crate::types::{DType, Shape};
use crate::{MlxError, Result};

/// Materialized input data passed to a backend for evaluation.
pub struct NodeInput<'a> {
    pub data: &'a [f32],
    pub shape: &'a Shape,
    pub dtype: DType,
}

/// Pluggable compute backend.
///
/// Backends evaluate individual graph nodes. The `Stream` handles scheduling
/// (topological sort) and buffer management; the backend only needs to
/// implement the actual kernel dispatch.
pub trait Backend: Send + Sync {
    /// Evaluate a single op node given its materialized inputs.
    fn eval_node(
        &self,
        op: &OpKind,
        inputs: &[NodeInput<'_>],
        output_meta: &TensorMeta,
    ) -> Result<Vec<f32>>;
}

/// A computation stream binding a graph to a backend.
///
/// Operations on tensors add nodes to the stream's graph lazily.
/// Calling `eval()` topologically sorts and evaluates pending nodes.
pub struct Stream {
    graph: Mutex<Graph>,
    backend: Box<dyn Backend>,
    buffers: Mutex<HashMap<NodeId, Vec<f32>>>,
}

impl Stream {
    /// Create a new stream with the given backend.
    pub fn new(backend: Box<dyn Backend>) -> Self {
        Self {
            graph: Mutex::new(Graph::new()),
            backend,
            buffers: Mutex::new(HashMap::new()),
        }
    }

    /// Add a constant node (data already known).
    pub fn add_constant(&self, data: Vec<f32>, meta: TensorMeta) -> NodeId {
        self.add_source(OpKind::Constant, data, meta)
    }

    /// Add a parameter node. Parameters are materialized like constants but
    /// are exported as named initializers.
    pub fn add_parameter(&self, data: Vec<f32>, meta: TensorMeta) -> NodeId {
        self.add_source(OpKind::Parameter, data, meta)
    }

    fn add_source(&self, op: OpKind, data: Vec<f32>, meta: TensorMeta) -> NodeId {
        let id = self.graph().add_node(op, SmallVec::new(), meta);
        self.buffers().insert(id, data);
        id
    }

    /// Add an operation node to the graph.
    pub fn add_op(&self, op: OpKind, inputs: SmallVec<[NodeId; 2]>, meta: TensorMeta) -> NodeId {
        self.graph().add_node(op, inputs, meta)
    }

    /// Evaluate all nodes needed to materialize the given output.
    pub fn eval(&self, output: NodeId) -> Result<()> {
        if self.buffers().contains_key(&output) {
            return Ok(());
        }

        let order = self.graph().topo_sort(&[output]);

        // Never hold both locks simultaneously.
        for &node_id in &order {
            if self.buffers().contains_key(&node_id) {
                continue;
            }

            let (node, input_metas) = {
                let graph = self.graph();
                let node = graph
                    .get(node_id)
                    .cloned()
                    .ok_or_else(|| MlxError::InvalidArgument(format!("missing graph node {node_id}")))?;
                let metas = node
                    .inputs
                    .iter()
                    .map(|&id| {
                        graph.get(id).map(|n| n.meta.clone()).ok_or_else(|| {
                            MlxError::InvalidArgument(format!("missing input node {id}"))
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                (node, metas)
            };

            let input_buffers: Vec<Vec<f32>> = {
                let buffers = self.buffers();
                node.inputs
                    .iter()
                    .map(|id| {
                        buffers.get(id).cloned().ok_or_else(|| {
                            MlxError::InvalidArgument(format!(
                                "input {id} of {node_id} was not evaluated"
                            ))
                        })
                    })
                    .collect::<Result<Vec<_>>>()?
            };

            let inputs: Vec<NodeInput<'_>> = input_buffers
                .iter()
                .zip(input_metas.iter())
                .map(|(data, meta)| NodeInput {
                    data: data.as_slice(),
                    shape: &meta.shape,
                    dtype: meta.dtype,
                })
                .collect();

            let result = self.backend.eval_node(&node.op, &inputs, &node.meta)?;
            self.buffers().insert(node_id, result);
        }

        Ok(())
    }

    /// Get materialized buffer data for a node (must call eval first).
    pub fn get_buffer(&self, id: NodeId) -> Option<Vec<f32>> {
        self.buffers().get(&id).cloned()
    }

    /// Get a clone of a graph node by ID.
    pub fn get_node(&self, id: NodeId) -> Option<Node> {
        self.graph().get(id).cloned()
    }

    /// Topological sort of the subgraph rooted at the given outputs.
    pub fn topo_sort(&self, outputs: &[NodeId]) -> Vec<NodeId> {
        self.graph().topo_sort(outputs)
    }

    /// Number of nodes in the graph.
    pub fn graph_node_count(&self) -> usize {
        self.graph().len()
    }

    // A panic while holding a lock leaves the graph append-only state intact,
    // so poisoned guards are recovered.
    fn graph(&self) -> MutexGuard<'_, Graph> {
        self.graph.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn buffers(&self) -> MutexGuard<'_, HashMap<NodeId, Vec<f32>>> {
        self.buffers.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl std::fmt::Debug for Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stream").finish_non_exhaustive()
    }
}

/// The default stream using the CPU reference backend.
///
/// Nodes and their buffers live as long as the process. Long runs that
/// build many unrelated graphs should give each one a [`cpu_stream`] so
/// the memory is released when its tensors are dropped.
static DEFAULT_STREAM: LazyLock<Arc<Stream>> =
    LazyLock::new(|| Arc::new(Stream::new(Box::new(crate::cpu_kernels::CpuRefBackend))));

/// Get the default computation stream.
pub fn default_stream() -> Arc<Stream> {
    Arc::clone(&DEFAULT_STREAM)
}

/// Create an isolated stream backed by the CPU reference backend.
pub fn cpu_stream() -> Arc<Stream> {
    Arc::new(Stream::new(Box::new(crate::cpu_kernels::CpuRefBackend)))
}
