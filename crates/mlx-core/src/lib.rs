//! Lazy tensor graph for tracing and exporting computations.
//!
//! `mlx-core` provides the foundational types (`Tensor`, `Value`, `DType`,
//! `Shape`) and the lazy graph every tensor operation records into. The graph
//! is what the ONNX exporter walks; the built-in CPU reference backend
//! evaluates it when concrete outputs are needed.

pub mod backend;
pub mod cpu_kernels;
pub mod custom;
pub mod graph;
pub mod tensor;
pub mod types;
pub mod value;

pub use backend::{Stream, default_stream};
pub use custom::{CallArg, CustomCall, call_custom};
pub use graph::NodeId;
pub use tensor::Tensor;
pub use types::{DType, Shape};
pub use value::{Structure, Value};

pub type Result<T> = std::result::Result<T, MlxError>;

#[derive(thiserror::Error, Debug)]
pub enum MlxError {
    #[error("Shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch { expected: Vec<i64>, got: Vec<i64> },

    #[error("DType mismatch: {lhs} vs {rhs}")]
    DTypeMismatch { lhs: DType, rhs: DType },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Tensors belong to different streams")]
    StreamMismatch,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
