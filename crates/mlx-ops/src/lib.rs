//! Shape inference and broadcasting rules for graph ops.

pub mod broadcast;
pub mod shape_inference;

pub use broadcast::{LegacyBroadcast, broadcast_shapes, legacy_broadcast};
pub use shape_inference::{ShapeError, infer_shape};
