//! Broadcasting rules.
//!
//! Traced computations broadcast NumPy-style. Opset-6 ONNX binary operators
//! only understand a narrower, one-directional rule: the right operand may be
//! broadcast to the left operand when its shape is a suffix of the left shape.

use mlx_core::Shape;

/// Compute the broadcast shape of two shapes, or None if incompatible.
///
/// Rules (NumPy-style):
/// 1. Align shapes from the trailing dimension.
/// 2. For each dimension pair: must be equal, or one must be 1.
/// 3. The output dimension is the max of the two.
pub fn broadcast_shapes(a: &Shape, b: &Shape) -> Option<Shape> {
    Shape::broadcast_shapes(a, b)
}

/// How a binary operator maps onto the legacy broadcasting rule.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LegacyBroadcast {
    /// Shapes are identical; no broadcast attribute is needed.
    Same,
    /// The right operand's shape is a proper suffix of the left's.
    Suffix,
}

/// Classify `lhs op rhs` under the legacy rule, or None when only
/// NumPy-style broadcasting could express it.
///
/// A scalar right operand is the empty suffix and always qualifies.
/// Size-1 dimensions get no special treatment: `[2, 3]` with `[2, 1]` is
/// rejected even though NumPy accepts it.
pub fn legacy_broadcast(lhs: &Shape, rhs: &Shape) -> Option<LegacyBroadcast> {
    if lhs == rhs {
        return Some(LegacyBroadcast::Same);
    }
    if rhs.ndim() < lhs.ndim() && lhs.0.ends_with(&rhs.0) {
        return Some(LegacyBroadcast::Suffix);
    }
    None
}
