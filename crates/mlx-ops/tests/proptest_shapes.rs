//! Property tests for shape inference and broadcasting.
//!
//! These tests use proptest to generate random shapes and verify invariants
//! that must hold for any valid input.

use mlx_core::Shape;
use mlx_core::graph::OpKind;
use mlx_ops::{LegacyBroadcast, broadcast_shapes, infer_shape, legacy_broadcast};
use proptest::prelude::*;

// ── Strategies ───────────────────────────────────────────────────────────

/// Generate a random dimension value (1..=8 to keep tests fast).
fn dim() -> impl Strategy<Value = i64> {
    1i64..=8
}

/// Generate a random shape with rank 0..=4.
fn arb_shape() -> impl Strategy<Value = Shape> {
    prop::collection::vec(dim(), 0..=4).prop_map(Shape::new)
}

/// Generate a broadcastable pair of shapes.
fn broadcastable_pair() -> impl Strategy<Value = (Shape, Shape)> {
    prop::collection::vec(dim(), 1..=4).prop_flat_map(|target| {
        let len = target.len();
        (
            0..=len,
            prop::collection::vec(prop::bool::ANY, len),
            Just(target),
        )
            .prop_map(|(skip, masks, t)| {
                // A suffix of `t` with some dims masked to 1 exercises both
                // rank extension and per-dimension broadcasting.
                let a_dims: Vec<i64> = t[skip..]
                    .iter()
                    .zip(masks[skip..].iter())
                    .map(|(&d, &keep)| if keep { d } else { 1 })
                    .collect();
                (Shape::new(a_dims), Shape::new(t))
            })
    })
}

/// A shape together with one of its proper suffixes.
fn shape_and_suffix() -> impl Strategy<Value = (Shape, Shape)> {
    prop::collection::vec(dim(), 1..=4).prop_flat_map(|dims| {
        let len = dims.len();
        (1..=len, Just(dims)).prop_map(|(skip, d)| (Shape::new(d[skip..].to_vec()), Shape::new(d)))
    })
}

/// Generate a 2D shape for matmul.
fn matmul_shapes() -> impl Strategy<Value = (Shape, Shape)> {
    (dim(), dim(), dim()).prop_map(|(m, k, n)| (Shape::new(vec![m, k]), Shape::new(vec![k, n])))
}

/// Generate a shape with rank in `rank` and a valid axis for it.
fn shape_with_axis(rank: std::ops::RangeInclusive<usize>) -> impl Strategy<Value = (Shape, usize)> {
    prop::collection::vec(dim(), rank).prop_flat_map(|dims| {
        let ndim = dims.len();
        (Just(Shape::new(dims)), 0..ndim)
    })
}

/// A shape with a random permutation of its axes.
fn shape_with_perm() -> impl Strategy<Value = (Shape, Vec<usize>)> {
    prop::collection::vec(dim(), 1..=5).prop_flat_map(|dims| {
        let axes: Vec<usize> = (0..dims.len()).collect();
        (Just(Shape::new(dims)), Just(axes).prop_shuffle())
    })
}

// ── Broadcasting property tests ──────────────────────────────────────────

proptest! {
    /// Broadcasting is commutative.
    #[test]
    fn broadcast_commutative(a in arb_shape(), b in arb_shape()) {
        prop_assert_eq!(broadcast_shapes(&a, &b), broadcast_shapes(&b, &a));
    }

    /// A shape broadcasts with itself to itself.
    #[test]
    fn broadcast_self_identity(a in arb_shape()) {
        prop_assert_eq!(broadcast_shapes(&a, &a), Some(a));
    }

    /// Known-broadcastable pairs always produce the larger shape.
    #[test]
    fn broadcast_valid_pairs((a, b) in broadcastable_pair()) {
        prop_assert_eq!(broadcast_shapes(&a, &b), Some(b));
    }

    /// Broadcast result rank is max(rank(a), rank(b)).
    #[test]
    fn broadcast_result_rank(a in arb_shape(), b in arb_shape()) {
        if let Some(result) = broadcast_shapes(&a, &b) {
            prop_assert_eq!(result.ndim(), a.ndim().max(b.ndim()));
        }
    }

    /// Broadcasting with a scalar always succeeds and returns the other shape.
    #[test]
    fn broadcast_scalar(a in arb_shape()) {
        prop_assert_eq!(broadcast_shapes(&a, &Shape::scalar()), Some(a));
    }

    /// Every proper suffix is a legacy broadcast of its shape.
    #[test]
    fn legacy_accepts_suffix((suffix, full) in shape_and_suffix()) {
        prop_assert_eq!(legacy_broadcast(&full, &suffix), Some(LegacyBroadcast::Suffix));
    }

    /// Legacy broadcasting never goes from a lower rank to a higher one.
    #[test]
    fn legacy_is_one_directional((suffix, full) in shape_and_suffix()) {
        prop_assert_eq!(legacy_broadcast(&suffix, &full), None);
    }

    /// Whatever the legacy rule accepts, NumPy accepts with the lhs shape.
    #[test]
    fn legacy_implies_numpy(a in arb_shape(), b in arb_shape()) {
        if legacy_broadcast(&a, &b).is_some() {
            prop_assert_eq!(broadcast_shapes(&a, &b), Some(a));
        }
    }
}

// ── Shape inference property tests ───────────────────────────────────────

proptest! {
    /// Unary ops preserve the input shape.
    #[test]
    fn unary_preserves_shape(a in arb_shape()) {
        for op in &[OpKind::Neg, OpKind::Sigmoid, OpKind::Tanh, OpKind::Sqrt] {
            prop_assert_eq!(infer_shape(op, &[&a]).unwrap(), a.clone());
        }
    }

    /// MatMul: [M,K] @ [K,N] → [M,N]
    #[test]
    fn matmul_shape_correct((a, b) in matmul_shapes()) {
        let result = infer_shape(&OpKind::MatMul, &[&a, &b]).unwrap();
        prop_assert_eq!(result.0, vec![a.0[0], b.0[1]]);
    }

    /// MatMul with mismatched inner dims always fails.
    #[test]
    fn matmul_mismatch_fails(m in dim(), k1 in dim(), k2 in dim(), n in dim()) {
        prop_assume!(k1 != k2);
        let a = Shape::new(vec![m, k1]);
        let b = Shape::new(vec![k2, n]);
        prop_assert!(infer_shape(&OpKind::MatMul, &[&a, &b]).is_err());
    }

    /// Mean removes exactly one dimension.
    #[test]
    fn mean_removes_one_dim((shape, axis) in shape_with_axis(1..=4)) {
        let result = infer_shape(&OpKind::Mean { axis }, &[&shape]).unwrap();
        prop_assert_eq!(result.ndim(), shape.ndim() - 1);
    }

    /// Permutation preserves numel and moves each dimension.
    #[test]
    fn permute_moves_dims((shape, axes) in shape_with_perm()) {
        let result = infer_shape(&OpKind::Transpose { axes: axes.clone() }, &[&shape]).unwrap();
        prop_assert_eq!(result.numel(), shape.numel());
        for (i, &ax) in axes.iter().enumerate() {
            prop_assert_eq!(result.0[i], shape.0[ax]);
        }
    }

    /// Split pieces concatenate back to the input shape.
    #[test]
    fn split_then_concat((shape, axis) in shape_with_axis(1..=4), first in 0i64..=8) {
        let len = shape.0[axis];
        let first = first.min(len - 1).max(1);
        prop_assume!(len >= 2);
        let sizes = vec![first, len - first];
        let pieces: Vec<Shape> = (0..2)
            .map(|index| {
                infer_shape(&OpKind::Split { axis, sizes: sizes.clone(), index }, &[&shape]).unwrap()
            })
            .collect();
        let refs: Vec<&Shape> = pieces.iter().collect();
        prop_assert_eq!(infer_shape(&OpKind::Concat { axis }, &refs).unwrap(), shape);
    }
}
