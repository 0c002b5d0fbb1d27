//! Operator export conformance harness.
//!
//! Every catalog case traces a small computation, exports it to ONNX, and
//! either compares the canonical text of the graph against a stored
//! expectation or asserts that export fails with the expected category of
//! error. Optionally each exported case is dumped as a self-contained test
//! directory (model plus input and output tensors) for external runtimes.

pub mod config;
pub mod dump;
pub mod error;
pub mod harness;
pub mod operators;
pub mod snapshot;

pub use config::{HarnessConfig, default_expect_dir};
pub use dump::{ArtifactDumper, clean_generated};
pub use error::{HarnessError, Result};
pub use harness::OperatorHarness;
pub use operators::{
    CaseSpec, Expectation, OperatorCase, case_text, catalog, find, run_case,
};
pub use snapshot::{ExpectStore, SnapshotKey, SnapshotOutcome, line_diff, snapshot_body};

/// Assert two f32 slices are element-wise close.
pub fn assert_allclose(actual: &[f32], expected: &[f32], atol: f32, rtol: f32) {
    assert_eq!(
        actual.len(),
        expected.len(),
        "length mismatch: actual={} expected={}",
        actual.len(),
        expected.len()
    );
    for (i, (x, y)) in actual.iter().zip(expected.iter()).enumerate() {
        let diff = (x - y).abs();
        let tol = atol + rtol * y.abs();
        assert!(
            diff <= tol,
            "mismatch at [{i}]: actual={x} expected={y} diff={diff} tol={tol}"
        );
    }
}
