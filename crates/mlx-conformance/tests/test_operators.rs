//! The operator suite: one snapshot test per catalog case, asserted with
//! `insta` against the records under `expect/`.
//!
//! Review changed records with `cargo insta review`, or set `MLX_ACCEPT=1`
//! and run `mlx onnx-test --accept` to rewrite them. `MLX_ONNX_TEST=1` also
//! dumps every exported case as a test directory.

use std::fs;

use mlx_conformance::{
    ArtifactDumper, HarnessConfig, HarnessError, OperatorHarness, SnapshotKey, SnapshotOutcome,
    assert_allclose, case_text, catalog, clean_generated, default_expect_dir, find, run_case,
    snapshot_body,
};
use mlx_core::{Shape, Tensor, Value, call_custom};
use mlx_nn::{FuncModule, tensor_arg};
use mlx_onnx::{ErrorCategory, ExportOptions, canonical_text, export_to_bytes};
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn suite() -> OperatorHarness {
    init_tracing();
    OperatorHarness::new(HarnessConfig::from_env(default_expect_dir()))
}

fn check(name: &str) {
    let case = find(name).unwrap_or_else(|| panic!("no case named {name}"));
    let text = case_text(&suite(), case).unwrap_or_else(|e| panic!("{e}"));

    let mut settings = insta::Settings::clone_current();
    settings.set_snapshot_path(default_expect_dir());
    settings.set_prepend_module_to_snapshot(false);
    settings.bind(|| {
        insta::assert_snapshot!(SnapshotKey::new(name).snapshot_name(), text);
    });
}

macro_rules! operator_tests {
    ($($test:ident => $case:literal),* $(,)?) => {
        $(
            #[test]
            fn $test() {
                check($case);
            }
        )*
    };
}

operator_tests! {
    test_basic => "basic",
    test_view => "view",
    test_addconstant => "addconstant",
    test_add_broadcast => "add_broadcast",
    test_add_left_broadcast => "add_left_broadcast",
    test_add_size1_broadcast => "add_size1_broadcast",
    test_transpose => "transpose",
    test_chunk => "chunk",
    test_concat2 => "concat2",
    test_mm => "mm",
    test_addmm => "addmm",
    test_permute2 => "permute2",
    test_pad => "pad",
    test_params => "params",
    test_non_float_params => "non_float_params",
    test_symbolic_mismatch => "symbolic_mismatch",
    test_batchnorm => "batchnorm",
    test_batchnorm_training => "batchnorm_training",
    test_conv => "conv",
    test_maxpool => "maxpool",
    test_symbolic_override => "symbolic_override",
    test_symbolic_override_nested => "symbolic_override_nested",
}

#[test]
fn every_case_has_a_record() {
    assert_eq!(catalog().len(), 22);
    for case in catalog() {
        let path = default_expect_dir().join(SnapshotKey::new(case.name).file_name());
        assert!(path.is_file(), "{} has no record at {}", case.name, path.display());
    }
}

#[test]
fn shipped_records_match_through_the_store() {
    let harness = OperatorHarness::new(HarnessConfig::new(default_expect_dir()));
    for name in ["basic", "chunk", "add_left_broadcast", "symbolic_override"] {
        let outcome = run_case(&harness, find(name).unwrap()).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(outcome, SnapshotOutcome::Matched, "{name}");
    }
}

fn scratch_harness(dir: &std::path::Path) -> OperatorHarness {
    init_tracing();
    OperatorHarness::new(HarnessConfig::new(dir.join("expect")))
}

fn recording_harness(dir: &std::path::Path) -> OperatorHarness {
    init_tracing();
    OperatorHarness::new(HarnessConfig::new(dir.join("expect")).with_accept(true))
}

#[test]
fn graph_cases_render_identically_across_builds() {
    for name in ["basic", "addmm", "batchnorm_training", "symbolic_override_nested"] {
        let case = find(name).unwrap();
        let texts: Vec<String> = (0..2)
            .map(|_| {
                let mut spec = (case.build)().unwrap();
                let bytes = export_to_bytes(spec.module.as_mut(), &spec.inputs, &spec.options).unwrap();
                canonical_text(&bytes).unwrap()
            })
            .collect();
        assert_eq!(texts[0], texts[1], "{name}");
    }
}

#[test]
fn missing_record_fails_until_accepted() {
    let dir = tempfile::tempdir().unwrap();
    let case = find("view").unwrap();

    let err = run_case(&scratch_harness(dir.path()), case).unwrap_err();
    assert!(matches!(err, HarnessError::MissingExpectation { ref key, .. } if key == "view"), "{err}");
    assert!(!dir.path().join("expect").exists());

    assert_eq!(run_case(&recording_harness(dir.path()), case).unwrap(), SnapshotOutcome::Recorded);
    assert_eq!(run_case(&scratch_harness(dir.path()), case).unwrap(), SnapshotOutcome::Matched);

    let file = fs::read_to_string(dir.path().join("expect/view.snap")).unwrap();
    let text = snapshot_body(&file);
    assert!(text.starts_with("ir_version: 3\n"), "{text}");
    assert!(text.contains("op_type: \"Reshape\""));
    assert!(!text.contains("doc_string"));
}

#[test]
fn changed_graph_is_reported_with_a_diff() {
    let dir = tempfile::tempdir().unwrap();
    let harness = scratch_harness(dir.path());
    let key = SnapshotKey::new("neg");
    fs::create_dir_all(dir.path().join("expect")).unwrap();
    fs::write(harness.store().path(&key), "---\nsource: x\n---\nir_version: 3\n").unwrap();

    let mut m = FuncModule::new(|args| Ok(tensor_arg(args, 0)?.neg().into()));
    let x = Tensor::from_f32(&[1.0], &Shape::new(vec![1])).unwrap();
    let err = harness
        .assert_onnx("neg", &mut m, &[x.into()], &ExportOptions::default(), None)
        .unwrap_err();
    match err {
        HarnessError::Mismatch { key, diff } => {
            assert_eq!(key, "neg");
            assert!(diff.starts_with("--- expected\n+++ actual\n"), "{diff}");
            assert!(diff.lines().any(|l| l == " ir_version: 3"), "{diff}");
            assert!(
                diff.lines().any(|l| l.starts_with('+') && l.ends_with("op_type: \"Neg\"")),
                "{diff}"
            );
        }
        other => panic!("expected a mismatch, got {other}"),
    }
}

#[test]
fn subname_keys_a_separate_record() {
    let dir = tempfile::tempdir().unwrap();
    let harness = recording_harness(dir.path());
    let mut m = FuncModule::new(|args| Ok(tensor_arg(args, 0)?.sigmoid().into()));
    let x: Value = Tensor::from_f32(&[0.5], &Shape::new(vec![1])).unwrap().into();
    harness
        .assert_onnx("sig", &mut m, &[x], &ExportOptions::default(), Some("eval"))
        .unwrap();
    assert!(dir.path().join("expect/sig-eval.snap").exists());
    assert!(!dir.path().join("expect/sig.snap").exists());
}

#[test]
fn symbolic_mismatch_names_the_operator() {
    let dir = tempfile::tempdir().unwrap();
    let harness = scratch_harness(dir.path());
    let message = case_text(&harness, find("symbolic_mismatch").unwrap()).unwrap();
    assert!(message.trim_end().ends_with("(occurred when translating MyFun)"), "{message}");
    assert!(message.ends_with('\n'));
}

#[test]
fn raises_rejects_success_and_wrong_category() {
    let dir = tempfile::tempdir().unwrap();
    let harness = scratch_harness(dir.path());
    let x: Value = Tensor::from_f32(&[1.0], &Shape::new(vec![1])).unwrap().into();

    let mut ok = FuncModule::new(|args| Ok(tensor_arg(args, 0)?.neg().into()));
    let err = harness
        .assert_onnx_raises("ok", ErrorCategory::Runtime, None, &mut ok, &[x.clone()], &ExportOptions::default())
        .unwrap_err();
    assert!(matches!(err, HarnessError::UnexpectedSuccess { .. }));

    let mut unknown = FuncModule::new(|args| {
        call_custom("Unregistered", vec![tensor_arg(args, 0)?.into()], |a| {
            Ok(a[0].as_tensor()?.neg().into())
        })
    });
    let err = harness
        .assert_onnx_raises(
            "unknown",
            ErrorCategory::Runtime,
            None,
            &mut unknown,
            &[x.clone()],
            &ExportOptions::default(),
        )
        .unwrap_err();
    match err {
        HarnessError::WrongCategory { got, .. } => assert_eq!(got, ErrorCategory::Unsupported),
        other => panic!("expected a wrong category, got {other}"),
    }

    let err = harness
        .assert_onnx_raises(
            "unknown",
            ErrorCategory::Unsupported,
            Some("^nothing like this$"),
            &mut unknown,
            &[x],
            &ExportOptions::default(),
        )
        .unwrap_err();
    assert!(matches!(err, HarnessError::PatternMismatch { .. }));
}

#[test]
fn dump_writes_a_runnable_case_and_replaces_it() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("generated");
    init_tracing();
    let harness = OperatorHarness::new(HarnessConfig::new(default_expect_dir()).with_dump(&out));
    let case = find("basic").unwrap();

    run_case(&harness, case).unwrap();
    let case_dir = ArtifactDumper::new(&out).case_dir("basic");
    let stale = case_dir.join("stale.txt");
    fs::write(&stale, "x").unwrap();
    run_case(&harness, case).unwrap();
    assert!(!stale.exists());

    let data = case_dir.join("test_data_set_0");
    let model = mlx_io::load_model(&case_dir.join("model.onnx")).unwrap();
    assert_eq!(model.graph.unwrap().output.len(), 1);

    let x = mlx_io::load_tensor_pb(&data.join("input_0.pb")).unwrap();
    let y = mlx_io::load_tensor_pb(&data.join("input_1.pb")).unwrap();
    assert_allclose(&x.to_vec_f32().unwrap(), &[0.4], 0.0, 0.0);
    assert_allclose(&y.to_vec_f32().unwrap(), &[0.7], 0.0, 0.0);

    let expected = -(1.0 / (1.0 + (-(0.4f32 * 1.1).tanh()).exp()));
    let z = mlx_io::load_tensor_pb(&data.join("output_0.pb")).unwrap();
    assert_allclose(&z.to_vec_f32().unwrap(), &[expected], 1e-6, 1e-5);
    assert!(!data.join("output_1.pb").exists());

    assert_eq!(clean_generated(&out).unwrap(), 1);
    assert!(!case_dir.exists());
}

#[test]
fn dump_writes_nested_outputs_in_flatten_order() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("generated");
    init_tracing();
    let harness = OperatorHarness::new(HarnessConfig::new(default_expect_dir()).with_dump(&out));
    run_case(&harness, find("symbolic_override_nested").unwrap()).unwrap();

    let data = ArtifactDumper::new(&out)
        .case_dir("symbolic_override_nested")
        .join("test_data_set_0");
    let read = |f: &str| mlx_io::load_tensor_pb(&data.join(f)).unwrap().to_vec_f32().unwrap();
    assert_eq!(read("input_2.pb"), vec![3.0]);
    assert_eq!(read("output_0.pb"), vec![6.0]);
    assert_eq!(read("output_1.pb"), vec![-1.0]);
    assert_eq!(read("output_2.pb"), vec![-2.0]);
}
