//! Graph and failure assertions over exported modules.

use mlx_core::Value;
use mlx_nn::Module;
use mlx_onnx::{ErrorCategory, ExportOptions};
use regex::Regex;
use tracing::debug;

use crate::config::HarnessConfig;
use crate::dump::ArtifactDumper;
use crate::error::{HarnessError, Result};
use crate::snapshot::{ExpectStore, SnapshotKey, SnapshotOutcome};

/// Runs export assertions against an expectation store, dumping artifacts
/// when the configuration asks for it.
#[derive(Debug)]
pub struct OperatorHarness {
    config: HarnessConfig,
    store: ExpectStore,
    dumper: Option<ArtifactDumper>,
}

impl OperatorHarness {
    pub fn new(config: HarnessConfig) -> Self {
        let store = ExpectStore::new(&config.expect_dir, config.accept);
        let dumper = config
            .onnx_test
            .then(|| ArtifactDumper::new(&config.output_dir));
        Self {
            config,
            store,
            dumper,
        }
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn store(&self) -> &ExpectStore {
        &self.store
    }

    /// Check `bytes`, render them canonically and compare against the
    /// expectation for `key`.
    pub fn assert_onnx_expected(&self, key: &SnapshotKey, bytes: &[u8]) -> Result<SnapshotOutcome> {
        let text = mlx_onnx::canonical_text(bytes)?;
        self.store.assert_expected(key, &text)
    }

    /// Export `module` on `inputs` and return the canonical text of its
    /// graph. The case is dumped first if dumping is enabled.
    pub fn export_text(
        &self,
        case: &str,
        module: &mut dyn Module,
        inputs: &[Value],
        opts: &ExportOptions,
    ) -> Result<String> {
        let bytes = mlx_onnx::export_to_bytes(module, inputs, opts)?;
        let text = mlx_onnx::canonical_text(&bytes)?;
        debug!(case, bytes = bytes.len(), "exported graph");

        if let Some(dumper) = &self.dumper {
            let exported_outputs = mlx_onnx::decode_model(&bytes)?
                .graph
                .map_or(0, |g| g.output.len());
            dumper.dump(case, &bytes, module, inputs, opts.training, exported_outputs)?;
        }
        Ok(text)
    }

    /// Export `module` on `inputs`, compare its graph, and dump the case if
    /// dumping is enabled.
    pub fn assert_onnx(
        &self,
        case: &str,
        module: &mut dyn Module,
        inputs: &[Value],
        opts: &ExportOptions,
        subname: Option<&str>,
    ) -> Result<SnapshotOutcome> {
        let text = self.export_text(case, module, inputs, opts)?;
        let key = match subname {
            Some(sub) => SnapshotKey::new(case).with_subname(sub),
            None => SnapshotKey::new(case),
        };
        let outcome = self.store.assert_expected(&key, &text)?;
        debug!(%key, ?outcome, "graph assertion passed");
        Ok(outcome)
    }

    /// Export must fail with an error of `expected` category whose message
    /// matches `pattern`. Returns the message, newline terminated, as the
    /// text to compare.
    pub fn failure_text(
        &self,
        case: &str,
        expected: ErrorCategory,
        pattern: Option<&str>,
        module: &mut dyn Module,
        inputs: &[Value],
        opts: &ExportOptions,
    ) -> Result<String> {
        let err = match mlx_onnx::export_to_bytes(module, inputs, opts) {
            Ok(_) => {
                return Err(HarnessError::UnexpectedSuccess {
                    case: case.to_string(),
                    expected,
                });
            }
            Err(e) => e,
        };
        let message = err.to_string();
        let got = err.category();
        if got != expected {
            return Err(HarnessError::WrongCategory {
                case: case.to_string(),
                expected,
                got,
                message,
            });
        }
        if let Some(pattern) = pattern {
            if !Regex::new(pattern)?.is_match(&message) {
                return Err(HarnessError::PatternMismatch {
                    case: case.to_string(),
                    pattern: pattern.to_string(),
                    message,
                });
            }
        }
        debug!(case, category = %got, "export failed as expected");
        Ok(format!("{message}\n"))
    }

    /// [`failure_text`](Self::failure_text), then compare the message
    /// against the expectation for `case`.
    pub fn assert_onnx_raises(
        &self,
        case: &str,
        expected: ErrorCategory,
        pattern: Option<&str>,
        module: &mut dyn Module,
        inputs: &[Value],
        opts: &ExportOptions,
    ) -> Result<SnapshotOutcome> {
        let text = self.failure_text(case, expected, pattern, module, inputs, opts)?;
        self.store.assert_expected(&SnapshotKey::new(case), &text)
    }
}
