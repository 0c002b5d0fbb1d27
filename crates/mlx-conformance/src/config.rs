//! Harness configuration.

use std::env;
use std::path::{Path, PathBuf};

/// Output directory used when dumping is enabled without an explicit one.
pub const DEFAULT_OUTPUT_DIR: &str = "onnx-operator-tests";

/// Record mode: rewrite expectations instead of comparing against them.
pub const ENV_ACCEPT: &str = "MLX_ACCEPT";
/// Dump every exported case as a test directory.
pub const ENV_ONNX_TEST: &str = "MLX_ONNX_TEST";
pub const ENV_OUTPUT_DIR: &str = "MLX_ONNX_OUTPUT_DIR";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HarnessConfig {
    /// Directory holding `<case>[-<subname>].snap` files.
    pub expect_dir: PathBuf,
    pub accept: bool,
    pub onnx_test: bool,
    pub output_dir: PathBuf,
}

fn flag(value: Option<String>) -> bool {
    value.is_some_and(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
}

impl HarnessConfig {
    /// Compare-only configuration with dumping disabled.
    pub fn new(expect_dir: impl Into<PathBuf>) -> Self {
        Self {
            expect_dir: expect_dir.into(),
            accept: false,
            onnx_test: false,
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
        }
    }

    /// Configuration from `MLX_ACCEPT`, `MLX_ONNX_TEST` and
    /// `MLX_ONNX_OUTPUT_DIR`.
    pub fn from_env(expect_dir: impl Into<PathBuf>) -> Self {
        Self::from_vars(expect_dir, |key| env::var(key).ok())
    }

    fn from_vars(expect_dir: impl Into<PathBuf>, var: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::new(expect_dir);
        config.accept = flag(var(ENV_ACCEPT));
        config.onnx_test = flag(var(ENV_ONNX_TEST));
        if let Some(dir) = var(ENV_OUTPUT_DIR).filter(|d| !d.is_empty()) {
            config.output_dir = PathBuf::from(dir);
        }
        config
    }

    pub fn with_accept(mut self, accept: bool) -> Self {
        self.accept = accept;
        self
    }

    /// Enable dumping into `output_dir`.
    pub fn with_dump(mut self, output_dir: impl AsRef<Path>) -> Self {
        self.onnx_test = true;
        self.output_dir = output_dir.as_ref().to_path_buf();
        self
    }
}

/// Expectation directory of the operator suite shipped with this crate.
pub fn default_expect_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("expect")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn test_defaults_without_env() {
        let c = HarnessConfig::from_vars("exp", vars(&[]));
        assert_eq!(c, HarnessConfig::new("exp"));
        assert_eq!(c.output_dir, PathBuf::from(DEFAULT_OUTPUT_DIR));
    }

    #[test]
    fn test_env_flags() {
        let c = HarnessConfig::from_vars(
            "exp",
            vars(&[
                (ENV_ACCEPT, "1"),
                (ENV_ONNX_TEST, "TRUE"),
                (ENV_OUTPUT_DIR, "/tmp/out"),
            ]),
        );
        assert!(c.accept);
        assert!(c.onnx_test);
        assert_eq!(c.output_dir, PathBuf::from("/tmp/out"));

        let c = HarnessConfig::from_vars("exp", vars(&[(ENV_ACCEPT, "0")]));
        assert!(!c.accept);
    }

    #[test]
    fn test_with_dump() {
        let c = HarnessConfig::new("exp").with_dump("out");
        assert!(c.onnx_test);
        assert_eq!(c.output_dir, PathBuf::from("out"));
    }
}
