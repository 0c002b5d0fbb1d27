use std::path::PathBuf;

use mlx_core::MlxError;
use mlx_onnx::{ErrorCategory, ExportError};

pub type Result<T> = std::result::Result<T, HarnessError>;

#[derive(thiserror::Error, Debug)]
pub enum HarnessError {
    #[error("{key}: output does not match the stored expectation\n{diff}")]
    Mismatch { key: String, diff: String },

    #[error("{key}: no stored expectation at {}; rerun in accept mode to record it", .path.display())]
    MissingExpectation { key: String, path: PathBuf },

    #[error("{case}: export succeeded, expected a {expected} error")]
    UnexpectedSuccess {
        case: String,
        expected: ErrorCategory,
    },

    #[error("{case}: expected a {expected} error, got {got}: {message}")]
    WrongCategory {
        case: String,
        expected: ErrorCategory,
        got: ErrorCategory,
        message: String,
    },

    #[error("{case}: error message {message:?} does not match /{pattern}/")]
    PatternMismatch {
        case: String,
        pattern: String,
        message: String,
    },

    #[error("invalid message pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("{case}: the exported graph has {exported} outputs, running the module gave {executed}")]
    OutputArity {
        case: String,
        exported: usize,
        executed: usize,
    },

    #[error("export failed: {0}")]
    Export(#[from] ExportError),

    #[error(transparent)]
    Mlx(#[from] MlxError),

    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl HarnessError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> HarnessError {
        let path = path.into();
        move |source| HarnessError::Io { path, source }
    }
}
