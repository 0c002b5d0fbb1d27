//! Export and validation errors.

use mlx_core::{MlxError, Shape};

/// Coarse classification of export failures, mirroring the kinds of error a
/// caller asserts against.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Operand shapes or values the target format cannot express.
    Runtime,
    /// A translation rule does not fit the call it was asked to translate.
    Type,
    /// No translation rule is registered for an operator.
    Unsupported,
    /// The produced graph is malformed.
    Structural,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Runtime => write!(f, "runtime"),
            ErrorCategory::Type => write!(f, "type"),
            ErrorCategory::Unsupported => write!(f, "unsupported"),
            ErrorCategory::Structural => write!(f, "structural"),
        }
    }
}

pub type Result<T> = std::result::Result<T, ExportError>;

#[derive(thiserror::Error, Debug)]
pub enum ExportError {
    #[error(
        "{op}: operand shapes {lhs} and {rhs} are not broadcastable under legacy broadcasting \
         (the second operand must equal a suffix of the first)"
    )]
    Broadcast { op: String, lhs: Shape, rhs: Shape },

    #[error(
        "symbolic for {op} takes {expected} arguments ({params}) but {got} were given \
         (occurred when translating {op})"
    )]
    SymbolicArity {
        op: String,
        params: String,
        expected: usize,
        got: usize,
    },

    #[error("symbolic for {op} {detail} (occurred when translating {op})")]
    SymbolicOutput { op: String, detail: String },

    #[error("invalid symbolic argument: {0}")]
    SymbolicArgument(String),

    #[error("no symbolic translation registered for operator {0}")]
    UnsupportedOperator(String),

    #[error("traced shape of {node} is {recorded}, but its inputs produce {inferred}")]
    InconsistentTrace {
        node: String,
        recorded: Shape,
        inferred: String,
    },

    #[error("exported graph failed validation: {0}")]
    Check(#[from] CheckError),

    #[error("tracing failed: {0}")]
    Trace(#[from] MlxError),

    #[error("malformed model bytes: {0}")]
    Decode(#[from] prost::DecodeError),
}

impl ExportError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            ExportError::Broadcast { .. } | ExportError::Trace(_) => ErrorCategory::Runtime,
            ExportError::SymbolicArity { .. }
            | ExportError::SymbolicOutput { .. }
            | ExportError::SymbolicArgument(_) => ErrorCategory::Type,
            ExportError::UnsupportedOperator(_) => ErrorCategory::Unsupported,
            ExportError::InconsistentTrace { .. }
            | ExportError::Check(_)
            | ExportError::Decode(_) => ErrorCategory::Structural,
        }
    }
}

/// Structural validation failures reported by [`crate::check_model`].
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum CheckError {
    #[error("missing required field {0}")]
    MissingField(&'static str),

    #[error("value name {0:?} is defined more than once")]
    DuplicateName(String),

    #[error("node {node} ({op}) reads {input:?}, which is not defined before it")]
    UndefinedInput {
        node: usize,
        op: String,
        input: String,
    },

    #[error("initializer {0:?} is not declared as a graph input")]
    InitializerNotInput(String),

    #[error("graph output {0:?} is never produced")]
    UndefinedOutput(String),

    #[error("operator {0} is not part of the supported opset")]
    UnknownOperator(String),

    #[error("{op} expects {min}..={max} {what}, got {got}")]
    Arity {
        op: String,
        what: &'static str,
        min: usize,
        max: usize,
        got: usize,
    },

    #[error("{op} is missing required attribute {name}")]
    MissingAttribute { op: String, name: String },

    #[error("{op} does not accept attribute {name}")]
    UnexpectedAttribute { op: String, name: String },

    #[error("attribute {name} of {op} should be {expected}, got {got}")]
    AttributeType {
        op: String,
        name: String,
        expected: &'static str,
        got: String,
    },

    #[error("{op} does not accept element type {elem}")]
    UnsupportedType { op: String, elem: i32 },

    #[error("inputs of {op} must share one element type, got {types:?}")]
    TypeMismatch { op: String, types: Vec<i32> },

    #[error("graph output {name:?} is declared as element type {declared}, produced as {produced}")]
    OutputType {
        name: String,
        declared: i32,
        produced: i32,
    },

    #[error("tensor {name:?}: {detail}")]
    Tensor { name: String, detail: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories() {
        let err = ExportError::Broadcast {
            op: "Add".into(),
            lhs: Shape::new(vec![3]),
            rhs: Shape::new(vec![2, 3]),
        };
        assert_eq!(err.category(), ErrorCategory::Runtime);
        assert!(err.to_string().starts_with("Add:"));

        let err = ExportError::SymbolicArity {
            op: "MyFun".into(),
            params: "x".into(),
            expected: 1,
            got: 2,
        };
        assert_eq!(err.category(), ErrorCategory::Type);
        assert!(err.to_string().ends_with("(occurred when translating MyFun)"));

        let err: ExportError = CheckError::MissingField("graph").into();
        assert_eq!(err.category(), ErrorCategory::Structural);
        assert_eq!(
            ExportError::UnsupportedOperator("expand".into()).category(),
            ErrorCategory::Unsupported
        );
    }
}
