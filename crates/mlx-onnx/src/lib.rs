//! ONNX export for traced MLX computations.
//!
//! A module is run on example inputs, the lazy graph it records is walked
//! from its outputs, and each node is translated by a rule looked up in a
//! [`SymbolicRegistry`]. The result targets IR version 3 and opset 6.
//! [`check_model`] validates the encoded graph and [`render_model`] produces
//! the canonical text used for snapshot comparison.

pub mod checker;
pub mod error;
pub mod export;
pub mod proto;
pub mod registry;
pub mod symbolic;
pub mod tensor_proto;
pub mod text;

pub use checker::check_model;
pub use error::{CheckError, ErrorCategory, ExportError, Result};
pub use export::{ExportOptions, IR_VERSION, OPSET_VERSION, export, export_to_bytes};
pub use proto::ModelProto;
pub use registry::{CustomRule, SymbolicRegistry, TranslationRule};
pub use symbolic::{GraphContext, Sym, SymArg};
pub use text::{render_model, strip_doc_strings};

use prost::Message;

/// Decode serialized model bytes.
pub fn decode_model(bytes: &[u8]) -> Result<ModelProto> {
    Ok(ModelProto::decode(bytes)?)
}

/// Decode, validate, strip doc strings and render `bytes` as canonical text.
pub fn canonical_text(bytes: &[u8]) -> Result<String> {
    let mut model = decode_model(bytes)?;
    check_model(&model)?;
    strip_doc_strings(&mut model);
    Ok(render_model(&model))
}
