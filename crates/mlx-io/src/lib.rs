//! Tensor and model I/O in the ONNX protobuf format.
//!
//! Tensors are stored as one encoded `TensorProto` per file (`.pb`), models
//! as an encoded `ModelProto` (`.onnx`).

use std::fs;
use std::path::Path;

use prost::Message;

use mlx_core::{MlxError, Result, Tensor};
use mlx_onnx::proto::{ModelProto, TensorProto};
use mlx_onnx::tensor_proto::{proto_to_tensor, tensor_to_proto};

fn decode_error(path: &Path, e: prost::DecodeError) -> MlxError {
    MlxError::InvalidArgument(format!("{}: protobuf parse error: {e}", path.display()))
}

/// Evaluate `tensor` and write it as an encoded `TensorProto`.
pub fn save_tensor_pb(path: &Path, tensor: &Tensor, name: Option<&str>) -> Result<()> {
    let proto = tensor_to_proto(tensor, name.map(str::to_string))?;
    fs::write(path, proto.encode_to_vec())?;
    Ok(())
}

/// Read the raw `TensorProto` stored at `path`.
pub fn read_tensor_proto(path: &Path) -> Result<TensorProto> {
    let data = fs::read(path)?;
    TensorProto::decode(data.as_slice()).map_err(|e| decode_error(path, e))
}

/// Load a tensor written by [`save_tensor_pb`] (or any ONNX tensor file of
/// a supported element type) onto the default stream.
pub fn load_tensor_pb(path: &Path) -> Result<Tensor> {
    proto_to_tensor(&read_tensor_proto(path)?)
}

/// Write already-encoded model bytes.
pub fn save_model_bytes(path: &Path, bytes: &[u8]) -> Result<()> {
    fs::write(path, bytes)?;
    Ok(())
}

/// Read and decode a model file.
pub fn load_model(path: &Path) -> Result<ModelProto> {
    let data = fs::read(path)?;
    ModelProto::decode(data.as_slice()).map_err(|e| decode_error(path, e))
}
