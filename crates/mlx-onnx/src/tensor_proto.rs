//! Conversion between tensors and `TensorProto` messages.

use half::{bf16, f16};
use mlx_core::{DType, MlxError, Shape, Tensor};

use crate::proto::{DataType, TensorProto};

/// Element type code for a tensor dtype.
pub fn dtype_to_onnx(dtype: DType) -> DataType {
    match dtype {
        DType::F32 => DataType::Float,
        DType::F64 => DataType::Double,
        DType::F16 => DataType::Float16,
        DType::BF16 => DataType::Bfloat16,
        DType::I32 => DataType::Int32,
        DType::I64 => DataType::Int64,
    }
}

/// Tensor dtype for an element type code, if representable.
pub fn onnx_to_dtype(code: i32) -> Option<DType> {
    match DataType::try_from(code).ok()? {
        DataType::Float => Some(DType::F32),
        DataType::Double => Some(DType::F64),
        DataType::Float16 => Some(DType::F16),
        DataType::Bfloat16 => Some(DType::BF16),
        DataType::Int32 => Some(DType::I32),
        DataType::Int64 => Some(DType::I64),
        _ => None,
    }
}

/// Encode values as little-endian elements of `dtype`.
pub fn encode_raw(values: &[f32], dtype: DType) -> Vec<u8> {
    let mut out = Vec::with_capacity(values.len() * dtype.size_bytes());
    for &v in values {
        match dtype {
            DType::F32 => out.extend_from_slice(&v.to_le_bytes()),
            DType::F64 => out.extend_from_slice(&f64::from(v).to_le_bytes()),
            DType::F16 => out.extend_from_slice(&f16::from_f32(v).to_le_bytes()),
            DType::BF16 => out.extend_from_slice(&bf16::from_f32(v).to_le_bytes()),
            DType::I32 => out.extend_from_slice(&(v as i32).to_le_bytes()),
            DType::I64 => out.extend_from_slice(&(v as i64).to_le_bytes()),
        }
    }
    out
}

/// Decode little-endian elements of `dtype` into f32 values.
pub fn decode_raw(bytes: &[u8], dtype: DType) -> Result<Vec<f32>, MlxError> {
    let width = dtype.size_bytes();
    if bytes.len() % width != 0 {
        return Err(MlxError::InvalidArgument(format!(
            "raw data of {} bytes is not a multiple of the {dtype} element size",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(width)
        .map(|c| match dtype {
            DType::F32 => f32::from_le_bytes([c[0], c[1], c[2], c[3]]),
            DType::F64 => {
                f64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]) as f32
            }
            DType::F16 => f16::from_le_bytes([c[0], c[1]]).to_f32(),
            DType::BF16 => bf16::from_le_bytes([c[0], c[1]]).to_f32(),
            DType::I32 => i32::from_le_bytes([c[0], c[1], c[2], c[3]]) as f32,
            DType::I64 => {
                i64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]) as f32
            }
        })
        .collect())
}

/// Build a `TensorProto` holding `values` as `raw_data`.
pub fn values_to_proto(values: &[f32], shape: &Shape, dtype: DType, name: Option<String>) -> TensorProto {
    TensorProto {
        dims: shape.0.clone(),
        data_type: Some(dtype_to_onnx(dtype) as i32),
        raw_data: Some(encode_raw(values, dtype)),
        name,
        ..Default::default()
    }
}

/// An int64 tensor proto, used for shape operands.
pub fn int64_proto(values: &[i64], dims: Vec<i64>) -> TensorProto {
    TensorProto {
        dims,
        data_type: Some(DataType::Int64 as i32),
        raw_data: Some(values.iter().flat_map(|v| v.to_le_bytes()).collect()),
        ..Default::default()
    }
}

/// Evaluate `tensor` and serialize it.
pub fn tensor_to_proto(tensor: &Tensor, name: Option<String>) -> Result<TensorProto, MlxError> {
    let values = tensor.to_vec_f32()?;
    Ok(values_to_proto(&values, tensor.shape(), tensor.dtype(), name))
}

/// Decode element values from a `TensorProto`, accepting `raw_data` or the
/// typed repeated fields.
pub fn proto_values(proto: &TensorProto) -> Result<(Shape, DType, Vec<f32>), MlxError> {
    let code = proto.data_type();
    let dtype = onnx_to_dtype(code)
        .ok_or_else(|| MlxError::InvalidArgument(format!("unsupported element type {code}")))?;
    let shape = Shape::new(proto.dims.clone());

    let values = if let Some(raw) = &proto.raw_data {
        decode_raw(raw, dtype)?
    } else {
        match dtype {
            DType::F32 => proto.float_data.clone(),
            DType::F64 => proto.double_data.iter().map(|&v| v as f32).collect(),
            DType::I64 => proto.int64_data.iter().map(|&v| v as f32).collect(),
            DType::I32 => proto.int32_data.iter().map(|&v| v as f32).collect(),
            DType::F16 => proto
                .int32_data
                .iter()
                .map(|&bits| f16::from_bits(bits as u16).to_f32())
                .collect(),
            DType::BF16 => proto
                .int32_data
                .iter()
                .map(|&bits| bf16::from_bits(bits as u16).to_f32())
                .collect(),
        }
    };

    if values.len() as i64 != shape.numel() {
        return Err(MlxError::ShapeMismatch {
            expected: shape.0.clone(),
            got: vec![values.len() as i64],
        });
    }
    Ok((shape, dtype, values))
}

/// Deserialize a `TensorProto` into a constant tensor on the default stream.
pub fn proto_to_tensor(proto: &TensorProto) -> Result<Tensor, MlxError> {
    let (shape, dtype, values) = proto_values(proto)?;
    Tensor::from_data_with_dtype(values, &shape, dtype)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_layouts() {
        assert_eq!(encode_raw(&[1.0], DType::F32), 1.0f32.to_le_bytes().to_vec());
        assert_eq!(encode_raw(&[1.0], DType::F64).len(), 8);
        assert_eq!(encode_raw(&[-3.0], DType::I64), (-3i64).to_le_bytes().to_vec());
        assert_eq!(encode_raw(&[1.0], DType::F16), vec![0x00, 0x3c]);
    }

    #[test]
    fn test_decode_rejects_ragged_bytes() {
        assert!(decode_raw(&[0, 0, 0], DType::F32).is_err());
    }

    #[test]
    fn test_proto_roundtrip_through_tensor() {
        let t = Tensor::from_data_with_dtype(vec![1.0, 2.0, 3.0, 4.0], &Shape::new(vec![2, 2]), DType::I64)
            .unwrap();
        let proto = tensor_to_proto(&t, Some("w".into())).unwrap();
        assert_eq!(proto.data_type(), DataType::Int64 as i32);
        assert_eq!(proto.name(), "w");
        let back = proto_to_tensor(&proto).unwrap();
        assert_eq!(back.dtype(), DType::I64);
        assert_eq!(back.shape(), &Shape::new(vec![2, 2]));
        assert_eq!(back.to_vec_f32().unwrap(), vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_typed_fields_are_accepted() {
        let proto = TensorProto {
            dims: vec![2],
            data_type: Some(DataType::Float as i32),
            float_data: vec![0.5, 1.5],
            ..Default::default()
        };
        let (_, dtype, values) = proto_values(&proto).unwrap();
        assert_eq!(dtype, DType::F32);
        assert_eq!(values, vec![0.5, 1.5]);
    }

    #[test]
    fn test_element_count_must_match_dims() {
        let proto = TensorProto {
            dims: vec![3],
            data_type: Some(DataType::Float as i32),
            float_data: vec![0.5],
            ..Default::default()
        };
        assert!(proto_values(&proto).is_err());
    }

    #[test]
    fn test_unknown_element_type() {
        assert_eq!(onnx_to_dtype(DataType::String as i32), None);
        assert_eq!(onnx_to_dtype(99), None);
    }
}
