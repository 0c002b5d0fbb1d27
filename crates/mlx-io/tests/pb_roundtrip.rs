use mlx_core::{DType, Shape, Tensor};
use mlx_io::{load_model, load_tensor_pb, read_tensor_proto, save_model_bytes, save_tensor_pb};
use mlx_onnx::proto::{DataType, GraphProto, ModelProto};
use prost::Message;

#[test]
fn roundtrip_every_dtype() {
    let dir = tempfile::tempdir().unwrap();
    let data = vec![1.0_f32, -2.0, 3.0, 4.0, 0.5, 6.0];
    for (i, dtype) in [DType::F32, DType::F64, DType::F16, DType::BF16, DType::I32, DType::I64]
        .into_iter()
        .enumerate()
    {
        // integer tensors only take whole values
        let data: Vec<f32> = if dtype.is_float() {
            data.clone()
        } else {
            data.iter().map(|v| v.trunc()).collect()
        };
        let expected = data.clone();
        let path = dir.path().join(format!("input_{i}.pb"));
        let t = Tensor::from_data_with_dtype(data.clone(), &Shape::new(vec![2, 3]), dtype).unwrap();
        save_tensor_pb(&path, &t, None).unwrap();

        let loaded = load_tensor_pb(&path).unwrap();
        assert_eq!(loaded.dtype(), dtype);
        assert_eq!(loaded.shape(), &Shape::new(vec![2, 3]));
        assert_eq!(loaded.to_vec_f32().unwrap(), expected, "{dtype}");
    }
}

#[test]
fn integer_tensor_rejects_fractional_data() {
    let err = Tensor::from_data_with_dtype(vec![0.5], &Shape::new(vec![1]), DType::I32).unwrap_err();
    assert!(err.to_string().contains("i32"), "{err}");
}

#[test]
fn tensor_name_is_stored() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("named.pb");
    let t = Tensor::from_f32(&[1.0], &Shape::new(vec![1])).unwrap();
    save_tensor_pb(&path, &t, Some("x")).unwrap();
    let proto = read_tensor_proto(&path).unwrap();
    assert_eq!(proto.name(), "x");
    assert_eq!(proto.data_type(), DataType::Float as i32);
}

#[test]
fn model_file_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.onnx");
    let model = ModelProto {
        ir_version: Some(3),
        graph: Some(GraphProto {
            name: Some("g".into()),
            ..Default::default()
        }),
        ..Default::default()
    };
    save_model_bytes(&path, &model.encode_to_vec()).unwrap();
    assert_eq!(load_model(&path).unwrap(), model);
}

#[test]
fn garbage_is_a_decode_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.pb");
    std::fs::write(&path, [0xff, 0xff, 0xff]).unwrap();
    let err = load_tensor_pb(&path).unwrap_err();
    assert!(err.to_string().contains("protobuf parse error"));
    assert!(load_tensor_pb(&dir.path().join("missing.pb")).is_err());
}
