use anyhow::{bail, ensure, Context, Result};
use bytes::{BufMut, Bytes, BytesMut};
use layerport_core::{DataType, QuantizationInfo, TensorHandle, TensorInfo};

/// Element types the reference kernels can read and write.
pub fn is_decodable(info: &TensorInfo) -> bool {
    match info.data_type {
        DataType::Float32 | DataType::Signed32 => true,
        DataType::QAsymmU8 | DataType::QAsymmS8 => info.quantization.is_some(),
        DataType::Float16 | DataType::Boolean => false,
    }
}

/// Reads a handle as real values, dequantizing where needed.
pub fn decode(handle: &TensorHandle) -> Result<Vec<f32>> {
    let info = handle.info();
    let bytes = handle.read();
    let size = info.data_type.size_in_bytes();
    ensure!(
        bytes.len() % size == 0,
        "{} tensor has invalid byte length {}",
        info.data_type,
        bytes.len()
    );

    let values = match info.data_type {
        DataType::Float32 => bytes
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect(),
        DataType::Signed32 => bytes
            .chunks_exact(4)
            .map(|b| i32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f32)
            .collect(),
        DataType::QAsymmU8 => {
            let q = quantization(info)?;
            bytes.iter().map(|&b| dequantize(i32::from(b), q)).collect()
        }
        DataType::QAsymmS8 => {
            let q = quantization(info)?;
            bytes
                .iter()
                .map(|&b| dequantize(i32::from(b as i8), q))
                .collect()
        }
        other => bail!("reference backend cannot decode {other} tensors"),
    };
    Ok(values)
}

/// Writes real values into a handle, quantizing and saturating where needed.
pub fn encode(handle: &TensorHandle, values: &[f32]) -> Result<()> {
    let info = handle.info();
    let mut buf = BytesMut::with_capacity(values.len() * info.data_type.size_in_bytes());
    match info.data_type {
        DataType::Float32 => values.iter().for_each(|v| buf.put_f32_le(*v)),
        DataType::Signed32 => values.iter().for_each(|v| buf.put_i32_le(v.round() as i32)),
        DataType::QAsymmU8 => {
            let q = quantization(info)?;
            values
                .iter()
                .for_each(|v| buf.put_u8(quantize(*v, q, 0, 255) as u8));
        }
        DataType::QAsymmS8 => {
            let q = quantization(info)?;
            values
                .iter()
                .for_each(|v| buf.put_i8(quantize(*v, q, -128, 127) as i8));
        }
        other => bail!("reference backend cannot encode {other} tensors"),
    }
    handle.write(Bytes::from(buf))
}

/// Reads an i32 tensor exactly, widened so integer kernels cannot overflow.
pub fn decode_int(handle: &TensorHandle) -> Result<Vec<i64>> {
    let data_type = handle.info().data_type;
    ensure!(data_type == DataType::Signed32, "expected an i32 tensor, found {data_type}");
    let bytes = handle.read();
    ensure!(bytes.len() % 4 == 0, "i32 tensor has invalid byte length {}", bytes.len());
    Ok(bytes
        .chunks_exact(4)
        .map(|b| i64::from(i32::from_le_bytes([b[0], b[1], b[2], b[3]])))
        .collect())
}

/// Writes widened integers into an i32 tensor, saturating at the i32 range.
pub fn encode_int(handle: &TensorHandle, values: &[i64]) -> Result<()> {
    let data_type = handle.info().data_type;
    ensure!(data_type == DataType::Signed32, "expected an i32 tensor, found {data_type}");
    let mut buf = BytesMut::with_capacity(values.len() * 4);
    for v in values {
        buf.put_i32_le((*v).clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32);
    }
    handle.write(buf.freeze())
}

fn quantization(info: &TensorInfo) -> Result<QuantizationInfo> {
    info.quantization
        .with_context(|| format!("{} tensor has no quantization parameters", info.data_type))
}

fn dequantize(value: i32, q: QuantizationInfo) -> f32 {
    q.scale * (value - q.offset) as f32
}

fn quantize(value: f32, q: QuantizationInfo, min: i32, max: i32) -> i32 {
    let scaled = (value / q.scale).round() as i32;
    scaled.saturating_add(q.offset).clamp(min, max)
}
