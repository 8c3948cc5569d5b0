//! Decoding raw bytes to values
//!
//! Converts the little-endian bytes returned by the daemon into typed values.

use crate::error::{OdError, OdResult};
use crate::types::DataType;
use crate::value::Value;

/// Decode raw bytes according to a data type
pub fn decode(data_type: DataType, data: &[u8]) -> OdResult<Value> {
    if let Some(expected) = data_type.byte_size() {
        if data.len() != expected {
            return Err(OdError::Malformed {
                data_type,
                reason: format!("expected {} bytes, got {}", expected, data.len()),
            });
        }
    }

    let value = match data_type {
        // Any non-zero byte is true
        DataType::Boolean => Value::Bool(data[0] != 0),
        DataType::Int8 => Value::Int(data[0] as i8 as i64),
        DataType::Int16 => Value::Int(i16::from_le_bytes(array(data)) as i64),
        DataType::Int32 => Value::Int(i32::from_le_bytes(array(data)) as i64),
        DataType::Int64 => Value::Int(i64::from_le_bytes(array(data))),
        DataType::Uint8 => Value::UInt(data[0] as u64),
        DataType::Uint16 => Value::UInt(u16::from_le_bytes(array(data)) as u64),
        DataType::Uint32 => Value::UInt(u32::from_le_bytes(array(data)) as u64),
        DataType::Uint64 => Value::UInt(u64::from_le_bytes(array(data))),
        DataType::Real32 => Value::Float(f32::from_le_bytes(array(data)) as f64),
        DataType::Real64 => Value::Float(f64::from_le_bytes(array(data))),
        DataType::VisibleString(_) => {
            let text = std::str::from_utf8(trim_trailing_zeros(data)).map_err(|e| {
                OdError::Malformed {
                    data_type,
                    reason: format!("invalid UTF-8: {}", e),
                }
            })?;
            Value::Str(text.to_string())
        }
        DataType::OctetString(_) => Value::Bytes(trim_trailing_zeros(data).to_vec()),
        DataType::Domain => Value::Bytes(data.to_vec()),
    };
    Ok(value)
}

/// Zero-extend integer bytes to a raw u64 bit pattern
///
/// Bit fields operate on this pattern; signed values are not sign-extended.
pub fn raw_bits(data_type: DataType, data: &[u8]) -> OdResult<u64> {
    let width = data_type
        .bit_width()
        .ok_or_else(|| OdError::Malformed {
            data_type,
            reason: "bit access requires an integer type".to_string(),
        })?;
    let expected = (width / 8) as usize;
    if data.len() != expected {
        return Err(OdError::Malformed {
            data_type,
            reason: format!("expected {} bytes, got {}", expected, data.len()),
        });
    }
    let mut buf = [0u8; 8];
    buf[..expected].copy_from_slice(data);
    Ok(u64::from_le_bytes(buf))
}

/// Inverse of [`raw_bits`]: truncate a raw bit pattern to the type's width
pub fn bits_to_bytes(data_type: DataType, bits: u64) -> OdResult<Vec<u8>> {
    let width = data_type
        .bit_width()
        .ok_or_else(|| OdError::Malformed {
            data_type,
            reason: "bit access requires an integer type".to_string(),
        })?;
    Ok(bits.to_le_bytes()[..(width / 8) as usize].to_vec())
}

fn trim_trailing_zeros(data: &[u8]) -> &[u8] {
    let end = data.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    &data[..end]
}

/// Copy a length-checked slice into a fixed array
fn array<const N: usize>(data: &[u8]) -> [u8; N] {
    let mut buf = [0u8; N];
    buf.copy_from_slice(&data[..N]);
    buf
}
