//! Encoding values to raw bytes
//!
//! Converts typed values to the little-endian byte representation the daemon
//! stores for an entry.

use crate::error::{OdError, OdResult};
use crate::types::DataType;
use crate::value::Value;

/// Encode a value according to a data type
pub fn encode(data_type: DataType, value: &Value) -> OdResult<Vec<u8>> {
    match data_type {
        DataType::Boolean => match value {
            Value::Bool(b) => Ok(vec![u8::from(*b)]),
            other => Err(mismatch(data_type, other)),
        },
        dt if dt.is_integer() => encode_integer(dt, value),
        DataType::Real32 => {
            let v = expect_float(data_type, value)?;
            if v.is_finite() && v.abs() > f32::MAX as f64 {
                return Err(OdError::OutOfRange {
                    value: v.to_string(),
                    min: f32::MIN.to_string(),
                    max: f32::MAX.to_string(),
                });
            }
            let narrowed = v as f32;
            // Rounding would break decode(encode(v)) == v
            if v.is_finite() && f64::from(narrowed) != v {
                return Err(OdError::Inexact {
                    value: v.to_string(),
                    data_type,
                });
            }
            Ok(narrowed.to_le_bytes().to_vec())
        }
        DataType::Real64 => Ok(expect_float(data_type, value)?.to_le_bytes().to_vec()),
        DataType::VisibleString(len) => match value {
            Value::Str(s) => pad(s.as_bytes(), len),
            other => Err(mismatch(data_type, other)),
        },
        DataType::OctetString(len) => match value {
            Value::Bytes(b) => pad(b, len),
            other => Err(mismatch(data_type, other)),
        },
        DataType::Domain => match value {
            Value::Bytes(b) => Ok(b.clone()),
            other => Err(mismatch(data_type, other)),
        },
        _ => Err(mismatch(data_type, value)),
    }
}

/// Encode an integer, range-checked against the type's bounds
fn encode_integer(data_type: DataType, value: &Value) -> OdResult<Vec<u8>> {
    let v = value
        .as_i128()
        .ok_or_else(|| mismatch(data_type, value))?;
    let (min, max) = data_type
        .int_range()
        .ok_or_else(|| mismatch(data_type, value))?;

    if v < min || v > max {
        return Err(OdError::OutOfRange {
            value: v.to_string(),
            min: min.to_string(),
            max: max.to_string(),
        });
    }

    // In range, so the narrowing casts below are lossless
    let bytes = match data_type {
        DataType::Int8 => (v as i8).to_le_bytes().to_vec(),
        DataType::Int16 => (v as i16).to_le_bytes().to_vec(),
        DataType::Int32 => (v as i32).to_le_bytes().to_vec(),
        DataType::Int64 => (v as i64).to_le_bytes().to_vec(),
        DataType::Uint8 => vec![v as u8],
        DataType::Uint16 => (v as u16).to_le_bytes().to_vec(),
        DataType::Uint32 => (v as u32).to_le_bytes().to_vec(),
        DataType::Uint64 => (v as u64).to_le_bytes().to_vec(),
        _ => return Err(mismatch(data_type, value)),
    };
    Ok(bytes)
}

fn expect_float(data_type: DataType, value: &Value) -> OdResult<f64> {
    value.as_f64().ok_or_else(|| mismatch(data_type, value))
}

/// Right-pad with zero bytes up to the fixed length
fn pad(bytes: &[u8], len: usize) -> OdResult<Vec<u8>> {
    if bytes.len() > len {
        return Err(OdError::OutOfRange {
            value: format!("{} bytes", bytes.len()),
            min: "0 bytes".to_string(),
            max: format!("{} bytes", len),
        });
    }
    let mut out = bytes.to_vec();
    out.resize(len, 0);
    Ok(out)
}

fn mismatch(data_type: DataType, value: &Value) -> OdError {
    OdError::TypeMismatch {
        data_type,
        value_kind: value.kind(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_integers_little_endian() {
        assert_eq!(
            encode(DataType::Uint16, &Value::UInt(0x1234)).unwrap(),
            vec![0x34, 0x12]
        );
        assert_eq!(
            encode(DataType::Int16, &Value::Int(-2)).unwrap(),
            vec![0xFE, 0xFF]
        );
        assert_eq!(
            encode(DataType::Uint32, &Value::Int(1)).unwrap(),
            vec![1, 0, 0, 0]
        );
        assert_eq!(
            encode(DataType::Int64, &Value::Int(i64::MIN)).unwrap(),
            i64::MIN.to_le_bytes().to_vec()
        );
    }

    #[test]
    fn test_encode_out_of_range() {
        for (dt, v) in [
            (DataType::Uint8, Value::UInt(256)),
            (DataType::Uint8, Value::Int(-1)),
            (DataType::Int8, Value::Int(128)),
            (DataType::Int8, Value::Int(-129)),
            (DataType::Uint16, Value::UInt(65536)),
            (DataType::Int32, Value::Int(i32::MAX as i64 + 1)),
            (DataType::Uint32, Value::UInt(u32::MAX as u64 + 1)),
            (DataType::Int64, Value::UInt(i64::MAX as u64 + 1)),
            (DataType::Uint64, Value::Int(-1)),
        ] {
            let err = encode(dt, &v).unwrap_err();
            assert!(
                matches!(err, OdError::OutOfRange { .. }),
                "{} {:?} gave {:?}",
                dt,
                v,
                err
            );
        }
    }

    #[test]
    fn test_encode_type_mismatch() {
        for (dt, v) in [
            (DataType::Uint8, Value::Float(1.0)),
            (DataType::Boolean, Value::UInt(1)),
            (DataType::Real32, Value::Int(1)),
            (DataType::VisibleString(4), Value::Bytes(vec![1])),
            (DataType::OctetString(4), Value::Str("a".into())),
            (DataType::Domain, Value::Str("a".into())),
        ] {
            let err = encode(dt, &v).unwrap_err();
            assert!(matches!(err, OdError::TypeMismatch { .. }), "{}", dt);
        }
    }

    #[test]
    fn test_encode_bool_canonical() {
        assert_eq!(encode(DataType::Boolean, &Value::Bool(true)).unwrap(), vec![1]);
        assert_eq!(encode(DataType::Boolean, &Value::Bool(false)).unwrap(), vec![0]);
    }

    #[test]
    fn test_encode_floats() {
        assert_eq!(
            encode(DataType::Real32, &Value::Float(1.5)).unwrap(),
            1.5f32.to_le_bytes().to_vec()
        );
        assert!(matches!(
            encode(DataType::Real32, &Value::Float(1e39)),
            Err(OdError::OutOfRange { .. })
        ));
        assert!(encode(DataType::Real32, &Value::Float(f64::INFINITY)).is_ok());
        assert!(encode(DataType::Real32, &Value::Float(f64::NAN)).is_ok());
        assert!(encode(DataType::Real64, &Value::Float(1e300)).is_ok());
    }

    #[test]
    fn test_real32_rejects_inexact_values() {
        assert!(matches!(
            encode(DataType::Real32, &Value::Float(0.1)),
            Err(OdError::Inexact { .. })
        ));
        // The nearest REAL32 to 0.1 itself round-trips
        let nearest = Value::Float(f64::from(0.1f32));
        let bytes = encode(DataType::Real32, &nearest).unwrap();
        assert_eq!(crate::decode::decode(DataType::Real32, &bytes).unwrap(), nearest);
        assert!(encode(DataType::Real64, &Value::Float(0.1)).is_ok());
    }

    #[test]
    fn test_encode_strings_padded() {
        assert_eq!(
            encode(DataType::VisibleString(6), &Value::Str("abc".into())).unwrap(),
            b"abc\0\0\0".to_vec()
        );
        assert_eq!(
            encode(DataType::OctetString(3), &Value::Bytes(vec![9])).unwrap(),
            vec![9, 0, 0]
        );
        assert!(matches!(
            encode(DataType::VisibleString(2), &Value::Str("abc".into())),
            Err(OdError::OutOfRange { .. })
        ));
        assert_eq!(
            encode(DataType::Domain, &Value::Bytes(vec![1, 2, 3, 4, 5])).unwrap(),
            vec![1, 2, 3, 4, 5]
        );
    }
}
