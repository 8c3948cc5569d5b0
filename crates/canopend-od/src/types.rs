//! Core types for object dictionary entries
//!
//! Defines the primitive data types a CANopen entry can hold and the
//! access policy attached to each entry.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{OdError, OdResult};
use crate::value::Value;

/// Primitive data type of an OD entry
///
/// Multi-byte values are little-endian, as on the CANopen bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    /// BOOLEAN (1 byte, 0 or 1)
    Boolean,
    /// INTEGER8
    Int8,
    /// INTEGER16
    Int16,
    /// INTEGER32
    Int32,
    /// INTEGER64
    Int64,
    /// UNSIGNED8
    Uint8,
    /// UNSIGNED16
    Uint16,
    /// UNSIGNED32
    Uint32,
    /// UNSIGNED64
    Uint64,
    /// REAL32 (IEEE 754 single precision)
    Real32,
    /// REAL64 (IEEE 754 double precision)
    Real64,
    /// VISIBLE_STRING with a fixed byte length
    VisibleString(usize),
    /// OCTET_STRING with a fixed byte length
    OctetString(usize),
    /// DOMAIN, variable-length blob
    Domain,
}

impl DataType {
    /// Get the byte size of this type
    /// Returns None for the variable-length Domain type
    pub fn byte_size(&self) -> Option<usize> {
        match self {
            DataType::Boolean | DataType::Int8 | DataType::Uint8 => Some(1),
            DataType::Int16 | DataType::Uint16 => Some(2),
            DataType::Int32 | DataType::Uint32 | DataType::Real32 => Some(4),
            DataType::Int64 | DataType::Uint64 | DataType::Real64 => Some(8),
            DataType::VisibleString(len) | DataType::OctetString(len) => Some(*len),
            DataType::Domain => None,
        }
    }

    /// Check if this type is a signed integer
    pub fn is_signed(&self) -> bool {
        matches!(
            self,
            DataType::Int8 | DataType::Int16 | DataType::Int32 | DataType::Int64
        )
    }

    /// Check if this type is an integer (signed or unsigned)
    pub fn is_integer(&self) -> bool {
        self.is_signed()
            || matches!(
                self,
                DataType::Uint8 | DataType::Uint16 | DataType::Uint32 | DataType::Uint64
            )
    }

    /// Check if this type is floating point
    pub fn is_float(&self) -> bool {
        matches!(self, DataType::Real32 | DataType::Real64)
    }

    /// Valid numeric range for integer types
    pub fn int_range(&self) -> Option<(i128, i128)> {
        let range = match self {
            DataType::Int8 => (i8::MIN as i128, i8::MAX as i128),
            DataType::Int16 => (i16::MIN as i128, i16::MAX as i128),
            DataType::Int32 => (i32::MIN as i128, i32::MAX as i128),
            DataType::Int64 => (i64::MIN as i128, i64::MAX as i128),
            DataType::Uint8 => (0, u8::MAX as i128),
            DataType::Uint16 => (0, u16::MAX as i128),
            DataType::Uint32 => (0, u32::MAX as i128),
            DataType::Uint64 => (0, u64::MAX as i128),
            _ => return None,
        };
        Some(range)
    }

    /// Number of bits available to bit fields (integer types only)
    pub fn bit_width(&self) -> Option<u32> {
        if self.is_integer() {
            self.byte_size().map(|size| size as u32 * 8)
        } else {
            None
        }
    }

    /// CiA 301 data type code
    pub fn code(&self) -> u8 {
        match self {
            DataType::Boolean => 0x01,
            DataType::Int8 => 0x02,
            DataType::Int16 => 0x03,
            DataType::Int32 => 0x04,
            DataType::Uint8 => 0x05,
            DataType::Uint16 => 0x06,
            DataType::Uint32 => 0x07,
            DataType::Real32 => 0x08,
            DataType::VisibleString(_) => 0x09,
            DataType::OctetString(_) => 0x0A,
            DataType::Domain => 0x0F,
            DataType::Real64 => 0x11,
            DataType::Int64 => 0x15,
            DataType::Uint64 => 0x1B,
        }
    }

    /// Build a data type from its CiA 301 code
    ///
    /// String codes need the fixed length, which the code alone does not carry.
    pub fn from_code(code: u8, length: Option<usize>) -> Option<Self> {
        let data_type = match code {
            0x01 => DataType::Boolean,
            0x02 => DataType::Int8,
            0x03 => DataType::Int16,
            0x04 => DataType::Int32,
            0x05 => DataType::Uint8,
            0x06 => DataType::Uint16,
            0x07 => DataType::Uint32,
            0x08 => DataType::Real32,
            0x09 => DataType::VisibleString(length?),
            0x0A => DataType::OctetString(length?),
            0x0F => DataType::Domain,
            0x11 => DataType::Real64,
            0x15 => DataType::Int64,
            0x1B => DataType::Uint64,
            _ => return None,
        };
        Some(data_type)
    }

    /// Encode a value to raw bytes, see [`encode`](crate::encode::encode)
    pub fn encode(&self, value: &Value) -> OdResult<Vec<u8>> {
        crate::encode::encode(*self, value)
    }

    /// Decode raw bytes to a value, see [`decode`](crate::decode::decode)
    pub fn decode(&self, data: &[u8]) -> OdResult<Value> {
        crate::decode::decode(*self, data)
    }

    /// Type name without any length suffix
    pub fn kind_name(&self) -> &'static str {
        match self {
            DataType::Boolean => "bool",
            DataType::Int8 => "int8",
            DataType::Int16 => "int16",
            DataType::Int32 => "int32",
            DataType::Int64 => "int64",
            DataType::Uint8 => "uint8",
            DataType::Uint16 => "uint16",
            DataType::Uint32 => "uint32",
            DataType::Uint64 => "uint64",
            DataType::Real32 => "real32",
            DataType::Real64 => "real64",
            DataType::VisibleString(_) => "visible_string",
            DataType::OctetString(_) => "octet_string",
            DataType::Domain => "domain",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::VisibleString(len) | DataType::OctetString(len) => {
                write!(f, "{}[{}]", self.kind_name(), len)
            }
            _ => f.write_str(self.kind_name()),
        }
    }
}

impl FromStr for DataType {
    type Err = OdError;

    /// Parses `uint16`, `int8`, `visible_string[8]`, `octet_string[4]`, ...
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (name, length) = match s.split_once('[') {
            Some((name, rest)) => {
                let len = rest
                    .strip_suffix(']')
                    .and_then(|l| l.trim().parse::<usize>().ok())
                    .ok_or_else(|| invalid_type(s))?;
                (name.trim(), Some(len))
            }
            None => (s, None),
        };

        let data_type = match (name, length) {
            ("bool" | "boolean", None) => DataType::Boolean,
            ("int8" | "i8", None) => DataType::Int8,
            ("int16" | "i16", None) => DataType::Int16,
            ("int32" | "i32", None) => DataType::Int32,
            ("int64" | "i64", None) => DataType::Int64,
            ("uint8" | "u8", None) => DataType::Uint8,
            ("uint16" | "u16", None) => DataType::Uint16,
            ("uint32" | "u32", None) => DataType::Uint32,
            ("uint64" | "u64", None) => DataType::Uint64,
            ("real32" | "float32" | "f32", None) => DataType::Real32,
            ("real64" | "float64" | "f64", None) => DataType::Real64,
            ("visible_string" | "str", Some(len)) => DataType::VisibleString(len),
            ("octet_string" | "bytes", Some(len)) => DataType::OctetString(len),
            ("domain", None) => DataType::Domain,
            _ => return Err(invalid_type(s)),
        };
        Ok(data_type)
    }
}

fn invalid_type(s: &str) -> OdError {
    OdError::InvalidDefinition {
        target: "data type".to_string(),
        reason: format!("unknown data type '{}'", s),
    }
}

impl Serialize for DataType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DataType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Access policy of an entry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessType {
    /// Readable only
    #[serde(alias = "ro", alias = "const")]
    ReadOnly,
    /// Writable only
    #[serde(alias = "wo")]
    WriteOnly,
    /// Readable and writable
    #[default]
    #[serde(alias = "rw")]
    ReadWrite,
}

impl AccessType {
    pub fn is_readable(&self) -> bool {
        !matches!(self, AccessType::WriteOnly)
    }

    pub fn is_writable(&self) -> bool {
        !matches!(self, AccessType::ReadOnly)
    }
}

impl fmt::Display for AccessType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AccessType::ReadOnly => "ro",
            AccessType::WriteOnly => "wo",
            AccessType::ReadWrite => "rw",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_type_sizes() {
        assert_eq!(DataType::Boolean.byte_size(), Some(1));
        assert_eq!(DataType::Uint8.byte_size(), Some(1));
        assert_eq!(DataType::Int16.byte_size(), Some(2));
        assert_eq!(DataType::Uint32.byte_size(), Some(4));
        assert_eq!(DataType::Real32.byte_size(), Some(4));
        assert_eq!(DataType::Int64.byte_size(), Some(8));
        assert_eq!(DataType::Real64.byte_size(), Some(8));
        assert_eq!(DataType::VisibleString(12).byte_size(), Some(12));
        assert_eq!(DataType::Domain.byte_size(), None);
    }

    #[test]
    fn test_code_round_trip() {
        for dt in [
            DataType::Boolean,
            DataType::Int8,
            DataType::Int16,
            DataType::Int32,
            DataType::Int64,
            DataType::Uint8,
            DataType::Uint16,
            DataType::Uint32,
            DataType::Uint64,
            DataType::Real32,
            DataType::Real64,
            DataType::VisibleString(3),
            DataType::OctetString(3),
            DataType::Domain,
        ] {
            assert_eq!(DataType::from_code(dt.code(), Some(3)), Some(dt));
        }
        assert_eq!(DataType::from_code(0x09, None), None);
        assert_eq!(DataType::from_code(0x7F, None), None);
    }

    #[test]
    fn test_int_range() {
        assert_eq!(DataType::Int8.int_range(), Some((-128, 127)));
        assert_eq!(DataType::Uint16.int_range(), Some((0, 65535)));
        assert_eq!(DataType::Real32.int_range(), None);
        assert_eq!(DataType::Uint64.bit_width(), Some(64));
        assert_eq!(DataType::Boolean.bit_width(), None);
    }

    #[test]
    fn test_parse_names() {
        assert_eq!("uint16".parse::<DataType>().unwrap(), DataType::Uint16);
        assert_eq!("f64".parse::<DataType>().unwrap(), DataType::Real64);
        assert_eq!(
            "visible_string[8]".parse::<DataType>().unwrap(),
            DataType::VisibleString(8)
        );
        assert!("visible_string".parse::<DataType>().is_err());
        assert!("uint16[2]".parse::<DataType>().is_err());
        assert!("uint24".parse::<DataType>().is_err());
        assert_eq!(DataType::OctetString(4).to_string(), "octet_string[4]");
    }

    #[test]
    fn test_access() {
        assert!(AccessType::ReadOnly.is_readable());
        assert!(!AccessType::ReadOnly.is_writable());
        assert!(!AccessType::WriteOnly.is_readable());
        assert!(AccessType::ReadWrite.is_writable());
    }
}
