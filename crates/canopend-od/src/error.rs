//! Error types for the object dictionary model

use thiserror::Error;

use crate::types::DataType;

/// Errors that can occur while building entries or converting values
#[derive(Debug, Error, Clone, PartialEq)]
pub enum OdError {
    /// Value outside the valid domain of a data type or bit field
    #[error("value out of range: {value} not in [{min}, {max}]")]
    OutOfRange {
        value: String,
        min: String,
        max: String,
    },

    /// Float with no exact representation in the data type
    #[error("value {value} is not exactly representable as {data_type}")]
    Inexact { value: String, data_type: DataType },

    /// Value variant disagrees with the entry's data type
    #[error("type mismatch: {value_kind} value cannot be encoded as {data_type}")]
    TypeMismatch {
        data_type: DataType,
        value_kind: &'static str,
    },

    /// Raw bytes have an unexpected length or content for the data type
    #[error("malformed {data_type} data: {reason}")]
    Malformed { data_type: DataType, reason: String },

    /// Bit field label not known to the field
    #[error("unknown label '{label}' for bit field '{field}'")]
    UnknownLabel { field: String, label: String },

    /// Bit field name not defined on the entry
    #[error("entry '{entry}' has no bit field named '{field}'")]
    UnknownBitField { entry: String, field: String },

    /// Entry or bit field definition violates a construction invariant
    #[error("invalid definition for {target}: {reason}")]
    InvalidDefinition { target: String, reason: String },

    /// Two catalog entries share an address or a name
    #[error("duplicate entry {0}")]
    DuplicateEntry(String),

    /// Invalid index/sub-index text
    #[error("invalid address format: {0}")]
    InvalidAddress(String),

    /// A process-wide catalog was already installed
    #[error("object dictionary already installed")]
    AlreadyInstalled,

    /// YAML parsing error
    #[error("YAML parse error: {0}")]
    Yaml(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(String),
}

impl From<serde_yaml::Error> for OdError {
    fn from(err: serde_yaml::Error) -> Self {
        OdError::Yaml(err.to_string())
    }
}

impl From<std::io::Error> for OdError {
    fn from(err: std::io::Error) -> Self {
        OdError::Io(err.to_string())
    }
}

/// Result type for object dictionary operations
pub type OdResult<T> = Result<T, OdError>;

/// Parse an integer that may carry a `0x` prefix (hex) or be plain decimal
pub fn parse_int(s: &str) -> OdResult<u64> {
    let s = s.trim();
    let parsed = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16)
    } else {
        s.parse::<u64>()
    };
    parsed.map_err(|_| OdError::InvalidAddress(s.to_string()))
}

/// Parse an OD address of the form `index:sub_index`
///
/// Both parts accept hex (`0x2000:0x01`) or decimal. A missing sub-index
/// (`0x1017`) means sub-index 0.
pub fn parse_address(s: &str) -> OdResult<(u16, u8)> {
    let (index, sub_index) = match s.split_once(':') {
        Some((i, sub)) => (i, Some(sub)),
        None => (s, None),
    };
    let index = u16::try_from(parse_int(index)?)
        .map_err(|_| OdError::InvalidAddress(s.to_string()))?;
    let sub_index = match sub_index {
        Some(sub) => u8::try_from(parse_int(sub)?)
            .map_err(|_| OdError::InvalidAddress(s.to_string()))?,
        None => 0,
    };
    Ok((index, sub_index))
}

/// Format an OD address as `0xIIII:SS`
pub fn format_address(index: u16, sub_index: u8) -> String {
    format!("0x{:04X}:{:02X}", index, sub_index)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_address() {
        assert_eq!(parse_address("0x2000:1").unwrap(), (0x2000, 1));
        assert_eq!(parse_address("0x1018:0x04").unwrap(), (0x1018, 4));
        assert_eq!(parse_address("4096").unwrap(), (0x1000, 0));
        assert_eq!(parse_address(" 0X1017 ").unwrap(), (0x1017, 0));
        assert!(parse_address("0x10000:0").is_err());
        assert!(parse_address("0x1000:256").is_err());
        assert!(parse_address("status").is_err());
    }

    #[test]
    fn test_format_address() {
        assert_eq!(format_address(0x2000, 1), "0x2000:01");
        assert_eq!(format_address(0x0001, 0xFF), "0x0001:FF");
    }
}
