//! Argument parsing: node ids, entry identifiers and typed values

use std::str::FromStr;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use canopend_od::{parse_address, parse_int, DataType, Entry, FieldInput, ObjectDictionary, Value};

/// Parse a node id given as decimal or `0x` hex
pub fn parse_node_id(s: &str) -> Result<u8, String> {
    let id = parse_int(s).map_err(|_| format!("invalid node id '{}'", s))?;
    u8::try_from(id).map_err(|_| format!("node id '{}' out of range", s))
}

/// One node or every node the daemon knows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeTarget {
    Node(u8),
    All,
}

impl FromStr for NodeTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("all") {
            Ok(NodeTarget::All)
        } else {
            parse_node_id(s).map(NodeTarget::Node)
        }
    }
}

/// Look up an entry by name or address
///
/// Addresses missing from the catalog are accepted when a data type is
/// given; the entry is then read-write without bit fields.
pub fn resolve_entry(
    catalog: &ObjectDictionary,
    identifier: &str,
    data_type: Option<&str>,
) -> Result<Arc<Entry>> {
    if let Some(entry) = catalog.resolve(identifier) {
        return Ok(entry);
    }

    let Some(data_type) = data_type else {
        bail!(
            "Unknown entry '{}' (pass --type to use an address outside the catalog)",
            identifier
        );
    };
    let data_type: DataType = data_type
        .parse()
        .with_context(|| format!("Invalid data type '{}'", data_type))?;
    let (index, sub_index) = parse_address(identifier)
        .with_context(|| format!("'{}' is neither a known name nor an address", identifier))?;

    Ok(Arc::new(Entry::new(index, sub_index, identifier, data_type)?))
}

/// Parse a command-line value according to a data type
pub fn parse_value(data_type: DataType, s: &str) -> Result<Value> {
    let s = s.trim();
    let value = match data_type {
        DataType::Boolean => match s.to_ascii_lowercase().as_str() {
            "true" | "1" | "on" => Value::Bool(true),
            "false" | "0" | "off" => Value::Bool(false),
            _ => bail!("Expected a boolean, got '{}'", s),
        },
        dt if dt.is_signed() => Value::Int(parse_signed(s)?),
        dt if dt.is_integer() => Value::UInt(
            parse_int(s).with_context(|| format!("Expected an unsigned integer, got '{}'", s))?,
        ),
        DataType::Real32 => {
            let wide: f64 = s
                .parse()
                .with_context(|| format!("Expected a number, got '{}'", s))?;
            // Nearest REAL32 so the value encodes exactly; out-of-range
            // values are left for the encoder to reject
            if wide.is_finite() && wide.abs() <= f64::from(f32::MAX) {
                Value::Float(f64::from(wide as f32))
            } else {
                Value::Float(wide)
            }
        }
        dt if dt.is_float() => Value::Float(
            s.parse()
                .with_context(|| format!("Expected a number, got '{}'", s))?,
        ),
        DataType::VisibleString(_) => Value::Str(s.to_string()),
        DataType::OctetString(_) | DataType::Domain => Value::Bytes(parse_hex(s)?),
        other => bail!("Cannot parse values of type {}", other),
    };
    Ok(value)
}

/// Parse a bit-field input: a number, or otherwise a label
pub fn parse_field_input(s: &str) -> FieldInput {
    match parse_int(s) {
        Ok(raw) => FieldInput::Raw(raw),
        Err(_) => FieldInput::Label(s.trim().to_string()),
    }
}

/// Parse a `u16`/`u32` argument given as decimal or hex
pub fn parse_number<T: TryFrom<u64>>(s: &str, what: &str) -> Result<T> {
    let raw = parse_int(s).with_context(|| format!("Invalid {} '{}'", what, s))?;
    T::try_from(raw).map_err(|_| anyhow!("{} '{}' out of range", what, s))
}

fn parse_signed(s: &str) -> Result<i64> {
    let (negative, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let magnitude = parse_int(digits).with_context(|| format!("Expected an integer, got '{}'", s))?;
    let magnitude = i128::from(magnitude);
    let value = if negative { -magnitude } else { magnitude };
    i64::try_from(value).map_err(|_| anyhow!("Integer '{}' out of range", s))
}

fn parse_hex(s: &str) -> Result<Vec<u8>> {
    let digits: String = s
        .trim_start_matches("0x")
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':')
        .collect();
    hex::decode(&digits).with_context(|| format!("Expected hex bytes, got '{}'", s))
}
