//! Entry definition files
//!
//! Serialized form of a catalog, usually written in YAML:
//!
//! ```yaml
//! meta:
//!   name: Star tracker
//!   version: "1.0"
//!
//! entries:
//!   - index: 0x2000
//!     sub_index: 1
//!     name: status
//!     type: uint16
//!     access: rw
//!     bits:
//!       - name: enabled
//!         bit: 0
//!       - name: mode
//!         bit: 1
//!         width: 3
//!         labels: { 0: idle, 2: run }
//! ```

use serde::{Deserialize, Serialize};

use crate::bitfield::EntryBitField;
use crate::entry::Entry;
use crate::error::{parse_int, OdError, OdResult};
use crate::types::{AccessType, DataType};

/// Top-level definition file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DefinitionFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<CatalogMeta>,
    #[serde(default)]
    pub entries: Vec<EntryDefinition>,
}

/// Metadata about a catalog
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Index or sub-index written either as a number or as hex text
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IntOrString {
    Int(u64),
    Text(String),
}

impl IntOrString {
    fn value(&self) -> OdResult<u64> {
        match self {
            IntOrString::Int(v) => Ok(*v),
            IntOrString::Text(s) => parse_int(s),
        }
    }
}

/// Serialized form of one entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryDefinition {
    pub index: IntOrString,
    #[serde(default = "default_sub_index")]
    pub sub_index: IntOrString,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub data_type: DataType,
    #[serde(default)]
    pub access: AccessType,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bits: Vec<EntryBitField>,
}

fn default_sub_index() -> IntOrString {
    IntOrString::Int(0)
}

impl EntryDefinition {
    /// Validate and convert into an [`Entry`]
    pub fn into_entry(self) -> OdResult<Entry> {
        let index = self.index.value()?;
        let index = u16::try_from(index)
            .map_err(|_| OdError::InvalidAddress(format!("index {} out of range", index)))?;
        let sub_index = self.sub_index.value()?;
        let sub_index = u8::try_from(sub_index).map_err(|_| {
            OdError::InvalidAddress(format!("sub-index {} out of range", sub_index))
        })?;

        let mut builder = Entry::builder(index, sub_index, self.name, self.data_type)
            .access(self.access)
            .bit_fields(self.bits);
        if let Some(description) = self.description {
            builder = builder.description(description);
        }
        builder.build()
    }
}

impl From<&Entry> for EntryDefinition {
    fn from(entry: &Entry) -> Self {
        Self {
            index: IntOrString::Text(format!("0x{:04X}", entry.index())),
            sub_index: IntOrString::Int(entry.sub_index() as u64),
            name: entry.name().to_string(),
            description: entry.description().map(str::to_string),
            data_type: entry.data_type(),
            access: entry.access(),
            bits: entry.bit_fields().to_vec(),
        }
    }
}
