//! Object dictionary entries
//!
//! An [`Entry`] binds an OD address to a data type, an access policy and an
//! optional set of bit fields. Entries are validated once at construction and
//! never change afterwards.

use std::fmt;

use serde::Serialize;

use crate::bitfield::{EntryBitField, FieldInput, FieldValue};
use crate::decode::{bits_to_bytes, raw_bits};
use crate::error::{format_address, OdError, OdResult};
use crate::types::{AccessType, DataType};
use crate::value::Value;

/// A single addressable OD entry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Entry {
    index: u16,
    sub_index: u8,
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    data_type: DataType,
    access: AccessType,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    bit_fields: Vec<EntryBitField>,
}

impl Entry {
    /// Start building an entry
    pub fn builder(
        index: u16,
        sub_index: u8,
        name: impl Into<String>,
        data_type: DataType,
    ) -> EntryBuilder {
        EntryBuilder {
            entry: Entry {
                index,
                sub_index,
                name: name.into(),
                description: None,
                data_type,
                access: AccessType::default(),
                bit_fields: Vec::new(),
            },
        }
    }

    /// Read-write entry without bit fields
    pub fn new(
        index: u16,
        sub_index: u8,
        name: impl Into<String>,
        data_type: DataType,
    ) -> OdResult<Self> {
        Self::builder(index, sub_index, name, data_type).build()
    }

    pub fn index(&self) -> u16 {
        self.index
    }

    pub fn sub_index(&self) -> u8 {
        self.sub_index
    }

    /// `(index, sub_index)` pair
    pub fn address(&self) -> (u16, u8) {
        (self.index, self.sub_index)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn access(&self) -> AccessType {
        self.access
    }

    pub fn bit_fields(&self) -> &[EntryBitField] {
        &self.bit_fields
    }

    /// Look up a bit field by name
    pub fn bit_field(&self, name: &str) -> OdResult<&EntryBitField> {
        self.bit_fields
            .iter()
            .find(|f| f.name == name)
            .ok_or_else(|| OdError::UnknownBitField {
                entry: self.name.clone(),
                field: name.to_string(),
            })
    }

    /// Encode a value with this entry's data type
    pub fn encode(&self, value: &Value) -> OdResult<Vec<u8>> {
        self.data_type.encode(value)
    }

    /// Decode raw bytes with this entry's data type
    pub fn decode(&self, data: &[u8]) -> OdResult<Value> {
        self.data_type.decode(data)
    }

    /// Extract a named bit field from the entry's raw bytes
    pub fn extract_field(&self, field: &str, data: &[u8]) -> OdResult<FieldValue> {
        let field = self.bit_field(field)?;
        let raw = raw_bits(self.data_type, data)?;
        Ok(field.describe(raw))
    }

    /// Pack a bit field value into the entry's current raw bytes
    ///
    /// Returns the combined bytes to write back.
    pub fn pack_field(&self, field: &str, current: &[u8], input: &FieldInput) -> OdResult<Vec<u8>> {
        let field = self.bit_field(field)?;
        let raw = raw_bits(self.data_type, current)?;
        let packed = field.pack_input(raw, input)?;
        bits_to_bytes(self.data_type, packed)
    }

    /// Check a bit field input without any current value
    ///
    /// Lets callers reject a bad sub-value before the read half of a
    /// read-modify-write.
    pub fn check_field_input(&self, field: &str, input: &FieldInput) -> OdResult<()> {
        self.bit_field(field)?.pack_input(0, input).map(|_| ())
    }

    fn validate(&self) -> OdResult<()> {
        if self.name.trim().is_empty() {
            return Err(OdError::InvalidDefinition {
                target: format_address(self.index, self.sub_index),
                reason: "entry name is empty".to_string(),
            });
        }
        if self.bit_fields.is_empty() {
            return Ok(());
        }

        let container_bits = self.data_type.bit_width().ok_or_else(|| {
            OdError::InvalidDefinition {
                target: self.to_string(),
                reason: format!("bit fields require an integer type, not {}", self.data_type),
            }
        })?;

        for (i, field) in self.bit_fields.iter().enumerate() {
            field.validate(container_bits)?;
            for other in &self.bit_fields[..i] {
                if other.name == field.name {
                    return Err(OdError::InvalidDefinition {
                        target: self.to_string(),
                        reason: format!("duplicate bit field '{}'", field.name),
                    });
                }
                if other.overlaps(field) {
                    return Err(OdError::InvalidDefinition {
                        target: self.to_string(),
                        reason: format!(
                            "bit fields '{}' and '{}' overlap",
                            other.name, field.name
                        ),
                    });
                }
            }
        }
        Ok(())
    }
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({})",
            self.name,
            format_address(self.index, self.sub_index)
        )
    }
}

/// Builder for [`Entry`]
#[derive(Debug, Clone)]
pub struct EntryBuilder {
    entry: Entry,
}

impl EntryBuilder {
    pub fn access(mut self, access: AccessType) -> Self {
        self.entry.access = access;
        self
    }

    pub fn read_only(self) -> Self {
        self.access(AccessType::ReadOnly)
    }

    pub fn write_only(self) -> Self {
        self.access(AccessType::WriteOnly)
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.entry.description = Some(description.into());
        self
    }

    pub fn bit_field(mut self, field: EntryBitField) -> Self {
        self.entry.bit_fields.push(field);
        self
    }

    pub fn bit_fields(mut self, fields: impl IntoIterator<Item = EntryBitField>) -> Self {
        self.entry.bit_fields.extend(fields);
        self
    }

    /// Validate and finish the entry
    pub fn build(self) -> OdResult<Entry> {
        self.entry.validate()?;
        Ok(self.entry)
    }
}
