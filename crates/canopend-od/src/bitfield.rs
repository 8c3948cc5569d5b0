//! Bit fields packed inside integer entries

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{OdError, OdResult};

/// Named bit sub-range within an integer entry's raw value
///
/// Position and width are only set through validated constructors, so every
/// field fits a 64-bit raw value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "BitFieldDef")]
pub struct EntryBitField {
    /// Field name, unique within its entry
    pub name: String,
    /// Bit position of the least significant bit (0 = LSB)
    #[serde(rename = "bit")]
    bit_offset: u8,
    #[serde(rename = "width")]
    bit_width: u8,
    /// Optional meaning of raw sub-values
    #[serde(rename = "labels", skip_serializing_if = "Option::is_none")]
    enum_labels: Option<BTreeMap<u64, String>>,
}

/// Bit field as written in a definition file, before validation
#[derive(Deserialize)]
struct BitFieldDef {
    name: String,
    bit: u8,
    #[serde(default = "default_bit_width")]
    width: u8,
    #[serde(default)]
    labels: Option<BTreeMap<u64, String>>,
}

fn default_bit_width() -> u8 {
    1
}

impl TryFrom<BitFieldDef> for EntryBitField {
    type Error = OdError;

    fn try_from(def: BitFieldDef) -> OdResult<Self> {
        let field = Self {
            name: def.name,
            bit_offset: def.bit,
            bit_width: def.width,
            enum_labels: def.labels,
        };
        field.validate(64)?;
        Ok(field)
    }
}

/// Value extracted from a bit field
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldValue {
    pub raw: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.label {
            Some(label) => write!(f, "{} ({})", label, self.raw),
            None => write!(f, "{}", self.raw),
        }
    }
}

/// Value to pack into a bit field: a raw number or one of its labels
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldInput {
    Raw(u64),
    Label(String),
}

impl From<u64> for FieldInput {
    fn from(v: u64) -> Self {
        FieldInput::Raw(v)
    }
}

impl From<bool> for FieldInput {
    fn from(v: bool) -> Self {
        FieldInput::Raw(u64::from(v))
    }
}

impl From<&str> for FieldInput {
    fn from(v: &str) -> Self {
        FieldInput::Label(v.to_string())
    }
}

impl From<String> for FieldInput {
    fn from(v: String) -> Self {
        FieldInput::Label(v)
    }
}

impl EntryBitField {
    /// Create a bit field without labels
    pub fn new(name: impl Into<String>, bit_offset: u8, bit_width: u8) -> OdResult<Self> {
        let field = Self {
            name: name.into(),
            bit_offset,
            bit_width,
            enum_labels: None,
        };
        field.validate(64)?;
        Ok(field)
    }

    /// Create a single-bit flag
    pub fn flag(name: impl Into<String>, bit: u8) -> OdResult<Self> {
        Self::new(name, bit, 1)
    }

    /// Attach labels for raw sub-values
    pub fn with_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = (u64, S)>,
        S: Into<String>,
    {
        self.enum_labels = Some(labels.into_iter().map(|(k, v)| (k, v.into())).collect());
        self
    }

    pub fn bit_offset(&self) -> u8 {
        self.bit_offset
    }

    pub fn bit_width(&self) -> u8 {
        self.bit_width
    }

    /// Labels keyed by raw sub-value
    pub fn labels(&self) -> Option<&BTreeMap<u64, String>> {
        self.enum_labels.as_ref()
    }

    /// Check the field fits in `container_bits` bits
    pub fn validate(&self, container_bits: u32) -> OdResult<()> {
        let fail = |reason: String| OdError::InvalidDefinition {
            target: format!("bit field '{}'", self.name),
            reason,
        };

        if self.bit_width == 0 {
            return Err(fail("bit width must be at least 1".to_string()));
        }
        let end = self.bit_offset as u32 + self.bit_width as u32;
        if end > container_bits {
            return Err(fail(format!(
                "bits {}..{} exceed the {}-bit value",
                self.bit_offset, end, container_bits
            )));
        }
        if let Some(labels) = &self.enum_labels {
            if let Some(raw) = labels.keys().find(|&&raw| raw > self.max_value()) {
                return Err(fail(format!("label value {} does not fit", raw)));
            }
        }
        Ok(())
    }

    /// Mask of the field's bits, unshifted
    fn value_mask(&self) -> u64 {
        if self.bit_width >= 64 {
            u64::MAX
        } else {
            (1u64 << self.bit_width) - 1
        }
    }

    /// Mask of the field's bits in position
    pub fn mask(&self) -> u64 {
        self.value_mask() << self.bit_offset
    }

    /// Largest sub-value the field can hold
    pub fn max_value(&self) -> u64 {
        self.value_mask()
    }

    /// Check whether two fields share any bit
    pub fn overlaps(&self, other: &EntryBitField) -> bool {
        self.mask() & other.mask() != 0
    }

    /// Extract this field's value from a raw integer
    pub fn extract(&self, raw: u64) -> u64 {
        (raw >> self.bit_offset) & self.value_mask()
    }

    /// Extract this field's value along with its label, if any
    pub fn describe(&self, raw: u64) -> FieldValue {
        let value = self.extract(raw);
        FieldValue {
            raw: value,
            label: self.label_for(value).map(str::to_string),
        }
    }

    /// Label of a sub-value
    pub fn label_for(&self, value: u64) -> Option<&str> {
        self.enum_labels
            .as_ref()
            .and_then(|labels| labels.get(&value))
            .map(String::as_str)
    }

    /// Raw sub-value of a label
    pub fn value_for(&self, label: &str) -> Option<u64> {
        self.enum_labels
            .as_ref()
            .and_then(|labels| labels.iter().find(|(_, l)| l.as_str() == label))
            .map(|(&raw, _)| raw)
    }

    /// Pack a sub-value into a raw integer
    ///
    /// Only the field's own bits change.
    pub fn pack(&self, raw: u64, value: u64) -> OdResult<u64> {
        if value > self.max_value() {
            return Err(OdError::OutOfRange {
                value: value.to_string(),
                min: "0".to_string(),
                max: self.max_value().to_string(),
            });
        }
        Ok((raw & !self.mask()) | (value << self.bit_offset))
    }

    /// Pack a raw number or a label into a raw integer
    pub fn pack_input(&self, raw: u64, input: &FieldInput) -> OdResult<u64> {
        let value = match input {
            FieldInput::Raw(v) => *v,
            FieldInput::Label(label) => {
                self.value_for(label)
                    .ok_or_else(|| OdError::UnknownLabel {
                        field: self.name.clone(),
                        label: label.clone(),
                    })?
            }
        };
        self.pack(raw, value)
    }
}
