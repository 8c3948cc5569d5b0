//! canopend-od - CANopen Object Dictionary Library
//!
//! Typed encoding and decoding of object dictionary (OD) entries as exposed
//! by a CANopen node daemon. Entries are addressed by `(index, sub_index)`,
//! carry one of the CiA 301 data types and may describe named bit fields
//! packed into an integer value.
//!
//! # Features
//!
//! - **Typed addresses** - indices are `u16`, sub-indices `u8`
//! - **Range-checked encoding** - values outside the type's range never reach the wire
//! - **Bit fields** - named sub-values with optional labels
//! - **YAML definition files** - load a node's catalog from disk
//! - **Immutable catalog** - validated once, installable as process-wide state
//!
//! # Quick Start
//!
//! ```rust
//! use canopend_od::{DataType, Entry, EntryBitField, FieldInput, Value};
//!
//! let status = Entry::builder(0x2000, 1, "status", DataType::Uint16)
//!     .bit_field(EntryBitField::flag("enabled", 0).unwrap())
//!     .bit_field(EntryBitField::new("mode", 1, 3).unwrap())
//!     .build()
//!     .unwrap();
//!
//! let bytes = status.encode(&Value::UInt(5)).unwrap();
//! assert_eq!(bytes, vec![0x05, 0x00]);
//! assert_eq!(status.extract_field("mode", &bytes).unwrap().raw, 2);
//!
//! let packed = status.pack_field("mode", &bytes, &FieldInput::Raw(5)).unwrap();
//! assert_eq!(packed, vec![0x0B, 0x00]);
//! ```
//!
//! # YAML Definition Files
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
//!     bits:
//!       - name: enabled
//!         bit: 0
//!       - name: mode
//!         bit: 1
//!         width: 3
//!
//!   - index: 0x2000
//!     sub_index: 2
//!     name: gain
//!     type: real32
//!     access: rw
//! ```
//!
//! # Data Types
//!
//! | Type | Code | Size |
//! |------|------|------|
//! | boolean | 0x01 | 1 |
//! | int8 / int16 / int32 / int64 | 0x02 / 0x03 / 0x04 / 0x15 | 1 / 2 / 4 / 8 |
//! | uint8 / uint16 / uint32 / uint64 | 0x05 / 0x06 / 0x07 / 0x1B | 1 / 2 / 4 / 8 |
//! | real32 / real64 | 0x08 / 0x11 | 4 / 8 |
//! | visible_string[n] | 0x09 | n |
//! | octet_string[n] | 0x0A | n |
//! | domain | 0x0F | any |

pub mod bitfield;
pub mod catalog;
pub mod decode;
pub mod definition;
pub mod encode;
pub mod entry;
pub mod error;
pub mod standard;
pub mod types;
pub mod value;

// Re-export main types
pub use bitfield::{EntryBitField, FieldInput, FieldValue};
pub use catalog::ObjectDictionary;
pub use definition::{CatalogMeta, DefinitionFile, EntryDefinition};
pub use entry::{Entry, EntryBuilder};
pub use error::{format_address, parse_address, parse_int, OdError, OdResult};
pub use types::{AccessType, DataType};
pub use value::Value;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::bitfield::{EntryBitField, FieldInput, FieldValue};
    pub use crate::catalog::ObjectDictionary;
    pub use crate::entry::Entry;
    pub use crate::error::{OdError, OdResult};
    pub use crate::types::{AccessType, DataType};
    pub use crate::value::Value;
}
