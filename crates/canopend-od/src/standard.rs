//! Entries every node daemon exposes
//!
//! Communication profile objects from CiA 301 plus the daemon's own
//! time, OS command and file cache objects.

use crate::bitfield::EntryBitField;
use crate::catalog::ObjectDictionary;
use crate::entry::Entry;
use crate::error::OdResult;
use crate::types::{AccessType, DataType};

/// Standard object indices
pub mod index {
    pub const DEVICE_TYPE: u16 = 0x1000;
    pub const ERROR_REGISTER: u16 = 0x1001;
    pub const PREDEFINED_ERROR_FIELD: u16 = 0x1003;
    pub const EMCY_COB_ID: u16 = 0x1014;
    pub const PRODUCER_HEARTBEAT_TIME: u16 = 0x1017;
    pub const IDENTITY: u16 = 0x1018;
    pub const OS_COMMAND: u16 = 0x1023;
    pub const SDO_SERVER_PARAMETER: u16 = 0x1200;
    pub const SDO_CLIENT_PARAMETER: u16 = 0x1280;
    pub const SCET: u16 = 0x2010;
    pub const UTC: u16 = 0x2011;
    pub const FREAD_CACHE: u16 = 0x3004;
    pub const FWRITE_CACHE: u16 = 0x3005;
}

/// Sub-indices shared by the file read and file write caches
pub mod file_cache {
    /// Number of cached files
    pub const FILE_COUNT: u8 = 1;
    /// JSON list of cached file names
    pub const FILES: u8 = 2;
    /// Selects the file the data sub-index refers to
    pub const FILE_NAME: u8 = 3;
    pub const FILE_DATA: u8 = 4;
    /// Writing true deletes the selected file
    pub const REMOVE: u8 = 5;
}

/// Depth of the pre-defined error field history
pub const ERROR_HISTORY_LEN: u8 = 8;

/// Device type (0x1000)
pub fn device_type() -> OdResult<Entry> {
    Entry::builder(index::DEVICE_TYPE, 0, "device_type", DataType::Uint32)
        .read_only()
        .build()
}

/// Error register (0x1001) with the CiA 301 error class bits
pub fn error_register() -> OdResult<Entry> {
    Entry::builder(index::ERROR_REGISTER, 0, "error_register", DataType::Uint8)
        .read_only()
        .bit_field(EntryBitField::flag("generic", 0)?)
        .bit_field(EntryBitField::flag("current", 1)?)
        .bit_field(EntryBitField::flag("voltage", 2)?)
        .bit_field(EntryBitField::flag("temperature", 3)?)
        .bit_field(EntryBitField::flag("communication", 4)?)
        .bit_field(EntryBitField::flag("device_profile", 5)?)
        .bit_field(EntryBitField::flag("manufacturer", 7)?)
        .build()
}

/// Pre-defined error field (0x1003): error count in sub 0, newest error first
pub fn predefined_error_field() -> OdResult<Vec<Entry>> {
    let mut entries = vec![Entry::builder(
        index::PREDEFINED_ERROR_FIELD,
        0,
        "error_count",
        DataType::Uint8,
    )
    .read_only()
    .build()?];
    for sub in 1..=ERROR_HISTORY_LEN {
        entries.push(
            Entry::builder(
                index::PREDEFINED_ERROR_FIELD,
                sub,
                format!("error_field_{}", sub),
                DataType::Uint32,
            )
            .bit_fields([
                EntryBitField::new("error_code", 0, 16)?,
                EntryBitField::new("additional_info", 16, 16)?,
            ])
            .build()?,
        );
    }
    Ok(entries)
}

/// COB-ID of the emergency message (0x1014)
pub fn emcy_cob_id() -> OdResult<Entry> {
    Entry::builder(index::EMCY_COB_ID, 0, "emcy_cob_id", DataType::Uint32)
        .bit_fields([
            EntryBitField::new("can_id", 0, 11)?,
            EntryBitField::flag("invalid", 31)?,
        ])
        .build()
}

/// Producer heartbeat time in milliseconds (0x1017)
pub fn producer_heartbeat_time() -> OdResult<Entry> {
    Entry::new(
        index::PRODUCER_HEARTBEAT_TIME,
        0,
        "producer_heartbeat_time",
        DataType::Uint16,
    )
}

/// Identity object sub-entries (0x1018 sub 1-4)
pub fn identity() -> OdResult<Vec<Entry>> {
    ["vendor_id", "product_code", "revision_number", "serial_number"]
        .iter()
        .enumerate()
        .map(|(i, name)| {
            Entry::builder(index::IDENTITY, i as u8 + 1, *name, DataType::Uint32)
                .read_only()
                .build()
        })
        .collect()
}

/// OS command status (0x1023 sub 2)
pub fn os_command_status() -> OdResult<Entry> {
    Entry::builder(index::OS_COMMAND, 2, "os_command_status", DataType::Uint8)
        .access(AccessType::ReadOnly)
        .bit_field(
            EntryBitField::new("state", 0, 8)?.with_labels([
                (0u64, "no_error_no_reply"),
                (1, "no_error_reply"),
                (2, "error_no_reply"),
                (3, "error_reply"),
                (0xFF, "executing"),
            ]),
        )
        .build()
}

/// SDO COB-ID pair plus peer node id, shared layout of 0x1200 and 0x1280
fn sdo_parameter(index: u16, prefix: &str, peer: &str, peer_type: DataType) -> OdResult<Vec<Entry>> {
    let cob_id = |sub: u8, name: &str| -> OdResult<Entry> {
        Entry::builder(index, sub, format!("{}_{}", prefix, name), DataType::Uint32)
            .bit_fields([
                EntryBitField::new("can_id", 0, 11)?,
                EntryBitField::flag("invalid", 31)?,
            ])
            .build()
    };
    Ok(vec![
        cob_id(1, "cob_id_rx")?,
        cob_id(2, "cob_id_tx")?,
        Entry::new(index, 3, format!("{}_{}", prefix, peer), peer_type)?,
    ])
}

/// SDO server parameter (0x1200 sub 1-3)
pub fn sdo_server_parameter() -> OdResult<Vec<Entry>> {
    sdo_parameter(
        index::SDO_SERVER_PARAMETER,
        "sdo_server",
        "client_node_id",
        DataType::Uint32,
    )
}

/// SDO client parameter (0x1280 sub 1-3)
pub fn sdo_client_parameter() -> OdResult<Vec<Entry>> {
    sdo_parameter(
        index::SDO_CLIENT_PARAMETER,
        "sdo_client",
        "server_node_id",
        DataType::Uint8,
    )
}

/// Spacecraft elapsed time (0x2010)
pub fn scet() -> OdResult<Entry> {
    Entry::builder(index::SCET, 0, "scet", DataType::Uint64)
        .description("CCSDS unsegmented time code")
        .bit_fields([
            EntryBitField::new("fine_time", 0, 24)?,
            EntryBitField::new("coarse_time", 32, 32)?,
        ])
        .build()
}

/// UTC time (0x2011)
pub fn utc() -> OdResult<Entry> {
    Entry::builder(index::UTC, 0, "utc", DataType::Uint64)
        .description("CCSDS day segmented time code")
        .bit_fields([
            EntryBitField::new("sub_ms", 0, 16)?,
            EntryBitField::new("ms_of_day", 16, 32)?,
            EntryBitField::new("day", 48, 16)?,
        ])
        .build()
}

fn file_cache_entries(index: u16, prefix: &str, data_access: AccessType) -> OdResult<Vec<Entry>> {
    let name = |what: &str| format!("{}_{}", prefix, what);
    Ok(vec![
        Entry::builder(index, file_cache::FILE_COUNT, name("file_count"), DataType::Uint8)
            .read_only()
            .build()?,
        Entry::builder(index, file_cache::FILES, name("files"), DataType::Domain)
            .read_only()
            .description("JSON array of file names")
            .build()?,
        Entry::new(index, file_cache::FILE_NAME, name("file_name"), DataType::Domain)?,
        Entry::builder(index, file_cache::FILE_DATA, name("file_data"), DataType::Domain)
            .access(data_access)
            .build()?,
        Entry::builder(index, file_cache::REMOVE, name("remove"), DataType::Boolean)
            .write_only()
            .build()?,
    ])
}

/// File read cache (0x3004): files the node offers for download
pub fn fread_cache() -> OdResult<Vec<Entry>> {
    file_cache_entries(index::FREAD_CACHE, "fread", AccessType::ReadOnly)
}

/// File write cache (0x3005): files uploaded to the node
pub fn fwrite_cache() -> OdResult<Vec<Entry>> {
    file_cache_entries(index::FWRITE_CACHE, "fwrite", AccessType::WriteOnly)
}

/// Catalog holding every standard entry
pub fn catalog() -> OdResult<ObjectDictionary> {
    let mut entries = vec![
        device_type()?,
        error_register()?,
        emcy_cob_id()?,
        producer_heartbeat_time()?,
        os_command_status()?,
        scet()?,
        utc()?,
    ];
    entries.extend(predefined_error_field()?);
    entries.extend(identity()?);
    entries.extend(sdo_server_parameter()?);
    entries.extend(sdo_client_parameter()?);
    entries.extend(fread_cache()?);
    entries.extend(fwrite_cache()?);
    ObjectDictionary::from_entries(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_catalog_is_valid() {
        let od = catalog().unwrap();
        assert_eq!(od.len(), 36);
        assert_eq!(od.sub_entries(index::IDENTITY).len(), 4);
        assert_eq!(od.sub_entries(index::PREDEFINED_ERROR_FIELD).len(), 9);
        assert_eq!(od.sub_entries(index::SDO_SERVER_PARAMETER).len(), 3);
        assert_eq!(
            od.get_by_name("sdo_client_server_node_id").unwrap().data_type(),
            DataType::Uint8
        );
        assert_eq!(
            od.get_by_name("serial_number").unwrap().address(),
            (0x1018, 4)
        );
    }

    #[test]
    fn test_error_register_bits() {
        let entry = error_register().unwrap();
        let generic = entry.extract_field("generic", &[0x11]).unwrap();
        let comm = entry.extract_field("communication", &[0x11]).unwrap();
        let temp = entry.extract_field("temperature", &[0x11]).unwrap();
        assert_eq!((generic.raw, comm.raw, temp.raw), (1, 1, 0));
    }

    #[test]
    fn test_file_caches() {
        let od = catalog().unwrap();
        let fread_data = od.get(index::FREAD_CACHE, file_cache::FILE_DATA).unwrap();
        assert_eq!(fread_data.name(), "fread_file_data");
        assert_eq!(fread_data.data_type(), DataType::Domain);
        assert_eq!(fread_data.access(), AccessType::ReadOnly);

        let fwrite_data = od.get(index::FWRITE_CACHE, file_cache::FILE_DATA).unwrap();
        assert_eq!(fwrite_data.access(), AccessType::WriteOnly);
        assert_eq!(
            od.get_by_name("fwrite_file_name").unwrap().address(),
            (0x3005, 3)
        );
        assert_eq!(
            od.get(index::FREAD_CACHE, file_cache::REMOVE).unwrap().access(),
            AccessType::WriteOnly
        );
    }

    #[test]
    fn test_cob_id_fields() {
        let entry = emcy_cob_id().unwrap();
        let data = 0x8000_0081u32.to_le_bytes();
        assert_eq!(entry.extract_field("can_id", &data).unwrap().raw, 0x81);
        assert_eq!(entry.extract_field("invalid", &data).unwrap().raw, 1);

        let history = predefined_error_field().unwrap();
        let newest = &history[1];
        assert_eq!(newest.address(), (0x1003, 1));
        let data = 0x0002_8130u32.to_le_bytes();
        assert_eq!(newest.extract_field("error_code", &data).unwrap().raw, 0x8130);
    }

    #[test]
    fn test_os_command_labels() {
        let entry = os_command_status().unwrap();
        let state = entry.extract_field("state", &[0xFF]).unwrap();
        assert_eq!(state.label.as_deref(), Some("executing"));
    }
}
