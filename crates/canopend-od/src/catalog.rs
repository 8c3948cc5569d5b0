//! Object dictionary catalog
//!
//! The static set of entry definitions a client works with. A catalog is
//! validated once when it is built and has no mutation API afterwards; it can
//! be installed as process-wide state before any client is created.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Arc, OnceLock};

use crate::definition::{CatalogMeta, DefinitionFile, EntryDefinition};
use crate::entry::Entry;
use crate::error::{format_address, parse_address, OdError, OdResult};

static GLOBAL: OnceLock<ObjectDictionary> = OnceLock::new();

/// Immutable catalog of OD entries
#[derive(Debug, Clone, Default)]
pub struct ObjectDictionary {
    entries: BTreeMap<(u16, u8), Arc<Entry>>,
    names: HashMap<String, (u16, u8)>,
    meta: CatalogMeta,
}

impl ObjectDictionary {
    /// Build a catalog, rejecting duplicate addresses and names
    pub fn from_entries(entries: impl IntoIterator<Item = Entry>) -> OdResult<Self> {
        Self::with_meta(CatalogMeta::default(), entries)
    }

    /// Build a catalog with metadata
    pub fn with_meta(
        meta: CatalogMeta,
        entries: impl IntoIterator<Item = Entry>,
    ) -> OdResult<Self> {
        let mut od = Self {
            entries: BTreeMap::new(),
            names: HashMap::new(),
            meta,
        };

        for entry in entries {
            let address = entry.address();
            if od.entries.contains_key(&address) {
                return Err(OdError::DuplicateEntry(format_address(address.0, address.1)));
            }
            if od.names.contains_key(entry.name()) {
                return Err(OdError::DuplicateEntry(format!("name '{}'", entry.name())));
            }
            od.names.insert(entry.name().to_string(), address);
            od.entries.insert(address, Arc::new(entry));
        }

        Ok(od)
    }

    /// Load a catalog from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> OdResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Load a catalog from a YAML string
    pub fn from_yaml(yaml: &str) -> OdResult<Self> {
        let file: DefinitionFile = serde_yaml::from_str(yaml)?;
        let entries = file
            .entries
            .into_iter()
            .map(EntryDefinition::into_entry)
            .collect::<OdResult<Vec<_>>>()?;
        Self::with_meta(file.meta.unwrap_or_default(), entries)
    }

    /// Serialize the catalog back to YAML
    pub fn to_yaml(&self) -> OdResult<String> {
        let file = DefinitionFile {
            meta: Some(self.meta.clone()),
            entries: self.entries.values().map(|e| e.as_ref().into()).collect(),
        };
        Ok(serde_yaml::to_string(&file)?)
    }

    /// Merge another catalog into a new one, still rejecting duplicates
    pub fn merge(&self, other: &ObjectDictionary) -> OdResult<Self> {
        let entries = self
            .entries
            .values()
            .chain(other.entries.values())
            .map(|e| e.as_ref().clone());
        Self::with_meta(self.meta.clone(), entries)
    }

    /// Install this catalog as process-wide state
    ///
    /// Fails if a catalog was already installed.
    pub fn install(self) -> OdResult<&'static ObjectDictionary> {
        GLOBAL.set(self).map_err(|_| OdError::AlreadyInstalled)?;
        GLOBAL.get().ok_or(OdError::AlreadyInstalled)
    }

    /// The installed process-wide catalog, if any
    pub fn global() -> Option<&'static ObjectDictionary> {
        GLOBAL.get()
    }

    pub fn meta(&self) -> &CatalogMeta {
        &self.meta
    }

    /// Get an entry by address
    pub fn get(&self, index: u16, sub_index: u8) -> Option<Arc<Entry>> {
        self.entries.get(&(index, sub_index)).cloned()
    }

    /// Get an entry by name
    pub fn get_by_name(&self, name: &str) -> Option<Arc<Entry>> {
        self.names
            .get(name)
            .and_then(|address| self.entries.get(address))
            .cloned()
    }

    /// Resolve an identifier - tries the entry name first, then `index:sub_index`
    pub fn resolve(&self, identifier: &str) -> Option<Arc<Entry>> {
        if let Some(entry) = self.get_by_name(identifier) {
            return Some(entry);
        }
        parse_address(identifier)
            .ok()
            .and_then(|(index, sub_index)| self.get(index, sub_index))
    }

    /// Check if an address is defined
    pub fn contains(&self, index: u16, sub_index: u8) -> bool {
        self.entries.contains_key(&(index, sub_index))
    }

    /// Entries in address order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Entry>> {
        self.entries.values()
    }

    /// All sub-entries of one index, in sub-index order
    pub fn sub_entries(&self, index: u16) -> Vec<Arc<Entry>> {
        self.entries
            .range((index, 0)..=(index, u8::MAX))
            .map(|(_, e)| e.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DataType;

    fn entry(index: u16, sub: u8, name: &str) -> Entry {
        Entry::new(index, sub, name, DataType::Uint8).unwrap()
    }

    #[test]
    fn test_lookup() {
        let od = ObjectDictionary::from_entries([
            entry(0x2000, 1, "a"),
            entry(0x2000, 2, "b"),
            entry(0x2001, 0, "c"),
        ])
        .unwrap();

        assert_eq!(od.len(), 3);
        assert_eq!(od.get(0x2000, 2).unwrap().name(), "b");
        assert_eq!(od.get_by_name("c").unwrap().address(), (0x2001, 0));
        assert_eq!(od.resolve("0x2000:1").unwrap().name(), "a");
        assert_eq!(od.resolve("a").unwrap().address(), (0x2000, 1));
        assert!(od.resolve("0x3000:0").is_none());
        assert_eq!(od.sub_entries(0x2000).len(), 2);
        assert!(od.contains(0x2001, 0));
    }

    #[test]
    fn test_duplicate_address_rejected() {
        let err = ObjectDictionary::from_entries([entry(0x2000, 1, "a"), entry(0x2000, 1, "b")])
            .unwrap_err();
        assert!(matches!(err, OdError::DuplicateEntry(_)));
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let err = ObjectDictionary::from_entries([entry(0x2000, 1, "a"), entry(0x2000, 2, "a")])
            .unwrap_err();
        assert!(matches!(err, OdError::DuplicateEntry(_)));
    }

    #[test]
    fn test_yaml_round_trip() {
        let yaml = r#"
meta:
  name: test node
entries:
  - index: "0x2000"
    sub_index: 1
    name: status
    type: uint16
    bits:
      - name: enabled
        bit: 0
"#;
        let od = ObjectDictionary::from_yaml(yaml).unwrap();
        let reloaded = ObjectDictionary::from_yaml(&od.to_yaml().unwrap()).unwrap();
        assert_eq!(reloaded.meta().name.as_deref(), Some("test node"));
        assert_eq!(
            reloaded.get(0x2000, 1).unwrap().as_ref(),
            od.get(0x2000, 1).unwrap().as_ref()
        );
    }

    #[test]
    fn test_invalid_yaml_entry_rejected() {
        let yaml = r#"
entries:
  - index: "0x2000"
    name: gain
    type: real32
    bits:
      - name: sign
        bit: 31
"#;
        assert!(matches!(
            ObjectDictionary::from_yaml(yaml),
            Err(OdError::InvalidDefinition { .. })
        ));
    }

    #[test]
    fn test_merge_rejects_overlap() {
        let a = ObjectDictionary::from_entries([entry(0x2000, 1, "a")]).unwrap();
        let b = ObjectDictionary::from_entries([entry(0x2000, 2, "b")]).unwrap();
        assert_eq!(a.merge(&b).unwrap().len(), 2);
        assert!(a.merge(&a).is_err());
    }
}
