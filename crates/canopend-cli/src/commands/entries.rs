//! Entries command - list the object dictionary catalog

use anyhow::{Context, Result};
use canopend_od::{format_address, parse_int, ObjectDictionary};

use crate::output::{EntryDefRow, OutputContext};

/// List catalog entries, optionally of one index only
pub fn entries(catalog: &ObjectDictionary, index: Option<&str>, ctx: &OutputContext) -> Result<()> {
    let selected = match index {
        Some(index) => {
            let index = u16::try_from(parse_int(index)?)
                .ok()
                .with_context(|| format!("Index '{}' out of range", index))?;
            catalog.sub_entries(index)
        }
        None => catalog.iter().cloned().collect(),
    };

    let rows: Vec<EntryDefRow> = selected
        .iter()
        .map(|entry| EntryDefRow {
            address: format_address(entry.index(), entry.sub_index()),
            name: entry.name().to_string(),
            data_type: entry.data_type().to_string(),
            access: entry.access().to_string(),
            fields: entry
                .bit_fields()
                .iter()
                .map(|f| f.name.as_str())
                .collect::<Vec<_>>()
                .join(" "),
        })
        .collect();

    ctx.print(&rows);
    Ok(())
}
