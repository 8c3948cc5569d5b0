//! Write command - write an entry or one of its bit fields

use anyhow::{Context, Result};
use canopend_client::NodeClient;
use canopend_od::Entry;

use crate::output::OutputContext;
use crate::parse::{parse_field_input, parse_value};

/// Write a value, parsed according to the entry's data type
pub async fn write(
    client: &NodeClient,
    entry: &Entry,
    value: &str,
    field: Option<&str>,
    ctx: &OutputContext,
) -> Result<()> {
    match field {
        Some(field) => {
            client
                .write_field(entry, field, parse_field_input(value))
                .await
                .with_context(|| format!("Failed to write {}.{}", entry.name(), field))?;
            ctx.success(&format!("Successfully wrote {}.{} = {}", entry.name(), field, value));
        }
        None => {
            let parsed = parse_value(entry.data_type(), value)?;
            client
                .write(entry, &parsed)
                .await
                .with_context(|| format!("Failed to write {}", entry))?;
            ctx.success(&format!("Successfully wrote {} = {}", entry.name(), parsed));
        }
    }
    Ok(())
}
