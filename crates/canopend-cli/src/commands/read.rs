//! Read command - read entries of one node or of every node

use anyhow::Result;
use canopend_client::{NetworkManagerNodeClient, NodeClient};
use canopend_od::{format_address, Entry, ObjectDictionary};

use crate::output::{node_label, NodeValueRow, OutputContext, ValueRow};
use crate::parse::resolve_entry;

/// Read one or more entries of a node
///
/// A failing entry is reported in its row; the others are still read.
pub async fn read(
    client: &NodeClient,
    catalog: &ObjectDictionary,
    identifiers: &[String],
    field: Option<&str>,
    data_type: Option<&str>,
    ctx: &OutputContext,
) -> Result<()> {
    let mut rows = Vec::with_capacity(identifiers.len());
    for identifier in identifiers {
        let entry = resolve_entry(catalog, identifier, data_type)?;
        let (value, raw) = match read_one(client, &entry, field).await {
            Ok(read) => read,
            Err(e) => (format!("Error: {}", e), String::new()),
        };
        rows.push(ValueRow {
            entry: entry.name().to_string(),
            address: format_address(entry.index(), entry.sub_index()),
            value,
            raw,
        });
    }

    ctx.print(&rows);
    Ok(())
}

/// Display value and raw hex of one entry or one of its bit fields
async fn read_one(
    client: &NodeClient,
    entry: &Entry,
    field: Option<&str>,
) -> canopend_client::ClientResult<(String, String)> {
    let raw = client.read_raw(entry).await?;
    let value = match field {
        Some(field) => entry.extract_field(field, &raw)?.to_string(),
        None => entry.decode(&raw)?.to_string(),
    };
    Ok((value, hex::encode(&raw)))
}

/// Read one entry on every node the daemon knows
pub async fn read_all(
    net: &NetworkManagerNodeClient,
    entry: &Entry,
    field: Option<&str>,
    ctx: &OutputContext,
) -> Result<()> {
    net.list_nodes().await?;

    let rows: Vec<NodeValueRow> = match field {
        Some(field) => net
            .read_field_all(entry, field)
            .await
            .into_iter()
            .map(|(node_id, result)| NodeValueRow {
                node: node_label(node_id),
                value: result.map_or_else(|e| format!("Error: {}", e), |v| v.to_string()),
            })
            .collect(),
        None => net
            .read_all(entry)
            .await
            .into_iter()
            .map(|(node_id, result)| NodeValueRow {
                node: node_label(node_id),
                value: result.map_or_else(|e| format!("Error: {}", e), |v| v.to_string()),
            })
            .collect(),
    };

    ctx.print(&rows);
    Ok(())
}
