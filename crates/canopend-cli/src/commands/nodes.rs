//! Nodes command - list nodes known to the daemon

use anyhow::Result;
use canopend_client::NetworkManagerNodeClient;

use crate::output::{node_label, NodeRow, OutputContext};

/// List nodes with their current NMT state
pub async fn nodes(net: &NetworkManagerNodeClient, ctx: &OutputContext) -> Result<()> {
    net.list_nodes().await?;
    let states = net.state_all().await;

    let rows: Vec<NodeRow> = states
        .into_iter()
        .map(|(node_id, state)| NodeRow {
            node: node_label(node_id),
            state: match state {
                Ok(state) => state.to_string(),
                Err(e) => format!("Error: {}", e),
            },
        })
        .collect();

    ctx.print(&rows);
    Ok(())
}
