//! State and NMT commands

use anyhow::{Context, Result};
use canopend_client::{NetworkManagerNodeClient, NmtCommand, NodeResults};

use crate::output::{node_label, NodeResultRow, NodeRow, OutputContext};
use crate::parse::NodeTarget;

/// Query the NMT state of one node or of every node
pub async fn state(
    net: &NetworkManagerNodeClient,
    target: NodeTarget,
    ctx: &OutputContext,
) -> Result<()> {
    let states = match target {
        NodeTarget::Node(node_id) => {
            let client = net.add_node(node_id);
            let state = client.state().await?;
            NodeResults::from([(node_id, Ok(state))])
        }
        NodeTarget::All => {
            net.list_nodes().await?;
            net.state_all().await
        }
    };

    let rows: Vec<NodeRow> = states
        .into_iter()
        .map(|(node_id, state)| NodeRow {
            node: node_label(node_id),
            state: state.map_or_else(|e| format!("Error: {}", e), |s| s.to_string()),
        })
        .collect();
    ctx.print(&rows);
    Ok(())
}

/// Send an NMT command
///
/// The state is queried first so the transition guard sees a fresh
/// observation.
pub async fn nmt(
    net: &NetworkManagerNodeClient,
    target: NodeTarget,
    command: NmtCommand,
    ctx: &OutputContext,
) -> Result<()> {
    match target {
        NodeTarget::Node(node_id) => {
            let client = net.add_node(node_id);
            client
                .state()
                .await
                .with_context(|| format!("Failed to query node {}", node_label(node_id)))?;
            client
                .send_command(command)
                .await
                .with_context(|| format!("Failed to send {} to node {}", command, node_label(node_id)))?;
            ctx.success(&format!("Sent {} to node {}", command, node_label(node_id)));
        }
        NodeTarget::All => {
            net.list_nodes().await?;
            net.state_all().await;
            let results = net.broadcast_command(command).await;

            let failed = results.values().filter(|r| r.is_err()).count();
            let rows: Vec<NodeResultRow> = results
                .into_iter()
                .map(|(node_id, result)| NodeResultRow {
                    node: node_label(node_id),
                    result: result.map_or_else(|e| format!("Error: {}", e), |_| "ok".to_string()),
                })
                .collect();
            ctx.print(&rows);
            if failed > 0 {
                ctx.warn(&format!("{} node(s) did not accept {}", failed, command));
            }
        }
    }
    Ok(())
}
