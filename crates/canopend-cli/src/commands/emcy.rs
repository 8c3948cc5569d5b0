//! EMCY and TPDO commands - ask the daemon to transmit on a node's behalf

use anyhow::{Context, Result};
use canopend_client::NodeClient;

use crate::output::{node_label, OutputContext};
use crate::parse::parse_number;

/// Send an emergency message
pub async fn emcy(client: &NodeClient, code: &str, info: &str, ctx: &OutputContext) -> Result<()> {
    let code: u16 = parse_number(code, "emergency code")?;
    let info: u32 = parse_number(info, "emergency info")?;

    client
        .send_emcy(code, info)
        .await
        .context("Failed to send emergency")?;
    ctx.success(&format!(
        "Sent EMCY 0x{:04X} from node {}",
        code,
        node_label(client.node_id())
    ));
    Ok(())
}

/// Transmit a TPDO
pub async fn tpdo(client: &NodeClient, num: u8, ctx: &OutputContext) -> Result<()> {
    client
        .send_tpdo(num)
        .await
        .with_context(|| format!("Failed to send TPDO {}", num))?;
    ctx.success(&format!(
        "Sent TPDO {} of node {}",
        num,
        node_label(client.node_id())
    ));
    Ok(())
}
