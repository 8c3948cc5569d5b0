//! File commands - move files through a node's file caches

use std::path::Path;

use anyhow::{Context, Result};
use canopend_client::NodeClient;

use crate::output::{node_label, OutputContext};

/// Download a file from the node's read cache
///
/// Without an output path the file goes to stdout.
pub async fn fread(
    client: &NodeClient,
    name: &str,
    out: Option<&Path>,
    ctx: &OutputContext,
) -> Result<()> {
    let data = client
        .read_file(name)
        .await
        .with_context(|| format!("Failed to read '{}'", name))?;

    match out {
        Some(path) => {
            std::fs::write(path, &data)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            ctx.success(&format!(
                "Read {} bytes of '{}' from node {} into {}",
                data.len(),
                name,
                node_label(client.node_id()),
                path.display()
            ));
        }
        None => {
            use std::io::Write;
            std::io::stdout()
                .write_all(&data)
                .context("Failed to write to stdout")?;
        }
    }
    Ok(())
}

/// Upload a local file into the node's write cache
///
/// The cache name defaults to the local file name.
pub async fn fwrite(
    client: &NodeClient,
    path: &Path,
    name: Option<&str>,
    ctx: &OutputContext,
) -> Result<()> {
    let name = match name {
        Some(name) => name.to_string(),
        None => path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .with_context(|| format!("Cannot derive a file name from {}", path.display()))?,
    };
    let data =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;

    client
        .write_file(&name, &data)
        .await
        .with_context(|| format!("Failed to write '{}'", name))?;
    ctx.success(&format!(
        "Wrote {} bytes as '{}' to node {}",
        data.len(),
        name,
        node_label(client.node_id())
    ));
    Ok(())
}
