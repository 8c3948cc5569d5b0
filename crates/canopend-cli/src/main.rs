//! canopend CLI - Command-line tool for CANopen node daemons
//!
//! Reads and writes object dictionary entries and drives NMT state of the
//! nodes behind a running node daemon.

mod commands;
mod config;
mod output;
mod parse;

use std::path::PathBuf;

use anyhow::{Context, Result};
use canopend_client::{NetworkManagerNodeClient, NodeClient};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::{Config, MergedConfig};
use crate::output::{OutputContext, OutputFormat};
use crate::parse::{parse_node_id, NodeTarget};

#[derive(Parser)]
#[command(name = "canopend-cli")]
#[command(author, version, about = "CANopen node daemon CLI")]
#[command(propagate_version = true)]
struct Cli {
    /// Daemon host
    #[arg(long, env = "CANOPEND_HOST")]
    host: Option<String>,

    /// Daemon IPC port
    #[arg(short, long, env = "CANOPEND_PORT")]
    port: Option<u16>,

    /// Request timeout in milliseconds
    #[arg(short, long, env = "CANOPEND_TIMEOUT_MS")]
    timeout: Option<u64>,

    /// Object dictionary catalog (YAML), merged over the standard entries
    #[arg(long, env = "CANOPEND_CATALOG")]
    catalog: Option<PathBuf>,

    /// Configuration file path
    #[arg(short, long, env = "CANOPEND_CONFIG")]
    config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum)]
    output: Option<OutputFormat>,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Minimal output (for scripting)
    #[arg(short, long)]
    quiet: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List nodes known to the daemon with their NMT state
    Nodes,

    /// List catalog entries
    Entries {
        /// Only entries of this index (e.g. 0x1018)
        #[arg(long)]
        index: Option<String>,
    },

    /// Read entries of one node
    Read {
        /// Node id (e.g. 0x10)
        #[arg(value_parser = parse_node_id)]
        node: u8,

        /// Entry names or addresses (index:sub)
        #[arg(required = true)]
        entries: Vec<String>,

        /// Read one bit field instead of the whole value
        #[arg(long)]
        field: Option<String>,

        /// Data type for addresses missing from the catalog
        #[arg(long = "type", value_name = "TYPE")]
        data_type: Option<String>,
    },

    /// Write an entry of one node
    Write {
        /// Node id (e.g. 0x10)
        #[arg(value_parser = parse_node_id)]
        node: u8,

        /// Entry name or address (index:sub)
        entry: String,

        /// Value to write; bytes as hex, bit fields as number or label
        value: String,

        /// Write one bit field, keeping the other bits
        #[arg(long)]
        field: Option<String>,

        /// Data type for addresses missing from the catalog
        #[arg(long = "type", value_name = "TYPE")]
        data_type: Option<String>,
    },

    /// Read an entry on every node
    ReadAll {
        /// Entry name or address (index:sub)
        entry: String,

        /// Read one bit field instead of the whole value
        #[arg(long)]
        field: Option<String>,

        /// Data type for addresses missing from the catalog
        #[arg(long = "type", value_name = "TYPE")]
        data_type: Option<String>,
    },

    /// Query NMT state
    State {
        /// Node id, or "all"
        target: NodeTarget,
    },

    /// Send an NMT command
    Nmt {
        /// Node id, or "all"
        target: NodeTarget,

        /// Command: start, stop, preop, reset, reset-comm
        command: String,
    },

    /// Ask the daemon to send an emergency message from a node
    Emcy {
        #[arg(value_parser = parse_node_id)]
        node: u8,

        /// Emergency error code (e.g. 0x8130)
        code: String,

        /// Manufacturer-specific info
        #[arg(default_value = "0")]
        info: String,
    },

    /// Ask the daemon to transmit a TPDO of a node
    Tpdo {
        #[arg(value_parser = parse_node_id)]
        node: u8,

        /// TPDO number
        num: u8,
    },

    /// Download a file from a node's read cache
    Fread {
        #[arg(value_parser = parse_node_id)]
        node: u8,

        /// File name in the cache
        name: String,

        /// Write to this path instead of stdout
        #[arg(short = 'O', long = "out")]
        out: Option<PathBuf>,
    },

    /// Upload a local file into a node's write cache
    Fwrite {
        #[arg(value_parser = parse_node_id)]
        node: u8,

        /// Local file to upload
        path: PathBuf,

        /// File name in the cache (defaults to the local file name)
        #[arg(long)]
        name: Option<String>,
    },

    /// Print heartbeats, emergencies and bus status until interrupted
    Monitor {
        /// Only events from this node
        #[arg(long, value_parser = parse_node_id)]
        node: Option<u8>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging; RUST_LOG wins over the default level
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();

    // Load config file
    let config = if let Some(config_path) = &cli.config {
        Config::load_from(config_path)?
    } else {
        Config::load().unwrap_or_default()
    };

    // Merge CLI args with config
    let merged = config.merge_with_args(
        cli.host.as_deref(),
        cli.port,
        cli.timeout,
        cli.catalog.as_deref(),
        cli.no_color,
    );

    let format = match cli.output {
        Some(format) => format,
        None => merged
            .output
            .as_deref()
            .and_then(|s| OutputFormat::from_str(s, true).ok())
            .unwrap_or_default(),
    };

    // Create output context
    let ctx = OutputContext::new(format, merged.no_color, cli.quiet);

    let catalog = merged
        .client
        .load_catalog()
        .context("Failed to load object dictionary catalog")?;

    // Execute command
    match &cli.command {
        Commands::Entries { index } => {
            commands::entries(&catalog, index.as_deref(), &ctx)?;
        }

        Commands::Nodes => {
            let net = connect(&merged).await?;
            commands::nodes(&net, &ctx).await?;
        }

        Commands::Read {
            node,
            entries,
            field,
            data_type,
        } => {
            let net = connect(&merged).await?;
            let client = node_client(&net, *node);
            commands::read(
                &client,
                &catalog,
                entries,
                field.as_deref(),
                data_type.as_deref(),
                &ctx,
            )
            .await?;
        }

        Commands::Write {
            node,
            entry,
            value,
            field,
            data_type,
        } => {
            let net = connect(&merged).await?;
            let client = node_client(&net, *node);
            let entry = parse::resolve_entry(&catalog, entry, data_type.as_deref())?;
            commands::write(&client, &entry, value, field.as_deref(), &ctx).await?;
        }

        Commands::ReadAll {
            entry,
            field,
            data_type,
        } => {
            let net = connect(&merged).await?;
            let entry = parse::resolve_entry(&catalog, entry, data_type.as_deref())?;
            commands::read_all(&net, &entry, field.as_deref(), &ctx).await?;
        }

        Commands::State { target } => {
            let net = connect(&merged).await?;
            commands::state(&net, *target, &ctx).await?;
        }

        Commands::Nmt { target, command } => {
            let net = connect(&merged).await?;
            let command = command
                .parse()
                .with_context(|| format!("Unknown NMT command '{}'", command))?;
            commands::nmt(&net, *target, command, &ctx).await?;
        }

        Commands::Emcy { node, code, info } => {
            let net = connect(&merged).await?;
            let client = node_client(&net, *node);
            commands::emcy(&client, code, info, &ctx).await?;
        }

        Commands::Tpdo { node, num } => {
            let net = connect(&merged).await?;
            let client = node_client(&net, *node);
            commands::tpdo(&client, *num, &ctx).await?;
        }

        Commands::Fread { node, name, out } => {
            let net = connect(&merged).await?;
            let client = node_client(&net, *node);
            commands::fread(&client, name, out.as_deref(), &ctx).await?;
        }

        Commands::Fwrite { node, path, name } => {
            let net = connect(&merged).await?;
            let client = node_client(&net, *node);
            commands::fwrite(&client, path, name.as_deref(), &ctx).await?;
        }

        Commands::Monitor { node } => {
            let net = connect(&merged).await?;
            commands::monitor(&net, *node, &ctx).await?;
        }
    }

    Ok(())
}

/// Connect to the daemon described by the merged configuration
async fn connect(merged: &MergedConfig) -> Result<NetworkManagerNodeClient> {
    tracing::debug!(transport = ?merged.client.transport, "Connecting");
    NetworkManagerNodeClient::connect(&merged.client)
        .await
        .context("Failed to connect to node daemon")
}

/// Client for one node, registered without asking the daemon first
fn node_client(net: &NetworkManagerNodeClient, node_id: u8) -> NodeClient {
    net.add_node(node_id)
}
