//! canopend-client - Async client for CANopen node daemons
//!
//! Reads and writes object dictionary entries of nodes served by a running
//! node daemon, and observes or drives their NMT state.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                NetworkManagerNodeClient                     │
//! │  node id -> NodeClient registry, concurrent fan-out         │
//! │                                                             │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────┐          │
//! │  │ NodeClient  │  │ NodeClient  │  │ NodeClient  │  ...     │
//! │  │ (node 0x01) │  │ (node 0x02) │  │ (node 0x03) │          │
//! │  └──────┬──────┘  └──────┬──────┘  └──────┬──────┘          │
//! │         └────────────────┼────────────────┘                 │
//! │                 ┌────────┴────────┐                         │
//! │                 │ DaemonTransport │                         │
//! │                 │  (TCP / mock)   │                         │
//! │                 └─────────────────┘                         │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use canopend_client::{ClientConfig, NetworkManagerNodeClient, NmtCommand};
//! use canopend_od::{standard, Value};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let net = NetworkManagerNodeClient::connect(&ClientConfig::default()).await?;
//!     net.list_nodes().await?;
//!
//!     let heartbeat = standard::producer_heartbeat_time()?;
//!     for (node_id, result) in net.write_all(&heartbeat, &Value::UInt(1000)).await {
//!         if let Err(e) = result {
//!             eprintln!("node {}: {}", node_id, e);
//!         }
//!     }
//!
//!     if let Some(node) = net.node(0x10) {
//!         node.state().await?;
//!         node.send_command(NmtCommand::Start).await?;
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Testing
//!
//! The `testing` module serves an in-memory [`MockDaemon`](transport::mock::MockDaemon)
//! over loopback TCP:
//!
//! ```rust,ignore
//! use canopend_client::testing::TestDaemon;
//!
//! let server = TestDaemon::start(daemon).await?;
//! let net = server.connect().await?;
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod network;
pub mod nmt;
pub mod protocol;
pub mod testing;
pub mod transport;

pub use client::{NodeAccess, NodeClient};
pub use config::{ClientConfig, MockConfig, TcpConfig, TransportConfig};
pub use error::{ClientError, ClientResult};
pub use network::{NetworkManagerNodeClient, NodeResults};
pub use nmt::{NmtCommand, NodeState};
pub use transport::{create_transport, DaemonTransport, IncomingEvent, TransportError};

// Re-export the entry model for convenience
pub use canopend_od::{
    AccessType, DataType, Entry, EntryBitField, FieldInput, FieldValue, ObjectDictionary, Value,
};
