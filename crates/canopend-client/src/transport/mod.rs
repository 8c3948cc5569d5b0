//! Transport layer for daemon communication
//!
//! This module provides transports for talking to a node daemon:
//! - TCP transport for the daemon's IPC port
//! - Mock daemon for testing
//!
//! # Example
//!
//! ```ignore
//! use canopend_client::transport::{create_transport, DaemonTransport};
//! use canopend_client::config::TransportConfig;
//!
//! let transport = create_transport(&TransportConfig::default()).await?;
//! let response = transport
//!     .request(Request::GetState { node_id: 0x10 }, Duration::from_secs(1))
//!     .await?;
//! ```

mod adapter;
pub mod error;
pub mod mock;
pub mod tcp;

pub use adapter::{DaemonTransport, IncomingEvent};
pub use error::TransportError;

use std::sync::Arc;

use crate::config::TransportConfig;

/// Create a transport based on configuration
pub async fn create_transport(
    config: &TransportConfig,
) -> Result<Arc<dyn DaemonTransport>, TransportError> {
    match config {
        TransportConfig::Tcp(cfg) => {
            let transport = tcp::TcpTransport::connect(cfg).await?;
            Ok(Arc::new(transport))
        }
        TransportConfig::Mock(cfg) => {
            let daemon = mock::MockDaemon::new(cfg);
            Ok(Arc::new(daemon))
        }
    }
}
