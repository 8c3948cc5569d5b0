//! Errors on the daemon IPC channel

use thiserror::Error;

/// Failure to exchange frames with the node daemon
///
/// These say nothing about the node itself; node-level refusals arrive as
/// daemon error replies instead.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Daemon socket could not be opened
    #[error("Cannot reach node daemon: {0}")]
    ConnectionFailed(String),

    /// Daemon went away; every outstanding request fails with this
    #[error("Node daemon connection closed")]
    ConnectionClosed,

    /// Request frame was not handed to the daemon
    #[error("Cannot send request to node daemon: {0}")]
    SendFailed(String),

    #[error("Cannot read from node daemon: {0}")]
    ReceiveFailed(String),

    /// No reply within the request timeout
    #[error("Node daemon did not answer: {0}")]
    Timeout(String),

    /// Bad length prefix, short header or undecodable payload
    #[error("Malformed daemon frame: {0}")]
    MalformedFrame(String),
}

impl TransportError {
    /// True when the connection is unusable and must be re-established
    pub fn is_connection_lost(&self) -> bool {
        matches!(
            self,
            TransportError::ConnectionFailed(_)
                | TransportError::ConnectionClosed
                | TransportError::ReceiveFailed(_)
        )
    }
}
