//! Client errors
//!
//! Local errors (`Range`, `TypeMismatch`, `Access`, `InvalidTransition`,
//! `InvalidArgument`, `Config`) are raised before any request is sent and
//! never leave partial remote state. Remote errors after a write leave the
//! entry in an unknown state: the daemon may or may not have applied it.
//! Nothing here is retried automatically.

use canopend_od::{AccessType, OdError};
use thiserror::Error;

use crate::nmt::{NmtCommand, NodeState};
use crate::protocol::{abort, DaemonError};
use crate::transport::TransportError;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ClientError {
    /// Value outside the entry's or bit field's valid domain
    #[error("Value out of range: {0}")]
    Range(String),

    /// Value variant disagrees with the entry's data type
    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    /// Operation disallowed by the entry's access policy
    #[error("Access denied: cannot {operation} '{entry}' ({access})")]
    Access {
        entry: String,
        access: AccessType,
        operation: &'static str,
    },

    /// Daemon returned bytes that do not fit the entry
    #[error("Malformed data: {0}")]
    Malformed(String),

    /// Address or node unknown to the daemon
    #[error("Not found: {0}")]
    NotFound(String),

    /// NMT command rejected by the local transition guard
    #[error("Invalid transition: {command} from observed state {from}")]
    InvalidTransition { from: NodeState, command: NmtCommand },

    /// No response within the request deadline
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Channel failure
    #[error("Transport error: {0}")]
    Transport(TransportError),

    /// Daemon refused the request
    #[error("Rejected by daemon: {message}")]
    Rejected { code: Option<u32>, message: String },

    /// Caller passed an argument that names nothing known
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Configuration or catalog problem
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ClientError {
    /// Detected locally, before any round trip
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            ClientError::Range(_)
                | ClientError::TypeMismatch(_)
                | ClientError::Access { .. }
                | ClientError::InvalidTransition { .. }
                | ClientError::InvalidArgument(_)
                | ClientError::Config(_)
        )
    }

    /// Channel-level failure a caller may choose to retry
    ///
    /// Retrying a write is only safe when the write is idempotent.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ClientError::Timeout(_) | ClientError::Transport(_))
    }

    /// The daemon connection is gone; nothing will succeed until reconnect
    pub fn is_connection_lost(&self) -> bool {
        matches!(self, ClientError::Transport(e) if e.is_connection_lost())
    }

    /// The CiA 301 abort code, when the daemon sent one
    pub fn abort_code(&self) -> Option<u32> {
        match self {
            ClientError::Rejected { code, .. } => *code,
            _ => None,
        }
    }
}

impl From<OdError> for ClientError {
    fn from(err: OdError) -> Self {
        match err {
            OdError::OutOfRange { .. }
            | OdError::Inexact { .. }
            | OdError::UnknownLabel { .. } => ClientError::Range(err.to_string()),
            OdError::TypeMismatch { .. } => ClientError::TypeMismatch(err.to_string()),
            OdError::Malformed { .. } => ClientError::Malformed(err.to_string()),
            OdError::UnknownBitField { .. } | OdError::InvalidAddress(_) => {
                ClientError::InvalidArgument(err.to_string())
            }
            OdError::InvalidDefinition { .. }
            | OdError::DuplicateEntry(_)
            | OdError::AlreadyInstalled
            | OdError::Yaml(_)
            | OdError::Io(_) => ClientError::Config(err.to_string()),
        }
    }
}

impl From<TransportError> for ClientError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Timeout(msg) => ClientError::Timeout(msg),
            TransportError::MalformedFrame(msg) => ClientError::Malformed(msg),
            other => ClientError::Transport(other),
        }
    }
}

impl From<DaemonError> for ClientError {
    fn from(err: DaemonError) -> Self {
        match err {
            DaemonError::Abort(code) if abort::is_not_found(code) => ClientError::NotFound(
                format!("{} (abort 0x{:08X})", abort::description(code), code),
            ),
            DaemonError::Abort(code) => ClientError::Rejected {
                code: Some(code),
                message: format!("{} (abort 0x{:08X})", abort::description(code), code),
            },
            DaemonError::UnknownNode(node_id) => {
                ClientError::NotFound(format!("node 0x{:02X}", node_id))
            }
            DaemonError::BadTpdo(num) => ClientError::Rejected {
                code: None,
                message: format!("node has no TPDO {}", num),
            },
            DaemonError::UnknownMessage(id) => {
                ClientError::Malformed(format!("daemon does not know message 0x{:02X}", id))
            }
            DaemonError::BadLength => {
                ClientError::Malformed("daemon rejected request length".to_string())
            }
        }
    }
}

/// Result type for client operations
pub type ClientResult<T> = Result<T, ClientError>;
