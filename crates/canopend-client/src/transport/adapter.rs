//! Daemon transport trait and types

use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::broadcast;

use super::TransportError;
use crate::protocol::{Event, Request, Response};

/// Event received from the daemon
#[derive(Debug, Clone)]
pub struct IncomingEvent {
    /// Timestamp when the event was received
    pub timestamp: Instant,
    pub event: Event,
}

impl IncomingEvent {
    pub fn now(event: Event) -> Self {
        Self {
            timestamp: Instant::now(),
            event,
        }
    }
}

/// Request/response channel to a node daemon
///
/// One channel can serve every node the daemon knows about; requests carry
/// the target node id. Implementations pair each response with its request
/// and make no ordering promise between concurrent requests.
#[async_trait]
pub trait DaemonTransport: Send + Sync {
    /// Send a request and wait for its response
    ///
    /// # Arguments
    /// * `request` - The request to send
    /// * `timeout` - Maximum time to wait for the response
    ///
    /// Dropping the returned future abandons the response. The daemon may
    /// still act on a request whose response was never read.
    async fn request(&self, request: Request, timeout: Duration)
        -> Result<Response, TransportError>;

    /// Subscribe to daemon events (heartbeats, emergencies, bus status)
    fn subscribe(&self) -> broadcast::Receiver<IncomingEvent>;

    /// Check if the transport is connected
    async fn is_connected(&self) -> bool;
}
