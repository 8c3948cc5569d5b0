//! TCP transport to the daemon's IPC port
//!
//! One connection serves every node. A background receiver task reads frames
//! and routes them: responses go to the waiting request by sequence number,
//! `seq = 0` frames are broadcast as events. A writer task owns the write
//! half, so a cancelled request never leaves half a frame on the socket.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::{DaemonTransport, IncomingEvent, TransportError};
use crate::config::TcpConfig;
use crate::protocol::{read_frame, Event, Request, Response, EVENT_SEQ, HEADER_LEN, MAX_FRAME_LEN};

/// Encoded frames waiting for the writer task
const OUTGOING_QUEUE: usize = 64;

type PendingMap = Arc<Mutex<HashMap<u16, oneshot::Sender<Response>>>>;

/// TCP daemon transport
pub struct TcpTransport {
    config: TcpConfig,
    outgoing: mpsc::Sender<Bytes>,
    pending: PendingMap,
    next_seq: AtomicU16,
    connected: Arc<AtomicBool>,
    events_tx: broadcast::Sender<IncomingEvent>,
    receiver_handle: JoinHandle<()>,
    writer_handle: JoinHandle<()>,
}

impl TcpTransport {
    /// Connect to the daemon
    pub async fn connect(config: &TcpConfig) -> Result<Self, TransportError> {
        let addr = config.address();
        let timeout = Duration::from_millis(config.connect_timeout_ms);

        let stream = tokio::time::timeout(timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| TransportError::Timeout(format!("connect to {}", addr)))?
            .map_err(|e| TransportError::ConnectionFailed(format!("{}: {}", addr, e)))?;
        stream
            .set_nodelay(true)
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        let (reader, writer) = stream.into_split();
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let connected = Arc::new(AtomicBool::new(true));
        let (events_tx, _) = broadcast::channel(256);
        let (outgoing, outgoing_rx) = mpsc::channel(OUTGOING_QUEUE);

        let writer_handle = tokio::spawn(Self::write_loop(
            writer,
            outgoing_rx,
            pending.clone(),
            connected.clone(),
        ));
        let receiver_handle = tokio::spawn(Self::receive_loop(
            reader,
            pending.clone(),
            connected.clone(),
            events_tx.clone(),
        ));

        info!(%addr, "Connected to node daemon");

        Ok(Self {
            config: config.clone(),
            outgoing,
            pending,
            next_seq: AtomicU16::new(1),
            connected,
            events_tx,
            receiver_handle,
            writer_handle,
        })
    }

    pub fn config(&self) -> &TcpConfig {
        &self.config
    }

    /// Next sequence number, skipping the event sequence
    fn next_seq(&self) -> u16 {
        loop {
            let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
            if seq != EVENT_SEQ {
                return seq;
            }
        }
    }

    /// Background writer task; frames are written whole, in queue order
    async fn write_loop(
        mut writer: OwnedWriteHalf,
        mut outgoing: mpsc::Receiver<Bytes>,
        pending: PendingMap,
        connected: Arc<AtomicBool>,
    ) {
        while let Some(frame) = outgoing.recv().await {
            if let Err(e) = writer.write_all(&frame).await {
                error!(error = %e, "Send error");
                connected.store(false, Ordering::SeqCst);
                pending.lock().clear();
                return;
            }
        }
    }

    /// Background receiver task
    async fn receive_loop(
        mut reader: OwnedReadHalf,
        pending: PendingMap,
        connected: Arc<AtomicBool>,
        events_tx: broadcast::Sender<IncomingEvent>,
    ) {
        loop {
            let frame = match read_frame(&mut reader).await {
                Ok(frame) => frame,
                Err(TransportError::ConnectionClosed) => {
                    info!("Daemon closed the connection");
                    break;
                }
                Err(e) => {
                    error!(error = %e, "Receive error");
                    break;
                }
            };

            if frame.is_event() {
                match Event::from_frame(&frame) {
                    Ok(event) => {
                        let _ = events_tx.send(IncomingEvent::now(event));
                    }
                    Err(e) => warn!(error = %e, "Dropping malformed event"),
                }
                continue;
            }

            let Some(waiter) = pending.lock().remove(&frame.seq) else {
                debug!(seq = frame.seq, "Response for abandoned request");
                continue;
            };
            match Response::from_frame(&frame) {
                Ok(response) => {
                    let _ = waiter.send(response);
                }
                // Dropping the waiter fails that request only
                Err(e) => warn!(seq = frame.seq, error = %e, "Malformed response"),
            }
        }

        connected.store(false, Ordering::SeqCst);
        // Wake every waiter with a closed channel
        pending.lock().clear();
    }

    async fn exchange(
        &self,
        seq: u16,
        request: &Request,
        timeout: Duration,
    ) -> Result<Response, TransportError> {
        let frame = request.to_frame(seq);
        if HEADER_LEN + frame.payload.len() > MAX_FRAME_LEN {
            return Err(TransportError::SendFailed(format!(
                "{} byte payload exceeds the frame limit",
                frame.payload.len()
            )));
        }

        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(seq, tx);
        let _slot = PendingSlot {
            pending: &self.pending,
            seq,
        };

        // The receiver task clears the map on close; a slot inserted after
        // that would never be answered
        if !self.connected.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionClosed);
        }

        let deadline = Instant::now() + timeout;
        let timed_out =
            || TransportError::Timeout(format!("no response to seq {} within {:?}", seq, timeout));

        // Queueing is all-or-nothing, so giving up here is safe
        tokio::time::timeout_at(deadline, self.outgoing.send(frame.encode()))
            .await
            .map_err(|_| timed_out())?
            .map_err(|_| TransportError::ConnectionClosed)?;

        // A dropped sender means the connection is gone or the response
        // did not parse
        tokio::time::timeout_at(deadline, rx)
            .await
            .map_err(|_| timed_out())?
            .map_err(|_| {
                if self.connected.load(Ordering::SeqCst) {
                    TransportError::MalformedFrame(format!("malformed response to seq {}", seq))
                } else {
                    TransportError::ConnectionClosed
                }
            })
    }
}

/// Removes a pending slot when its request finishes or is cancelled
struct PendingSlot<'a> {
    pending: &'a PendingMap,
    seq: u16,
}

impl Drop for PendingSlot<'_> {
    fn drop(&mut self) {
        self.pending.lock().remove(&self.seq);
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        self.receiver_handle.abort();
        self.writer_handle.abort();
    }
}

#[async_trait]
impl DaemonTransport for TcpTransport {
    async fn request(
        &self,
        request: Request,
        timeout: Duration,
    ) -> Result<Response, TransportError> {
        let seq = self.next_seq();
        debug!(seq, msg_id = request.msg_id(), node_id = ?request.node_id(), "Sending request");
        self.exchange(seq, &request, timeout).await
    }

    fn subscribe(&self) -> broadcast::Receiver<IncomingEvent> {
        self.events_tx.subscribe()
    }

    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}
