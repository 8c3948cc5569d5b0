//! Test utilities for canopend-client
//!
//! Provides a loopback TCP daemon backed by [`MockDaemon`], so tests can run
//! the real TCP transport end to end.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, warn};

use crate::config::{ClientConfig, TcpConfig, TransportConfig};
use crate::error::ClientResult;
use crate::network::NetworkManagerNodeClient;
use crate::protocol::{read_frame, Request, Response};
use crate::transport::mock::MockDaemon;
use crate::transport::DaemonTransport;

/// A TCP daemon that shuts down when dropped
pub struct TestDaemon {
    pub addr: SocketAddr,
    pub daemon: Arc<MockDaemon>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl TestDaemon {
    /// Serve `daemon` on a free loopback port
    ///
    /// # Example
    ///
    /// ```ignore
    /// use canopend_client::testing::TestDaemon;
    ///
    /// let server = TestDaemon::start(Arc::new(MockDaemon::new(&Default::default()))).await?;
    /// let net = server.connect().await?;
    /// let nodes = net.list_nodes().await?;
    /// ```
    pub async fn start(daemon: Arc<MockDaemon>) -> std::io::Result<Self> {
        // Bind to any available port
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
        let served = daemon.clone();

        let handle = tokio::spawn(async move {
            // Dropping the set aborts every connection task
            let mut connections = JoinSet::new();
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    accepted = listener.accept() => match accepted {
                        Ok((stream, peer)) => {
                            debug!(%peer, "Test daemon accepted connection");
                            connections.spawn(serve_connection(stream, served.clone()));
                        }
                        Err(_) => break,
                    },
                }
            }
        });

        Ok(Self {
            addr,
            daemon,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    pub fn tcp_config(&self) -> TcpConfig {
        TcpConfig {
            host: self.addr.ip().to_string(),
            port: self.addr.port(),
            connect_timeout_ms: 1000,
        }
    }

    /// Client configuration pointing at this daemon
    pub fn client_config(&self, request_timeout: Duration) -> ClientConfig {
        ClientConfig {
            request_timeout_ms: request_timeout.as_millis() as u64,
            catalog: None,
            transport: TransportConfig::Tcp(self.tcp_config()),
        }
    }

    /// Connect a network client over TCP
    pub async fn connect(&self) -> ClientResult<NetworkManagerNodeClient> {
        NetworkManagerNodeClient::connect(&self.client_config(Duration::from_millis(500))).await
    }

    /// Shutdown the daemon
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for TestDaemon {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

async fn serve_connection(stream: TcpStream, daemon: Arc<MockDaemon>) {
    let (mut reader, mut writer) = stream.into_split();
    let (out_tx, mut out_rx) = mpsc::channel::<Bytes>(64);

    let _write_task = AbortOnDrop(tokio::spawn(async move {
        while let Some(frame) = out_rx.recv().await {
            if writer.write_all(&frame).await.is_err() {
                break;
            }
        }
    }));

    let mut events = daemon.subscribe();
    let event_tx = out_tx.clone();
    let _event_task = AbortOnDrop(tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(incoming) => {
                    if event_tx.send(incoming.event.to_frame().encode()).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }));

    while let Ok(frame) = read_frame(&mut reader).await {
        let reply = match Request::from_frame(&frame) {
            Ok(request) => daemon.handle(&request),
            Err(err) => Some(Response::Error(err)),
        };
        let Some(reply) = reply else { continue };
        match reply.to_frame(frame.msg_id, frame.seq) {
            Ok(reply) => {
                if out_tx.send(reply.encode()).await.is_err() {
                    break;
                }
            }
            Err(e) => warn!(seq = frame.seq, error = %e, "Cannot encode reply"),
        }
    }
}

/// Aborts the task when the connection (or its whole server) goes away
struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Wait for a condition with timeout
pub async fn wait_for<F, Fut>(condition: F, timeout: Duration) -> bool
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;

    while tokio::time::Instant::now() < deadline {
        if condition().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    false
}
