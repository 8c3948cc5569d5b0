//! Single-node client
//!
//! [`NodeClient`] reads and writes OD entries of one node and observes or
//! drives its NMT state. It holds no entry data, only the transport, the
//! node id, the request deadline and the last observed NMT state.
//!
//! # Hazards
//!
//! - Bit-field writes are a read-modify-write. Two writers updating sibling
//!   fields of the same entry can lose one update; use one writer per entry.
//! - A write that fails remotely (timeout, transport, daemon error) or is
//!   cancelled may or may not have been applied by the daemon.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use canopend_od::standard::{self, file_cache};
use canopend_od::{Entry, FieldInput, FieldValue, Value};
use parking_lot::RwLock;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::error::{ClientError, ClientResult};
use crate::nmt::{self, NmtCommand, NodeState};
use crate::protocol::{Event, Request, Response};
use crate::transport::{DaemonTransport, TransportError};

/// Capabilities shared by single-node and network clients
///
/// The output types let a network client report one result per node while
/// a single-node client reports one result.
#[async_trait]
pub trait NodeAccess: Send + Sync {
    type ReadOutput: Send;
    type WriteOutput: Send;
    type StateOutput: Send;

    /// Read an entry's typed value
    async fn read(&self, entry: &Entry) -> Self::ReadOutput;

    /// Write an entry's typed value
    async fn write(&self, entry: &Entry, value: &Value) -> Self::WriteOutput;

    /// Query the NMT state
    async fn state(&self) -> Self::StateOutput;

    /// Send an NMT command
    async fn send_command(&self, command: NmtCommand) -> Self::WriteOutput;
}

/// Client for one node behind the daemon
#[derive(Clone)]
pub struct NodeClient {
    node_id: u8,
    transport: Arc<dyn DaemonTransport>,
    timeout: Duration,
    observed: Arc<RwLock<NodeState>>,
}

impl std::fmt::Debug for NodeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeClient")
            .field("node_id", &self.node_id)
            .field("timeout", &self.timeout)
            .field("observed", &*self.observed.read())
            .finish()
    }
}

impl NodeClient {
    /// Create a client; the observed state starts as `Initializing`
    pub fn new(node_id: u8, transport: Arc<dyn DaemonTransport>, timeout: Duration) -> Self {
        Self {
            node_id,
            transport,
            timeout,
            observed: Arc::new(RwLock::new(NodeState::Initializing)),
        }
    }

    pub fn node_id(&self) -> u8 {
        self.node_id
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Same node and transport with a different deadline
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Last observed NMT state, without I/O
    pub fn last_observed_state(&self) -> NodeState {
        *self.observed.read()
    }

    fn observe(&self, state: NodeState) {
        let previous = std::mem::replace(&mut *self.observed.write(), state);
        if previous != state {
            debug!(node_id = self.node_id, from = %previous, to = %state, "Observed NMT state change");
        }
    }

    /// One request/response round trip; daemon error replies become errors
    async fn exchange(&self, request: Request) -> ClientResult<Response> {
        match self.transport.request(request, self.timeout).await? {
            Response::Error(err) => Err(err.into()),
            response => Ok(response),
        }
    }

    fn check_readable(&self, entry: &Entry) -> ClientResult<()> {
        if entry.access().is_readable() {
            Ok(())
        } else {
            Err(ClientError::Access {
                entry: entry.to_string(),
                access: entry.access(),
                operation: "read",
            })
        }
    }

    fn check_writable(&self, entry: &Entry) -> ClientResult<()> {
        if entry.access().is_writable() {
            Ok(())
        } else {
            Err(ClientError::Access {
                entry: entry.to_string(),
                access: entry.access(),
                operation: "write",
            })
        }
    }

    /// Read an entry's raw bytes
    pub async fn read_raw(&self, entry: &Entry) -> ClientResult<Vec<u8>> {
        self.check_readable(entry)?;

        let request = Request::GetEntry {
            node_id: self.node_id,
            index: entry.index(),
            sub_index: entry.sub_index(),
        };
        match self.exchange(request).await {
            Ok(Response::Entry(data)) => {
                debug!(
                    node_id = self.node_id,
                    index = format!("0x{:04X}", entry.index()),
                    sub_index = entry.sub_index(),
                    data = %hex::encode(&data),
                    "Read entry"
                );
                Ok(data)
            }
            Ok(other) => Err(unexpected(&other)),
            Err(e) => {
                warn!(node_id = self.node_id, entry = %entry, error = %e, "Read failed");
                Err(e)
            }
        }
    }

    /// Read an entry and decode it with the entry's data type
    pub async fn read(&self, entry: &Entry) -> ClientResult<Value> {
        let data = self.read_raw(entry).await?;
        Ok(entry.decode(&data)?)
    }

    /// Read one bit field of an entry
    pub async fn read_field(&self, entry: &Entry, field: &str) -> ClientResult<FieldValue> {
        // Unknown field names fail before the round trip
        entry.bit_field(field)?;
        let data = self.read_raw(entry).await?;
        Ok(entry.extract_field(field, &data)?)
    }

    /// Write raw bytes to an entry
    pub async fn write_raw(&self, entry: &Entry, data: Vec<u8>) -> ClientResult<()> {
        self.check_writable(entry)?;

        let len = data.len();
        let request = Request::SetEntry {
            node_id: self.node_id,
            index: entry.index(),
            sub_index: entry.sub_index(),
            data,
        };
        match self.exchange(request).await {
            Ok(Response::Ack) => {
                debug!(
                    node_id = self.node_id,
                    index = format!("0x{:04X}", entry.index()),
                    sub_index = entry.sub_index(),
                    len,
                    "Wrote entry"
                );
                Ok(())
            }
            Ok(other) => Err(unexpected(&other)),
            Err(e) => {
                warn!(node_id = self.node_id, entry = %entry, error = %e, "Write failed, remote value unknown");
                Err(e)
            }
        }
    }

    /// Encode and write a value
    ///
    /// Access and encoding errors are raised before anything is sent.
    pub async fn write(&self, entry: &Entry, value: &Value) -> ClientResult<()> {
        self.check_writable(entry)?;
        let data = entry.encode(value)?;
        self.write_raw(entry, data).await
    }

    /// Write one bit field, keeping the other bits of the entry
    ///
    /// Reads the current value, packs the field into it and writes the
    /// result back. Not atomic against concurrent writers of the same entry.
    pub async fn write_field(
        &self,
        entry: &Entry,
        field: &str,
        input: impl Into<FieldInput>,
    ) -> ClientResult<()> {
        let input = input.into();
        self.check_writable(entry)?;
        // Needs the current value
        self.check_readable(entry)?;
        entry.check_field_input(field, &input)?;

        let current = self.read_raw(entry).await?;
        let packed = entry.pack_field(field, &current, &input)?;
        self.write_raw(entry, packed).await
    }

    /// Query the node's NMT state and record it
    pub async fn state(&self) -> ClientResult<NodeState> {
        let request = Request::GetState {
            node_id: self.node_id,
        };
        match self.exchange(request).await? {
            Response::State(code) => {
                let state = NodeState::from_code(code).ok_or_else(|| {
                    ClientError::Malformed(format!("unknown NMT state code 0x{:02X}", code))
                })?;
                self.observe(state);
                Ok(state)
            }
            other => Err(unexpected(&other)),
        }
    }

    /// Send an NMT command
    ///
    /// Guarded against the last observed state. Success means the daemon
    /// accepted the command, not that the node finished the transition;
    /// poll [`state`](Self::state) or wait for a heartbeat to confirm.
    pub async fn send_command(&self, command: NmtCommand) -> ClientResult<()> {
        nmt::check_command(self.last_observed_state(), command)?;

        let request = Request::SendNmtCommand {
            node_id: self.node_id,
            command: command.code(),
        };
        match self.exchange(request).await? {
            Response::Ack => {
                info!(node_id = self.node_id, %command, "NMT command sent");
                Ok(())
            }
            other => Err(unexpected(&other)),
        }
    }

    /// Wait for the next heartbeat of this node and record its state
    pub async fn wait_for_state_change(&self, timeout: Duration) -> ClientResult<NodeState> {
        let mut events = self.transport.subscribe();
        let node_id = self.node_id;

        let wait = async {
            loop {
                match events.recv().await {
                    Ok(incoming) => {
                        if let Event::Heartbeat { node_id: from, state } = incoming.event {
                            if from != node_id {
                                continue;
                            }
                            match NodeState::from_code(state) {
                                Some(state) => return Ok(state),
                                None => warn!(node_id, state, "Unknown heartbeat state"),
                            }
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(node_id, skipped, "Event subscriber lagged");
                    }
                    Err(RecvError::Closed) => {
                        return Err(ClientError::Transport(TransportError::ConnectionClosed))
                    }
                }
            }
        };

        let state = tokio::time::timeout(timeout, wait).await.map_err(|_| {
            ClientError::Timeout(format!("no heartbeat from node 0x{:02X} within {:?}", node_id, timeout))
        })??;
        self.observe(state);
        Ok(state)
    }

    /// Ask the daemon to send an emergency message from this node
    pub async fn send_emcy(&self, code: u16, info: u32) -> ClientResult<()> {
        let request = Request::SendEmcy {
            node_id: self.node_id,
            code,
            info,
        };
        match self.exchange(request).await? {
            Response::Ack => Ok(()),
            other => Err(unexpected(&other)),
        }
    }

    /// Ask the daemon to transmit one of this node's TPDOs
    pub async fn send_tpdo(&self, num: u8) -> ClientResult<()> {
        match self
            .exchange(Request::SendTpdo {
                node_id: self.node_id,
                num,
            })
            .await?
        {
            Response::Ack => Ok(()),
            other => Err(unexpected(&other)),
        }
    }

    /// Download a file from the node's read cache (0x3004)
    ///
    /// Selects the file by name, then reads the data domain. Two transfers
    /// on the same cache at once race on the selection.
    pub async fn read_file(&self, file_name: &str) -> ClientResult<Vec<u8>> {
        let (name_entry, data_entry) = transfer_entries(standard::fread_cache()?)?;
        self.select_file(&name_entry, file_name).await?;
        let data = self.read_raw(&data_entry).await?;
        info!(node_id = self.node_id, file = file_name, len = data.len(), "Read file");
        Ok(data)
    }

    /// Upload a file into the node's write cache (0x3005)
    ///
    /// Selects the file by name, then writes the data domain.
    pub async fn write_file(&self, file_name: &str, data: &[u8]) -> ClientResult<()> {
        let (name_entry, data_entry) = transfer_entries(standard::fwrite_cache()?)?;
        self.select_file(&name_entry, file_name).await?;
        self.write_raw(&data_entry, data.to_vec()).await?;
        info!(node_id = self.node_id, file = file_name, len = data.len(), "Wrote file");
        Ok(())
    }

    async fn select_file(&self, name_entry: &Entry, file_name: &str) -> ClientResult<()> {
        if file_name.is_empty() || file_name.contains('/') {
            return Err(ClientError::InvalidArgument(format!(
                "'{}' is not a cache file name",
                file_name
            )));
        }
        self.write_raw(name_entry, file_name.as_bytes().to_vec()).await
    }
}

/// File name and file data entries of a file cache
fn transfer_entries(entries: Vec<Entry>) -> ClientResult<(Entry, Entry)> {
    let mut name = None;
    let mut data = None;
    for entry in entries {
        match entry.sub_index() {
            file_cache::FILE_NAME => name = Some(entry),
            file_cache::FILE_DATA => data = Some(entry),
            _ => {}
        }
    }
    name.zip(data)
        .ok_or_else(|| ClientError::Config("file cache without name or data entry".to_string()))
}

fn unexpected(response: &Response) -> ClientError {
    ClientError::Malformed(format!("unexpected response {:?}", response))
}

#[async_trait]
impl NodeAccess for NodeClient {
    type ReadOutput = ClientResult<Value>;
    type WriteOutput = ClientResult<()>;
    type StateOutput = ClientResult<NodeState>;

    async fn read(&self, entry: &Entry) -> ClientResult<Value> {
        NodeClient::read(self, entry).await
    }

    async fn write(&self, entry: &Entry, value: &Value) -> ClientResult<()> {
        NodeClient::write(self, entry, value).await
    }

    async fn state(&self) -> ClientResult<NodeState> {
        NodeClient::state(self).await
    }

    async fn send_command(&self, command: NmtCommand) -> ClientResult<()> {
        NodeClient::send_command(self, command).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MockConfig;
    use crate::transport::mock::MockDaemon;
    use canopend_od::{DataType, EntryBitField};

    fn setup() -> (Arc<MockDaemon>, NodeClient) {
        let daemon = Arc::new(MockDaemon::new(&MockConfig::default()));
        let client = NodeClient::new(1, daemon.clone(), Duration::from_millis(100));
        (daemon, client)
    }

    fn status_entry() -> Entry {
        Entry::builder(0x2000, 1, "status", DataType::Uint16)
            .bit_field(EntryBitField::flag("enabled", 0).unwrap())
            .bit_field(EntryBitField::new("mode", 1, 3).unwrap())
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_read_file_selects_then_reads() {
        let (daemon, client) = setup();
        daemon.set_entry(1, 0x3004, file_cache::FILE_DATA, b"line 1\nline 2\n".to_vec());

        let data = client.read_file("app.log").await.unwrap();
        assert_eq!(data, b"line 1\nline 2\n".to_vec());
        assert_eq!(
            daemon.entry_bytes(1, 0x3004, file_cache::FILE_NAME),
            Some(b"app.log".to_vec())
        );
    }

    #[tokio::test]
    async fn test_write_file_selects_then_writes() {
        let (daemon, client) = setup();
        let payload: Vec<u8> = (0..=255).collect();

        client.write_file("firmware.bin", &payload).await.unwrap();
        assert_eq!(
            daemon.entry_bytes(1, 0x3005, file_cache::FILE_NAME),
            Some(b"firmware.bin".to_vec())
        );
        assert_eq!(daemon.entry_bytes(1, 0x3005, file_cache::FILE_DATA), Some(payload));
        assert_eq!(daemon.call_count(), 2);
    }

    #[tokio::test]
    async fn test_file_transfer_failures() {
        let (daemon, client) = setup();
        daemon.reset_call_count();
        for bad in ["", "../etc/passwd"] {
            let err = client.read_file(bad).await.unwrap_err();
            assert!(matches!(err, ClientError::InvalidArgument(_)));
        }
        assert_eq!(daemon.call_count(), 0);

        // A refused selection stops the transfer before the data request
        daemon.set_state(1, NodeState::Stopped);
        let err = client.write_file("cfg.json", b"{}").await.unwrap_err();
        assert_eq!(err.abort_code(), Some(0x0800_0022));
        assert_eq!(daemon.call_count(), 1);
        assert_eq!(daemon.entry_bytes(1, 0x3005, file_cache::FILE_DATA), Some(Vec::new()));
    }

    #[tokio::test]
    async fn test_read_and_write() {
        let (daemon, client) = setup();
        let entry = Entry::new(0x1017, 0, "producer_heartbeat_time", DataType::Uint16).unwrap();

        client.write(&entry, &Value::UInt(1000)).await.unwrap();
        assert_eq!(daemon.entry_bytes(1, 0x1017, 0), Some(vec![0xE8, 0x03]));
        assert_eq!(client.read(&entry).await.unwrap(), Value::UInt(1000));
    }

    #[tokio::test]
    async fn test_write_field_keeps_siblings() {
        let (daemon, client) = setup();
        daemon.set_entry(1, 0x2000, 1, vec![0x05, 0x00]);
        let entry = status_entry();

        assert_eq!(client.read_field(&entry, "mode").await.unwrap().raw, 2);
        client.write_field(&entry, "mode", 5u64).await.unwrap();
        assert_eq!(daemon.entry_bytes(1, 0x2000, 1), Some(vec![0x0B, 0x00]));
        assert_eq!(client.read_field(&entry, "enabled").await.unwrap().raw, 1);
    }

    #[tokio::test]
    async fn test_bad_field_input_sends_nothing() {
        let (daemon, client) = setup();
        daemon.set_entry(1, 0x2000, 1, vec![0x05, 0x00]);
        let entry = status_entry();

        let err = client.write_field(&entry, "mode", 8u64).await.unwrap_err();
        assert!(matches!(err, ClientError::Range(_)));
        let err = client.read_field(&entry, "speed").await.unwrap_err();
        assert!(matches!(err, ClientError::InvalidArgument(_)));
        assert_eq!(daemon.call_count(), 0);
    }

    #[tokio::test]
    async fn test_encode_errors_are_local() {
        let (daemon, client) = setup();
        let entry = Entry::new(0x1017, 0, "producer_heartbeat_time", DataType::Uint16).unwrap();

        let err = client.write(&entry, &Value::UInt(70_000)).await.unwrap_err();
        assert!(matches!(err, ClientError::Range(_)));
        let err = client.write(&entry, &Value::Float(1.0)).await.unwrap_err();
        assert!(matches!(err, ClientError::TypeMismatch(_)));
        assert_eq!(daemon.call_count(), 0);
    }

    #[tokio::test]
    async fn test_malformed_read() {
        let (daemon, client) = setup();
        daemon.inject_failure(1, crate::transport::mock::InjectedFailure::Malformed);
        let entry = Entry::new(0x1017, 0, "producer_heartbeat_time", DataType::Uint16).unwrap();
        assert!(matches!(
            client.read(&entry).await,
            Err(ClientError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn test_state_updates_observation() {
        let (daemon, client) = setup();
        assert_eq!(client.last_observed_state(), NodeState::Initializing);
        daemon.set_state(1, NodeState::Operational);
        assert_eq!(client.state().await.unwrap(), NodeState::Operational);
        assert_eq!(client.last_observed_state(), NodeState::Operational);
    }

    #[tokio::test]
    async fn test_wait_for_state_change() {
        let (daemon, client) = setup();
        let waiter = {
            let client = client.clone();
            tokio::spawn(async move { client.wait_for_state_change(Duration::from_secs(2)).await })
        };
        // Let the waiter subscribe first
        tokio::time::sleep(Duration::from_millis(20)).await;
        daemon.set_state(2, NodeState::Stopped);
        daemon.set_state(1, NodeState::Operational);

        assert_eq!(waiter.await.unwrap().unwrap(), NodeState::Operational);
        assert_eq!(client.last_observed_state(), NodeState::Operational);
    }

    #[tokio::test]
    async fn test_wait_for_state_change_times_out() {
        let (_daemon, client) = setup();
        let result = client.wait_for_state_change(Duration::from_millis(20)).await;
        assert!(matches!(result, Err(ClientError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_emcy_and_tpdo() {
        let (daemon, client) = setup();
        let mut events = daemon.subscribe();
        client.send_emcy(0x8130, 7).await.unwrap();
        assert_eq!(
            events.recv().await.unwrap().event,
            Event::Emergency {
                node_id: 1,
                code: 0x8130,
                info: 7
            }
        );

        client.send_tpdo(0).await.unwrap();
        assert!(matches!(
            client.send_tpdo(200).await,
            Err(ClientError::Rejected { code: None, .. })
        ));
    }
}
