//! Mock daemon for testing
//!
//! An in-memory stand-in for the node daemon: every node has its own value
//! store and NMT state, requests are counted, and per-node failures can be
//! injected. [`MockDaemon::handle`] is the daemon logic on its own, so the
//! same behavior can be served over TCP by [`crate::testing::TestDaemon`].

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use canopend_od::{standard, ObjectDictionary};
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::debug;

use super::{DaemonTransport, IncomingEvent, TransportError};
use crate::config::MockConfig;
use crate::nmt::{NmtCommand, NodeState};
use crate::protocol::{abort, DaemonError, Event, Request, Response};

/// Number of TPDOs every mock node has
const TPDO_COUNT: u8 = 16;

/// Failure injected for one node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectedFailure {
    /// Never answer
    Timeout,
    /// Answer every request with this abort code
    Abort(u32),
    /// Answer entry reads with one extra byte
    Malformed,
}

#[derive(Debug, Clone)]
struct StoredValue {
    data: Vec<u8>,
    /// Fixed length for typed entries, `None` for domains
    fixed_len: Option<usize>,
}

#[derive(Debug, Clone, Default)]
struct MockNode {
    state: NodeState,
    values: HashMap<(u16, u8), StoredValue>,
}

/// In-memory node daemon
pub struct MockDaemon {
    config: MockConfig,
    connected: AtomicBool,
    calls: AtomicUsize,
    nodes: RwLock<BTreeMap<u8, MockNode>>,
    failures: RwLock<HashMap<u8, InjectedFailure>>,
    events_tx: broadcast::Sender<IncomingEvent>,
}

impl MockDaemon {
    /// Daemon whose local node holds the standard entries, in PreOperational
    pub fn new(config: &MockConfig) -> Self {
        let daemon = Self::empty(config);
        if let Ok(od) = standard::catalog() {
            daemon.add_node(config.local_node_id, &od);
        }
        daemon
    }

    /// Daemon without any node
    pub fn empty(config: &MockConfig) -> Self {
        let (events_tx, _) = broadcast::channel(256);
        Self {
            config: config.clone(),
            connected: AtomicBool::new(true),
            calls: AtomicUsize::new(0),
            nodes: RwLock::new(BTreeMap::new()),
            failures: RwLock::new(HashMap::new()),
            events_tx,
        }
    }

    pub fn local_node_id(&self) -> u8 {
        self.config.local_node_id
    }

    /// Add a node holding every entry of `od`, zero initialized
    pub fn add_node(&self, node_id: u8, od: &ObjectDictionary) {
        let values = od
            .iter()
            .map(|entry| {
                let fixed_len = entry.data_type().byte_size();
                let data = vec![0u8; fixed_len.unwrap_or(0)];
                (entry.address(), StoredValue { data, fixed_len })
            })
            .collect();

        self.nodes.write().insert(
            node_id,
            MockNode {
                state: NodeState::PreOperational,
                values,
            },
        );
    }

    pub fn remove_node(&self, node_id: u8) {
        self.nodes.write().remove(&node_id);
    }

    /// Seed raw bytes for an entry, bypassing NMT and length checks
    pub fn set_entry(&self, node_id: u8, index: u16, sub_index: u8, data: Vec<u8>) {
        if let Some(node) = self.nodes.write().get_mut(&node_id) {
            let slot = node
                .values
                .entry((index, sub_index))
                .or_insert(StoredValue {
                    data: Vec::new(),
                    fixed_len: Some(data.len()),
                });
            slot.data = data;
        }
    }

    pub fn entry_bytes(&self, node_id: u8, index: u16, sub_index: u8) -> Option<Vec<u8>> {
        self.nodes
            .read()
            .get(&node_id)
            .and_then(|node| node.values.get(&(index, sub_index)))
            .map(|v| v.data.clone())
    }

    /// Force a node's state and broadcast its heartbeat
    pub fn set_state(&self, node_id: u8, state: NodeState) {
        if let Some(node) = self.nodes.write().get_mut(&node_id) {
            node.state = state;
        }
        self.emit(Event::Heartbeat {
            node_id,
            state: state.code(),
        });
    }

    pub fn node_state(&self, node_id: u8) -> Option<NodeState> {
        self.nodes.read().get(&node_id).map(|node| node.state)
    }

    pub fn inject_failure(&self, node_id: u8, failure: InjectedFailure) {
        self.failures.write().insert(node_id, failure);
    }

    pub fn clear_failure(&self, node_id: u8) {
        self.failures.write().remove(&node_id);
    }

    /// Number of requests handled so far
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn reset_call_count(&self) {
        self.calls.store(0, Ordering::SeqCst);
    }

    /// Set connection state
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Broadcast an event to subscribers
    pub fn emit(&self, event: Event) {
        let _ = self.events_tx.send(IncomingEvent::now(event));
    }

    /// Handle one request; `None` means the daemon stays silent
    pub fn handle(&self, request: &Request) -> Option<Response> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(node_id) = request.node_id() {
            let failure = self.failures.read().get(&node_id).copied();
            match failure {
                Some(InjectedFailure::Timeout) => return None,
                Some(InjectedFailure::Abort(code)) => {
                    return Some(Response::Error(DaemonError::Abort(code)))
                }
                Some(InjectedFailure::Malformed) => {
                    if let Request::GetEntry {
                        index, sub_index, ..
                    } = request
                    {
                        let mut data = self
                            .entry_bytes(node_id, *index, *sub_index)
                            .unwrap_or_default();
                        data.push(0xFF);
                        return Some(Response::Entry(data));
                    }
                }
                None => {}
            }
        }

        let response = match request {
            Request::GetEntry {
                node_id,
                index,
                sub_index,
            } => self.get_entry(*node_id, *index, *sub_index),
            Request::SetEntry {
                node_id,
                index,
                sub_index,
                data,
            } => self.set_entry_checked(*node_id, *index, *sub_index, data),
            Request::GetState { node_id } => match self.node_state(*node_id) {
                Some(state) => Ok(Response::State(state.code())),
                None => Err(DaemonError::UnknownNode(*node_id)),
            },
            Request::SendNmtCommand { node_id, command } => self.nmt(*node_id, *command),
            Request::ListNodes => Ok(Response::Nodes(self.nodes.read().keys().copied().collect())),
            Request::SendEmcy {
                node_id,
                code,
                info,
            } => self.known(*node_id).map(|_| {
                self.emit(Event::Emergency {
                    node_id: *node_id,
                    code: *code,
                    info: *info,
                });
                Response::Ack
            }),
            Request::SendTpdo { node_id, num } => self.known(*node_id).and_then(|_| {
                if *num < TPDO_COUNT {
                    Ok(Response::Ack)
                } else {
                    Err(DaemonError::BadTpdo(*num))
                }
            }),
        };

        Some(response.unwrap_or_else(Response::Error))
    }

    fn known(&self, node_id: u8) -> Result<(), DaemonError> {
        if self.nodes.read().contains_key(&node_id) {
            Ok(())
        } else {
            Err(DaemonError::UnknownNode(node_id))
        }
    }

    fn get_entry(&self, node_id: u8, index: u16, sub_index: u8) -> Result<Response, DaemonError> {
        let nodes = self.nodes.read();
        let node = nodes.get(&node_id).ok_or(DaemonError::UnknownNode(node_id))?;
        Self::check_accessible(node, index)?;
        let value = Self::lookup(node, index, sub_index)?;
        Ok(Response::Entry(value.data.clone()))
    }

    fn set_entry_checked(
        &self,
        node_id: u8,
        index: u16,
        sub_index: u8,
        data: &[u8],
    ) -> Result<Response, DaemonError> {
        let mut nodes = self.nodes.write();
        let node = nodes
            .get_mut(&node_id)
            .ok_or(DaemonError::UnknownNode(node_id))?;
        Self::check_accessible(node, index)?;
        Self::lookup(node, index, sub_index)?;

        let Some(slot) = node.values.get_mut(&(index, sub_index)) else {
            return Err(DaemonError::Abort(abort::SUB_INDEX_NOT_FOUND));
        };
        match slot.fixed_len {
            Some(len) if data.len() > len => return Err(DaemonError::Abort(abort::LENGTH_TOO_HIGH)),
            Some(len) if data.len() < len => return Err(DaemonError::Abort(abort::LENGTH_TOO_LOW)),
            _ => {}
        }
        slot.data = data.to_vec();
        Ok(Response::Ack)
    }

    /// Stopped nodes only serve the communication profile area
    fn check_accessible(node: &MockNode, index: u16) -> Result<(), DaemonError> {
        if node.state == NodeState::Stopped && !(0x1000..=0x1FFF).contains(&index) {
            return Err(DaemonError::Abort(abort::DEVICE_STATE));
        }
        Ok(())
    }

    fn lookup(node: &MockNode, index: u16, sub_index: u8) -> Result<&StoredValue, DaemonError> {
        if let Some(value) = node.values.get(&(index, sub_index)) {
            return Ok(value);
        }
        let index_known = node.values.keys().any(|(i, _)| *i == index);
        Err(DaemonError::Abort(if index_known {
            abort::SUB_INDEX_NOT_FOUND
        } else {
            abort::OBJECT_NOT_FOUND
        }))
    }

    fn nmt(&self, node_id: u8, code: u8) -> Result<Response, DaemonError> {
        self.known(node_id)?;
        let command =
            NmtCommand::from_code(code).ok_or(DaemonError::Abort(abort::INVALID_VALUE))?;
        debug!(node_id, %command, "Mock daemon: NMT command");

        if command.is_reset() {
            self.set_state(node_id, NodeState::Initializing);
            self.set_state(node_id, NodeState::PreOperational);
        } else {
            self.set_state(node_id, command.target_state());
        }
        Ok(Response::Ack)
    }
}

#[async_trait]
impl DaemonTransport for MockDaemon {
    async fn request(
        &self,
        request: Request,
        timeout: Duration,
    ) -> Result<Response, TransportError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionClosed);
        }

        // Simulate latency
        if self.config.latency_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.config.latency_ms)).await;
        }

        match self.handle(&request) {
            Some(response) => Ok(response),
            None => {
                tokio::time::sleep(timeout).await;
                Err(TransportError::Timeout(format!(
                    "no response from node within {:?}",
                    timeout
                )))
            }
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<IncomingEvent> {
        self.events_tx.subscribe()
    }

    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn daemon() -> MockDaemon {
        MockDaemon::new(&MockConfig::default())
    }

    #[test]
    fn test_local_node_has_standard_entries() {
        let daemon = daemon();
        let response = daemon.handle(&Request::GetEntry {
            node_id: 1,
            index: 0x1018,
            sub_index: 1,
        });
        assert_eq!(response, Some(Response::Entry(vec![0, 0, 0, 0])));
        assert_eq!(daemon.call_count(), 1);
    }

    #[test]
    fn test_missing_addresses() {
        let daemon = daemon();
        let missing_sub = daemon.handle(&Request::GetEntry {
            node_id: 1,
            index: 0x1018,
            sub_index: 9,
        });
        assert_eq!(
            missing_sub,
            Some(Response::Error(DaemonError::Abort(abort::SUB_INDEX_NOT_FOUND)))
        );

        let missing_index = daemon.handle(&Request::GetEntry {
            node_id: 1,
            index: 0x3000,
            sub_index: 0,
        });
        assert_eq!(
            missing_index,
            Some(Response::Error(DaemonError::Abort(abort::OBJECT_NOT_FOUND)))
        );

        let unknown_node = daemon.handle(&Request::GetState { node_id: 9 });
        assert_eq!(
            unknown_node,
            Some(Response::Error(DaemonError::UnknownNode(9)))
        );
    }

    #[test]
    fn test_write_length_checked() {
        let daemon = daemon();
        let response = daemon.handle(&Request::SetEntry {
            node_id: 1,
            index: 0x1017,
            sub_index: 0,
            data: vec![0xE8, 0x03, 0x00],
        });
        assert_eq!(
            response,
            Some(Response::Error(DaemonError::Abort(abort::LENGTH_TOO_HIGH)))
        );
        assert_eq!(daemon.entry_bytes(1, 0x1017, 0), Some(vec![0, 0]));
    }

    #[test]
    fn test_stopped_node_restricts_access() {
        let daemon = daemon();
        daemon.set_entry(1, 0x2000, 1, vec![0x05, 0x00]);
        daemon.set_state(1, NodeState::Stopped);

        let app = daemon.handle(&Request::GetEntry {
            node_id: 1,
            index: 0x2000,
            sub_index: 1,
        });
        assert_eq!(
            app,
            Some(Response::Error(DaemonError::Abort(abort::DEVICE_STATE)))
        );

        let comm = daemon.handle(&Request::GetEntry {
            node_id: 1,
            index: 0x1001,
            sub_index: 0,
        });
        assert_eq!(comm, Some(Response::Entry(vec![0])));
    }

    #[test]
    fn test_reset_emits_heartbeats() {
        let daemon = daemon();
        let mut events = daemon.subscribe();
        daemon.set_state(1, NodeState::Operational);
        daemon.handle(&Request::SendNmtCommand {
            node_id: 1,
            command: NmtCommand::Reset.code(),
        });

        let states: Vec<u8> = std::iter::from_fn(|| events.try_recv().ok())
            .filter_map(|e| match e.event {
                Event::Heartbeat { state, .. } => Some(state),
                _ => None,
            })
            .collect();
        assert_eq!(states, vec![0x05, 0x00, 0x7F]);
        assert_eq!(daemon.node_state(1), Some(NodeState::PreOperational));
    }

    #[test]
    fn test_tpdo_numbers() {
        let daemon = daemon();
        assert_eq!(
            daemon.handle(&Request::SendTpdo { node_id: 1, num: 0 }),
            Some(Response::Ack)
        );
        assert_eq!(
            daemon.handle(&Request::SendTpdo {
                node_id: 1,
                num: TPDO_COUNT
            }),
            Some(Response::Error(DaemonError::BadTpdo(TPDO_COUNT)))
        );
    }

    #[tokio::test]
    async fn test_injected_timeout() {
        let daemon = daemon();
        daemon.inject_failure(1, InjectedFailure::Timeout);
        let result = daemon
            .request(Request::GetState { node_id: 1 }, Duration::from_millis(10))
            .await;
        assert!(matches!(result, Err(TransportError::Timeout(_))));

        daemon.clear_failure(1);
        let result = daemon
            .request(Request::GetState { node_id: 1 }, Duration::from_millis(10))
            .await;
        assert_eq!(result, Ok(Response::State(0x7F)));
    }

    #[tokio::test]
    async fn test_disconnected() {
        let daemon = daemon();
        daemon.set_connected(false);
        assert!(!daemon.is_connected().await);
        let result = daemon
            .request(Request::ListNodes, Duration::from_millis(10))
            .await;
        assert_eq!(result, Err(TransportError::ConnectionClosed));
        assert_eq!(daemon.call_count(), 0);
    }
}
