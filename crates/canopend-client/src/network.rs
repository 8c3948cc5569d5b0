//! Network client - fans operations out over many nodes
//!
//! [`NetworkManagerNodeClient`] keeps a registry of [`NodeClient`]s sharing
//! one transport. Fan-out operations run against every registered node
//! concurrently and report each node's outcome separately: one node failing
//! never fails the call.

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use canopend_od::{Entry, FieldInput, FieldValue, Value};
use futures::future::join_all;
use parking_lot::RwLock;
use tracing::{debug, error, info, warn};

use crate::client::{NodeAccess, NodeClient};
use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::nmt::{NmtCommand, NodeState};
use crate::protocol::{Request, Response};
use crate::transport::{create_transport, DaemonTransport};

/// Per-node outcome of a fan-out operation
pub type NodeResults<T> = BTreeMap<u8, ClientResult<T>>;

/// Client for every node reachable through one daemon
pub struct NetworkManagerNodeClient {
    transport: Arc<dyn DaemonTransport>,
    timeout: Duration,
    /// Registered nodes by id
    nodes: RwLock<BTreeMap<u8, NodeClient>>,
}

impl NetworkManagerNodeClient {
    /// Create a network client with an empty registry
    pub fn new(transport: Arc<dyn DaemonTransport>, timeout: Duration) -> Self {
        Self {
            transport,
            timeout,
            nodes: RwLock::new(BTreeMap::new()),
        }
    }

    /// Connect using a client configuration
    pub async fn connect(config: &ClientConfig) -> ClientResult<Self> {
        let transport = create_transport(&config.transport).await?;
        Ok(Self::new(transport, config.request_timeout()))
    }

    pub fn transport(&self) -> Arc<dyn DaemonTransport> {
        self.transport.clone()
    }

    /// Ask the daemon which nodes it currently knows
    ///
    /// The registry is refreshed to match: new nodes are added, vanished ones
    /// removed. The answer may be stale by the time it is used.
    pub async fn list_nodes(&self) -> ClientResult<BTreeSet<u8>> {
        let ids = match self.transport.request(Request::ListNodes, self.timeout).await? {
            Response::Nodes(ids) => ids.into_iter().collect::<BTreeSet<u8>>(),
            Response::Error(err) => return Err(err.into()),
            other => {
                return Err(ClientError::Malformed(format!(
                    "unexpected response {:?}",
                    other
                )))
            }
        };

        let mut nodes = self.nodes.write();
        nodes.retain(|id, _| {
            let keep = ids.contains(id);
            if !keep {
                info!(node_id = *id, "Node left the network");
            }
            keep
        });
        for id in &ids {
            nodes.entry(*id).or_insert_with(|| {
                info!(node_id = *id, "Node joined the network");
                NodeClient::new(*id, self.transport.clone(), self.timeout)
            });
        }
        Ok(ids)
    }

    /// Register a node explicitly; returns its client
    pub fn add_node(&self, node_id: u8) -> NodeClient {
        self.nodes
            .write()
            .entry(node_id)
            .or_insert_with(|| NodeClient::new(node_id, self.transport.clone(), self.timeout))
            .clone()
    }

    pub fn remove_node(&self, node_id: u8) -> Option<NodeClient> {
        self.nodes.write().remove(&node_id)
    }

    /// Client for one registered node
    pub fn node(&self, node_id: u8) -> Option<NodeClient> {
        self.nodes.read().get(&node_id).cloned()
    }

    /// Registered node ids, without I/O
    pub fn node_ids(&self) -> Vec<u8> {
        self.nodes.read().keys().copied().collect()
    }

    /// Run `op` against every registered node concurrently
    async fn fan_out<T, F, Fut>(&self, operation: &'static str, op: F) -> NodeResults<T>
    where
        F: Fn(NodeClient) -> Fut,
        Fut: Future<Output = ClientResult<T>>,
    {
        let clients: Vec<NodeClient> = self.nodes.read().values().cloned().collect();
        debug!(operation, nodes = clients.len(), "Fan-out");

        let pending = clients.into_iter().map(|client| {
            let node_id = client.node_id();
            let fut = op(client);
            async move { (node_id, fut.await) }
        });
        let results: NodeResults<T> = join_all(pending).await.into_iter().collect();

        for (node_id, result) in &results {
            match result {
                Err(e) if e.is_connection_lost() => {
                    error!(operation, node_id = *node_id, error = %e, "Daemon connection lost")
                }
                Err(e) => warn!(operation, node_id = *node_id, error = %e, "Node failed"),
                Ok(_) => {}
            }
        }
        results
    }

    pub async fn read_all(&self, entry: &Entry) -> NodeResults<Value> {
        self.fan_out("read", |node| async move { node.read(entry).await })
            .await
    }

    pub async fn read_field_all(&self, entry: &Entry, field: &str) -> NodeResults<FieldValue> {
        self.fan_out("read_field", |node| async move {
            node.read_field(entry, field).await
        })
        .await
    }

    pub async fn write_all(&self, entry: &Entry, value: &Value) -> NodeResults<()> {
        self.fan_out("write", |node| async move { node.write(entry, value).await })
            .await
    }

    /// Write one bit field on every node, each with its own read-modify-write
    pub async fn write_field_all(
        &self,
        entry: &Entry,
        field: &str,
        input: &FieldInput,
    ) -> NodeResults<()> {
        self.fan_out("write_field", |node| async move {
            node.write_field(entry, field, input.clone()).await
        })
        .await
    }

    pub async fn state_all(&self) -> NodeResults<NodeState> {
        self.fan_out("state", |node| async move { node.state().await })
            .await
    }

    /// Send an NMT command to every node, each guarded by its own observed state
    pub async fn broadcast_command(&self, command: NmtCommand) -> NodeResults<()> {
        self.fan_out("nmt", |node| async move { node.send_command(command).await })
            .await
    }
}

#[async_trait]
impl NodeAccess for NetworkManagerNodeClient {
    type ReadOutput = NodeResults<Value>;
    type WriteOutput = NodeResults<()>;
    type StateOutput = NodeResults<NodeState>;

    async fn read(&self, entry: &Entry) -> NodeResults<Value> {
        self.read_all(entry).await
    }

    async fn write(&self, entry: &Entry, value: &Value) -> NodeResults<()> {
        self.write_all(entry, value).await
    }

    async fn state(&self) -> NodeResults<NodeState> {
        self.state_all().await
    }

    async fn send_command(&self, command: NmtCommand) -> NodeResults<()> {
        self.broadcast_command(command).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MockConfig;
    use crate::transport::mock::{InjectedFailure, MockDaemon};
    use canopend_od::{standard, DataType};

    fn network(ids: &[u8]) -> (Arc<MockDaemon>, NetworkManagerNodeClient) {
        let daemon = Arc::new(MockDaemon::empty(&MockConfig::default()));
        let od = standard::catalog().unwrap();
        for id in ids {
            daemon.add_node(*id, &od);
        }
        let net = NetworkManagerNodeClient::new(daemon.clone(), Duration::from_millis(50));
        (daemon, net)
    }

    #[tokio::test]
    async fn test_list_nodes_refreshes_registry() {
        let (daemon, net) = network(&[1, 2, 3]);
        let ids = net.list_nodes().await.unwrap();
        assert_eq!(ids.into_iter().collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(net.node_ids(), vec![1, 2, 3]);

        daemon.remove_node(2);
        net.list_nodes().await.unwrap();
        assert_eq!(net.node_ids(), vec![1, 3]);
        assert!(net.node(2).is_none());
    }

    #[tokio::test]
    async fn test_partial_failure_isolated() {
        let (daemon, net) = network(&[1, 2, 3]);
        net.list_nodes().await.unwrap();
        daemon.inject_failure(2, InjectedFailure::Abort(0x0800_0000));

        let entry = Entry::new(0x1017, 0, "producer_heartbeat_time", DataType::Uint16).unwrap();
        let results = net.write_all(&entry, &Value::UInt(500)).await;
        assert!(results[&1].is_ok());
        assert!(matches!(results[&2], Err(ClientError::Rejected { .. })));
        assert!(results[&3].is_ok());
        assert_eq!(daemon.entry_bytes(3, 0x1017, 0), Some(vec![0xF4, 0x01]));
    }

    #[tokio::test]
    async fn test_broadcast_uses_each_nodes_observation() {
        let (daemon, net) = network(&[1, 2]);
        net.list_nodes().await.unwrap();
        daemon.set_state(2, NodeState::Stopped);

        let states = net.state_all().await;
        assert_eq!(states[&1], Ok(NodeState::PreOperational));
        assert_eq!(states[&2], Ok(NodeState::Stopped));

        let results = net.broadcast_command(NmtCommand::Start).await;
        assert!(results[&1].is_ok());
        assert!(matches!(
            results[&2],
            Err(ClientError::InvalidTransition { .. })
        ));
        assert_eq!(daemon.node_state(1), Some(NodeState::Operational));
        assert_eq!(daemon.node_state(2), Some(NodeState::Stopped));
    }

    #[tokio::test]
    async fn test_empty_registry() {
        let (_daemon, net) = network(&[1]);
        assert!(net.state_all().await.is_empty());
        net.add_node(1);
        assert_eq!(net.state_all().await.len(), 1);
    }
}
