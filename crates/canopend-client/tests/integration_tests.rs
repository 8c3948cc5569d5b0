//! Integration tests for canopend-client
//!
//! Most tests drive an in-memory daemon directly through the transport
//! trait. The TCP tests serve the same daemon over loopback so the wire
//! codec and the sequence routing are exercised too.

use std::sync::Arc;
use std::time::Duration;

use canopend_client::protocol::{abort, Event};
use canopend_client::testing::{wait_for, TestDaemon};
use canopend_client::transport::mock::{InjectedFailure, MockDaemon};
use canopend_client::{
    ClientConfig, ClientError, DaemonTransport, MockConfig, NetworkManagerNodeClient, NmtCommand,
    NodeClient, NodeState,
};
use canopend_od::{standard, DataType, Entry, EntryBitField, FieldInput, ObjectDictionary, Value};
use pretty_assertions::assert_eq;

// =============================================================================
// Fixtures
// =============================================================================

const TIMEOUT: Duration = Duration::from_millis(100);

/// Star tracker status word: bit 0 enabled, bits 1..4 mode
fn status_entry() -> Entry {
    Entry::builder(0x2000, 1, "status", DataType::Uint16)
        .bit_field(EntryBitField::flag("enabled", 0).unwrap())
        .bit_field(
            EntryBitField::new("mode", 1, 3)
                .unwrap()
                .with_labels([(0u64, "idle"), (2, "tracking"), (5, "calibrating")]),
        )
        .build()
        .unwrap()
}

fn device_catalog() -> ObjectDictionary {
    let device = ObjectDictionary::from_entries([
        status_entry(),
        Entry::builder(0x2000, 2, "gain", DataType::Real32)
            .build()
            .unwrap(),
        Entry::builder(0x2001, 0, "command_key", DataType::Uint32)
            .write_only()
            .build()
            .unwrap(),
    ])
    .unwrap();
    standard::catalog().unwrap().merge(&device).unwrap()
}

fn daemon_with_nodes(ids: &[u8]) -> Arc<MockDaemon> {
    let daemon = Arc::new(MockDaemon::empty(&MockConfig::default()));
    let od = device_catalog();
    for id in ids {
        daemon.add_node(*id, &od);
    }
    daemon
}

fn node(daemon: &Arc<MockDaemon>, node_id: u8) -> NodeClient {
    NodeClient::new(node_id, daemon.clone(), TIMEOUT)
}

// =============================================================================
// Local validation
// =============================================================================

#[tokio::test]
async fn test_access_violations_never_reach_daemon() {
    let daemon = daemon_with_nodes(&[1]);
    let client = node(&daemon, 1);
    let od = device_catalog();

    let command_key = od.get_by_name("command_key").unwrap();
    let err = client.read(&command_key).await.unwrap_err();
    assert!(matches!(
        err,
        ClientError::Access {
            operation: "read",
            ..
        }
    ));

    let device_type = od.get(0x1000, 0).unwrap();
    let err = client.write(&device_type, &Value::UInt(1)).await.unwrap_err();
    assert!(matches!(
        err,
        ClientError::Access {
            operation: "write",
            ..
        }
    ));

    // Bit-field writes need both read and write access
    let err = client
        .write_field(&command_key, "mode", 1u64)
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Access { .. }));

    assert_eq!(daemon.call_count(), 0);
}

#[tokio::test]
async fn test_out_of_range_values_are_local_errors() {
    let daemon = daemon_with_nodes(&[1]);
    let client = node(&daemon, 1);
    let heartbeat = standard::producer_heartbeat_time().unwrap();

    let err = client.write(&heartbeat, &Value::Int(-1)).await.unwrap_err();
    assert!(err.is_local());
    assert!(matches!(err, ClientError::Range(_)));

    let err = client
        .write_field(&status_entry(), "mode", FieldInput::Label("sleeping".into()))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Range(_)));
    assert_eq!(daemon.call_count(), 0);
}

// =============================================================================
// Bit fields
// =============================================================================

#[tokio::test]
async fn test_status_word_read_modify_write() {
    let daemon = daemon_with_nodes(&[0x10]);
    daemon.set_entry(0x10, 0x2000, 1, vec![0x05, 0x00]);
    let client = node(&daemon, 0x10);
    let status = status_entry();

    let enabled = client.read_field(&status, "enabled").await.unwrap();
    assert_eq!(enabled.raw, 1);
    let mode = client.read_field(&status, "mode").await.unwrap();
    assert_eq!(mode.raw, 2);
    assert_eq!(mode.label.as_deref(), Some("tracking"));

    client
        .write_field(&status, "mode", FieldInput::Label("calibrating".into()))
        .await
        .unwrap();
    assert_eq!(daemon.entry_bytes(0x10, 0x2000, 1), Some(vec![0x0B, 0x00]));
    assert_eq!(client.read(&status).await.unwrap(), Value::UInt(0x000B));
}

#[tokio::test]
async fn test_field_write_on_network() {
    let daemon = daemon_with_nodes(&[1, 2]);
    daemon.set_entry(1, 0x2000, 1, vec![0x01, 0x00]);
    daemon.set_entry(2, 0x2000, 1, vec![0x00, 0x00]);
    let net = NetworkManagerNodeClient::new(daemon.clone(), TIMEOUT);
    net.list_nodes().await.unwrap();

    let results = net
        .write_field_all(&status_entry(), "mode", &FieldInput::Raw(2))
        .await;
    assert!(results.values().all(Result::is_ok));
    assert_eq!(daemon.entry_bytes(1, 0x2000, 1), Some(vec![0x05, 0x00]));
    assert_eq!(daemon.entry_bytes(2, 0x2000, 1), Some(vec![0x04, 0x00]));

    let modes = net.read_field_all(&status_entry(), "mode").await;
    for (_, mode) in modes {
        assert_eq!(mode.unwrap().label.as_deref(), Some("tracking"));
    }
}

// =============================================================================
// Daemon errors
// =============================================================================

#[tokio::test]
async fn test_daemon_errors_are_classified() {
    let daemon = daemon_with_nodes(&[1]);
    let client = node(&daemon, 1);

    let missing = Entry::new(0x6000, 0, "missing", DataType::Uint8).unwrap();
    assert!(matches!(
        client.read(&missing).await,
        Err(ClientError::NotFound(_))
    ));

    let unknown = node(&daemon, 0x42);
    assert!(matches!(unknown.state().await, Err(ClientError::NotFound(_))));

    daemon.set_state(1, NodeState::Stopped);
    let err = client.read(&status_entry()).await.unwrap_err();
    assert_eq!(err.abort_code(), Some(abort::DEVICE_STATE));
    assert!(!err.is_local());

    // The communication area stays reachable while stopped
    let heartbeat = standard::producer_heartbeat_time().unwrap();
    assert_eq!(client.read(&heartbeat).await.unwrap(), Value::UInt(0));
}

// =============================================================================
// NMT
// =============================================================================

#[tokio::test]
async fn test_nmt_guard_uses_observed_state() {
    let daemon = daemon_with_nodes(&[1]);
    let client = node(&daemon, 1);

    daemon.set_state(1, NodeState::Stopped);
    assert_eq!(client.state().await.unwrap(), NodeState::Stopped);
    let calls = daemon.call_count();

    let err = client.send_command(NmtCommand::Start).await.unwrap_err();
    assert_eq!(
        err,
        ClientError::InvalidTransition {
            from: NodeState::Stopped,
            command: NmtCommand::Start,
        }
    );
    assert_eq!(daemon.call_count(), calls);

    // Resets are always allowed
    client.send_command(NmtCommand::Reset).await.unwrap();
    assert_eq!(client.state().await.unwrap(), NodeState::PreOperational);

    client.send_command(NmtCommand::Start).await.unwrap();
    // Acceptance does not update the observation
    assert_eq!(client.last_observed_state(), NodeState::PreOperational);
    assert_eq!(client.state().await.unwrap(), NodeState::Operational);
}

#[tokio::test]
async fn test_broadcast_command() {
    let daemon = daemon_with_nodes(&[1, 2, 3]);
    let net = NetworkManagerNodeClient::new(daemon.clone(), TIMEOUT);
    net.list_nodes().await.unwrap();
    net.state_all().await;

    let results = net.broadcast_command(NmtCommand::Start).await;
    assert_eq!(results.len(), 3);
    assert!(results.values().all(Result::is_ok));

    let states = net.state_all().await;
    for id in [1, 2, 3] {
        assert_eq!(states[&id], Ok(NodeState::Operational));
    }
}

// =============================================================================
// Fan-out isolation
// =============================================================================

#[tokio::test]
async fn test_read_all_isolates_timeout() {
    let daemon = daemon_with_nodes(&[0x0A, 0x0B, 0x0C]);
    daemon.set_entry(0x0A, 0x1017, 0, vec![0x64, 0x00]);
    daemon.set_entry(0x0C, 0x1017, 0, vec![0xC8, 0x00]);
    daemon.inject_failure(0x0B, InjectedFailure::Timeout);

    let net = NetworkManagerNodeClient::new(daemon.clone(), Duration::from_millis(50));
    net.list_nodes().await.unwrap();

    let heartbeat = standard::producer_heartbeat_time().unwrap();
    let results = net.read_all(&heartbeat).await;

    assert_eq!(results.len(), 3);
    assert_eq!(results[&0x0A], Ok(Value::UInt(100)));
    assert!(matches!(results[&0x0B], Err(ClientError::Timeout(_))));
    assert_eq!(results[&0x0C], Ok(Value::UInt(200)));
    assert!(results[&0x0B].as_ref().unwrap_err().is_retryable());
}

#[tokio::test]
async fn test_fan_out_runs_concurrently() {
    let daemon = Arc::new(MockDaemon::empty(&MockConfig {
        latency_ms: 50,
        ..Default::default()
    }));
    let od = device_catalog();
    for id in 1..=8 {
        daemon.add_node(id, &od);
    }
    let net = NetworkManagerNodeClient::new(daemon.clone(), Duration::from_secs(1));
    net.list_nodes().await.unwrap();

    let started = tokio::time::Instant::now();
    let results = net.state_all().await;
    assert_eq!(results.len(), 8);
    assert!(started.elapsed() < Duration::from_millis(300));
}

// =============================================================================
// Configuration
// =============================================================================

#[tokio::test]
async fn test_connect_with_mock_config() {
    let config = ClientConfig::from_toml(
        r#"
        request_timeout_ms = 200

        [transport]
        type = "mock"
        local_node_id = 5
        "#,
    )
    .unwrap();

    let net = NetworkManagerNodeClient::connect(&config).await.unwrap();
    let ids: Vec<u8> = net.list_nodes().await.unwrap().into_iter().collect();
    assert_eq!(ids, vec![5]);
    assert_eq!(net.node(5).unwrap().timeout(), Duration::from_millis(200));
}

// =============================================================================
// TCP end to end
// =============================================================================

#[tokio::test]
async fn test_tcp_read_write_and_nmt() {
    let daemon = daemon_with_nodes(&[1, 2]);
    let server = TestDaemon::start(daemon.clone()).await.unwrap();
    let net = server.connect().await.unwrap();

    let ids: Vec<u8> = net.list_nodes().await.unwrap().into_iter().collect();
    assert_eq!(ids, vec![1, 2]);

    let node = net.node(2).unwrap();
    let gain = device_catalog().get_by_name("gain").unwrap();
    node.write(&gain, &Value::Float(1.5)).await.unwrap();
    assert_eq!(node.read(&gain).await.unwrap(), Value::Float(1.5));
    assert_eq!(
        daemon.entry_bytes(2, 0x2000, 2),
        Some(1.5f32.to_le_bytes().to_vec())
    );

    assert_eq!(node.state().await.unwrap(), NodeState::PreOperational);
    node.send_command(NmtCommand::Start).await.unwrap();
    assert_eq!(node.state().await.unwrap(), NodeState::Operational);

    node.send_tpdo(3).await.unwrap();
    assert!(matches!(
        node.send_tpdo(99).await,
        Err(ClientError::Rejected { code: None, .. })
    ));

    server.shutdown().await;
}

#[tokio::test]
async fn test_tcp_events() {
    let daemon = daemon_with_nodes(&[7]);
    let server = TestDaemon::start(daemon.clone()).await.unwrap();
    let net = server.connect().await.unwrap();
    net.list_nodes().await.unwrap();
    let node = net.node(7).unwrap();

    let mut events = net.transport().subscribe();
    node.send_emcy(0x8130, 0x0000_0042).await.unwrap();
    let received = tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        received.event,
        Event::Emergency {
            node_id: 7,
            code: 0x8130,
            info: 0x42
        }
    );

    let waiter = {
        let node = node.clone();
        tokio::spawn(async move { node.wait_for_state_change(Duration::from_secs(2)).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    daemon.set_state(7, NodeState::Stopped);
    assert_eq!(waiter.await.unwrap().unwrap(), NodeState::Stopped);
    assert_eq!(node.last_observed_state(), NodeState::Stopped);
}

#[tokio::test]
async fn test_tcp_timeout_does_not_poison_connection() {
    let daemon = daemon_with_nodes(&[1, 2]);
    daemon.inject_failure(2, InjectedFailure::Timeout);
    let server = TestDaemon::start(daemon.clone()).await.unwrap();
    let net = NetworkManagerNodeClient::connect(&server.client_config(Duration::from_millis(100)))
        .await
        .unwrap();
    net.list_nodes().await.unwrap();

    let states = net.state_all().await;
    assert_eq!(states[&1], Ok(NodeState::PreOperational));
    assert!(matches!(states[&2], Err(ClientError::Timeout(_))));

    daemon.clear_failure(2);
    assert_eq!(
        net.node(2).unwrap().state().await.unwrap(),
        NodeState::PreOperational
    );
}

#[tokio::test]
async fn test_tcp_daemon_shutdown_reported() {
    let daemon = daemon_with_nodes(&[1]);
    let server = TestDaemon::start(daemon).await.unwrap();
    let net = server.connect().await.unwrap();
    let transport = net.transport();
    assert!(transport.is_connected().await);

    server.shutdown().await;
    let closed = wait_for(
        || {
            let transport = transport.clone();
            async move { !transport.is_connected().await }
        },
        Duration::from_secs(2),
    )
    .await;
    assert!(closed);

    net.add_node(1);
    let err = net.node(1).unwrap().state().await.unwrap_err();
    assert!(matches!(err, ClientError::Transport(_)));
}
