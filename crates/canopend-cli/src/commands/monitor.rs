//! Monitor command - print daemon events as they arrive

use std::time::{Duration, Instant};

use anyhow::Result;
use canopend_client::protocol::Event;
use canopend_client::{DaemonTransport, IncomingEvent, NetworkManagerNodeClient, NodeState};
use tokio::sync::broadcast::error::RecvError;

use crate::output::{node_label, EventRow, OutputContext};

/// Print heartbeats, emergencies and bus status until Ctrl+C or disconnect
pub async fn monitor(
    net: &NetworkManagerNodeClient,
    node: Option<u8>,
    ctx: &OutputContext,
) -> Result<()> {
    let transport = net.transport();
    let mut events = transport.subscribe();
    let started = Instant::now();
    let mut liveness = tokio::time::interval(Duration::from_millis(500));

    ctx.info("Monitoring daemon events, press Ctrl+C to stop");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                ctx.info("\nStopped");
                break;
            }
            _ = liveness.tick() => {
                if !transport.is_connected().await {
                    ctx.error("Daemon closed the connection");
                    break;
                }
            }
            received = events.recv() => match received {
                Ok(incoming) => {
                    if node.is_some() && incoming.event.node_id() != node {
                        continue;
                    }
                    let row = event_row(&incoming, started);
                    let line = format!("[{}] {} {}: {}", row.elapsed, row.node, row.kind, row.detail);
                    ctx.print_line(&row, &line);
                }
                Err(RecvError::Lagged(skipped)) => {
                    ctx.warn(&format!("Skipped {} event(s)", skipped));
                }
                Err(RecvError::Closed) => break,
            }
        }
    }

    Ok(())
}

fn event_row(incoming: &IncomingEvent, started: Instant) -> EventRow {
    let elapsed = incoming.timestamp.saturating_duration_since(started);
    let (node, kind, detail) = match &incoming.event {
        Event::Heartbeat { node_id, state } => (
            node_label(*node_id),
            "heartbeat",
            match NodeState::from_code(*state) {
                Some(state) => state.to_string(),
                None => format!("unknown state 0x{:02X}", state),
            },
        ),
        Event::Emergency {
            node_id,
            code,
            info,
        } => (
            node_label(*node_id),
            "emcy",
            format!("code 0x{:04X} info 0x{:08X}", code, info),
        ),
        Event::BusStatus(status) => (
            "-".to_string(),
            "bus",
            format!("status 0x{:02X}", status),
        ),
    };

    EventRow {
        elapsed: format!("{:.3}s", elapsed.as_secs_f64()),
        node,
        kind: kind.to_string(),
        detail,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_rows() {
        let started = Instant::now();
        let row = event_row(
            &IncomingEvent::now(Event::Heartbeat {
                node_id: 0x10,
                state: 0x05,
            }),
            started,
        );
        assert_eq!(row.node, "0x10");
        assert_eq!(row.kind, "heartbeat");
        assert_eq!(row.detail, NodeState::Operational.to_string());

        let row = event_row(&IncomingEvent::now(Event::BusStatus(1)), started);
        assert_eq!(row.node, "-");
        assert_eq!(row.detail, "status 0x01");
    }
}
