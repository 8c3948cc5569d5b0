//! NMT states and commands
//!
//! The client only observes the node's state machine; the node itself runs
//! it. [`check_command`] is a pre-flight guard against the last observed
//! state, not an authoritative check.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ClientError, ClientResult};

/// NMT state of a node as last observed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    /// Boot phase, normally not observable by a client that connects later
    #[default]
    Initializing,
    /// Configuration phase
    PreOperational,
    /// Application running, full entry access
    Operational,
    /// Only error/status entries remain accessible
    Stopped,
}

impl NodeState {
    /// CiA 301 heartbeat state code
    pub fn code(self) -> u8 {
        match self {
            NodeState::Initializing => 0x00,
            NodeState::PreOperational => 0x7F,
            NodeState::Operational => 0x05,
            NodeState::Stopped => 0x04,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0x00 => Some(NodeState::Initializing),
            0x7F => Some(NodeState::PreOperational),
            0x05 => Some(NodeState::Operational),
            0x04 => Some(NodeState::Stopped),
            _ => None,
        }
    }

    /// Whether `self -> to` is a transition a node can make
    pub fn can_transition_to(self, to: NodeState) -> bool {
        use NodeState::*;
        matches!(
            (self, to),
            (_, Initializing)
                | (Initializing, PreOperational)
                | (PreOperational, Operational)
                | (PreOperational, Stopped)
                | (Operational, PreOperational)
                | (Operational, Stopped)
                | (Stopped, PreOperational)
        )
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeState::Initializing => "initializing",
            NodeState::PreOperational => "pre-operational",
            NodeState::Operational => "operational",
            NodeState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// NMT command sent to a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NmtCommand {
    /// Go to Operational
    Start,
    /// Go to Stopped
    Stop,
    EnterPreOperational,
    /// Reset the node application
    Reset,
    /// Reset the communication layer only
    ResetCommunication,
}

impl NmtCommand {
    /// CiA 301 NMT command specifier
    pub fn code(self) -> u8 {
        match self {
            NmtCommand::Start => 0x01,
            NmtCommand::Stop => 0x02,
            NmtCommand::EnterPreOperational => 0x80,
            NmtCommand::Reset => 0x81,
            NmtCommand::ResetCommunication => 0x82,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0x01 => Some(NmtCommand::Start),
            0x02 => Some(NmtCommand::Stop),
            0x80 => Some(NmtCommand::EnterPreOperational),
            0x81 => Some(NmtCommand::Reset),
            0x82 => Some(NmtCommand::ResetCommunication),
            _ => None,
        }
    }

    /// State the command drives the node into
    ///
    /// Both resets pass through `Initializing` and settle in `PreOperational`.
    pub fn target_state(self) -> NodeState {
        match self {
            NmtCommand::Start => NodeState::Operational,
            NmtCommand::Stop => NodeState::Stopped,
            NmtCommand::EnterPreOperational => NodeState::PreOperational,
            NmtCommand::Reset | NmtCommand::ResetCommunication => NodeState::Initializing,
        }
    }

    pub fn is_reset(self) -> bool {
        matches!(self, NmtCommand::Reset | NmtCommand::ResetCommunication)
    }
}

impl fmt::Display for NmtCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NmtCommand::Start => "start",
            NmtCommand::Stop => "stop",
            NmtCommand::EnterPreOperational => "pre-operational",
            NmtCommand::Reset => "reset",
            NmtCommand::ResetCommunication => "reset-communication",
        };
        f.write_str(name)
    }
}

impl FromStr for NmtCommand {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "start" | "operational" => Ok(NmtCommand::Start),
            "stop" | "stopped" => Ok(NmtCommand::Stop),
            "pre-operational" | "preoperational" | "preop" => Ok(NmtCommand::EnterPreOperational),
            "reset" | "reset-node" => Ok(NmtCommand::Reset),
            "reset-communication" | "reset-comm" => Ok(NmtCommand::ResetCommunication),
            other => Err(ClientError::InvalidArgument(format!(
                "unknown NMT command '{}'",
                other
            ))),
        }
    }
}

/// Pre-flight guard for an NMT command
///
/// Re-issuing the command for the state the node is already in is allowed.
pub fn check_command(observed: NodeState, command: NmtCommand) -> ClientResult<()> {
    let target = command.target_state();
    if observed == target || observed.can_transition_to(target) {
        Ok(())
    } else {
        Err(ClientError::InvalidTransition {
            from: observed,
            command,
        })
    }
}
