//! Events module for engine activity
//!
//! Structured event types for mode transitions, recording sessions,
//! display updates, the supervised agent and credential changes.

use serde::{Deserialize, Serialize};

use crate::collab::Channel;
use crate::state::ModeKind;

/// Events emitted by the engine and its background loops
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    /// The interaction mode changed
    ModeChanged {
        from: ModeKind,
        to: ModeKind,
        /// Time spent in the previous mode
        duration_ms: u64,
    },

    /// Audio recorder began writing a new file
    RecordingStarted,

    /// Audio recorder drained its queue and closed the file
    RecordingStopped {
        /// Samples written to the file
        samples: u64,
    },

    /// A display channel received new text
    ChannelUpdated { channel: Channel, text: String },

    /// The external voice agent was launched
    AgentStarted { pid: u32 },

    /// The external voice agent is no longer running
    AgentStopped,

    /// A credential change was applied successfully
    CredentialsApplied { kind: CredentialKind },
}

/// Which credential group an applied change belonged to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialKind {
    Wifi,
    Login,
}

impl std::fmt::Display for EngineEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineEvent::ModeChanged { from, to, duration_ms } => {
                write!(f, "MODE_CHANGED {from} -> {to} ({duration_ms}ms)")
            }
            EngineEvent::RecordingStarted => write!(f, "RECORDING_STARTED"),
            EngineEvent::RecordingStopped { samples } => {
                write!(f, "RECORDING_STOPPED ({samples} samples)")
            }
            EngineEvent::ChannelUpdated { channel, .. } => {
                write!(f, "CHANNEL_UPDATED ({channel})")
            }
            EngineEvent::AgentStarted { pid } => write!(f, "AGENT_STARTED (pid {pid})"),
            EngineEvent::AgentStopped => write!(f, "AGENT_STOPPED"),
            EngineEvent::CredentialsApplied { kind } => {
                write!(f, "CREDENTIALS_APPLIED ({kind:?})")
            }
        }
    }
}
