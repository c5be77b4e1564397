//! Stage events and their delivery to the controller.
//!
//! Events arrive by name with a JSON payload (the first Socket.IO event
//! argument, or a replay line's `payload`) and are decoded into
//! [`StageEvent`]. A [`Delivery`] pairs an event with the acknowledgment its
//! sender asked for.

use serde::Deserialize;

use crate::ack::Ack;
use crate::error::{Result, StageError};
use crate::types::AgentId;

pub const START_AGENT: &str = "start_agent";
pub const AGENT_MESSAGE: &str = "agent_message";
pub const CLEAR_AGENT: &str = "clear_agent";

#[derive(Debug, Deserialize)]
struct AgentPayload {
    agent_id: AgentId,
}

#[derive(Debug, Deserialize)]
struct MessagePayload {
    agent_id: AgentId,
    text: String,
}

/// A typed stage event addressed to one agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageEvent {
    StartAgent { agent_id: AgentId },
    AgentMessage { agent_id: AgentId, text: String },
    ClearAgent { agent_id: AgentId },
}

impl StageEvent {
    /// Decode an event by name.
    ///
    /// Returns `Ok(None)` for event names this client does not handle, and a
    /// protocol error when a known event's payload is missing required fields.
    pub fn decode(name: &str, payload: Option<&serde_json::Value>) -> Result<Option<Self>> {
        let payload = match name {
            START_AGENT | AGENT_MESSAGE | CLEAR_AGENT => payload
                .cloned()
                .ok_or_else(|| StageError::Protocol(format!("{name}: missing payload")))?,
            _ => return Ok(None),
        };

        let bad = |e: serde_json::Error| StageError::Protocol(format!("{name}: {e}"));
        let event = match name {
            START_AGENT => {
                let p: AgentPayload = serde_json::from_value(payload).map_err(bad)?;
                Self::StartAgent { agent_id: p.agent_id }
            }
            AGENT_MESSAGE => {
                let p: MessagePayload = serde_json::from_value(payload).map_err(bad)?;
                Self::AgentMessage {
                    agent_id: p.agent_id,
                    text: p.text,
                }
            }
            _ => {
                let p: AgentPayload = serde_json::from_value(payload).map_err(bad)?;
                Self::ClearAgent { agent_id: p.agent_id }
            }
        };
        Ok(Some(event))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::StartAgent { .. } => START_AGENT,
            Self::AgentMessage { .. } => AGENT_MESSAGE,
            Self::ClearAgent { .. } => CLEAR_AGENT,
        }
    }

    pub fn agent_id(&self) -> &AgentId {
        match self {
            Self::StartAgent { agent_id }
            | Self::AgentMessage { agent_id, .. }
            | Self::ClearAgent { agent_id } => agent_id,
        }
    }

    /// The wire payload for this event.
    pub fn payload(&self) -> serde_json::Value {
        match self {
            Self::AgentMessage { agent_id, text } => {
                serde_json::json!({ "agent_id": agent_id, "text": text })
            }
            Self::StartAgent { agent_id } | Self::ClearAgent { agent_id } => {
                serde_json::json!({ "agent_id": agent_id })
            }
        }
    }
}

/// An event handed to the controller, with its optional acknowledgment.
#[derive(Debug)]
pub struct Delivery {
    pub event: StageEvent,
    pub ack: Option<Ack>,
}

impl Delivery {
    pub fn new(event: StageEvent) -> Self {
        Self { event, ack: None }
    }

    pub fn with_ack(event: StageEvent, ack: Ack) -> Self {
        Self {
            event,
            ack: Some(ack),
        }
    }
}
