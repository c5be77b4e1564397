//! Core types, events, Socket.IO packets, config, and errors for Agent Stage.

pub mod ack;
pub mod config;
pub mod error;
pub mod protocol;
pub mod socketio;
pub mod types;

pub use ack::Ack;
pub use error::{Result, StageError};
pub use protocol::{Delivery, StageEvent};
pub use types::{AgentId, Visibility};
