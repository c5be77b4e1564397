//! Replay recorded stage events from a JSON Lines file.
//!
//! Each non-blank line is `{"at_ms": 0, "event": "...", "payload": {...}}`.
//! Lines starting with `#` or `//` are comments. `at_ms` is the offset from
//! the start of the replay; when omitted the line fires together with the
//! previous one.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use agent_stage_core::protocol::{Delivery, StageEvent};
use agent_stage_core::{Ack, Result, StageError};

use crate::{DeliveryReceiver, EventSource, SourceHandle};

#[derive(Debug, Deserialize)]
struct ReplayLine {
    #[serde(default)]
    at_ms: Option<u64>,
    event: String,
    #[serde(default)]
    payload: Option<serde_json::Value>,
}

/// One scheduled event.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayEntry {
    /// 1-based source line.
    pub line: usize,
    pub at: Duration,
    pub event: StageEvent,
}

/// Parse a replay script. Unhandled event names are skipped with a warning.
pub fn parse_replay(input: &str) -> Result<Vec<ReplayEntry>> {
    let mut entries = Vec::new();
    let mut at = Duration::ZERO;

    for (idx, raw) in input.lines().enumerate() {
        let line = idx + 1;
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with("//") {
            continue;
        }

        let parsed: ReplayLine = serde_json::from_str(trimmed)
            .map_err(|e| StageError::Protocol(format!("line {line}: {e}")))?;
        if let Some(ms) = parsed.at_ms {
            at = Duration::from_millis(ms);
        }

        match StageEvent::decode(&parsed.event, parsed.payload.as_ref()) {
            Ok(Some(event)) => entries.push(ReplayEntry { line, at, event }),
            Ok(None) => warn!(line, event = %parsed.event, "Skipping unhandled replay event"),
            Err(e) => return Err(StageError::Protocol(format!("line {line}: {e}"))),
        }
    }

    Ok(entries)
}

/// Feeds a replay script to the controller.
pub struct ReplaySource {
    path: PathBuf,
    realtime: bool,
}

impl ReplaySource {
    /// With `realtime` the entries are spaced by their `at_ms` offsets;
    /// otherwise they are delivered back to back.
    pub fn new(path: impl Into<PathBuf>, realtime: bool) -> Self {
        Self {
            path: path.into(),
            realtime,
        }
    }

    /// Start from already parsed entries.
    pub fn spawn(entries: Vec<ReplayEntry>, realtime: bool) -> (DeliveryReceiver, SourceHandle) {
        let (delivery_tx, delivery_rx) = mpsc::unbounded_channel::<Delivery>();
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            let origin = Instant::now();
            let total = entries.len();
            for entry in entries {
                if realtime {
                    tokio::select! {
                        _ = &mut shutdown_rx => {
                            debug!("Replay stopped");
                            return;
                        }
                        _ = tokio::time::sleep_until(origin + entry.at) => {}
                    }
                } else if shutdown_rx.try_recv().is_ok() {
                    debug!("Replay stopped");
                    return;
                }

                let line = entry.line;
                let ack = Ack::new(move || trace!(line, "Replay event acknowledged"));
                if delivery_tx.send(Delivery::with_ack(entry.event, ack)).is_err() {
                    debug!("Replay receiver dropped");
                    return;
                }
            }
            info!(events = total, "Replay finished");
        });

        (delivery_rx, SourceHandle::new(shutdown_tx))
    }
}

#[async_trait]
impl EventSource for ReplaySource {
    fn id(&self) -> &str {
        "replay"
    }

    async fn start(&self) -> anyhow::Result<(DeliveryReceiver, SourceHandle)> {
        let raw = tokio::fs::read_to_string(&self.path).await.map_err(StageError::Io)?;
        let entries = parse_replay(&raw)?;
        info!(path = %self.path.display(), events = entries.len(), realtime = self.realtime, "Starting replay");
        Ok(Self::spawn(entries, self.realtime))
    }
}
