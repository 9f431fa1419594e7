//! Progress event types and bus for the ingestion pipeline
//!
//! The pipeline's coordinating task is the only producer; display layers
//! (CLI, GUI shell, tests) subscribe and consume. Worker tasks never touch
//! the bus directly - they return plain data to the coordinator, which keeps
//! whatever consumes these events thread-safe by construction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Events emitted by an ingestion run.
///
/// Serializable so a display layer can forward them over SSE or similar.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ProgressEvent {
    /// Human-readable log line for the activity stream
    Log {
        /// Message text
        message: String,
        /// When the message was emitted
        timestamp: DateTime<Utc>,
    },

    /// Percentage milestone, monotonically non-decreasing across one run
    Progress {
        /// Completed percentage (0-100)
        percent: u8,
        /// When the milestone was reached
        timestamp: DateTime<Utc>,
    },
}

/// Broadcast bus for [`ProgressEvent`]s.
///
/// Wraps `tokio::sync::broadcast`: multi-consumer, bounded, and lossy for
/// slow subscribers (old events are dropped, never blocking the pipeline).
#[derive(Debug, Clone)]
pub struct ProgressBus {
    tx: broadcast::Sender<ProgressEvent>,
    capacity: usize,
}

impl ProgressBus {
    /// Create a new bus buffering up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events. Events emitted before subscription
    /// are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring the absence of subscribers.
    ///
    /// A headless run (no display attached) is valid; tracing still carries
    /// the diagnostics.
    pub fn emit_lossy(&self, event: ProgressEvent) {
        let _ = self.tx.send(event);
    }

    /// Emit a log line.
    pub fn log(&self, message: impl Into<String>) {
        self.emit_lossy(ProgressEvent::Log {
            message: message.into(),
            timestamp: Utc::now(),
        });
    }

    /// Emit a percentage milestone.
    pub fn progress(&self, percent: u8) {
        self.emit_lossy(ProgressEvent::Progress {
            percent,
            timestamp: Utc::now(),
        });
    }

    /// Configured channel capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_log_and_progress() {
        let bus = ProgressBus::new(16);
        let mut rx = bus.subscribe();

        bus.log("hello");
        bus.progress(25);

        match rx.recv().await.unwrap() {
            ProgressEvent::Log { message, .. } => assert_eq!(message, "hello"),
            other => panic!("expected log, got {:?}", other),
        }
        match rx.recv().await.unwrap() {
            ProgressEvent::Progress { percent, .. } => assert_eq!(percent, 25),
            other => panic!("expected progress, got {:?}", other),
        }
    }

    #[test]
    fn emit_without_subscribers_does_not_panic() {
        let bus = ProgressBus::new(4);
        bus.log("nobody listening");
        bus.progress(100);
    }
}
