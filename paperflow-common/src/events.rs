//! Event types and EventBus for Paperflow
//!
//! Events are broadcast via EventBus and serialize with a `type` tag so a
//! future UI or journal consumer can stream them as JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::broadcast;

/// Paperflow event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PaperflowEvent {
    /// A document was moved into the folder tree
    DocumentFiled {
        source: PathBuf,
        destination: PathBuf,
        category: String,
        emitter: String,
        /// "main_category" or "subfolder_emitter"
        organization_type: String,
        timestamp: DateTime<Utc>,
    },

    /// A per-emitter subfolder was created for the first time
    SubfolderCreated {
        path: PathBuf,
        category: String,
        emitter: String,
        timestamp: DateTime<Utc>,
    },

    /// An existing file was moved by a retroactive sweep
    FileSwept {
        from: PathBuf,
        to: PathBuf,
        emitter: String,
        timestamp: DateTime<Utc>,
    },

    /// Processing of a document failed; the file stays where it was
    DocumentFailed {
        path: PathBuf,
        error: String,
        timestamp: DateTime<Utc>,
    },

    /// A collaborator failed and a fallback signal was used instead
    ClassificationFallback {
        path: PathBuf,
        collaborator: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },
}

/// Central event distribution bus
///
/// Uses tokio::broadcast internally:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Lagged message detection for slow subscribers
///
/// # Examples
///
/// ```
/// use paperflow_common::events::{EventBus, PaperflowEvent};
///
/// let event_bus = EventBus::new(100);
/// let mut rx = event_bus.subscribe();
///
/// event_bus.emit_lossy(PaperflowEvent::DocumentFailed {
///     path: "/tmp/scan.pdf".into(),
///     error: "vanished".to_string(),
///     timestamp: chrono::Utc::now(),
/// });
///
/// assert!(rx.try_recv().is_ok());
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PaperflowEvent>,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<PaperflowEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: PaperflowEvent) {
        let _ = self.tx.send(event);
    }
}
