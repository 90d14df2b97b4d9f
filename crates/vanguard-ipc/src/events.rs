//! IPC event types (server to client).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use vanguard_core::{MirrorSnapshot, SourceInfo};

/// Event sent from daemon to subscribed clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Event type
    pub event: EventType,
    /// Event data
    pub data: Value,
}

impl Event {
    /// Build an event from serializable data.
    #[must_use]
    pub fn new(event: EventType, data: &impl Serialize) -> Self {
        Self { event, data: serde_json::to_value(data).unwrap_or_default() }
    }
}

/// Types of events that can be subscribed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// Mirror status or state changed
    StatusChanged,
    /// A source was added, updated or removed
    SourcesChanged,
    /// Error occurred
    Error,
}

/// Status changed event data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusChangedData {
    /// Display line, e.g. "Status: mirroring device 0"
    pub status_text: String,
    #[serde(flatten)]
    pub snapshot: MirrorSnapshot,
}

impl From<&MirrorSnapshot> for StatusChangedData {
    fn from(snapshot: &MirrorSnapshot) -> Self {
        Self { status_text: snapshot.status_text(), snapshot: snapshot.clone() }
    }
}

/// Sources changed event data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesChangedData {
    pub sources: Vec<SourceInfo>,
}

/// Error event data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorData {
    pub code: i32,
    pub message: String,
    pub source: String,
}
