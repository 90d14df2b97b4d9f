//! IPC message types.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use vanguard_core::{Color, SourceId};

use crate::events::EventType;

/// Request envelope sent from client to daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Unique request ID for matching responses
    pub id: u64,
    /// The method to invoke
    pub method: Method,
}

/// Response envelope sent from daemon to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Request ID this is responding to
    pub id: u64,
    /// Result of the request
    pub result: Result<Value, ErrorInfo>,
}

impl Response {
    /// Plain `{"success": true}` acknowledgement.
    #[must_use]
    pub fn success(id: u64) -> Self {
        Self { id, result: Ok(serde_json::json!({ "success": true })) }
    }
}

/// Error information in a response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Error code
    pub code: i32,
    /// Human-readable error message
    pub message: String,
}

impl ErrorInfo {
    /// Create a new error.
    #[must_use]
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }
}

/// Methods that can be invoked via IPC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "params")]
pub enum Method {
    // State queries
    /// Get the mirror status snapshot
    GetStatus,
    /// List known color sources
    ListSources,

    // Mirror control
    /// Enable or disable mirroring
    SetEnabled { enabled: bool },
    /// Select the source to mirror (`null` for none)
    SelectSource { source: Option<SourceId> },

    // Source registry
    /// Register a source or replace its color buffer
    UpdateSource { id: SourceId, name: String, colors: Vec<Color> },
    /// Remove a source
    RemoveSource { id: SourceId },

    // Subscriptions
    /// Subscribe to event types
    Subscribe { events: Vec<EventType> },
    /// Unsubscribe from event types
    Unsubscribe { events: Vec<EventType> },

    // System
    /// Request graceful shutdown
    Shutdown,
}
