//! Commands for state mutations.
//!
//! Commands are returned by IPC handlers to request state changes
//! that the main daemon loop can process with mutable access.

use crate::color::Color;
use crate::source::SourceId;

/// A command representing a state mutation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Enable or disable mirroring
    SetEnabled { enabled: bool },
    /// Select the source to mirror
    SelectSource { source: Option<SourceId> },
    /// Register a source or replace its colors
    UpdateSource { id: SourceId, name: String, colors: Vec<Color> },
    /// Forget a source
    RemoveSource { id: SourceId },
    /// Request shutdown
    Shutdown,
}
