//! Advisory status reported to the user.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::color::Color;
use crate::source::SourceId;

/// Last known outcome of the mirror.
///
/// This is for display only; callers should not branch on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "source")]
pub enum MirrorStatus {
    #[default]
    Idle,
    Loaded,
    Enabled,
    Disabled,
    NoSourceSelected,
    Mirroring(SourceId),
    OpenFailed,
    WriteError,
}

impl fmt::Display for MirrorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "Status: idle"),
            Self::Loaded => write!(f, "Status: loaded"),
            Self::Enabled => write!(f, "Status: enabled"),
            Self::Disabled => write!(f, "Status: disabled"),
            Self::NoSourceSelected => write!(f, "Status: no device selected"),
            Self::Mirroring(id) => write!(f, "Status: mirroring device {id}"),
            Self::OpenFailed => write!(f, "Status: failed to open Vanguard"),
            Self::WriteError => write!(f, "Status: write error"),
        }
    }
}

/// Point-in-time view of the mirror, published by the runtime.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MirrorSnapshot {
    pub status: MirrorStatus,
    pub enabled: bool,
    pub selected_source: Option<SourceId>,
    /// Color last pushed to the keyboard, if any
    pub last_color: Option<Color>,
    /// Whether the HID link is currently open
    pub link_open: bool,
}

impl MirrorSnapshot {
    /// Status line for display.
    #[must_use]
    pub fn status_text(&self) -> String {
        self.status.to_string()
    }
}
