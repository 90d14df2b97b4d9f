//! Polling mirror from a color source onto a lighting target.
//!
//! The loop is driven by a fixed tick. Each tick samples the selected source
//! and only talks to the target when the color differs from the one last sent,
//! which keeps USB traffic down and avoids waking the keyboard for nothing.

use std::fmt::Display;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::color::Color;
use crate::source::{ColorSource, SourceId};
use crate::status::{MirrorSnapshot, MirrorStatus};

/// Default polling period (~20 Hz).
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(50);

/// Device the mirror writes to.
pub trait MirrorTarget {
    type Error: Display;

    /// Whether the device connection is open.
    fn is_open(&self) -> bool;

    /// Open the device connection. Must be a no-op when already open.
    ///
    /// # Errors
    /// Returns an error if the device cannot be opened.
    fn open(&mut self) -> Result<(), Self::Error>;

    /// Release the device connection. Must be a no-op when closed.
    fn close(&mut self);

    /// Show a solid color on the whole device.
    ///
    /// # Errors
    /// Returns an error if the color could not be delivered.
    fn set_global_color(&mut self, color: Color) -> Result<(), Self::Error>;
}

/// What a single tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Mirroring is disabled
    Disabled,
    /// No source selected or the source has no color
    NoColor,
    /// Sampled color equals the last sent one
    Unchanged,
    /// Color was pushed to the target
    Sent(Color),
    /// Target could not be opened
    OpenFailed,
    /// Target was open but the color could not be delivered
    WriteFailed,
}

/// Mirrors the selected source's color onto a target.
pub struct MirrorLoop<S, T> {
    source: S,
    target: T,
    enabled: bool,
    selected: Option<SourceId>,
    /// Color last delivered; `None` forces the next tick to send.
    last_color: Option<Color>,
    status: MirrorStatus,
}

impl<S: ColorSource, T: MirrorTarget> MirrorLoop<S, T> {
    /// Create a disabled mirror with no source selected.
    pub fn new(source: S, target: T) -> Self {
        Self {
            source,
            target,
            enabled: false,
            selected: None,
            last_color: None,
            status: MirrorStatus::Loaded,
        }
    }

    /// Enable or disable mirroring.
    ///
    /// Any call forgets the last sent color, since the keyboard may have been
    /// reset while we were not looking. Disabling also releases the device.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        self.last_color = None;

        if enabled {
            self.status = MirrorStatus::Enabled;
        } else {
            self.target.close();
            self.status = MirrorStatus::Disabled;
        }

        info!(enabled, "Mirroring toggled");
    }

    /// Select the source to mirror, or none.
    pub fn set_selected_source(&mut self, source: Option<SourceId>) {
        self.selected = source;
        self.last_color = None;

        self.status = match source {
            Some(id) => MirrorStatus::Mirroring(id),
            None => MirrorStatus::NoSourceSelected,
        };

        info!(source = ?source, "Mirror source selected");
    }

    /// Run one polling step.
    pub fn on_tick(&mut self) -> TickOutcome {
        if !self.enabled {
            return TickOutcome::Disabled;
        }

        let Some(source) = self.selected else {
            return TickOutcome::NoColor;
        };
        let Some(color) = self.source.sample_color(source) else {
            return TickOutcome::NoColor;
        };

        if self.last_color == Some(color) {
            return TickOutcome::Unchanged;
        }

        if !self.target.is_open()
            && let Err(e) = self.target.open()
        {
            warn!(error = %e, "Failed to open keyboard");
            self.status = MirrorStatus::OpenFailed;
            return TickOutcome::OpenFailed;
        }

        if let Err(e) = self.target.set_global_color(color) {
            warn!(error = %e, %color, "Failed to set keyboard color");
            self.status = MirrorStatus::WriteError;
            return TickOutcome::WriteFailed;
        }

        debug!(%source, %color, "Mirrored color");
        self.last_color = Some(color);
        self.status = MirrorStatus::Mirroring(source);
        TickOutcome::Sent(color)
    }

    /// Release the device; used when the host unloads the mirror.
    pub fn shutdown(&mut self) {
        self.target.close();
        self.status = MirrorStatus::Idle;
    }

    /// Color last delivered to the target.
    #[must_use]
    pub fn last_color(&self) -> Option<Color> {
        self.last_color
    }

    /// Last known outcome.
    #[must_use]
    pub fn status(&self) -> MirrorStatus {
        self.status
    }

    /// Status line for display.
    #[must_use]
    pub fn status_text(&self) -> String {
        self.status.to_string()
    }

    /// Capture the current state.
    #[must_use]
    pub fn snapshot(&self) -> MirrorSnapshot {
        MirrorSnapshot {
            status: self.status,
            enabled: self.enabled,
            selected_source: self.selected,
            last_color: self.last_color,
            link_open: self.target.is_open(),
        }
    }

    /// The color source.
    pub fn source(&self) -> &S {
        &self.source
    }

    /// The target device.
    pub fn target(&self) -> &T {
        &self.target
    }
}
