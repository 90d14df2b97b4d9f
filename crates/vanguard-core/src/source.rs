//! Color sources the mirror can follow.
//!
//! The mirror only ever sees sources through [`ColorSource`]. The daemon backs
//! it with a [`SourceRegistry`] that producers fill over IPC.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::color::Color;
use crate::error::{Error, Result};

/// Identifier of a color source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(pub u32);

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Listing entry for a source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceInfo {
    pub id: SourceId,
    /// Human-readable name
    pub name: String,
}

/// Something that can be sampled for a color.
pub trait ColorSource {
    /// All sources currently known, in display order.
    fn list_sources(&self) -> Vec<SourceInfo>;

    /// Current color of a source.
    ///
    /// Returns `None` if the source is unknown or has no color data.
    fn sample_color(&self, id: SourceId) -> Option<Color>;
}

impl<S: ColorSource + ?Sized> ColorSource for Arc<S> {
    fn list_sources(&self) -> Vec<SourceInfo> {
        (**self).list_sources()
    }

    fn sample_color(&self, id: SourceId) -> Option<Color> {
        (**self).sample_color(id)
    }
}

#[derive(Debug, Clone)]
struct SourceEntry {
    info: SourceInfo,
    colors: Vec<Color>,
}

/// Thread-safe in-memory source registry.
#[derive(Debug, Default)]
pub struct SourceRegistry {
    entries: RwLock<Vec<SourceEntry>>,
}

impl SourceRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a source or replace its name and color buffer.
    ///
    /// New sources are appended; updating keeps its position.
    ///
    /// # Errors
    /// Returns an error if the name is blank.
    pub fn upsert(&self, id: SourceId, name: &str, colors: Vec<Color>) -> Result<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::InvalidSourceName(name.to_string()));
        }

        let mut entries = self.entries.write();
        if let Some(entry) = entries.iter_mut().find(|e| e.info.id == id) {
            entry.info.name = name.to_string();
            entry.colors = colors;
        } else {
            debug!(%id, name, "Source registered");
            entries.push(SourceEntry { info: SourceInfo { id, name: name.to_string() }, colors });
        }

        Ok(())
    }

    /// Remove a source.
    ///
    /// # Errors
    /// Returns an error if the source does not exist.
    pub fn remove(&self, id: SourceId) -> Result<SourceInfo> {
        let mut entries = self.entries.write();
        let index =
            entries.iter().position(|e| e.info.id == id).ok_or(Error::SourceNotFound(id))?;

        let entry = entries.remove(index);
        debug!(%id, name = %entry.info.name, "Source removed");
        Ok(entry.info)
    }

    /// Check whether a source exists.
    #[must_use]
    pub fn contains(&self, id: SourceId) -> bool {
        self.entries.read().iter().any(|e| e.info.id == id)
    }

    /// Number of registered sources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether no sources are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl ColorSource for SourceRegistry {
    fn list_sources(&self) -> Vec<SourceInfo> {
        self.entries.read().iter().map(|e| e.info.clone()).collect()
    }

    fn sample_color(&self, id: SourceId) -> Option<Color> {
        self.entries.read().iter().find(|e| e.info.id == id)?.colors.first().copied()
    }
}
