//! Error types for Vanguard core.

use thiserror::Error;

use crate::source::SourceId;

/// Core error type for Vanguard operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid color: {0} (expected 0xRRGGBB or #RRGGBB)")]
    InvalidColor(String),

    #[error("Source not found: {0}")]
    SourceNotFound(SourceId),

    #[error("Invalid source name: {0:?}")]
    InvalidSourceName(String),
}

/// Result type alias for Vanguard core operations.
pub type Result<T> = std::result::Result<T, Error>;
