//! HID error types.

use thiserror::Error;

/// HID error type.
#[derive(Debug, Error)]
pub enum HidError {
    #[error("No HID devices found")]
    NoDeviceFound,

    #[error("No suitable HID interface")]
    NoSuitableInterface,

    #[error("Failed to open HID interface: {0}")]
    OpenFailed(String),

    #[error("Write error: {0}")]
    WriteError(String),

    #[error("HID backend error: {0}")]
    Backend(String),
}

impl From<hidapi::HidError> for HidError {
    fn from(e: hidapi::HidError) -> Self {
        Self::Backend(e.to_string())
    }
}

/// Result type for HID operations.
pub type HidResult<T> = Result<T, HidError>;
