//! Vanguard Core - colors, color sources and the mirror loop.
//!
//! This crate holds the device-independent part of the bridge: what a color
//! is, where colors come from, and the polling loop that decides when the
//! keyboard needs to be told about a new one.

pub mod color;
pub mod command;
pub mod error;
pub mod mirror;
pub mod source;
pub mod status;

pub use color::Color;
pub use command::Command;
pub use error::{Error, Result};
pub use mirror::{MirrorLoop, MirrorTarget, TickOutcome};
pub use source::{ColorSource, SourceId, SourceInfo, SourceRegistry};
pub use status::{MirrorSnapshot, MirrorStatus};
