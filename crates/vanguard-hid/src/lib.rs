//! Vanguard HID - Corsair Vanguard 96 lighting over USB HID.
//!
//! [`protocol`] renders the fixed frame exchange that sets a solid color, and
//! [`link`] owns the HID handle that carries it to the keyboard.
//!
//! The keyboard exposes several HID interfaces; lighting lives on the one with
//! vendor usage page `0xFF42`.

pub mod error;
pub mod link;
pub mod protocol;
pub mod transport;

pub use error::{HidError, HidResult};
pub use link::{DeviceLink, LinkSettings, SendReport};
pub use protocol::{Frame, render_frames};
pub use transport::{HidApiBackend, HidBackend, HidWriter, InterfaceInfo};
