//! Corsair Vanguard 96 lighting protocol.
//!
//! Setting a color is a scripted exchange of 27 output reports. The script was
//! captured from the vendor software and is replayed byte for byte; only the
//! color frame carries data of ours. The firmware expects every frame in this
//! exact order, including the ones that look like repeats.

use std::time::Duration;

use bytes::{Bytes, BytesMut};
use vanguard_core::Color;

/// Corsair USB Vendor ID
pub const VENDOR_ID: u16 = 0x1B1C;
/// Vanguard 96 USB Product ID
pub const PRODUCT_ID: u16 = 0x2B0D;
/// Usage page of the vendor-specific lighting interface
pub const RGB_USAGE_PAGE: u16 = 0xFF42;
/// Report ID prepended to every frame on the wire
pub const REPORT_ID: u8 = 0x00;

/// Number of frames in one exchange
pub const FRAME_COUNT: usize = 27;
/// Position of the color frame in the exchange
pub const COLOR_FRAME_INDEX: usize = 12;
/// Offset of the `[brightness, b, g, r]` payload in the color frame
pub const COLOR_PAYLOAD_OFFSET: usize = 16;

/// Pause between frames; the firmware drops frames sent back to back.
pub const DEFAULT_FRAME_DELAY: Duration = Duration::from_millis(20);

/// One HID output report body, without the report ID.
pub type Frame = Bytes;

#[rustfmt::skip]
static BASE_FRAMES: [&[u8]; FRAME_COUNT] = [
    &[0, 1, 0, 2, 225, 0],
    &[0, 1, 0, 1, 3, 0, 2, 0, 0, 0],
    &[0, 1, 0, 13, 0, 96, 109],
    &[0, 1, 0, 9, 0],
    &[0, 1, 0, 2, 225, 0],
    &[0, 1, 0, 8, 0],
    &[0, 1, 0, 5, 1, 0],
    &[0, 1, 0, 13, 0, 98, 109],
    &[0, 1, 0, 9, 0],
    &[0, 1, 0, 8, 0],
    &[0, 1, 0, 5, 1, 0],
    &[0, 1, 0, 13, 1, 101, 109],
    // Color frame: bytes 16..20 are replaced.
    &[
        0, 1, 0, 6, 1, 115, 0, 0, 0, 126, 32, 1, 0, 0, 0, 1,
        255, 255, 0, 0, 103, 41, 58, 59, 60, 61, 62, 63,
        64, 65, 66, 67, 68, 69, 70, 76, 53, 30, 31, 32,
        33, 34, 35, 36, 37, 38, 39, 45, 46, 42, 43, 20,
        26, 8, 21, 23, 28, 24, 12, 18, 19, 47, 48, 40,
        57, 4, 22, 7, 9, 10, 11, 13, 14, 15, 51, 52, 50,
        106, 100, 29, 27, 6, 25, 5, 17, 16, 54, 55, 56,
        110, 105, 108, 107, 44, 111, 122, 136, 82, 80,
        81, 79, 83, 84, 85, 86, 95, 96, 97, 87, 92, 93,
        94, 89, 90, 91, 88, 98, 99, 130, 131, 132, 133,
        134, 135,
    ],
    &[0, 1, 0, 5, 1, 1],
    &[0, 1, 0, 13, 2, 98, 109],
    &[0, 1, 0, 6, 2, 8, 0, 0, 0, 105, 108, 1, 0, 8, 0, 101, 109],
    &[0, 1, 0, 5, 1, 2],
    &[0, 1, 0, 1, 3, 0, 2, 0, 0, 0],
    &[0, 1, 0, 13, 3, 96, 109],
    &[0, 1, 0, 9, 3],
    &[0, 1, 0, 8, 3],
    &[0, 1, 0, 5, 1, 3],
    &[0, 1, 0, 13, 3, 96, 109],
    &[
        0, 1, 0, 6, 3, 42, 0, 0, 0, 30, 241, 81, 145, 118, 105, 0, 0,
        97, 109, 0, 0, 98, 109, 99, 109, 0, 0, 100, 109, 0, 0, 0, 0,
        0, 0, 0, 0, 0, 0, 1, 0, 49, 0, 0, 0, 0, 0, 0, 0, 102, 109,
    ],
    &[0, 1, 0, 5, 1, 3],
    &[0, 1, 0, 1, 3, 0, 1, 0, 0, 0],
    &[0, 1, 0, 1, 3, 0, 1, 0, 0, 0],
];

/// Render the full exchange for a solid color.
///
/// All frames except the color frame are the captured script, untouched.
#[must_use]
pub fn render_frames(color: Color) -> Vec<Frame> {
    BASE_FRAMES
        .iter()
        .enumerate()
        .map(|(index, template)| {
            if index == COLOR_FRAME_INDEX {
                color_frame(color)
            } else {
                Bytes::from_static(*template)
            }
        })
        .collect()
}

/// Splice a color into the color frame template.
///
/// The payload order is brightness, blue, green, red.
fn color_frame(color: Color) -> Frame {
    let mut frame = BytesMut::from(BASE_FRAMES[COLOR_FRAME_INDEX]);
    frame[COLOR_PAYLOAD_OFFSET..COLOR_PAYLOAD_OFFSET + 4]
        .copy_from_slice(&[color.brightness, color.b, color.g, color.r]);
    frame.freeze()
}
