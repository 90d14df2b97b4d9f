//! Connection to the keyboard's lighting interface.

use std::thread;
use std::time::Duration;

use bytes::{BufMut, BytesMut};
use tracing::{debug, info, warn};
use vanguard_core::{Color, MirrorTarget};

use crate::error::{HidError, HidResult};
use crate::protocol::{
    DEFAULT_FRAME_DELAY, Frame, PRODUCT_ID, REPORT_ID, RGB_USAGE_PAGE, VENDOR_ID, render_frames,
};
use crate::transport::{HidBackend, HidWriter, InterfaceInfo};

/// Device identity and pacing used by a [`DeviceLink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkSettings {
    pub vendor_id: u16,
    pub product_id: u16,
    /// Preferred interface usage page
    pub usage_page: u16,
    /// Pause after each frame
    pub frame_delay: Duration,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            vendor_id: VENDOR_ID,
            product_id: PRODUCT_ID,
            usage_page: RGB_USAGE_PAGE,
            frame_delay: DEFAULT_FRAME_DELAY,
        }
    }
}

/// A frame that could not be written.
#[derive(Debug)]
pub struct FrameFailure {
    /// Position of the frame in the exchange
    pub index: usize,
    pub error: HidError,
}

/// Outcome of a best-effort frame exchange.
#[derive(Debug, Default)]
pub struct SendReport {
    /// Frames written or attempted
    pub attempted: usize,
    pub failures: Vec<FrameFailure>,
}

impl SendReport {
    /// Whether every frame was written.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Owns the HID handle of the keyboard.
///
/// The link is either closed (`device` is `None`) or open. It re-enumerates
/// on every open and never retries on its own.
pub struct DeviceLink<B> {
    backend: B,
    settings: LinkSettings,
    device: Option<Box<dyn HidWriter>>,
}

impl<B: HidBackend> DeviceLink<B> {
    /// Create a closed link for the Vanguard 96.
    pub fn new(backend: B) -> Self {
        Self::with_settings(backend, LinkSettings::default())
    }

    /// Create a closed link with custom settings.
    pub fn with_settings(backend: B, settings: LinkSettings) -> Self {
        Self { backend, settings, device: None }
    }

    /// Whether the link is open.
    pub fn is_open(&self) -> bool {
        self.device.is_some()
    }

    /// Open the lighting interface. A no-op when already open.
    ///
    /// # Errors
    /// Returns [`HidError::NoDeviceFound`] if the keyboard is not on the bus,
    /// [`HidError::NoSuitableInterface`] if no interface can be picked and
    /// [`HidError::OpenFailed`] if the OS refuses to open it.
    pub fn open(&mut self) -> HidResult<()> {
        if self.device.is_some() {
            return Ok(());
        }

        let LinkSettings { vendor_id, product_id, usage_page, .. } = self.settings;

        let interfaces = self.backend.enumerate(vendor_id, product_id)?;
        if interfaces.is_empty() {
            debug!(vendor_id, product_id, "No HID devices found");
            return Err(HidError::NoDeviceFound);
        }

        let target =
            select_interface(&interfaces, usage_page).ok_or(HidError::NoSuitableInterface)?;
        let device = self.backend.open_path(&target.path)?;

        if let Err(e) = device.set_nonblocking() {
            warn!(error = %e, "Could not switch HID handle to non-blocking mode");
        }

        info!(
            path = %target.path.to_string_lossy(),
            usage_page = format_args!("{:#06x}", target.usage_page),
            interface = target.interface_number,
            "Vanguard link opened"
        );

        self.device = Some(device);
        Ok(())
    }

    /// Release the HID handle. A no-op when closed.
    pub fn close(&mut self) {
        if self.device.take().is_some() {
            info!("Vanguard link closed");
        }
    }

    /// Write frames in order, pausing `inter_frame_delay` after each one.
    ///
    /// Opens the link first if needed. A failed frame write is logged and the
    /// exchange carries on with the next frame; the failures are listed in
    /// the returned report.
    ///
    /// # Errors
    /// Returns the [`open`](Self::open) error if the link cannot be opened.
    pub fn send_frames(
        &mut self,
        frames: &[Frame],
        inter_frame_delay: Duration,
    ) -> HidResult<SendReport> {
        self.open()?;
        let Some(device) = self.device.as_ref() else {
            return Err(HidError::NoDeviceFound);
        };

        let mut report = SendReport::default();
        let mut buf = BytesMut::new();

        for (index, frame) in frames.iter().enumerate() {
            buf.clear();
            buf.put_u8(REPORT_ID);
            buf.put_slice(frame);

            report.attempted += 1;
            if let Err(error) = device.write(&buf) {
                warn!(frame = index, error = %error, "Frame write failed");
                report.failures.push(FrameFailure { index, error });
            }

            if !inter_frame_delay.is_zero() {
                thread::sleep(inter_frame_delay);
            }
        }

        Ok(report)
    }

    /// Show a solid color on the whole keyboard.
    ///
    /// # Errors
    /// Returns the [`open`](Self::open) error if the link cannot be opened.
    pub fn set_global_color(&mut self, color: Color) -> HidResult<SendReport> {
        let frames = render_frames(color);
        self.send_frames(&frames, self.settings.frame_delay)
    }
}

/// Pick the lighting interface, falling back to the first one listed.
#[must_use]
pub fn select_interface(interfaces: &[InterfaceInfo], usage_page: u16) -> Option<&InterfaceInfo> {
    interfaces.iter().find(|i| i.usage_page == usage_page).or_else(|| interfaces.first())
}

impl<B: HidBackend> MirrorTarget for DeviceLink<B> {
    type Error = HidError;

    fn is_open(&self) -> bool {
        DeviceLink::is_open(self)
    }

    fn open(&mut self) -> HidResult<()> {
        DeviceLink::open(self)
    }

    fn close(&mut self) {
        DeviceLink::close(self);
    }

    fn set_global_color(&mut self, color: Color) -> HidResult<()> {
        let report = DeviceLink::set_global_color(self, color)?;
        if !report.is_complete() {
            warn!(
                failed = report.failures.len(),
                attempted = report.attempted,
                %color,
                "Color sent with frame errors"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::ffi::CString;
    use std::sync::{Arc, Mutex};

    use assert_matches::assert_matches;
    use vanguard_core::{MirrorLoop, SourceId, SourceRegistry, TickOutcome};

    use super::*;
    use crate::protocol::{COLOR_FRAME_INDEX, COLOR_PAYLOAD_OFFSET, FRAME_COUNT};
    use crate::transport::{MockHidBackend, MockHidWriter};

    const RGB_PATH: &str = "/dev/hidraw2";

    fn interface(path: &str, usage_page: u16) -> InterfaceInfo {
        InterfaceInfo { path: CString::new(path).unwrap(), usage_page, interface_number: 1 }
    }

    fn keyboard_interfaces() -> Vec<InterfaceInfo> {
        vec![interface("/dev/hidraw1", 0x0001), interface(RGB_PATH, RGB_USAGE_PAGE)]
    }

    fn fast() -> LinkSettings {
        LinkSettings { frame_delay: Duration::ZERO, ..LinkSettings::default() }
    }

    fn writer(writes: usize) -> MockHidWriter {
        let mut writer = MockHidWriter::new();
        writer.expect_set_nonblocking().times(1).returning(|| Ok(()));
        writer.expect_write().times(writes).returning(|report| Ok(report.len()));
        writer
    }

    /// Backend that finds the keyboard once and hands out `writer`.
    fn backend(writer: MockHidWriter) -> MockHidBackend {
        let mut backend = MockHidBackend::new();
        backend
            .expect_enumerate()
            .times(1)
            .withf(|vid, pid| *vid == VENDOR_ID && *pid == PRODUCT_ID)
            .returning(|_, _| Ok(keyboard_interfaces()));
        backend
            .expect_open_path()
            .times(1)
            .withf(|path| path.to_bytes() == RGB_PATH.as_bytes())
            .return_once(move |_| Ok(Box::new(writer) as Box<dyn HidWriter>));
        backend
    }

    #[test]
    fn test_select_prefers_rgb_usage_page() {
        let interfaces = keyboard_interfaces();
        let selected = select_interface(&interfaces, RGB_USAGE_PAGE).unwrap();
        assert_eq!(selected.path.to_str().unwrap(), RGB_PATH);
    }

    #[test]
    fn test_select_falls_back_to_first() {
        let interfaces = vec![interface("/dev/hidraw5", 0x000c), interface("/dev/hidraw6", 0x0001)];
        let selected = select_interface(&interfaces, RGB_USAGE_PAGE).unwrap();
        assert_eq!(selected.path.to_str().unwrap(), "/dev/hidraw5");
    }

    #[test]
    fn test_select_empty() {
        assert!(select_interface(&[], RGB_USAGE_PAGE).is_none());
    }

    #[test]
    fn test_open_is_idempotent() {
        let mut link = DeviceLink::with_settings(backend(writer(0)), fast());

        link.open().unwrap();
        link.open().unwrap();
        assert!(link.is_open());
    }

    #[test]
    fn test_open_without_device() {
        let mut backend = MockHidBackend::new();
        backend.expect_enumerate().times(1).returning(|_, _| Ok(Vec::new()));
        backend.expect_open_path().never();

        let mut link = DeviceLink::new(backend);
        assert_matches!(link.open(), Err(HidError::NoDeviceFound));
        assert!(!link.is_open());
    }

    #[test]
    fn test_open_failure_stays_closed() {
        let mut backend = MockHidBackend::new();
        backend.expect_enumerate().returning(|_, _| Ok(keyboard_interfaces()));
        backend
            .expect_open_path()
            .times(1)
            .returning(|_| Err(HidError::OpenFailed("Permission denied".into())));

        let mut link = DeviceLink::new(backend);
        assert_matches!(link.open(), Err(HidError::OpenFailed(_)));
        assert!(!link.is_open());
    }

    #[test]
    fn test_reopen_enumerates_again() {
        let mut backend = MockHidBackend::new();
        backend.expect_enumerate().times(2).returning(|_, _| Ok(keyboard_interfaces()));
        backend.expect_open_path().times(2).returning(|_| Ok(Box::new(writer(0)) as Box<dyn HidWriter>));

        let mut link = DeviceLink::with_settings(backend, fast());
        link.open().unwrap();
        link.close();
        assert!(!link.is_open());
        link.close();
        link.open().unwrap();
    }

    #[test]
    fn test_send_prepends_report_id() {
        let mut writer = MockHidWriter::new();
        writer.expect_set_nonblocking().returning(|| Ok(()));
        writer
            .expect_write()
            .times(2)
            .withf(|report| report.len() == 4 && report[0] == REPORT_ID && report[1..] == [7, 8, 9])
            .returning(|report| Ok(report.len()));

        let mut link = DeviceLink::with_settings(backend(writer), fast());
        let frame = Frame::from_static(&[7, 8, 9]);
        let report = link.send_frames(&[frame.clone(), frame], Duration::ZERO).unwrap();

        assert_eq!(report.attempted, 2);
        assert!(report.is_complete());
    }

    #[test]
    fn test_send_continues_after_failed_frame() {
        let mut writer = MockHidWriter::new();
        writer.expect_set_nonblocking().returning(|| Ok(()));
        let mut calls = 0;
        writer.expect_write().times(FRAME_COUNT).returning(move |report| {
            calls += 1;
            if calls == 5 {
                Err(HidError::WriteError("pipe stalled".into()))
            } else {
                Ok(report.len())
            }
        });

        let mut link = DeviceLink::with_settings(backend(writer), fast());
        let report = link.set_global_color(Color::rgb(1, 2, 3)).unwrap();

        assert_eq!(report.attempted, FRAME_COUNT);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].index, 4);
        assert_matches!(report.failures[0].error, HidError::WriteError(_));
        assert!(link.is_open());
    }

    #[test]
    fn test_all_writes_failing_keeps_link_open() {
        let mut writer = MockHidWriter::new();
        writer.expect_set_nonblocking().returning(|| Ok(()));
        writer
            .expect_write()
            .times(FRAME_COUNT)
            .returning(|_| Err(HidError::WriteError("device gone".into())));

        let registry = Arc::new(SourceRegistry::new());
        registry.upsert(SourceId(0), "GPU", vec![Color::rgb(0, 255, 0)]).unwrap();

        let link = DeviceLink::with_settings(backend(writer), fast());
        let mut mirror = MirrorLoop::new(registry, link);
        mirror.set_selected_source(Some(SourceId(0)));
        mirror.set_enabled(true);

        // Writes are best effort: the color counts as sent and is not retried
        // until the mirror is toggled or the color changes.
        assert_eq!(mirror.on_tick(), TickOutcome::Sent(Color::rgb(0, 255, 0)));
        assert_eq!(mirror.on_tick(), TickOutcome::Unchanged);
        assert!(mirror.target().is_open());
    }

    #[test]
    fn test_send_opens_on_demand() {
        let mut link = DeviceLink::with_settings(backend(writer(FRAME_COUNT)), fast());
        assert!(!link.is_open());

        link.set_global_color(Color::rgb(0, 0, 255)).unwrap();
        assert!(link.is_open());
    }

    #[test]
    fn test_send_propagates_open_error() {
        let mut backend = MockHidBackend::new();
        backend.expect_enumerate().returning(|_, _| Ok(Vec::new()));

        let mut link = DeviceLink::new(backend);
        assert_matches!(
            link.send_frames(&render_frames(Color::default()), Duration::ZERO),
            Err(HidError::NoDeviceFound)
        );
    }

    #[test]
    fn test_frame_delay_paces_writes() {
        let settings = LinkSettings { frame_delay: Duration::from_millis(2), ..fast() };
        let mut link = DeviceLink::with_settings(backend(writer(FRAME_COUNT)), settings);

        let started = std::time::Instant::now();
        link.set_global_color(Color::rgb(1, 1, 1)).unwrap();
        assert!(started.elapsed() >= Duration::from_millis(2) * FRAME_COUNT as u32);
    }

    #[test]
    fn test_mirror_scenario_red() {
        let written: Arc<Mutex<Vec<Vec<u8>>>> = Arc::default();

        let mut writer = MockHidWriter::new();
        writer.expect_set_nonblocking().returning(|| Ok(()));
        let sink = Arc::clone(&written);
        writer.expect_write().returning(move |report| {
            sink.lock().unwrap().push(report.to_vec());
            Ok(report.len())
        });

        let registry = Arc::new(SourceRegistry::new());
        registry.upsert(SourceId(0), "Mainboard", vec![Color::rgb(255, 0, 0)]).unwrap();

        let link = DeviceLink::with_settings(backend(writer), fast());
        let mut mirror = MirrorLoop::new(Arc::clone(&registry), link);
        mirror.set_selected_source(Some(SourceId(0)));
        mirror.set_enabled(true);

        assert_eq!(mirror.on_tick(), TickOutcome::Sent(Color::rgb(255, 0, 0)));
        assert_eq!(mirror.on_tick(), TickOutcome::Unchanged);
        assert!(mirror.target().is_open());
        assert_eq!(mirror.last_color(), Some(Color::rgb(255, 0, 0)));

        let written = written.lock().unwrap();
        assert_eq!(written.len(), FRAME_COUNT);
        // Report ID shifts the frame by one byte on the wire.
        let payload = COLOR_PAYLOAD_OFFSET + 1;
        assert_eq!(written[COLOR_FRAME_INDEX][payload..payload + 4], [255, 0, 0, 255]);
    }
}
