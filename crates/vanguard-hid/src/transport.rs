//! HID transport seam.
//!
//! [`DeviceLink`](crate::link::DeviceLink) only needs to enumerate interfaces,
//! open one by path and write reports to it. Those three operations are
//! behind traits so the link can be exercised without hardware.

use std::ffi::{CStr, CString};

use hidapi::{HidApi, HidDevice};
use tracing::debug;

use crate::error::{HidError, HidResult};

/// One HID interface exposed by a USB device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceInfo {
    /// OS path used to open the interface
    pub path: CString,
    /// HID usage page from the report descriptor
    pub usage_page: u16,
    /// USB interface number, -1 if unknown
    pub interface_number: i32,
}

/// Enumerates and opens HID interfaces.
#[cfg_attr(test, mockall::automock)]
pub trait HidBackend {
    /// List every interface of the given device, re-reading the bus.
    ///
    /// # Errors
    /// Returns an error if the bus cannot be enumerated.
    fn enumerate(&mut self, vendor_id: u16, product_id: u16) -> HidResult<Vec<InterfaceInfo>>;

    /// Open an interface by OS path.
    ///
    /// # Errors
    /// Returns [`HidError::OpenFailed`] if the OS refuses the open.
    fn open_path(&mut self, path: &CStr) -> HidResult<Box<dyn HidWriter>>;
}

/// An open HID interface.
#[cfg_attr(test, mockall::automock)]
pub trait HidWriter {
    /// Switch the handle to non-blocking I/O.
    ///
    /// # Errors
    /// Returns an error if the mode cannot be changed.
    fn set_nonblocking(&self) -> HidResult<()>;

    /// Write one output report, report ID first.
    ///
    /// # Errors
    /// Returns [`HidError::WriteError`] with the device error string.
    fn write(&self, report: &[u8]) -> HidResult<usize>;
}

/// [`HidBackend`] backed by the system hidapi library.
pub struct HidApiBackend {
    api: HidApi,
}

impl HidApiBackend {
    /// Initialise hidapi.
    ///
    /// # Errors
    /// Returns an error if the HID subsystem is unavailable.
    pub fn new() -> HidResult<Self> {
        let api = HidApi::new()?;
        Ok(Self { api })
    }
}

impl HidBackend for HidApiBackend {
    fn enumerate(&mut self, vendor_id: u16, product_id: u16) -> HidResult<Vec<InterfaceInfo>> {
        // Paths change across replugs, so never trust the previous listing.
        self.api.refresh_devices()?;

        let interfaces: Vec<_> = self
            .api
            .device_list()
            .filter(|d| d.vendor_id() == vendor_id && d.product_id() == product_id)
            .map(|d| InterfaceInfo {
                path: d.path().to_owned(),
                usage_page: d.usage_page(),
                interface_number: d.interface_number(),
            })
            .collect();

        debug!(vendor_id, product_id, count = interfaces.len(), "Enumerated HID interfaces");
        Ok(interfaces)
    }

    fn open_path(&mut self, path: &CStr) -> HidResult<Box<dyn HidWriter>> {
        let device =
            self.api.open_path(path).map_err(|e| HidError::OpenFailed(e.to_string()))?;
        Ok(Box::new(device))
    }
}

impl HidWriter for HidDevice {
    fn set_nonblocking(&self) -> HidResult<()> {
        self.set_blocking_mode(false)?;
        Ok(())
    }

    fn write(&self, report: &[u8]) -> HidResult<usize> {
        HidDevice::write(self, report).map_err(|e| HidError::WriteError(e.to_string()))
    }
}
