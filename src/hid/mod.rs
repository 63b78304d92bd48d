//! # HID Module
//!
//! Discovery, opening and reading of the USB HID transmitter.
//!
//! This module handles:
//! - Describing candidate interfaces and the opened device
//! - The [`HidBackend`] capability trait (`discover`, `open`, `read`, `close`)
//!   that keeps platform HID calls out of the reader loop
//! - [`DeviceSession`], which owns a backend and encapsulates open/reconnect state
//! - The hidapi-based backend used on real hardware
//! - Report descriptor walking for the input report length capability query

pub mod descriptor;
pub mod hidapi_backend;
pub mod session;

use std::time::Duration;

use bytes::Bytes;

use crate::error::{DeviceError, ReadError};

pub use hidapi_backend::HidapiBackend;
pub use session::DeviceSession;

/// HID usage page "Generic Desktop".
pub const USAGE_PAGE_GENERIC_DESKTOP: u16 = 0x01;

/// Generic Desktop usages that identify a stick-type controller.
pub const FLIGHT_CONTROLLER_USAGES: &[u16] = &[
    0x04, // Joystick
    0x05, // Gamepad
    0x08, // Multi-axis controller
];

/// Builds the stable identity used to key persisted calibrations.
///
/// # Examples
///
/// ```
/// use flight_hid::hid::device_id;
///
/// assert_eq!(device_id(0x2ca3, 0x1020), "VID_2CA3_PID_1020");
/// ```
#[must_use]
pub fn device_id(vendor_id: u16, product_id: u16) -> String {
    format!("VID_{:04X}_PID_{:04X}", vendor_id, product_id)
}

/// One enumerated HID interface matching the vendor/product filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceCandidate {
    pub vendor_id: u16,
    pub product_id: u16,
    /// Platform path / handle token used to open the interface.
    pub path: String,
    pub usage_page: u16,
    pub usage: u16,
    pub interface_number: i32,
    pub product: Option<String>,
}

impl DeviceCandidate {
    /// True when the top-level collection is a joystick, gamepad or
    /// multi-axis controller.
    #[must_use]
    pub fn is_flight_controller_class(&self) -> bool {
        self.usage_page == USAGE_PAGE_GENERIC_DESKTOP
            && FLIGHT_CONTROLLER_USAGES.contains(&self.usage)
    }
}

/// The opened transmitter. Immutable while the session is open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub vendor_id: u16,
    pub product_id: u16,
    pub path: String,
    /// Exact input report length learned from the capability query.
    pub input_report_len: usize,
}

impl DeviceDescriptor {
    /// Stable identity of this transmitter.
    #[must_use]
    pub fn device_id(&self) -> String {
        device_id(self.vendor_id, self.product_id)
    }
}

/// One input report as read from the device.
///
/// The buffer is always `input_report_len` long; only the first
/// `bytes_read` bytes carry data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawReport {
    buffer: Bytes,
    bytes_read: usize,
}

impl RawReport {
    /// Wraps a report buffer. `bytes_read` is clamped to the buffer length.
    #[must_use]
    pub fn new(buffer: Bytes, bytes_read: usize) -> Self {
        let bytes_read = bytes_read.min(buffer.len());
        Self { buffer, bytes_read }
    }

    /// Convenience constructor for a fully-read report.
    #[must_use]
    pub fn from_slice(data: &[u8]) -> Self {
        Self::new(Bytes::copy_from_slice(data), data.len())
    }

    /// The bytes actually read.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.buffer[..self.bytes_read]
    }

    /// Number of bytes actually read.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes_read
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes_read == 0
    }

    /// Full buffer length (the device's input report length).
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }
}

/// Platform HID capability interface.
///
/// Keeps the reader loop and calibration engine platform-agnostic: the
/// hidapi implementation talks to hardware, tests replay canned reports.
#[cfg_attr(test, mockall::automock)]
pub trait HidBackend: Send + 'static {
    /// Enumerates interfaces matching the vendor/product id.
    fn discover(
        &mut self,
        vendor_id: u16,
        product_id: u16,
    ) -> Result<Vec<DeviceCandidate>, DeviceError>;

    /// Opens one interface and runs the capability query.
    ///
    /// Returns the input report length when the device reports one.
    fn open(&mut self, candidate: &DeviceCandidate) -> Result<Option<usize>, DeviceError>;

    /// Reads one report, waiting at most `timeout`.
    ///
    /// `Ok(0)` means no new data arrived within the timeout.
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, ReadError>;

    /// Releases the open handle, if any.
    fn close(&mut self);
}
