//! # Device Session
//!
//! Owns a [`HidBackend`] and the currently opened [`DeviceDescriptor`].
//!
//! ## Lifecycle
//!
//! 1. `open()` enumerates matching interfaces, prefers a joystick / gamepad /
//!    multi-axis collection, opens it and runs the capability query once
//! 2. `read_report()` reads with a bounded timeout; `Ok(None)` means no new data
//! 3. On a disconnect-class failure the owner calls `close()` and goes back to 1
//!
//! A closed session never reaches the backend's `read`.

use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, info, warn};

use super::{DeviceCandidate, DeviceDescriptor, HidBackend, RawReport};
use crate::error::{DeviceError, ReadError};

/// Open/closed state of one transmitter connection.
pub struct DeviceSession<B: HidBackend> {
    backend: B,
    vendor_id: u16,
    product_id: u16,
    fallback_report_len: usize,
    descriptor: Option<DeviceDescriptor>,
    buffer: Vec<u8>,
}

impl<B: HidBackend> std::fmt::Debug for DeviceSession<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceSession")
            .field("vendor_id", &self.vendor_id)
            .field("product_id", &self.product_id)
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

impl<B: HidBackend> DeviceSession<B> {
    /// Creates a closed session targeting one vendor/product id.
    ///
    /// `fallback_report_len` is used only when the capability query cannot
    /// report an input length.
    pub fn new(backend: B, vendor_id: u16, product_id: u16, fallback_report_len: usize) -> Self {
        Self {
            backend,
            vendor_id,
            product_id,
            fallback_report_len: fallback_report_len.max(1),
            descriptor: None,
            buffer: Vec::new(),
        }
    }

    /// Discovers and opens the transmitter.
    ///
    /// Candidates are tried in preference order; the last open failure is
    /// returned when none of them can be opened.
    ///
    /// # Errors
    ///
    /// - `NotFound`: no interface matches the vendor/product id
    /// - `OpenFailed`: every matching interface refused to open
    /// - `Backend`: enumeration itself failed
    pub fn open(&mut self) -> Result<&DeviceDescriptor, DeviceError> {
        if self.descriptor.is_some() {
            self.close();
        }

        let candidates = self.backend.discover(self.vendor_id, self.product_id)?;
        if candidates.is_empty() {
            return Err(DeviceError::NotFound {
                vendor_id: self.vendor_id,
                product_id: self.product_id,
            });
        }

        let mut last_error = None;
        for candidate in preference_order(&candidates) {
            debug!(
                "Trying HID interface {} (usage page 0x{:04X}, usage 0x{:04X}, interface {})",
                candidate.path, candidate.usage_page, candidate.usage, candidate.interface_number
            );

            match self.backend.open(candidate) {
                Ok(report_len) => {
                    let input_report_len = match report_len {
                        Some(len) if len > 0 => len,
                        _ => {
                            warn!(
                                "Capability query gave no input report length for {}, using {} bytes",
                                candidate.path, self.fallback_report_len
                            );
                            self.fallback_report_len
                        }
                    };

                    info!(
                        "Opened HID device {} (VID 0x{:04X} PID 0x{:04X}, usage page 0x{:04X}, usage 0x{:04X}, input report {} bytes)",
                        candidate.path,
                        candidate.vendor_id,
                        candidate.product_id,
                        candidate.usage_page,
                        candidate.usage,
                        input_report_len
                    );

                    self.buffer = vec![0u8; input_report_len];
                    let descriptor = self.descriptor.insert(DeviceDescriptor {
                        vendor_id: candidate.vendor_id,
                        product_id: candidate.product_id,
                        path: candidate.path.clone(),
                        input_report_len,
                    });
                    return Ok(&*descriptor);
                }
                Err(e) => {
                    debug!("Could not open {}: {}", candidate.path, e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or(DeviceError::NotFound {
            vendor_id: self.vendor_id,
            product_id: self.product_id,
        }))
    }

    /// Reads one report, blocking at most `timeout`.
    ///
    /// Returns `Ok(None)` when no report arrived within the timeout.
    ///
    /// # Errors
    ///
    /// - `Disconnected`: the session is closed or the device went away
    /// - `Transient`: a single read failed; the device is still present
    pub fn read_report(&mut self, timeout: Duration) -> Result<Option<RawReport>, ReadError> {
        if self.descriptor.is_none() {
            return Err(ReadError::Disconnected("session is not open".to_string()));
        }

        self.buffer.fill(0);
        let bytes_read = self.backend.read(&mut self.buffer, timeout)?;
        if bytes_read == 0 {
            return Ok(None);
        }

        Ok(Some(RawReport::new(
            Bytes::copy_from_slice(&self.buffer),
            bytes_read,
        )))
    }

    /// Closes the device handle. Safe to call on a closed session.
    pub fn close(&mut self) {
        if let Some(descriptor) = self.descriptor.take() {
            self.backend.close();
            debug!("Closed HID device {}", descriptor.path);
        }
    }

    /// True while a device handle is open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.descriptor.is_some()
    }

    /// The opened device, if any.
    #[must_use]
    pub fn descriptor(&self) -> Option<&DeviceDescriptor> {
        self.descriptor.as_ref()
    }

    /// Closes the session and hands the backend back.
    pub fn into_backend(mut self) -> B {
        self.close();
        self.backend
    }
}

/// Orders candidates so joystick-class collections come first, keeping
/// enumeration order otherwise.
fn preference_order(candidates: &[DeviceCandidate]) -> Vec<&DeviceCandidate> {
    let mut ordered: Vec<&DeviceCandidate> = candidates.iter().collect();
    ordered.sort_by_key(|c| !c.is_flight_controller_class());
    ordered
}
