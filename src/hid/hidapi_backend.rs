//! # hidapi Backend
//!
//! [`HidBackend`] implementation on top of the `hidapi` crate.
//!
//! The input report length comes from the device's report descriptor
//! (see [`super::descriptor`]). A failed read is classified by checking
//! whether the device path is still enumerated: a vanished path means the
//! transmitter was unplugged or powered off.

use std::ffi::CString;
use std::time::Duration;

use hidapi::{HidApi, HidDevice};
use tracing::debug;

use super::descriptor::input_report_len;
use super::{DeviceCandidate, HidBackend};
use crate::error::{DeviceError, ReadError};

/// Upper bound of a HID report descriptor.
const MAX_REPORT_DESCRIPTOR_SIZE: usize = 4096;

/// Real-hardware backend.
pub struct HidapiBackend {
    api: HidApi,
    device: Option<HidDevice>,
    path: Option<String>,
}

impl std::fmt::Debug for HidapiBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HidapiBackend")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl HidapiBackend {
    /// Initialises the host HID library.
    ///
    /// # Errors
    ///
    /// Returns `Backend` if hidapi cannot be initialised.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use flight_hid::hid::HidapiBackend;
    ///
    /// let backend = HidapiBackend::new()?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn new() -> Result<Self, DeviceError> {
        let api = HidApi::new().map_err(|e| DeviceError::Backend(e.to_string()))?;
        Ok(Self {
            api,
            device: None,
            path: None,
        })
    }

    /// Lists every HID interface on the host, optionally filtered by vendor id.
    ///
    /// # Errors
    ///
    /// Returns `Backend` if the device list cannot be refreshed.
    pub fn list(&mut self, vendor_id: Option<u16>) -> Result<Vec<DeviceCandidate>, DeviceError> {
        self.api
            .refresh_devices()
            .map_err(|e| DeviceError::Backend(e.to_string()))?;

        Ok(self
            .api
            .device_list()
            .filter(|info| vendor_id.map_or(true, |vid| info.vendor_id() == vid))
            .map(|info| DeviceCandidate {
                vendor_id: info.vendor_id(),
                product_id: info.product_id(),
                path: info.path().to_string_lossy().into_owned(),
                usage_page: info.usage_page(),
                usage: info.usage(),
                interface_number: info.interface_number(),
                product: info.product_string().map(str::to_string),
            })
            .collect())
    }

    fn query_input_report_len(device: &HidDevice) -> Option<usize> {
        let mut descriptor = vec![0u8; MAX_REPORT_DESCRIPTOR_SIZE];
        match device.get_report_descriptor(&mut descriptor) {
            Ok(len) => input_report_len(&descriptor[..len.min(descriptor.len())]),
            Err(e) => {
                debug!("Report descriptor unavailable: {}", e);
                None
            }
        }
    }

    /// True when the opened path is still enumerated by the host.
    fn still_present(&mut self) -> bool {
        let Some(path) = self.path.as_deref() else {
            return false;
        };
        if self.api.refresh_devices().is_err() {
            // Cannot tell; treat as transient and let the next read decide.
            return true;
        }
        self.api
            .device_list()
            .any(|info| info.path().to_string_lossy() == path)
    }
}

/// Millisecond timeout for hidapi. Saturates at `i32::MAX`; a sub-millisecond
/// timeout rounds up so it never becomes a non-blocking read.
fn timeout_millis(timeout: Duration) -> i32 {
    if timeout.is_zero() {
        return 0;
    }
    let millis = timeout.as_millis().max(1);
    i32::try_from(millis).unwrap_or(i32::MAX)
}

impl HidBackend for HidapiBackend {
    fn discover(
        &mut self,
        vendor_id: u16,
        product_id: u16,
    ) -> Result<Vec<DeviceCandidate>, DeviceError> {
        let candidates: Vec<DeviceCandidate> = self
            .list(Some(vendor_id))?
            .into_iter()
            .filter(|c| c.product_id == product_id)
            .collect();

        for candidate in &candidates {
            debug!(
                "Found HID interface: {} (usage page 0x{:04X}, usage 0x{:04X}, interface {}, product {:?})",
                candidate.path,
                candidate.usage_page,
                candidate.usage,
                candidate.interface_number,
                candidate.product
            );
        }

        Ok(candidates)
    }

    fn open(&mut self, candidate: &DeviceCandidate) -> Result<Option<usize>, DeviceError> {
        self.close();

        let open_failed = |reason: String| DeviceError::OpenFailed {
            path: candidate.path.clone(),
            reason,
        };

        let c_path = CString::new(candidate.path.as_bytes())
            .map_err(|e| open_failed(format!("invalid device path: {}", e)))?;
        let device = self
            .api
            .open_path(&c_path)
            .map_err(|e| open_failed(e.to_string()))?;

        let report_len = Self::query_input_report_len(&device);
        self.device = Some(device);
        self.path = Some(candidate.path.clone());
        Ok(report_len)
    }

    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, ReadError> {
        let Some(device) = self.device.as_ref() else {
            return Err(ReadError::Disconnected("no open device".to_string()));
        };

        match device.read_timeout(buf, timeout_millis(timeout)) {
            Ok(n) => Ok(n),
            Err(e) => {
                let reason = e.to_string();
                if self.still_present() {
                    Err(ReadError::Transient(reason))
                } else {
                    Err(ReadError::Disconnected(reason))
                }
            }
        }
    }

    fn close(&mut self) {
        self.device = None;
        self.path = None;
    }
}
