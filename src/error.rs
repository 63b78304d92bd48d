//! # Error Types
//!
//! Custom error types for Flight HID using `thiserror`.
//!
//! Device and read errors are recoverable by design: the reader loop retries
//! them indefinitely while armed. Only configuration and persistence errors
//! surface to the application.

use thiserror::Error;

/// Failures while discovering or opening the transmitter.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeviceError {
    /// No HID interface matched the configured vendor/product id
    #[error("no HID device found for VID 0x{vendor_id:04X} PID 0x{product_id:04X}")]
    NotFound { vendor_id: u16, product_id: u16 },

    /// A matching interface exists but its handle could not be obtained
    #[error("failed to open HID device {path}: {reason}")]
    OpenFailed { path: String, reason: String },

    /// The host HID layer itself failed (enumeration, initialisation)
    #[error("HID backend error: {0}")]
    Backend(String),
}

/// Failures while reading a single input report.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReadError {
    /// One read failed but the device is still present
    #[error("transient read failure: {0}")]
    Transient(String),

    /// The device was removed, reset or powered off
    #[error("device disconnected: {0}")]
    Disconnected(String),
}

impl ReadError {
    /// True when the session must be closed and discovery restarted.
    #[must_use]
    pub fn is_disconnect(&self) -> bool {
        matches!(self, ReadError::Disconnected(_))
    }
}

/// Failures while turning a report into raw axis values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// Report shorter than the decoder table requires
    #[error("report too short: need {needed} bytes, got {got}")]
    TooShort { needed: usize, got: usize },
}

/// Main error type for Flight HID
#[derive(Debug, Error)]
pub enum FlightHidError {
    /// Device discovery / open errors
    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    /// Report read errors
    #[error("Read error: {0}")]
    Read(#[from] ReadError),

    /// Report decode errors
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// Calibration record (de)serialization errors
    #[error("Calibration format error: {0}")]
    Json(#[from] serde_json::Error),

    /// Calibration procedure errors
    #[error("Calibration error: {0}")]
    Calibration(String),

    /// Background reader errors
    #[error("Reader error: {0}")]
    Reader(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Flight HID
pub type Result<T> = std::result::Result<T, FlightHidError>;
