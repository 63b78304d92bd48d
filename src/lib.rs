//! # Flight HID Library
//!
//! Read a USB HID flight-control transmitter and turn it into calibrated
//! roll/pitch/yaw/throttle channels.
//!
//! A background reader thread owns the device session, decodes every input
//! report into raw axis values, normalizes them with the active calibration
//! and publishes the latest [`channels::ChannelSnapshot`]. The guided
//! [`calibration::CalibrationEngine`] discovers which physical axis is which
//! from live samples.

pub mod calibration;
pub mod channels;
pub mod config;
pub mod decoder;
pub mod error;
pub mod hid;
pub mod reader;
