//! # Channels Module
//!
//! Normalized flight channels and the store they are published through.
//!
//! This module handles:
//! - Normalizing raw axis values with the active calibration
//! - The [`ChannelSnapshot`] consumers poll every frame
//! - The lock-guarded [`ChannelStore`] shared between the reader thread and consumers

pub mod normalizer;
pub mod store;

use serde::Serialize;

pub use normalizer::normalize_channels;
pub use store::ChannelStore;

/// Normalized flight channels.
///
/// Roll, pitch and yaw are in -1.0..1.0, throttle in 0.0..1.0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ChannelSnapshot {
    pub roll: f32,
    pub pitch: f32,
    pub yaw: f32,
    pub throttle: f32,
}
