//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.
//!
//! Every section and every field has a default, so an empty file (or no
//! file at all) yields a working configuration for the DJI FPV Remote
//! Controller 2.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::calibration::{AxisCalibration, Calibration, CalibrationSettings, LogicalAxis};
use crate::decoder::{AxisField, FieldDecoder};
use crate::error::{FlightHidError, Result};
use crate::reader::ReaderSettings;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub decoder: DecoderConfig,
    #[serde(default)]
    pub channels: ChannelsConfig,
    #[serde(default)]
    pub calibration: CalibrationConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
}

/// HID device configuration
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct DeviceConfig {
    #[serde(default = "default_vendor_id")]
    pub vendor_id: u16,

    #[serde(default = "default_product_id")]
    pub product_id: u16,

    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    #[serde(default = "default_reconnect_interval_ms")]
    pub reconnect_interval_ms: u64,

    #[serde(default = "default_transient_retry_ms")]
    pub transient_retry_ms: u64,

    #[serde(default = "default_fallback_report_length")]
    pub fallback_report_length: usize,

    #[serde(default)]
    pub trace_raw_reports: bool,
}

/// Built-in report layouts
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DecoderLayout {
    /// Consecutive 16-bit little-endian words
    #[default]
    Le16,
    /// 11-bit channels packed LSB-first
    Packed11,
    /// Explicit field table from `fields`
    Custom,
}

/// Report decoder configuration
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct DecoderConfig {
    #[serde(default)]
    pub layout: DecoderLayout,

    #[serde(default = "default_first_byte")]
    pub first_byte: usize,

    #[serde(default = "default_axis_count")]
    pub axis_count: usize,

    #[serde(default)]
    pub fields: Vec<AxisField>,
}

/// One logical channel of the default mapping
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct AxisMappingConfig {
    pub axis: usize,

    #[serde(default = "default_raw_min")]
    pub min: f64,

    #[serde(default = "default_raw_center")]
    pub center: f64,

    #[serde(default = "default_raw_max")]
    pub max: f64,

    #[serde(default = "default_deadzone_centered")]
    pub deadzone: f32,

    #[serde(default)]
    pub invert: bool,
}

/// Default channel mapping, used until a calibration is installed
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ChannelsConfig {
    #[serde(default = "default_roll")]
    pub roll: AxisMappingConfig,

    #[serde(default = "default_pitch")]
    pub pitch: AxisMappingConfig,

    #[serde(default = "default_yaw")]
    pub yaw: AxisMappingConfig,

    #[serde(default = "default_throttle")]
    pub throttle: AxisMappingConfig,
}

/// Calibration procedure configuration
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct CalibrationConfig {
    #[serde(default = "default_step_duration_ms")]
    pub step_duration_ms: u64,

    #[serde(default = "default_deadzone_centered")]
    pub deadzone_centered: f32,

    #[serde(default = "default_deadzone_throttle")]
    pub deadzone_throttle: f32,

    #[serde(default = "default_motion_threshold")]
    pub motion_threshold: f64,

    #[serde(default = "default_center_adaptation_rate")]
    pub center_adaptation_rate: f64,

    /// Ignore motion below half of an axis' rest jitter
    #[serde(default)]
    pub rest_noise_rejection: bool,

    #[serde(default = "default_store_dir")]
    pub store_dir: String,
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for daily rolling log files; empty logs to stdout only
    #[serde(default)]
    pub log_dir: String,
}

/// Monitor mode configuration
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct MonitorConfig {
    #[serde(default = "default_poll_rate_hz")]
    pub poll_rate_hz: u32,

    #[serde(default = "default_log_interval_frames")]
    pub log_interval_frames: u64,
}

// Default value functions
fn default_vendor_id() -> u16 { 0x2CA3 }
fn default_product_id() -> u16 { 0x1020 }
fn default_read_timeout_ms() -> u64 { 50 }
fn default_reconnect_interval_ms() -> u64 { 500 }
fn default_transient_retry_ms() -> u64 { 10 }
fn default_fallback_report_length() -> usize { 64 }

fn default_first_byte() -> usize { 1 }
fn default_axis_count() -> usize { 4 }

fn default_raw_min() -> f64 { 0.0 }
fn default_raw_center() -> f64 { 2048.0 }
fn default_raw_max() -> f64 { 4096.0 }

fn default_roll() -> AxisMappingConfig { default_mapping(2, default_deadzone_centered(), false) }
fn default_pitch() -> AxisMappingConfig { default_mapping(3, default_deadzone_centered(), true) }
fn default_yaw() -> AxisMappingConfig { default_mapping(0, default_deadzone_centered(), false) }
fn default_throttle() -> AxisMappingConfig { default_mapping(1, default_deadzone_throttle(), false) }

fn default_mapping(axis: usize, deadzone: f32, invert: bool) -> AxisMappingConfig {
    AxisMappingConfig {
        axis,
        min: default_raw_min(),
        center: default_raw_center(),
        max: default_raw_max(),
        deadzone,
        invert,
    }
}

fn default_step_duration_ms() -> u64 { 2000 }
fn default_deadzone_centered() -> f32 { 0.05 }
fn default_deadzone_throttle() -> f32 { 0.02 }
fn default_motion_threshold() -> f64 { 0.001 }
fn default_center_adaptation_rate() -> f64 { 0.1 }
fn default_store_dir() -> String { "./calibrations".to_string() }

fn default_log_level() -> String { "info".to_string() }

fn default_poll_rate_hz() -> u32 { 60 }
fn default_log_interval_frames() -> u64 { 60 }

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            vendor_id: default_vendor_id(),
            product_id: default_product_id(),
            read_timeout_ms: default_read_timeout_ms(),
            reconnect_interval_ms: default_reconnect_interval_ms(),
            transient_retry_ms: default_transient_retry_ms(),
            fallback_report_length: default_fallback_report_length(),
            trace_raw_reports: false,
        }
    }
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            layout: DecoderLayout::default(),
            first_byte: default_first_byte(),
            axis_count: default_axis_count(),
            fields: Vec::new(),
        }
    }
}

impl Default for ChannelsConfig {
    fn default() -> Self {
        Self {
            roll: default_roll(),
            pitch: default_pitch(),
            yaw: default_yaw(),
            throttle: default_throttle(),
        }
    }
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            step_duration_ms: default_step_duration_ms(),
            deadzone_centered: default_deadzone_centered(),
            deadzone_throttle: default_deadzone_throttle(),
            motion_threshold: default_motion_threshold(),
            center_adaptation_rate: default_center_adaptation_rate(),
            rest_noise_rejection: false,
            store_dir: default_store_dir(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            log_dir: String::new(),
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_rate_hz: default_poll_rate_hz(),
            log_interval_frames: default_log_interval_frames(),
        }
    }
}

fn invalid(message: impl std::fmt::Display) -> FlightHidError {
    FlightHidError::Config(toml::de::Error::custom(message))
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// * `Result<Config>` - Loaded and validated configuration
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use flight_hid::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse and validate configuration from a TOML string
    ///
    /// # Errors
    ///
    /// Returns error if parsing or validation fails
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Returns
    ///
    /// * `Result<()>` - Ok if valid, Err if invalid
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        // Validate device timing
        if self.device.read_timeout_ms == 0 || self.device.read_timeout_ms > 1000 {
            return Err(invalid("read_timeout_ms must be between 1 and 1000"));
        }

        if self.device.reconnect_interval_ms == 0 || self.device.reconnect_interval_ms > 60000 {
            return Err(invalid("reconnect_interval_ms must be between 1 and 60000"));
        }

        if self.device.transient_retry_ms == 0 || self.device.transient_retry_ms > 1000 {
            return Err(invalid("transient_retry_ms must be between 1 and 1000"));
        }

        if self.device.fallback_report_length == 0 || self.device.fallback_report_length > 4096 {
            return Err(invalid("fallback_report_length must be between 1 and 4096"));
        }

        // Validate decoder
        if self.decoder.axis_count == 0 || self.decoder.axis_count > 32 {
            return Err(invalid("decoder axis_count must be between 1 and 32"));
        }

        if self.decoder.layout == DecoderLayout::Custom && self.decoder.fields.is_empty() {
            return Err(invalid("decoder fields cannot be empty when layout is 'custom'"));
        }

        for (i, field) in self.decoder.fields.iter().enumerate() {
            if field.bit_offset > 7 {
                return Err(invalid(format!("decoder field {} bit_offset must be between 0 and 7", i)));
            }
            if field.bit_width == 0 || field.bit_width > 32 {
                return Err(invalid(format!("decoder field {} bit_width must be between 1 and 32", i)));
            }
        }

        // Validate default channel mapping
        for (name, mapping) in [
            ("roll", &self.channels.roll),
            ("pitch", &self.channels.pitch),
            ("yaw", &self.channels.yaw),
            ("throttle", &self.channels.throttle),
        ] {
            if mapping.min >= mapping.max {
                return Err(invalid(format!("channels.{} min must be less than max", name)));
            }
            if mapping.center < mapping.min || mapping.center > mapping.max {
                return Err(invalid(format!("channels.{} center must be within min to max", name)));
            }
            if !(0.0..1.0).contains(&mapping.deadzone) {
                return Err(invalid(format!("channels.{} deadzone must be at least 0.0 and below 1.0", name)));
            }
        }

        // Validate calibration procedure
        if self.calibration.step_duration_ms == 0 || self.calibration.step_duration_ms > 60000 {
            return Err(invalid("step_duration_ms must be between 1 and 60000"));
        }

        for (name, value) in [
            ("deadzone_centered", self.calibration.deadzone_centered),
            ("deadzone_throttle", self.calibration.deadzone_throttle),
        ] {
            if !(0.0..1.0).contains(&value) {
                return Err(invalid(format!("{} must be at least 0.0 and below 1.0", name)));
            }
        }

        if !(self.calibration.motion_threshold > 0.0) {
            return Err(invalid("motion_threshold must be greater than 0"));
        }

        if !(0.0..=1.0).contains(&self.calibration.center_adaptation_rate) {
            return Err(invalid("center_adaptation_rate must be between 0.0 and 1.0"));
        }

        if self.calibration.store_dir.is_empty() {
            return Err(invalid("calibration store_dir cannot be empty"));
        }

        // Validate logging
        if tracing_subscriber::EnvFilter::try_new(&self.logging.level).is_err() {
            return Err(invalid(format!("invalid logging level '{}'", self.logging.level)));
        }

        // Validate monitor
        if self.monitor.poll_rate_hz == 0 || self.monitor.poll_rate_hz > 1000 {
            return Err(invalid("poll_rate_hz must be between 1 and 1000"));
        }

        if self.monitor.log_interval_frames == 0 {
            return Err(invalid("log_interval_frames must be greater than 0"));
        }

        Ok(())
    }
}

impl DeviceConfig {
    /// Reader loop parameters for this device
    #[must_use]
    pub fn reader_settings(&self) -> ReaderSettings {
        ReaderSettings {
            vendor_id: self.vendor_id,
            product_id: self.product_id,
            read_timeout: Duration::from_millis(self.read_timeout_ms),
            reconnect_interval: Duration::from_millis(self.reconnect_interval_ms),
            transient_retry: Duration::from_millis(self.transient_retry_ms),
            fallback_report_len: self.fallback_report_length,
            trace_raw_reports: self.trace_raw_reports,
        }
    }
}

impl DecoderConfig {
    /// Builds the report decoder for the configured layout
    #[must_use]
    pub fn build(&self) -> FieldDecoder {
        match self.layout {
            DecoderLayout::Le16 => FieldDecoder::le16(self.first_byte, self.axis_count),
            DecoderLayout::Packed11 => FieldDecoder::packed11(self.first_byte, self.axis_count),
            DecoderLayout::Custom => FieldDecoder::from_fields(self.fields.clone()),
        }
    }
}

impl ChannelsConfig {
    /// Calibration record built from the configured default mapping
    #[must_use]
    pub fn to_calibration(&self, device_id: &str) -> Calibration {
        [
            (LogicalAxis::Roll, &self.roll),
            (LogicalAxis::Pitch, &self.pitch),
            (LogicalAxis::Yaw, &self.yaw),
            (LogicalAxis::Throttle, &self.throttle),
        ]
        .into_iter()
        .fold(Calibration::new(device_id), |calibration, (axis, m)| {
            calibration.with_mapping(
                axis,
                m.axis,
                AxisCalibration::new(m.min, m.center, m.max, m.deadzone, m.invert),
            )
        })
    }
}

impl CalibrationConfig {
    /// Calibration engine tuning
    #[must_use]
    pub fn settings(&self) -> CalibrationSettings {
        CalibrationSettings {
            step_duration: Duration::from_millis(self.step_duration_ms),
            deadzone_centered: self.deadzone_centered,
            deadzone_throttle: self.deadzone_throttle,
            motion_threshold: self.motion_threshold,
            center_adaptation_rate: self.center_adaptation_rate,
            rest_noise_rejection: self.rest_noise_rejection,
        }
    }
}

impl MonitorConfig {
    /// Snapshot polling period
    #[must_use]
    pub fn poll_period(&self) -> Duration {
        Duration::from_micros(1_000_000 / u64::from(self.poll_rate_hz.max(1)))
    }
}
