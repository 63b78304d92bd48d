//! # Calibration Module
//!
//! Per-axis calibration records and the procedures that produce them.
//!
//! This module handles:
//! - [`AxisCalibration`]: raw min/center/max, deadzone and inversion of one axis
//! - [`ChannelMapping`] / [`Calibration`]: logical axis name to physical axis
//! - [`CalibrationEngine`]: the guided, time-boxed detection procedure
//! - [`RangeTracker`]: live min/max learning while the user sweeps the sticks
//! - [`CalibrationStore`]: JSON persistence keyed by device id
//!
//! ## Record format
//!
//! ```json
//! {
//!   "device_id": "VID_2CA3_PID_1020",
//!   "mappings": [
//!     { "logical_name": "Roll", "axis_index": 2, "min": 524.0, "center": 1024.0,
//!       "max": 1524.0, "deadzone": 0.05, "invert": false }
//!   ]
//! }
//! ```

pub mod engine;
pub mod persist;
pub mod range_tracker;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::decoder::RawAxisVector;

pub use engine::{CalibrationEngine, CalibrationSettings, CalibrationStep, StepOutcome, StepProgress};
pub use persist::CalibrationStore;
pub use range_tracker::{RangeTracker, TrackingOutcome};

/// Largest deadzone accepted by the normalizer; keeps `1 - deadzone` away from zero.
pub const MAX_DEADZONE: f32 = 0.99;

/// Calibration parameters of one physical axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisCalibration {
    #[serde(rename = "min")]
    pub raw_min: f64,
    #[serde(rename = "center")]
    pub raw_center: f64,
    #[serde(rename = "max")]
    pub raw_max: f64,
    /// Fraction of the normalized range forced to neutral.
    pub deadzone: f32,
    pub invert: bool,
}

impl AxisCalibration {
    /// Creates a calibration, restoring `min <= center <= max`.
    ///
    /// # Examples
    ///
    /// ```
    /// use flight_hid::calibration::AxisCalibration;
    ///
    /// let cal = AxisCalibration::new(4096.0, 2048.0, 0.0, 0.05, false);
    /// assert_eq!(cal.raw_min, 0.0);
    /// assert_eq!(cal.raw_max, 4096.0);
    /// ```
    #[must_use]
    pub fn new(raw_min: f64, raw_center: f64, raw_max: f64, deadzone: f32, invert: bool) -> Self {
        Self {
            raw_min,
            raw_center,
            raw_max,
            deadzone,
            invert,
        }
        .sanitized()
    }

    /// Calibration whose center is the midpoint of the observed range.
    #[must_use]
    pub fn from_range(raw_min: f64, raw_max: f64, deadzone: f32) -> Self {
        Self::new(raw_min, (raw_min + raw_max) / 2.0, raw_max, deadzone, false)
    }

    /// Reorders min/max, clamps the center between them and the deadzone
    /// into `[0, MAX_DEADZONE]`.
    #[must_use]
    pub fn sanitized(mut self) -> Self {
        if self.raw_min > self.raw_max {
            std::mem::swap(&mut self.raw_min, &mut self.raw_max);
        }
        self.raw_center = self.raw_center.clamp(self.raw_min, self.raw_max);
        self.deadzone = if self.deadzone.is_finite() {
            self.deadzone.clamp(0.0, MAX_DEADZONE)
        } else {
            0.0
        };
        self
    }

    /// True when `min <= center <= max`.
    #[must_use]
    pub fn is_ordered(&self) -> bool {
        self.raw_min <= self.raw_center && self.raw_center <= self.raw_max
    }
}

/// Logical flight axis.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum LogicalAxis {
    Roll,
    Pitch,
    Yaw,
    Throttle,
    Custom(String),
}

impl LogicalAxis {
    /// The four flight channels of a [`crate::channels::ChannelSnapshot`].
    pub const FLIGHT: [LogicalAxis; 4] = [
        LogicalAxis::Roll,
        LogicalAxis::Pitch,
        LogicalAxis::Yaw,
        LogicalAxis::Throttle,
    ];

    /// Throttle is normalized to 0..1, every other axis to -1..1.
    #[must_use]
    pub fn is_throttle(&self) -> bool {
        matches!(self, LogicalAxis::Throttle)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            LogicalAxis::Roll => "Roll",
            LogicalAxis::Pitch => "Pitch",
            LogicalAxis::Yaw => "Yaw",
            LogicalAxis::Throttle => "Throttle",
            LogicalAxis::Custom(name) => name,
        }
    }
}

impl From<String> for LogicalAxis {
    fn from(name: String) -> Self {
        match name.as_str() {
            "Roll" => LogicalAxis::Roll,
            "Pitch" => LogicalAxis::Pitch,
            "Yaw" => LogicalAxis::Yaw,
            "Throttle" => LogicalAxis::Throttle,
            _ => LogicalAxis::Custom(name),
        }
    }
}

impl From<LogicalAxis> for String {
    fn from(axis: LogicalAxis) -> Self {
        match axis {
            LogicalAxis::Custom(name) => name,
            other => other.name().to_string(),
        }
    }
}

impl fmt::Display for LogicalAxis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Binding of one logical axis to a physical axis index.
///
/// Serialized as one flat record: `min`, `center`, `max`, `deadzone` and
/// `invert` sit next to `logical_name` and `axis_index`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "MappingRecord", into = "MappingRecord")]
pub struct ChannelMapping {
    pub logical_name: LogicalAxis,
    pub axis_index: usize,
    pub calibration: AxisCalibration,
}

/// On-disk layout of a [`ChannelMapping`]. Every number is a plain field so
/// floats go straight through the JSON parser.
#[derive(Serialize, Deserialize)]
struct MappingRecord {
    logical_name: LogicalAxis,
    axis_index: usize,
    min: f64,
    center: f64,
    max: f64,
    deadzone: f32,
    invert: bool,
}

impl From<MappingRecord> for ChannelMapping {
    fn from(r: MappingRecord) -> Self {
        Self {
            logical_name: r.logical_name,
            axis_index: r.axis_index,
            calibration: AxisCalibration {
                raw_min: r.min,
                raw_center: r.center,
                raw_max: r.max,
                deadzone: r.deadzone,
                invert: r.invert,
            },
        }
    }
}

impl From<ChannelMapping> for MappingRecord {
    fn from(m: ChannelMapping) -> Self {
        Self {
            logical_name: m.logical_name,
            axis_index: m.axis_index,
            min: m.calibration.raw_min,
            center: m.calibration.raw_center,
            max: m.calibration.raw_max,
            deadzone: m.calibration.deadzone,
            invert: m.calibration.invert,
        }
    }
}

/// Calibration record of one transmitter.
///
/// Mappings are unique by logical name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    pub device_id: String,
    #[serde(default)]
    mappings: Vec<ChannelMapping>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Calibration {
    /// Empty record for `device_id`.
    #[must_use]
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            mappings: Vec::new(),
            created_at: None,
        }
    }

    /// Inserts a mapping, replacing any mapping with the same logical name.
    ///
    /// The axis calibration is sanitized on the way in.
    pub fn insert(&mut self, mut mapping: ChannelMapping) {
        mapping.calibration = mapping.calibration.sanitized();
        match self
            .mappings
            .iter_mut()
            .find(|m| m.logical_name == mapping.logical_name)
        {
            Some(existing) => *existing = mapping,
            None => self.mappings.push(mapping),
        }
    }

    /// Builder form of [`Calibration::insert`].
    #[must_use]
    pub fn with_mapping(mut self, axis: LogicalAxis, axis_index: usize, calibration: AxisCalibration) -> Self {
        self.insert(ChannelMapping {
            logical_name: axis,
            axis_index,
            calibration,
        });
        self
    }

    /// Mapping for a logical axis.
    #[must_use]
    pub fn find(&self, axis: &LogicalAxis) -> Option<&ChannelMapping> {
        self.mappings.iter().find(|m| &m.logical_name == axis)
    }

    #[must_use]
    pub fn mappings(&self) -> &[ChannelMapping] {
        &self.mappings
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    /// Merges live-learned ranges into the existing mappings.
    ///
    /// `ranges[i]` updates min/center/max of every mapping bound to physical
    /// axis `i`; deadzone and inversion are kept. Returns the number of
    /// mappings updated.
    pub fn apply_ranges(&mut self, ranges: &[AxisCalibration]) -> usize {
        let mut updated = 0;
        for mapping in &mut self.mappings {
            if let Some(range) = ranges.get(mapping.axis_index) {
                mapping.calibration = AxisCalibration {
                    raw_min: range.raw_min,
                    raw_center: range.raw_center,
                    raw_max: range.raw_max,
                    ..mapping.calibration
                }
                .sanitized();
                updated += 1;
            }
        }
        updated
    }

    /// Restores `min <= center <= max` on every mapping.
    #[must_use]
    pub fn sanitized(mut self) -> Self {
        for mapping in &mut self.mappings {
            mapping.calibration = mapping.calibration.sanitized();
        }
        self
    }
}

/// One sample handed to the calibration engine.
#[derive(Debug, Clone, PartialEq)]
pub struct RawState {
    pub device_id: String,
    pub axes: RawAxisVector,
}

/// Source of raw axis samples for calibration.
///
/// Returns `None` while no sample is available. Axis order must stay stable
/// for the duration of one calibration.
pub trait RawStateProvider {
    fn raw_state(&mut self) -> Option<RawState>;
}

impl<F> RawStateProvider for F
where
    F: FnMut() -> Option<RawState>,
{
    fn raw_state(&mut self) -> Option<RawState> {
        self()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==================== AxisCalibration Tests ====================

    #[test]
    fn test_new_reorders_min_max() {
        let cal = AxisCalibration::new(100.0, 50.0, 0.0, 0.05, false);
        assert_eq!(cal.raw_min, 0.0);
        assert_eq!(cal.raw_center, 50.0);
        assert_eq!(cal.raw_max, 100.0);
        assert!(cal.is_ordered());
    }

    #[test]
    fn test_new_clamps_center() {
        let cal = AxisCalibration::new(0.0, 150.0, 100.0, 0.05, false);
        assert_eq!(cal.raw_center, 100.0);

        let cal = AxisCalibration::new(0.0, -3.0, 100.0, 0.05, false);
        assert_eq!(cal.raw_center, 0.0);
    }

    #[test]
    fn test_new_clamps_deadzone() {
        assert_eq!(AxisCalibration::new(0.0, 1.0, 2.0, 1.5, false).deadzone, MAX_DEADZONE);
        assert_eq!(AxisCalibration::new(0.0, 1.0, 2.0, -0.1, false).deadzone, 0.0);
        assert_eq!(AxisCalibration::new(0.0, 1.0, 2.0, f32::NAN, false).deadzone, 0.0);
    }

    #[test]
    fn test_from_range_uses_midpoint() {
        let cal = AxisCalibration::from_range(524.0, 1524.0, 0.05);
        assert_eq!(cal.raw_center, 1024.0);
        assert!(!cal.invert);
    }

    // ==================== LogicalAxis Tests ====================

    #[test]
    fn test_logical_axis_names_round_trip() {
        for axis in LogicalAxis::FLIGHT {
            let name: String = axis.clone().into();
            assert_eq!(LogicalAxis::from(name), axis);
        }
        assert_eq!(
            LogicalAxis::from("Aux1".to_string()),
            LogicalAxis::Custom("Aux1".to_string())
        );
    }

    #[test]
    fn test_only_throttle_is_throttle() {
        assert!(LogicalAxis::Throttle.is_throttle());
        assert!(!LogicalAxis::Roll.is_throttle());
        assert!(!LogicalAxis::Custom("Throttle2".into()).is_throttle());
    }

    // ==================== Calibration Tests ====================

    #[test]
    fn test_insert_replaces_same_name() {
        let mut cal = Calibration::new("VID_2CA3_PID_1020");
        cal.insert(ChannelMapping {
            logical_name: LogicalAxis::Roll,
            axis_index: 0,
            calibration: AxisCalibration::from_range(0.0, 100.0, 0.05),
        });
        cal.insert(ChannelMapping {
            logical_name: LogicalAxis::Roll,
            axis_index: 2,
            calibration: AxisCalibration::from_range(0.0, 200.0, 0.05),
        });

        assert_eq!(cal.mappings().len(), 1);
        assert_eq!(cal.find(&LogicalAxis::Roll).unwrap().axis_index, 2);
    }

    #[test]
    fn test_insert_sanitizes() {
        let mut cal = Calibration::new("dev");
        cal.insert(ChannelMapping {
            logical_name: LogicalAxis::Yaw,
            axis_index: 0,
            calibration: AxisCalibration {
                raw_min: 10.0,
                raw_center: 20.0,
                raw_max: 0.0,
                deadzone: 0.05,
                invert: false,
            },
        });
        assert!(cal.find(&LogicalAxis::Yaw).unwrap().calibration.is_ordered());
    }

    #[test]
    fn test_apply_ranges_keeps_deadzone_and_invert() {
        let mut cal = Calibration::new("dev")
            .with_mapping(LogicalAxis::Pitch, 1, AxisCalibration::new(0.0, 2048.0, 4096.0, 0.1, true))
            .with_mapping(LogicalAxis::Roll, 7, AxisCalibration::new(0.0, 2048.0, 4096.0, 0.05, false));

        let ranges = vec![
            AxisCalibration::from_range(0.0, 10.0, 0.0),
            AxisCalibration::new(364.0, 1024.0, 1684.0, 0.0, false),
        ];
        let updated = cal.apply_ranges(&ranges);

        assert_eq!(updated, 1);
        let pitch = cal.find(&LogicalAxis::Pitch).unwrap().calibration;
        assert_eq!((pitch.raw_min, pitch.raw_center, pitch.raw_max), (364.0, 1024.0, 1684.0));
        assert_eq!(pitch.deadzone, 0.1);
        assert!(pitch.invert);

        // Axis 7 has no learned range
        let roll = cal.find(&LogicalAxis::Roll).unwrap().calibration;
        assert_eq!(roll.raw_max, 4096.0);
    }

    #[test]
    fn test_json_uses_flat_mapping_fields() {
        let cal = Calibration::new("VID_2CA3_PID_1020")
            .with_mapping(LogicalAxis::Roll, 2, AxisCalibration::from_range(524.0, 1524.0, 0.05));

        let json: serde_json::Value = serde_json::to_value(&cal).unwrap();
        let mapping = &json["mappings"][0];
        assert_eq!(mapping["logical_name"], "Roll");
        assert_eq!(mapping["axis_index"], 2);
        assert_eq!(mapping["min"], 524.0);
        assert_eq!(mapping["center"], 1024.0);
        assert_eq!(mapping["max"], 1524.0);
        assert_eq!(mapping["invert"], false);
        assert!(json.get("created_at").is_none());
    }

    #[test]
    fn test_flat_record_parses() {
        let json = r#"{
            "device_id": "VID_2CA3_PID_1020",
            "mappings": [
                { "logical_name": "Yaw", "axis_index": 0, "min": -1976948.6226948425,
                  "center": 390854.73908547004, "max": 2000000.0, "deadzone": 0.05, "invert": true }
            ]
        }"#;

        let cal: Calibration = serde_json::from_str(json).unwrap();
        let yaw = cal.find(&LogicalAxis::Yaw).unwrap();
        assert_eq!(yaw.axis_index, 0);
        assert_eq!(yaw.calibration.raw_min, -1976948.6226948425);
        assert_eq!(yaw.calibration.raw_center, 390854.73908547004);
        assert!(yaw.calibration.invert);
    }

    #[test]
    fn test_closure_is_a_provider() {
        let mut calls = 0;
        let mut provider = || {
            calls += 1;
            Some(RawState {
                device_id: "dev".into(),
                axes: vec![1.0, 2.0],
            })
        };
        let state = provider.raw_state().unwrap();
        assert_eq!(state.axes, vec![1.0, 2.0]);
        drop(provider);
        assert_eq!(calls, 1);
    }
}
