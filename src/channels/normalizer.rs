//! # Axis Normalizer
//!
//! Converts raw axis values into calibrated, unit-range flight channels.
//!
//! ## Centered axes (roll, pitch, yaw)
//!
//! The two halves of the range are scaled independently so an off-center
//! rest position still reaches -1 and 1 at the extremes:
//!
//! ```text
//! r >= center: (r - center) / max(EPSILON, max - center)
//! r <  center: (r - center) / max(EPSILON, center - min)
//! ```
//!
//! ## Throttle
//!
//! Unidirectional: `(r - min) / max(EPSILON, max - min)` in 0..1.
//!
//! ## Deadzone
//!
//! Values inside the deadzone map to neutral, the remainder is rescaled so
//! full deflection still reaches the endpoint.
//!
//! ## Usage
//!
//! ```
//! use flight_hid::calibration::AxisCalibration;
//! use flight_hid::channels::normalizer::{normalize_centered, normalize_throttle};
//!
//! let cal = AxisCalibration::new(0.0, 2048.0, 4096.0, 0.05, false);
//! assert_eq!(normalize_centered(2048.0, &cal), 0.0);
//! assert_eq!(normalize_centered(4096.0, &cal), 1.0);
//! assert_eq!(normalize_throttle(0.0, &cal), 0.0);
//! ```

use super::ChannelSnapshot;
use crate::calibration::{AxisCalibration, Calibration, LogicalAxis, MAX_DEADZONE};

/// Floor for a calibrated half-range, in raw units.
pub const EPSILON: f64 = 1.0;

/// Normalizes a roll/pitch/yaw value to -1.0..1.0.
///
/// # Arguments
///
/// * `raw` - Raw axis value
/// * `cal` - Calibration of the axis
///
/// # Returns
///
/// 0.0 at center and inside the deadzone, -1.0/1.0 at min/max (negated when inverted)
#[must_use]
pub fn normalize_centered(raw: f64, cal: &AxisCalibration) -> f32 {
    let offset = raw - cal.raw_center;
    let half_range = if raw >= cal.raw_center {
        cal.raw_max - cal.raw_center
    } else {
        cal.raw_center - cal.raw_min
    };

    let norm = (offset / half_range.max(EPSILON)).clamp(-1.0, 1.0) as f32;
    let shaped = norm.signum() * apply_deadzone(norm.abs(), cal.deadzone);

    if cal.invert {
        -shaped
    } else {
        shaped
    }
}

/// Normalizes a throttle value to 0.0..1.0.
///
/// # Arguments
///
/// * `raw` - Raw axis value
/// * `cal` - Calibration of the axis
///
/// # Returns
///
/// 0.0 at min and inside the deadzone, 1.0 at max (`1 - value` when inverted)
#[must_use]
pub fn normalize_throttle(raw: f64, cal: &AxisCalibration) -> f32 {
    let range = (cal.raw_max - cal.raw_min).max(EPSILON);
    let norm = ((raw - cal.raw_min) / range).clamp(0.0, 1.0) as f32;
    let shaped = apply_deadzone(norm, cal.deadzone);

    if cal.invert {
        1.0 - shaped
    } else {
        shaped
    }
}

/// Maps values within the deadzone to 0 and scales the remaining range to 0..1.
#[inline]
fn apply_deadzone(value: f32, deadzone: f32) -> f32 {
    let deadzone = deadzone.clamp(0.0, MAX_DEADZONE);
    if value <= deadzone {
        0.0
    } else {
        ((value - deadzone) / (1.0 - deadzone)).min(1.0)
    }
}

/// Normalizes one value for a logical axis.
///
/// Returns neutral (0.0) when the axis has no mapping or the mapped index
/// is outside `axes`.
#[must_use]
pub fn normalize_axis(axes: &[f64], calibration: &Calibration, axis: &LogicalAxis) -> f32 {
    let Some(mapping) = calibration.find(axis) else {
        return 0.0;
    };
    let Some(&raw) = axes.get(mapping.axis_index) else {
        return 0.0;
    };

    if axis.is_throttle() {
        normalize_throttle(raw, &mapping.calibration)
    } else {
        normalize_centered(raw, &mapping.calibration)
    }
}

/// Builds a complete snapshot from one raw axis vector.
#[must_use]
pub fn normalize_channels(axes: &[f64], calibration: &Calibration) -> ChannelSnapshot {
    ChannelSnapshot {
        roll: normalize_axis(axes, calibration, &LogicalAxis::Roll),
        pitch: normalize_axis(axes, calibration, &LogicalAxis::Pitch),
        yaw: normalize_axis(axes, calibration, &LogicalAxis::Yaw),
        throttle: normalize_axis(axes, calibration, &LogicalAxis::Throttle),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn centered(deadzone: f32) -> AxisCalibration {
        AxisCalibration::new(0.0, 2048.0, 4096.0, deadzone, false)
    }

    // ==================== Centered Axis Tests ====================

    #[test]
    fn test_center_is_zero() {
        for deadzone in [0.0, 0.05, 0.2] {
            assert_eq!(normalize_centered(2048.0, &centered(deadzone)), 0.0);
        }
        let skewed = AxisCalibration::new(100.0, 900.0, 1000.0, 0.05, false);
        assert_eq!(normalize_centered(900.0, &skewed), 0.0);
    }

    #[test]
    fn test_extremes_are_unit() {
        for deadzone in [0.0, 0.05, 0.2] {
            let cal = centered(deadzone);
            assert_eq!(normalize_centered(0.0, &cal), -1.0);
            assert_eq!(normalize_centered(4096.0, &cal), 1.0);
        }
    }

    #[test]
    fn test_asymmetric_halves() {
        // Center closer to max: each half reaches its endpoint
        let cal = AxisCalibration::new(0.0, 3000.0, 4000.0, 0.0, false);
        assert!((normalize_centered(3500.0, &cal) - 0.5).abs() < 1e-6);
        assert!((normalize_centered(1500.0, &cal) - (-0.5)).abs() < 1e-6);
    }

    #[test]
    fn test_beyond_range_is_clamped() {
        let cal = centered(0.05);
        assert_eq!(normalize_centered(10_000.0, &cal), 1.0);
        assert_eq!(normalize_centered(-10_000.0, &cal), -1.0);
    }

    #[test]
    fn test_magnitude_never_exceeds_one() {
        let cal = AxisCalibration::new(524.0, 1024.0, 1524.0, 0.05, false);
        let mut raw = 524.0;
        while raw <= 1524.0 {
            let value = normalize_centered(raw, &cal);
            assert!(value.abs() <= 1.0, "raw {} gave {}", raw, value);
            raw += 7.0;
        }
    }

    #[test]
    fn test_deadzone_zeroes_small_deflection() {
        let cal = centered(0.1);
        // 0.05 normalized deflection
        assert_eq!(normalize_centered(2048.0 + 102.4, &cal), 0.0);
        assert_eq!(normalize_centered(2048.0 - 102.4, &cal), 0.0);
    }

    #[test]
    fn test_deadzone_rescales_remainder() {
        let cal = centered(0.1);
        // 0.55 normalized -> (0.55 - 0.1) / 0.9 = 0.5
        let raw = 2048.0 + 0.55 * 2048.0;
        assert!((normalize_centered(raw, &cal) - 0.5).abs() < 1e-4);
    }

    #[test]
    fn test_invert_negates() {
        let mut cal = centered(0.0);
        cal.invert = true;
        assert_eq!(normalize_centered(4096.0, &cal), -1.0);
        assert_eq!(normalize_centered(0.0, &cal), 1.0);
        assert_eq!(normalize_centered(2048.0, &cal), 0.0);
    }

    #[test]
    fn test_zero_width_range_uses_epsilon() {
        let cal = AxisCalibration::new(1000.0, 1000.0, 1000.0, 0.0, false);
        assert_eq!(normalize_centered(1000.0, &cal), 0.0);
        assert_eq!(normalize_centered(1000.5, &cal), 0.5);
        assert_eq!(normalize_centered(1003.0, &cal), 1.0);
    }

    // ==================== Throttle Tests ====================

    #[test]
    fn test_throttle_endpoints() {
        let cal = AxisCalibration::new(364.0, 1024.0, 1684.0, 0.02, false);
        assert_eq!(normalize_throttle(364.0, &cal), 0.0);
        assert_eq!(normalize_throttle(1684.0, &cal), 1.0);
    }

    #[test]
    fn test_throttle_monotonic() {
        let cal = AxisCalibration::new(0.0, 2048.0, 4096.0, 0.02, false);
        let mut previous = normalize_throttle(0.0, &cal);
        let mut raw = 0.0;
        while raw <= 4096.0 {
            let value = normalize_throttle(raw, &cal);
            assert!(value >= previous);
            assert!((0.0..=1.0).contains(&value));
            previous = value;
            raw += 16.0;
        }
    }

    #[test]
    fn test_throttle_deadzone_near_zero() {
        let cal = AxisCalibration::new(0.0, 500.0, 1000.0, 0.1, false);
        assert_eq!(normalize_throttle(50.0, &cal), 0.0);
        assert!((normalize_throttle(550.0, &cal) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_throttle_invert() {
        let cal = AxisCalibration::new(0.0, 500.0, 1000.0, 0.0, true);
        assert_eq!(normalize_throttle(0.0, &cal), 1.0);
        assert_eq!(normalize_throttle(1000.0, &cal), 0.0);
    }

    #[test]
    fn test_throttle_clamps() {
        let cal = AxisCalibration::new(0.0, 500.0, 1000.0, 0.0, false);
        assert_eq!(normalize_throttle(-50.0, &cal), 0.0);
        assert_eq!(normalize_throttle(5000.0, &cal), 1.0);
    }

    // ==================== Snapshot Tests ====================

    fn sample_calibration() -> Calibration {
        Calibration::new("dev")
            .with_mapping(LogicalAxis::Yaw, 0, centered(0.0))
            .with_mapping(LogicalAxis::Throttle, 1, AxisCalibration::new(0.0, 2048.0, 4096.0, 0.0, false))
            .with_mapping(LogicalAxis::Roll, 2, centered(0.0))
            .with_mapping(LogicalAxis::Pitch, 3, AxisCalibration::new(0.0, 2048.0, 4096.0, 0.0, true))
    }

    #[test]
    fn test_normalize_channels_uses_mapping() {
        let snapshot = normalize_channels(&[0.0, 4096.0, 4096.0, 4096.0], &sample_calibration());
        assert_eq!(snapshot.yaw, -1.0);
        assert_eq!(snapshot.throttle, 1.0);
        assert_eq!(snapshot.roll, 1.0);
        assert_eq!(snapshot.pitch, -1.0);
    }

    #[test]
    fn test_missing_axis_reads_neutral() {
        // Only two axes decoded: roll (2) and pitch (3) are out of range
        let snapshot = normalize_channels(&[4096.0, 4096.0], &sample_calibration());
        assert_eq!(snapshot.roll, 0.0);
        assert_eq!(snapshot.pitch, 0.0);
        assert_eq!(snapshot.yaw, 1.0);
    }

    #[test]
    fn test_missing_mapping_reads_neutral() {
        let snapshot = normalize_channels(&[4096.0; 4], &Calibration::new("dev"));
        assert_eq!(snapshot, ChannelSnapshot::default());
    }
}
