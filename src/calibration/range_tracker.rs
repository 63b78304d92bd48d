//! # Range Tracker
//!
//! Live range learning: while active, every sample widens the observed
//! min/max of each axis and pulls its center toward the sample by
//! `center_adaptation_rate`.
//!
//! Unlike [`super::CalibrationEngine`] this does not discover which axis is
//! which; it refines the ranges of an existing mapping.
//!
//! ```
//! use flight_hid::calibration::{RangeTracker, TrackingOutcome};
//!
//! let mut tracker = RangeTracker::new(0.1);
//! tracker.start(&[1024.0, 1024.0]);
//! tracker.update(&[364.0, 1684.0]);
//! tracker.update(&[1684.0, 364.0]);
//!
//! let TrackingOutcome::Kept(ranges) = tracker.finish(true) else {
//!     panic!("tracking was active");
//! };
//! assert_eq!(ranges[0].raw_min, 364.0);
//! assert_eq!(ranges[0].raw_max, 1684.0);
//! ```

use tracing::{debug, info};

use super::AxisCalibration;

#[derive(Debug, Clone, Copy, PartialEq)]
struct TrackedRange {
    min: f64,
    center: f64,
    max: f64,
}

impl TrackedRange {
    fn at(value: f64) -> Self {
        Self {
            min: value,
            center: value,
            max: value,
        }
    }
}

/// How a tracking run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackingOutcome {
    /// Learned ranges, one per axis (deadzone 0, not inverted).
    Kept(Vec<AxisCalibration>),
    /// The run was thrown away.
    Discarded,
    /// No run was active, so nothing was learned.
    NotStarted,
}

/// Tracks per-axis min/center/max of a live sample stream.
#[derive(Debug, Clone)]
pub struct RangeTracker {
    alpha: f64,
    ranges: Vec<TrackedRange>,
    active: bool,
}

impl RangeTracker {
    /// Creates an idle tracker.
    ///
    /// # Arguments
    ///
    /// * `center_adaptation_rate` - Center smoothing factor (0.0 to 1.0). Values outside this range are clamped.
    #[must_use]
    pub fn new(center_adaptation_rate: f64) -> Self {
        Self {
            alpha: center_adaptation_rate.clamp(0.0, 1.0),
            ranges: Vec::new(),
            active: false,
        }
    }

    /// Starts tracking, seeding min/center/max of each axis with `axes`.
    pub fn start(&mut self, axes: &[f64]) {
        self.ranges = axes.iter().copied().map(TrackedRange::at).collect();
        self.active = true;
        info!("Range tracking started on {} axes", axes.len());
    }

    /// Feeds one sample. Ignored while idle or when the axis count changed.
    pub fn update(&mut self, axes: &[f64]) {
        if !self.active {
            return;
        }
        if axes.len() != self.ranges.len() {
            debug!(
                "Ignoring sample with {} axes (tracking {})",
                axes.len(),
                self.ranges.len()
            );
            return;
        }

        for (range, &value) in self.ranges.iter_mut().zip(axes) {
            range.min = range.min.min(value);
            range.max = range.max.max(value);
            range.center += self.alpha * (value - range.center);
        }
    }

    /// Stops tracking.
    ///
    /// With `keep` the learned ranges are returned. Without it the ranges
    /// collapse onto their current centers.
    pub fn finish(&mut self, keep: bool) -> TrackingOutcome {
        if !self.active {
            return TrackingOutcome::NotStarted;
        }
        self.active = false;

        if keep {
            info!("Range tracking finished, keeping {} ranges", self.ranges.len());
            TrackingOutcome::Kept(
                self.ranges
                    .iter()
                    .map(|r| AxisCalibration::new(r.min, r.center, r.max, 0.0, false))
                    .collect(),
            )
        } else {
            info!("Range tracking discarded");
            for range in &mut self.ranges {
                *range = TrackedRange::at(range.center);
            }
            TrackingOutcome::Discarded
        }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Number of axes being tracked.
    #[must_use]
    pub fn axis_count(&self) -> usize {
        self.ranges.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kept(tracker: &mut RangeTracker) -> Vec<AxisCalibration> {
        match tracker.finish(true) {
            TrackingOutcome::Kept(ranges) => ranges,
            other => panic!("expected kept ranges, got {:?}", other),
        }
    }

    #[test]
    fn test_update_widens_range() {
        let mut tracker = RangeTracker::new(0.1);
        tracker.start(&[500.0]);
        tracker.update(&[400.0]);
        tracker.update(&[700.0]);
        tracker.update(&[550.0]);

        let ranges = kept(&mut tracker);
        assert_eq!(ranges[0].raw_min, 400.0);
        assert_eq!(ranges[0].raw_max, 700.0);
        assert!(ranges[0].is_ordered());
    }

    #[test]
    fn test_center_moves_by_rate() {
        let mut tracker = RangeTracker::new(0.5);
        tracker.start(&[100.0]);
        tracker.update(&[200.0]);

        let ranges = kept(&mut tracker);
        assert!((ranges[0].raw_center - 150.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_rate_keeps_initial_center() {
        let mut tracker = RangeTracker::new(0.0);
        tracker.start(&[1024.0]);
        for value in [0.0, 2048.0, 300.0] {
            tracker.update(&[value]);
        }
        let ranges = kept(&mut tracker);
        assert_eq!(ranges[0].raw_center, 1024.0);
    }

    #[test]
    fn test_update_ignored_when_idle() {
        let mut tracker = RangeTracker::new(0.1);
        tracker.update(&[1.0, 2.0]);
        assert_eq!(tracker.axis_count(), 0);
        assert_eq!(tracker.finish(true), TrackingOutcome::NotStarted);
        assert_eq!(tracker.finish(false), TrackingOutcome::NotStarted);
    }

    #[test]
    fn test_mismatched_sample_ignored() {
        let mut tracker = RangeTracker::new(0.1);
        tracker.start(&[10.0, 10.0]);
        tracker.update(&[0.0, 0.0, 0.0]);

        let ranges = kept(&mut tracker);
        assert_eq!(ranges[0].raw_min, 10.0);
        assert_eq!(ranges.len(), 2);
    }

    #[test]
    fn test_discard_collapses_ranges() {
        let mut tracker = RangeTracker::new(1.0);
        tracker.start(&[10.0]);
        tracker.update(&[90.0]);
        assert_eq!(tracker.finish(false), TrackingOutcome::Discarded);
        assert!(!tracker.is_active());
        assert_eq!(tracker.finish(false), TrackingOutcome::NotStarted);

        // Restarting from the collapsed state
        tracker.start(&[50.0]);
        let ranges = kept(&mut tracker);
        assert_eq!((ranges[0].raw_min, ranges[0].raw_max), (50.0, 50.0));
    }

    #[test]
    fn test_rate_is_clamped() {
        let mut tracker = RangeTracker::new(3.0);
        tracker.start(&[0.0]);
        tracker.update(&[100.0]);
        let ranges = kept(&mut tracker);
        assert_eq!(ranges[0].raw_center, 100.0);
    }
}
