//! # Calibration Engine
//!
//! Guided, time-boxed procedure that learns which physical axis drives each
//! flight channel and the raw range of that axis.
//!
//! ## Steps
//!
//! ```text
//! NotStarted -> DetectCenter -> DetectPitch -> DetectRoll -> DetectYaw -> DetectThrottle -> Done
//! ```
//!
//! Every detection step lasts `step_duration` of accumulated tick time. The
//! caller drives the engine with [`CalibrationEngine::tick_calibration`],
//! passing the elapsed time since the previous tick and a raw state source.
//!
//! - `DetectCenter` records the resting value and the rest jitter of every axis.
//! - Each per-axis step accumulates `|value - baseline|` for every axis not yet
//!   assigned, where the baseline is the first sample of the step. When the
//!   step expires the axis with the largest mean motion wins (lowest index on
//!   a tie) and its range becomes the calibration of that logical axis.
//!   Only motion above `motion_threshold` qualifies. With
//!   `rest_noise_rejection` the threshold of each axis is raised to half its
//!   rest jitter.
//!
//! A tick without a usable sample is skipped entirely: no accumulation and
//! no elapsed time. Calibration then takes longer in wall-clock time but is
//! never aborted by a missed sample.

use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use super::{AxisCalibration, Calibration, ChannelMapping, LogicalAxis, RawStateProvider};

/// Tuning of the calibration procedure.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationSettings {
    /// Duration of each detection step.
    pub step_duration: Duration,
    /// Deadzone assigned to roll, pitch and yaw.
    pub deadzone_centered: f32,
    /// Deadzone assigned to throttle.
    pub deadzone_throttle: f32,
    /// Mean absolute motion per sample an axis must exceed to be assigned.
    pub motion_threshold: f64,
    /// Center smoothing factor used by live range tracking.
    pub center_adaptation_rate: f64,
    /// Raise each axis' motion threshold to half its rest jitter.
    ///
    /// Off by default: a stick bumped during `DetectCenter` would otherwise
    /// hide a later deliberate movement of that stick.
    pub rest_noise_rejection: bool,
}

impl Default for CalibrationSettings {
    fn default() -> Self {
        Self {
            step_duration: Duration::from_secs(2),
            deadzone_centered: 0.05,
            deadzone_throttle: 0.02,
            motion_threshold: 0.001,
            center_adaptation_rate: 0.1,
            rest_noise_rejection: false,
        }
    }
}

/// Position in the calibration procedure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CalibrationStep {
    #[default]
    NotStarted,
    DetectCenter,
    DetectPitch,
    DetectRoll,
    DetectYaw,
    DetectThrottle,
    Done,
}

impl CalibrationStep {
    /// The step that follows this one.
    #[must_use]
    pub fn next(self) -> Self {
        match self {
            CalibrationStep::NotStarted => CalibrationStep::DetectCenter,
            CalibrationStep::DetectCenter => CalibrationStep::DetectPitch,
            CalibrationStep::DetectPitch => CalibrationStep::DetectRoll,
            CalibrationStep::DetectRoll => CalibrationStep::DetectYaw,
            CalibrationStep::DetectYaw => CalibrationStep::DetectThrottle,
            CalibrationStep::DetectThrottle | CalibrationStep::Done => CalibrationStep::Done,
        }
    }

    /// Logical axis detected by this step, if it is a per-axis step.
    #[must_use]
    pub fn axis(self) -> Option<LogicalAxis> {
        match self {
            CalibrationStep::DetectPitch => Some(LogicalAxis::Pitch),
            CalibrationStep::DetectRoll => Some(LogicalAxis::Roll),
            CalibrationStep::DetectYaw => Some(LogicalAxis::Yaw),
            CalibrationStep::DetectThrottle => Some(LogicalAxis::Throttle),
            _ => None,
        }
    }

    /// True while samples are being collected.
    #[must_use]
    pub fn is_detecting(self) -> bool {
        !matches!(self, CalibrationStep::NotStarted | CalibrationStep::Done)
    }

    /// Operator instruction for this step.
    #[must_use]
    pub fn instruction(self) -> &'static str {
        match self {
            CalibrationStep::NotStarted => "Press start to begin calibration.",
            CalibrationStep::DetectCenter => {
                "Step 1: Leave all sticks centered and do not touch them."
            }
            CalibrationStep::DetectPitch => {
                "Step 2: Move the PITCH stick fully up and down repeatedly.\n(Right stick: forward/back)"
            }
            CalibrationStep::DetectRoll => {
                "Step 3: Move the ROLL stick fully left and right repeatedly.\n(Right stick: left/right)"
            }
            CalibrationStep::DetectYaw => {
                "Step 4: Move the YAW stick fully left and right repeatedly.\n(Left stick: yaw)"
            }
            CalibrationStep::DetectThrottle => {
                "Step 5: Move the THROTTLE stick from bottom to top and back repeatedly.\n(Left stick: throttle)"
            }
            CalibrationStep::Done => "Calibration complete.",
        }
    }
}

/// Result of a finished per-axis step.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// The logical axis was bound to a physical axis.
    Assigned { axis: LogicalAxis, index: usize },
    /// No unassigned axis moved enough; the logical axis stays unmapped.
    NoMotion { axis: LogicalAxis },
}

/// Progress report returned by every tick.
#[derive(Debug, Clone, PartialEq)]
pub struct StepProgress {
    /// Step the engine is in after the tick.
    pub step: CalibrationStep,
    /// Fraction of `step` already elapsed, 0.0..=1.0.
    pub fraction: f32,
    /// Set on the tick that finished a per-axis step.
    pub outcome: Option<StepOutcome>,
}

/// Per-axis running statistics of one step.
#[derive(Debug, Clone)]
struct AxisStats {
    sum: f64,
    motion: f64,
    min: f64,
    max: f64,
}

impl AxisStats {
    fn new() -> Self {
        Self {
            sum: 0.0,
            motion: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }

    fn observe(&mut self, value: f64, baseline: f64) {
        self.sum += value;
        self.motion += (value - baseline).abs();
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    fn spread(&self) -> f64 {
        if self.max >= self.min {
            self.max - self.min
        } else {
            0.0
        }
    }
}

/// Transient state of one calibration run.
#[derive(Debug)]
struct CalibrationSession {
    device_id: String,
    elapsed: Duration,
    axis_count: Option<usize>,
    baseline: Vec<f64>,
    samples: u64,
    stats: Vec<AxisStats>,
    rest_jitter: Vec<f64>,
    assigned: Vec<bool>,
    result: Calibration,
}

impl CalibrationSession {
    fn new(device_id: String) -> Self {
        Self {
            result: Calibration::new(device_id.clone()),
            device_id,
            elapsed: Duration::ZERO,
            axis_count: None,
            baseline: Vec::new(),
            samples: 0,
            stats: Vec::new(),
            rest_jitter: Vec::new(),
            assigned: Vec::new(),
        }
    }

    fn reset_step(&mut self) {
        self.elapsed = Duration::ZERO;
        self.baseline.clear();
        self.samples = 0;
        self.stats = vec![AxisStats::new(); self.axis_count.unwrap_or(0)];
    }

    fn accumulate(&mut self, axes: &[f64]) {
        if self.baseline.is_empty() {
            self.baseline = axes.to_vec();
        }
        for (index, (&value, stats)) in axes.iter().zip(self.stats.iter_mut()).enumerate() {
            if self.assigned.get(index).copied().unwrap_or(false) {
                continue;
            }
            stats.observe(value, self.baseline[index]);
        }
        self.samples += 1;
    }
}

/// Guided calibration state machine.
#[derive(Debug)]
pub struct CalibrationEngine {
    settings: CalibrationSettings,
    step: CalibrationStep,
    session: Option<CalibrationSession>,
    finished: Option<Calibration>,
}

impl CalibrationEngine {
    /// Creates an idle engine.
    #[must_use]
    pub fn new(settings: CalibrationSettings) -> Self {
        Self {
            settings,
            step: CalibrationStep::NotStarted,
            session: None,
            finished: None,
        }
    }

    #[must_use]
    pub fn settings(&self) -> &CalibrationSettings {
        &self.settings
    }

    /// Starts a new run for `device_id`, discarding any previous run.
    pub fn begin_calibration(&mut self, device_id: impl Into<String>) {
        let device_id = device_id.into();
        info!("Calibration started for {}", device_id);

        let mut session = CalibrationSession::new(device_id);
        session.reset_step();
        self.session = Some(session);
        self.finished = None;
        self.step = CalibrationStep::DetectCenter;
        info!("{}", self.step.instruction());
    }

    /// Advances the procedure by one sample.
    ///
    /// # Arguments
    ///
    /// * `elapsed` - Time since the previous tick
    /// * `provider` - Source of the current raw axis values
    ///
    /// # Returns
    ///
    /// The step after this tick, its progress and, when a per-axis step just
    /// ended, its outcome.
    pub fn tick_calibration<P>(&mut self, elapsed: Duration, provider: &mut P) -> StepProgress
    where
        P: RawStateProvider + ?Sized,
    {
        if !self.step.is_detecting() {
            return self.progress_report(None);
        }
        let Some(session) = self.session.as_mut() else {
            return self.progress_report(None);
        };

        let Some(state) = provider.raw_state() else {
            return self.progress_report(None);
        };
        if state.device_id != session.device_id {
            debug!(
                "Ignoring sample from {} while calibrating {}",
                state.device_id, session.device_id
            );
            return self.progress_report(None);
        }
        if state.axes.is_empty() {
            return self.progress_report(None);
        }

        match session.axis_count {
            None => {
                debug!("Calibrating {} axes", state.axes.len());
                session.axis_count = Some(state.axes.len());
                session.assigned = vec![false; state.axes.len()];
                session.reset_step();
            }
            Some(count) if count != state.axes.len() => {
                debug!(
                    "Ignoring sample with {} axes (expected {})",
                    state.axes.len(),
                    count
                );
                return self.progress_report(None);
            }
            Some(_) => {}
        }

        session.accumulate(&state.axes);
        session.elapsed += elapsed;

        if session.elapsed < self.settings.step_duration {
            return self.progress_report(None);
        }

        let outcome = self.finish_step();
        self.progress_report(outcome)
    }

    /// Closes the current step and moves to the next one.
    fn finish_step(&mut self) -> Option<StepOutcome> {
        let step = self.step;
        let session = self.session.as_mut()?;

        let outcome = match step.axis() {
            None => {
                session.rest_jitter = session.stats.iter().map(AxisStats::spread).collect();
                let samples = session.samples.max(1) as f64;
                let centers: Vec<f64> = session.stats.iter().map(|s| s.sum / samples).collect();
                debug!(
                    "Rest position {:?}, rest jitter {:?}",
                    centers, session.rest_jitter
                );
                None
            }
            Some(axis) => Some(Self::assign_axis(&self.settings, session, axis)),
        };

        self.step = step.next();
        if self.step == CalibrationStep::Done {
            self.finalize();
        } else if let Some(session) = self.session.as_mut() {
            session.reset_step();
            info!("{}", self.step.instruction());
        }

        outcome
    }

    /// Picks the winning axis of a per-axis step.
    fn assign_axis(
        settings: &CalibrationSettings,
        session: &mut CalibrationSession,
        axis: LogicalAxis,
    ) -> StepOutcome {
        let samples = session.samples as f64;
        let mut winner: Option<(usize, f64)> = None;

        if samples > 0.0 {
            for (index, stats) in session.stats.iter().enumerate() {
                if session.assigned.get(index).copied().unwrap_or(true) {
                    continue;
                }
                let mean_motion = stats.motion / samples;
                let threshold = if settings.rest_noise_rejection {
                    let jitter = session.rest_jitter.get(index).copied().unwrap_or(0.0);
                    settings.motion_threshold.max(jitter / 2.0)
                } else {
                    settings.motion_threshold
                };
                if mean_motion <= threshold {
                    continue;
                }
                if winner.map_or(true, |(_, best)| mean_motion > best) {
                    winner = Some((index, mean_motion));
                }
            }
        }

        let Some((index, mean_motion)) = winner else {
            warn!(
                "No axis moved during {} detection, {} stays unmapped",
                axis, axis
            );
            return StepOutcome::NoMotion { axis };
        };

        let stats = &session.stats[index];
        let deadzone = if axis.is_throttle() {
            settings.deadzone_throttle
        } else {
            settings.deadzone_centered
        };
        let calibration = AxisCalibration::from_range(stats.min, stats.max, deadzone);

        info!(
            "{} -> axis {} (min {:.1}, center {:.1}, max {:.1}, mean motion {:.1})",
            axis, index, calibration.raw_min, calibration.raw_center, calibration.raw_max, mean_motion
        );

        session.assigned[index] = true;
        session.result.insert(ChannelMapping {
            logical_name: axis.clone(),
            axis_index: index,
            calibration,
        });

        StepOutcome::Assigned { axis, index }
    }

    fn finalize(&mut self) {
        if let Some(session) = self.session.take() {
            let mut calibration = session.result.sanitized();
            calibration.created_at = Some(Utc::now());
            info!(
                "Calibration complete for {}: {} of {} channels mapped",
                calibration.device_id,
                calibration.mappings().len(),
                LogicalAxis::FLIGHT.len()
            );
            self.finished = Some(calibration);
        }
    }

    fn progress_report(&self, outcome: Option<StepOutcome>) -> StepProgress {
        StepProgress {
            step: self.step,
            fraction: self.progress(),
            outcome,
        }
    }

    /// Current step.
    #[must_use]
    pub fn step(&self) -> CalibrationStep {
        self.step
    }

    /// Fraction of the current step already elapsed.
    #[must_use]
    pub fn progress(&self) -> f32 {
        match (self.step, self.session.as_ref()) {
            (CalibrationStep::Done, _) => 1.0,
            (step, Some(session)) if step.is_detecting() => {
                let total = self.settings.step_duration.as_secs_f32();
                if total <= 0.0 {
                    1.0
                } else {
                    (session.elapsed.as_secs_f32() / total).clamp(0.0, 1.0)
                }
            }
            _ => 0.0,
        }
    }

    /// The finished calibration, once the procedure reached `Done`.
    #[must_use]
    pub fn is_calibration_done(&self) -> Option<&Calibration> {
        self.finished.as_ref()
    }

    /// Takes the finished calibration and returns the engine to `NotStarted`.
    pub fn take_calibration(&mut self) -> Option<Calibration> {
        let finished = self.finished.take()?;
        self.step = CalibrationStep::NotStarted;
        Some(finished)
    }

    /// Abandons the current run.
    pub fn cancel(&mut self) {
        if self.step.is_detecting() {
            info!("Calibration cancelled during {:?}", self.step);
        }
        self.session = None;
        self.finished = None;
        self.step = CalibrationStep::NotStarted;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::RawState;

    const DEVICE: &str = "VID_2CA3_PID_1020";
    const TICK: Duration = Duration::from_millis(100);
    /// Ticks per 2 s step at 100 ms
    const TICKS_PER_STEP: usize = 20;
    const BASE: f64 = 1024.0;

    fn settings() -> CalibrationSettings {
        CalibrationSettings::default()
    }

    /// Four axes resting at BASE with ±5 jitter; `moving` sweeps ±500.
    fn sample(tick: usize, moving: Option<usize>) -> Vec<f64> {
        sample_with_jitter(tick, moving, 5.0)
    }

    fn sample_with_jitter(tick: usize, moving: Option<usize>, amplitude: f64) -> Vec<f64> {
        let jitter = if tick % 2 == 0 { amplitude } else { -amplitude };
        let sweep = [0.0, 500.0, 0.0, -500.0][tick % 4];
        (0..4)
            .map(|axis| {
                if Some(axis) == moving {
                    BASE + sweep
                } else {
                    BASE + jitter
                }
            })
            .collect()
    }

    fn state(axes: Vec<f64>) -> Option<RawState> {
        Some(RawState {
            device_id: DEVICE.to_string(),
            axes,
        })
    }

    /// Runs one full step with `moving` swept and returns the last progress.
    fn run_step(engine: &mut CalibrationEngine, moving: Option<usize>) -> StepProgress {
        run_step_with(engine, |tick| sample(tick, moving))
    }

    /// Runs one full step fed by `axes_at(tick)`.
    fn run_step_with(
        engine: &mut CalibrationEngine,
        axes_at: impl Fn(usize) -> Vec<f64>,
    ) -> StepProgress {
        let mut last = None;
        for tick in 0..TICKS_PER_STEP {
            let mut provider = || state(axes_at(tick));
            last = Some(engine.tick_calibration(TICK, &mut provider));
        }
        last.unwrap()
    }

    fn still(moving: Option<usize>) -> impl Fn(usize) -> Vec<f64> {
        move |tick| sample_with_jitter(tick, moving, 0.0)
    }

    // ==================== Step Machine Tests ====================

    #[test]
    fn test_step_order() {
        let mut step = CalibrationStep::NotStarted;
        let mut order = vec![step];
        while step != CalibrationStep::Done {
            step = step.next();
            order.push(step);
        }
        assert_eq!(
            order,
            vec![
                CalibrationStep::NotStarted,
                CalibrationStep::DetectCenter,
                CalibrationStep::DetectPitch,
                CalibrationStep::DetectRoll,
                CalibrationStep::DetectYaw,
                CalibrationStep::DetectThrottle,
                CalibrationStep::Done,
            ]
        );
    }

    #[test]
    fn test_instructions() {
        assert!(CalibrationStep::DetectCenter.instruction().contains("centered"));
        assert!(CalibrationStep::DetectPitch.instruction().contains("PITCH"));
        assert!(CalibrationStep::DetectThrottle.instruction().contains("THROTTLE"));
        assert_eq!(CalibrationStep::Done.instruction(), "Calibration complete.");
    }

    #[test]
    fn test_tick_before_begin_does_nothing() {
        let mut engine = CalibrationEngine::new(settings());
        let mut provider = || state(vec![BASE; 4]);
        let progress = engine.tick_calibration(TICK, &mut provider);

        assert_eq!(progress.step, CalibrationStep::NotStarted);
        assert_eq!(progress.fraction, 0.0);
        assert!(engine.is_calibration_done().is_none());
    }

    #[test]
    fn test_begin_enters_center_detection() {
        let mut engine = CalibrationEngine::new(settings());
        engine.begin_calibration(DEVICE);
        assert_eq!(engine.step(), CalibrationStep::DetectCenter);
        assert_eq!(engine.progress(), 0.0);
    }

    #[test]
    fn test_progress_fraction() {
        let mut engine = CalibrationEngine::new(settings());
        engine.begin_calibration(DEVICE);

        for tick in 0..5 {
            let mut provider = || state(sample(tick, None));
            engine.tick_calibration(TICK, &mut provider);
        }
        assert!((engine.progress() - 0.25).abs() < 1e-6);
    }

    // ==================== Detection Scenario Tests ====================

    #[test]
    fn test_roll_detected_on_axis_two() {
        let mut engine = CalibrationEngine::new(settings());
        engine.begin_calibration(DEVICE);

        let center = run_step(&mut engine, None);
        assert_eq!(center.step, CalibrationStep::DetectPitch);
        assert!(center.outcome.is_none());

        let pitch = run_step(&mut engine, Some(1));
        assert_eq!(
            pitch.outcome,
            Some(StepOutcome::Assigned {
                axis: LogicalAxis::Pitch,
                index: 1
            })
        );

        let roll = run_step(&mut engine, Some(2));
        assert_eq!(
            roll.outcome,
            Some(StepOutcome::Assigned {
                axis: LogicalAxis::Roll,
                index: 2
            })
        );
        assert_eq!(roll.step, CalibrationStep::DetectYaw);

        run_step(&mut engine, Some(0));
        let throttle = run_step(&mut engine, Some(3));
        assert_eq!(throttle.step, CalibrationStep::Done);
        assert_eq!(throttle.fraction, 1.0);

        let calibration = engine.is_calibration_done().unwrap();
        assert_eq!(calibration.device_id, DEVICE);
        assert!(calibration.created_at.is_some());

        let roll = calibration.find(&LogicalAxis::Roll).unwrap();
        assert_eq!(roll.axis_index, 2);
        assert!((roll.calibration.raw_min - 524.0).abs() < 1e-9);
        assert!((roll.calibration.raw_max - 1524.0).abs() < 1e-9);
        assert!((roll.calibration.raw_center - 1024.0).abs() < 1e-9);
        assert_eq!(roll.calibration.deadzone, 0.05);
        assert!(!roll.calibration.invert);

        let throttle = calibration.find(&LogicalAxis::Throttle).unwrap();
        assert_eq!(throttle.axis_index, 3);
        assert_eq!(throttle.calibration.deadzone, 0.02);

        assert_eq!(calibration.find(&LogicalAxis::Yaw).unwrap().axis_index, 0);
    }

    #[test]
    fn test_no_motion_leaves_axis_unmapped() {
        let mut engine = CalibrationEngine::new(settings());
        engine.begin_calibration(DEVICE);

        run_step(&mut engine, None);
        // Nobody touches the pitch stick
        let pitch = run_step_with(&mut engine, still(None));
        assert_eq!(
            pitch.outcome,
            Some(StepOutcome::NoMotion {
                axis: LogicalAxis::Pitch
            })
        );
        // Procedure continues
        assert_eq!(pitch.step, CalibrationStep::DetectRoll);

        run_step(&mut engine, Some(2));
        run_step(&mut engine, Some(0));
        run_step(&mut engine, Some(3));

        let calibration = engine.is_calibration_done().unwrap();
        assert!(calibration.find(&LogicalAxis::Pitch).is_none());
        assert_eq!(calibration.mappings().len(), 3);
    }

    #[test]
    fn test_assigned_axis_is_not_reused() {
        let mut engine = CalibrationEngine::new(settings());
        engine.begin_calibration(DEVICE);

        run_step(&mut engine, None);
        run_step(&mut engine, Some(2));
        // Same stick moved again for roll: axis 2 is taken
        let roll = run_step_with(&mut engine, still(Some(2)));
        assert_eq!(
            roll.outcome,
            Some(StepOutcome::NoMotion {
                axis: LogicalAxis::Roll
            })
        );
    }

    #[test]
    fn test_tie_goes_to_lowest_index() {
        let mut engine = CalibrationEngine::new(CalibrationSettings {
            step_duration: Duration::from_millis(400),
            ..settings()
        });
        engine.begin_calibration(DEVICE);

        for _ in 0..4 {
            let mut provider = || state(vec![0.0, 0.0, 0.0]);
            engine.tick_calibration(TICK, &mut provider);
        }
        assert_eq!(engine.step(), CalibrationStep::DetectPitch);

        let mut last = None;
        for tick in 0..4 {
            let v = if tick % 2 == 0 { 0.0 } else { 100.0 };
            let mut provider = || state(vec![0.0, v, v]);
            last = Some(engine.tick_calibration(TICK, &mut provider));
        }
        assert_eq!(
            last.unwrap().outcome,
            Some(StepOutcome::Assigned {
                axis: LogicalAxis::Pitch,
                index: 1
            })
        );
    }

    #[test]
    fn test_jitter_counts_as_motion_by_default() {
        let mut engine = CalibrationEngine::new(settings());
        engine.begin_calibration(DEVICE);

        run_step(&mut engine, None);
        // ±5 noise is above motion_threshold; lowest index wins the tie
        let pitch = run_step(&mut engine, None);
        assert_eq!(
            pitch.outcome,
            Some(StepOutcome::Assigned {
                axis: LogicalAxis::Pitch,
                index: 0
            })
        );
    }

    /// Center step where axis 1 is knocked through ±500, then a ±100 pitch sweep.
    fn run_bumped_center_then_small_pitch(engine: &mut CalibrationEngine) -> StepProgress {
        engine.begin_calibration(DEVICE);
        run_step_with(engine, still(Some(1)));
        run_step_with(engine, |tick| {
            let mut axes = vec![BASE; 4];
            axes[1] += [0.0, 100.0, 0.0, -100.0][tick % 4];
            axes
        })
    }

    #[test]
    fn test_bumped_center_does_not_hide_later_movement() {
        let mut engine = CalibrationEngine::new(settings());
        let pitch = run_bumped_center_then_small_pitch(&mut engine);
        assert_eq!(
            pitch.outcome,
            Some(StepOutcome::Assigned {
                axis: LogicalAxis::Pitch,
                index: 1
            })
        );
    }

    #[test]
    fn test_rest_noise_rejection_is_opt_in() {
        let mut engine = CalibrationEngine::new(CalibrationSettings {
            rest_noise_rejection: true,
            ..settings()
        });

        engine.begin_calibration(DEVICE);
        run_step(&mut engine, None);
        // ±5 noise stays under half the ±5 rest spread
        let pitch = run_step(&mut engine, None);
        assert_eq!(
            pitch.outcome,
            Some(StepOutcome::NoMotion {
                axis: LogicalAxis::Pitch
            })
        );

        // Rest spread of 1000 on axis 1 raises its threshold to 500
        let pitch = run_bumped_center_then_small_pitch(&mut engine);
        assert_eq!(
            pitch.outcome,
            Some(StepOutcome::NoMotion {
                axis: LogicalAxis::Pitch
            })
        );
    }

    // ==================== Skipped Sample Tests ====================

    #[test]
    fn test_missing_sample_is_skipped() {
        let mut engine = CalibrationEngine::new(settings());
        engine.begin_calibration(DEVICE);

        let mut not_ready = || -> Option<RawState> { None };
        for _ in 0..100 {
            let progress = engine.tick_calibration(TICK, &mut not_ready);
            assert_eq!(progress.step, CalibrationStep::DetectCenter);
        }
        assert_eq!(engine.progress(), 0.0);
    }

    #[test]
    fn test_other_device_is_skipped() {
        let mut engine = CalibrationEngine::new(settings());
        engine.begin_calibration(DEVICE);

        let mut other = || {
            Some(RawState {
                device_id: "VID_054C_PID_0CE6".into(),
                axes: vec![BASE; 4],
            })
        };
        engine.tick_calibration(TICK, &mut other);
        assert_eq!(engine.progress(), 0.0);
    }

    #[test]
    fn test_mismatched_length_is_skipped() {
        let mut engine = CalibrationEngine::new(settings());
        engine.begin_calibration(DEVICE);

        let mut four = || state(vec![BASE; 4]);
        engine.tick_calibration(TICK, &mut four);
        assert!((engine.progress() - 0.05).abs() < 1e-6);

        let mut three = || state(vec![BASE; 3]);
        engine.tick_calibration(TICK, &mut three);
        assert!((engine.progress() - 0.05).abs() < 1e-6);
    }

    // ==================== Lifecycle Tests ====================

    #[test]
    fn test_take_calibration_resets() {
        let mut engine = CalibrationEngine::new(settings());
        engine.begin_calibration(DEVICE);
        run_step(&mut engine, None);
        for axis in [1, 2, 0, 3] {
            run_step(&mut engine, Some(axis));
        }

        let calibration = engine.take_calibration().unwrap();
        assert_eq!(calibration.mappings().len(), 4);
        assert_eq!(engine.step(), CalibrationStep::NotStarted);
        assert!(engine.is_calibration_done().is_none());
        assert!(engine.take_calibration().is_none());
    }

    #[test]
    fn test_cancel() {
        let mut engine = CalibrationEngine::new(settings());
        engine.begin_calibration(DEVICE);
        run_step(&mut engine, None);

        engine.cancel();
        assert_eq!(engine.step(), CalibrationStep::NotStarted);
        assert_eq!(engine.progress(), 0.0);

        let mut provider = || state(vec![BASE; 4]);
        let progress = engine.tick_calibration(TICK, &mut provider);
        assert_eq!(progress.step, CalibrationStep::NotStarted);
    }

    #[test]
    fn test_begin_restarts_run() {
        let mut engine = CalibrationEngine::new(settings());
        engine.begin_calibration(DEVICE);
        run_step(&mut engine, None);
        assert_eq!(engine.step(), CalibrationStep::DetectPitch);

        engine.begin_calibration(DEVICE);
        assert_eq!(engine.step(), CalibrationStep::DetectCenter);
        assert_eq!(engine.progress(), 0.0);
    }
}
