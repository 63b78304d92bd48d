//! # Flight HID
//!
//! Read a USB HID flight-control transmitter (DJI FPV Remote Controller 2 by
//! default) and turn it into calibrated roll/pitch/yaw/throttle channels.
//!
//! # Commands
//!
//! - `monitor` (default): print live channel values
//! - `calibrate`: guided axis detection, saved per device
//! - `track --seconds N`: learn axis ranges from live movement
//! - `list`: show matching HID interfaces
//!
//! # Examples
//!
//! ```bash
//! cargo run --release -- --config config/default.toml calibrate
//! ```
//!
//! Expected output:
//! ```text
//! INFO flight_hid: Flight HID v0.1.0 starting...
//! INFO flight_hid::hid::session: Opened VID_2CA3_PID_1020 at /dev/hidraw3 (input report 9 bytes)
//! INFO flight_hid: Step 1: Leave all sticks centered and do not touch them.
//! ```

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use tokio::time::{interval, sleep, Duration};
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use flight_hid::calibration::{
    Calibration, CalibrationEngine, CalibrationStep, CalibrationStore, RangeTracker, TrackingOutcome,
};
use flight_hid::config::{Config, LoggingConfig};
use flight_hid::hid::{device_id, HidapiBackend};
use flight_hid::reader::ReaderHandle;

mod args;

use args::{Args, Command};

/// Calibration tick period
const CALIBRATION_TICK: Duration = Duration::from_millis(20);

/// File name prefix of the daily rolling log
const LOG_FILE_PREFIX: &str = "flight-hid.log";

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let (config, from_file) = load_config(&args.config)?;

    // Keep the guard alive so buffered file logs are flushed on exit
    let _log_guard = init_logging(&config.logging)?;

    info!("Flight HID v{} starting...", env!("CARGO_PKG_VERSION"));
    if from_file {
        info!("Loaded configuration from {}", args.config);
    } else {
        warn!("{} not found, using built-in defaults", args.config);
    }

    match args.command() {
        Command::Monitor => monitor(&config).await,
        Command::Calibrate => calibrate(&config).await,
        Command::Track { seconds } => track(&config, Duration::from_secs(seconds)).await,
        Command::List { all } => list_devices(&config, all),
    }
}

/// Loads the configuration file, falling back to defaults when it is missing.
///
/// Returns the configuration and whether it came from the file.
fn load_config(path: &str) -> Result<(Config, bool)> {
    if !Path::new(path).exists() {
        return Ok((Config::default(), false));
    }
    let config = Config::load(path).with_context(|| format!("Failed to load {}", path))?;
    Ok((config, true))
}

/// Sets up stdout logging, plus a daily rolling file when `log_dir` is set.
///
/// `RUST_LOG` overrides the configured level.
fn init_logging(logging: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&logging.level))?;

    if logging.log_dir.is_empty() {
        tracing_subscriber::fmt().with_env_filter(filter).init();
        return Ok(None);
    }

    let appender = tracing_appender::rolling::daily(&logging.log_dir, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(fmt::layer().with_ansi(false).with_writer(writer))
        .init();

    Ok(Some(guard))
}

/// Stored calibration of the device, or the configured default mapping.
fn initial_calibration(config: &Config, device_id: &str) -> Calibration {
    let store = CalibrationStore::new(&config.calibration.store_dir);
    match store.load(device_id) {
        Ok(Some(calibration)) => calibration,
        Ok(None) => {
            info!("No stored calibration for {}, using configured mapping", device_id);
            config.channels.to_calibration(device_id)
        }
        Err(e) => {
            warn!("Ignoring stored calibration: {}", e);
            config.channels.to_calibration(device_id)
        }
    }
}

fn start_reader(config: &Config) -> Result<ReaderHandle<HidapiBackend>> {
    let settings = config.device.reader_settings();
    let id = device_id(settings.vendor_id, settings.product_id);
    let calibration = initial_calibration(config, &id);

    let backend = HidapiBackend::new()?;
    let reader = ReaderHandle::new(backend, Arc::new(config.decoder.build()), settings, calibration);
    reader.start()?;
    Ok(reader)
}

/// Reports published between two reads of the store sequence.
fn reports_since(last_sequence: u64, sequence: u64) -> u64 {
    sequence.wrapping_sub(last_sequence)
}

async fn monitor(config: &Config) -> Result<()> {
    let reader = start_reader(config)?;
    let store = reader.store();

    let mut poll = interval(config.monitor.poll_period());
    let mut frames: u64 = 0;
    let mut last_sequence = store.sequence();

    info!("Monitoring channels at {}Hz", config.monitor.poll_rate_hz);
    info!("Press Ctrl+C to exit");

    loop {
        tokio::select! {
            _ = poll.tick() => {
                frames += 1;
                if frames % config.monitor.log_interval_frames != 0 {
                    continue;
                }

                let snapshot = reader.get_channel_snapshot();
                let sequence = store.sequence();
                info!(
                    "roll {:+.3}  pitch {:+.3}  yaw {:+.3}  throttle {:.3}  ({} new reports{})",
                    snapshot.roll,
                    snapshot.pitch,
                    snapshot.yaw,
                    snapshot.throttle,
                    reports_since(last_sequence, sequence),
                    if store.is_connected() { "" } else { ", disconnected" }
                );
                debug!("{}", serde_json::to_string(&snapshot)?);
                last_sequence = sequence;
            }

            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                break;
            }
        }
    }

    reader.stop();
    Ok(())
}

async fn calibrate(config: &Config) -> Result<()> {
    let reader = start_reader(config)?;
    let mut store = reader.store();
    let id = device_id(config.device.vendor_id, config.device.product_id);

    let mut engine = CalibrationEngine::new(config.calibration.settings());
    engine.begin_calibration(id);

    let mut step = engine.step();
    info!("{}", step.instruction());

    let mut ticker = interval(CALIBRATION_TICK);
    let mut last_tick = Instant::now();
    let mut waiting = false;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let now = Instant::now();
                let progress = engine.tick_calibration(now - last_tick, &mut store);
                last_tick = now;

                let connected = store.is_connected();
                if !connected && !waiting {
                    info!("Waiting for the transmitter, calibration paused");
                }
                waiting = !connected;

                if progress.step != step {
                    step = progress.step;
                    if step != CalibrationStep::Done {
                        info!("{}", step.instruction());
                    }
                }

                if let Some(calibration) = engine.take_calibration() {
                    let path = CalibrationStore::new(&config.calibration.store_dir).save(&calibration)?;
                    reader.install_calibration(calibration);
                    info!("{} Saved to {}", CalibrationStep::Done.instruction(), path.display());
                    break;
                }
            }

            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, calibration not saved");
                engine.cancel();
                break;
            }
        }
    }

    reader.stop();
    Ok(())
}

async fn track(config: &Config, duration: Duration) -> Result<()> {
    let reader = start_reader(config)?;
    let store = reader.store();
    let mut tracker = RangeTracker::new(config.calibration.center_adaptation_rate);

    let mut poll = interval(config.monitor.poll_period());
    let deadline = sleep(duration);
    tokio::pin!(deadline);
    let mut last_sequence = store.sequence();

    info!(
        "Move every stick through its full range for {} seconds",
        duration.as_secs()
    );

    let keep = loop {
        tokio::select! {
            _ = poll.tick() => {
                let sequence = store.sequence();
                if sequence == last_sequence {
                    continue;
                }
                last_sequence = sequence;

                if let Some(state) = store.raw_state() {
                    if tracker.is_active() {
                        tracker.update(&state.axes);
                    } else {
                        tracker.start(&state.axes);
                    }
                }
            }

            _ = &mut deadline => break true,

            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, discarding tracked ranges");
                break false;
            }
        }
    };

    let outcome = tracker.finish(keep);
    reader.stop();

    match outcome {
        TrackingOutcome::Kept(ranges) => {
            let mut calibration = (*reader.calibration()).clone();
            let updated = calibration.apply_ranges(&ranges);
            calibration.created_at = Some(Utc::now());

            let path = CalibrationStore::new(&config.calibration.store_dir).save(&calibration)?;
            info!("Updated {} channel ranges, saved to {}", updated, path.display());
        }
        TrackingOutcome::NotStarted => warn!("No reports received, nothing to save"),
        TrackingOutcome::Discarded => {}
    }

    Ok(())
}

fn list_devices(config: &Config, all: bool) -> Result<()> {
    let mut backend = HidapiBackend::new()?;
    let vendor_id = if all { None } else { Some(config.device.vendor_id) };
    let candidates = backend.list(vendor_id)?;

    if candidates.is_empty() {
        info!("No HID interfaces found");
    }

    for candidate in &candidates {
        println!(
            "{}  usage {:04X}:{:04X}  interface {:>2}  {}{}\n    {}",
            device_id(candidate.vendor_id, candidate.product_id),
            candidate.usage_page,
            candidate.usage,
            candidate.interface_number,
            candidate.product.as_deref().unwrap_or("(unknown product)"),
            if candidate.is_flight_controller_class() { "  [flight controller]" } else { "" },
            candidate.path
        );
    }

    Ok(())
}
