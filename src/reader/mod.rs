//! # Reader Module
//!
//! Background reading of the transmitter.
//!
//! [`ReaderHandle`] owns one reader thread per device. The thread runs
//! [`run_reader`] until a cooperative stop flag is set:
//!
//! 1. No open session: discover and open, retrying every `reconnect_interval`
//! 2. Open session: read one report with a bounded timeout
//! 3. Decode, normalize with the active calibration, publish to the [`ChannelStore`]
//! 4. Transient read failure: short pause, read again
//! 5. Disconnect: close the session, keep the last snapshot, go back to 1
//!
//! Consumers only ever call [`ReaderHandle::get_channel_snapshot`], which
//! copies the snapshot under a short lock and never blocks on I/O.

mod diagnostics;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::calibration::Calibration;
use crate::channels::{normalize_channels, ChannelSnapshot, ChannelStore};
use crate::decoder::ReportDecoder;
use crate::error::{FlightHidError, ReadError, Result};
use crate::hid::{DeviceSession, HidBackend};

use diagnostics::{OutageLog, RateLimitedLog, RawTracer};

/// Longest single sleep while waiting; bounds how late a stop request is seen.
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Name of the reader thread.
const THREAD_NAME: &str = "hid-reader";

/// Runtime parameters of the reader loop.
#[derive(Debug, Clone, PartialEq)]
pub struct ReaderSettings {
    pub vendor_id: u16,
    pub product_id: u16,
    /// Upper bound of one blocking read.
    pub read_timeout: Duration,
    /// Pause between discovery attempts while no device is open.
    pub reconnect_interval: Duration,
    /// Pause after a transient read failure.
    pub transient_retry: Duration,
    /// Report length used when the capability query gives none.
    pub fallback_report_len: usize,
    /// Log every changed report as hex at debug level.
    pub trace_raw_reports: bool,
}

impl Default for ReaderSettings {
    fn default() -> Self {
        Self {
            vendor_id: 0x2ca3,
            product_id: 0x1020,
            read_timeout: Duration::from_millis(50),
            reconnect_interval: Duration::from_millis(500),
            transient_retry: Duration::from_millis(10),
            fallback_report_len: 64,
            trace_raw_reports: false,
        }
    }
}

/// State shared between the handle and the reader thread.
struct Shared {
    stop: AtomicBool,
    store: ChannelStore,
    calibration: Mutex<Arc<Calibration>>,
    decoder: Arc<dyn ReportDecoder>,
    settings: ReaderSettings,
}

impl Shared {
    fn calibration(&self) -> Arc<Calibration> {
        Arc::clone(
            &self
                .calibration
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        )
    }

    fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    /// Sleeps for `duration`, waking early when a stop is requested.
    fn sleep(&self, duration: Duration) {
        let deadline = Instant::now() + duration;
        while !self.stop_requested() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::sleep((deadline - now).min(STOP_POLL_INTERVAL));
        }
    }
}

struct Worker<B> {
    backend: Option<B>,
    join: Option<JoinHandle<B>>,
}

/// Explicit, constructible owner of one device reader.
///
/// The backend is moved into the reader thread on [`ReaderHandle::start`]
/// and handed back when the thread exits, so the handle can be restarted.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use flight_hid::calibration::Calibration;
/// use flight_hid::decoder::FieldDecoder;
/// use flight_hid::hid::HidapiBackend;
/// use flight_hid::reader::{ReaderHandle, ReaderSettings};
///
/// let reader = ReaderHandle::new(
///     HidapiBackend::new()?,
///     Arc::new(FieldDecoder::le16(1, 4)),
///     ReaderSettings::default(),
///     Calibration::new("VID_2CA3_PID_1020"),
/// );
/// reader.start()?;
/// let snapshot = reader.get_channel_snapshot();
/// reader.stop();
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct ReaderHandle<B: HidBackend> {
    shared: Arc<Shared>,
    worker: Mutex<Worker<B>>,
}

impl<B: HidBackend> std::fmt::Debug for ReaderHandle<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReaderHandle")
            .field("settings", &self.shared.settings)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl<B: HidBackend> ReaderHandle<B> {
    /// Creates a stopped reader.
    ///
    /// # Arguments
    ///
    /// * `backend` - Platform HID implementation
    /// * `decoder` - Report layout
    /// * `settings` - Device ids and timing
    /// * `calibration` - Calibration used until another one is installed
    pub fn new(
        backend: B,
        decoder: Arc<dyn ReportDecoder>,
        settings: ReaderSettings,
        calibration: Calibration,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                stop: AtomicBool::new(false),
                store: ChannelStore::new(),
                calibration: Mutex::new(Arc::new(calibration)),
                decoder,
                settings,
            }),
            worker: Mutex::new(Worker {
                backend: Some(backend),
                join: None,
            }),
        }
    }

    fn worker(&self) -> MutexGuard<'_, Worker<B>> {
        self.worker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Starts the reader thread. Does nothing when already running.
    ///
    /// # Errors
    ///
    /// Returns error if the thread cannot be spawned or a previous reader
    /// thread panicked and took the backend with it
    pub fn start(&self) -> Result<()> {
        let mut worker = self.worker();

        if let Some(join) = worker.join.take() {
            if !join.is_finished() {
                worker.join = Some(join);
                return Ok(());
            }
            // Thread ended on its own; recover the backend before restarting
            Self::reclaim(&mut worker, join);
        }

        let backend = worker
            .backend
            .take()
            .ok_or_else(|| FlightHidError::Reader("HID backend is no longer available".into()))?;

        self.shared.stop.store(false, Ordering::Release);
        let shared = Arc::clone(&self.shared);
        let join = thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || run_reader(backend, &shared))?;

        info!(
            "Reader started for VID 0x{:04X} PID 0x{:04X}",
            self.shared.settings.vendor_id, self.shared.settings.product_id
        );
        worker.join = Some(join);
        Ok(())
    }

    /// Stops the reader thread and waits for it to exit.
    ///
    /// The device handle is closed by the thread itself after it observed
    /// the stop flag, never while a read is in flight. Safe to call when
    /// already stopped.
    pub fn stop(&self) {
        let mut worker = self.worker();
        self.shared.stop.store(true, Ordering::Release);

        if let Some(join) = worker.join.take() {
            Self::reclaim(&mut worker, join);
            info!("Reader stopped");
        }
    }

    fn reclaim(worker: &mut Worker<B>, join: JoinHandle<B>) {
        match join.join() {
            Ok(backend) => worker.backend = Some(backend),
            Err(_) => error!("Reader thread panicked; HID backend lost"),
        }
    }

    /// True while the reader thread is alive.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.worker()
            .join
            .as_ref()
            .is_some_and(|join| !join.is_finished())
    }

    /// Non-blocking copy of the latest channels.
    #[must_use]
    pub fn get_channel_snapshot(&self) -> ChannelSnapshot {
        self.shared.store.get_channel_snapshot()
    }

    /// Handle to the published channels and raw axes.
    #[must_use]
    pub fn store(&self) -> ChannelStore {
        self.shared.store.clone()
    }

    /// Replaces the calibration used for subsequent reports.
    pub fn install_calibration(&self, calibration: Calibration) {
        info!(
            "Installing calibration for {} ({} mappings)",
            calibration.device_id,
            calibration.mappings().len()
        );
        *self
            .shared
            .calibration
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Arc::new(calibration);
    }

    /// The calibration currently in use.
    #[must_use]
    pub fn calibration(&self) -> Arc<Calibration> {
        self.shared.calibration()
    }

    /// Device id of the open device, `None` while disconnected.
    #[must_use]
    pub fn connection(&self) -> Option<String> {
        if self.shared.store.is_connected() {
            self.shared.store.device_id()
        } else {
            None
        }
    }
}

impl<B: HidBackend> Drop for ReaderHandle<B> {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Reader loop body. Returns the backend once the stop flag is observed.
fn run_reader<B: HidBackend>(backend: B, shared: &Shared) -> B {
    let settings = &shared.settings;
    let mut session = DeviceSession::new(
        backend,
        settings.vendor_id,
        settings.product_id,
        settings.fallback_report_len,
    );

    let mut outage = OutageLog::default();
    let mut transient_log = RateLimitedLog::new();
    let mut decode_log = RateLimitedLog::new();
    let mut tracer = RawTracer::new(settings.trace_raw_reports);
    let mut device_id = String::new();

    while !shared.stop_requested() {
        if !session.is_open() {
            match session.open() {
                Ok(descriptor) => {
                    device_id = descriptor.device_id();
                    let min_len = shared.decoder.min_report_len();
                    if descriptor.input_report_len < min_len {
                        warn!(
                            "Input report is {} bytes but the decoder needs {}; reports will be dropped",
                            descriptor.input_report_len, min_len
                        );
                    }
                    outage.recovered(&device_id);
                    shared.store.mark_connected(&device_id);
                    tracer.reset();
                }
                Err(e) => {
                    outage.failed(&e);
                    shared.sleep(settings.reconnect_interval);
                    continue;
                }
            }
        }

        match session.read_report(settings.read_timeout) {
            Ok(Some(report)) => {
                tracer.trace(report.bytes());
                match shared.decoder.decode(&report) {
                    Ok(axes) => {
                        let calibration = shared.calibration();
                        let snapshot = normalize_channels(&axes, &calibration);
                        shared.store.publish(&device_id, axes, snapshot);
                    }
                    Err(e) => {
                        if let Some(suppressed) = decode_log.hit() {
                            debug!("Dropping report: {} ({} similar suppressed)", e, suppressed);
                        }
                    }
                }
            }
            Ok(None) => {}
            Err(ReadError::Transient(reason)) => {
                if let Some(suppressed) = transient_log.hit() {
                    warn!("Transient read failure: {} ({} similar suppressed)", reason, suppressed);
                }
                shared.sleep(settings.transient_retry);
            }
            Err(ReadError::Disconnected(reason)) => {
                warn!("Device {} disconnected: {}", device_id, reason);
                session.close();
                shared.store.mark_disconnected();
            }
        }
    }

    session.close();
    shared.store.mark_disconnected();
    debug!("Reader loop exited");
    session.into_backend()
}
