//! Log throttling for the reader loop.
//!
//! The loop runs hundreds of times per second; without these a missing
//! transmitter or a flaky cable would flood the log.

use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::error::DeviceError;

/// Minimum time between two repeated log lines of the same kind.
pub(super) const LOG_INTERVAL: Duration = Duration::from_secs(5);

/// Logs discovery/open failures once per outage episode.
#[derive(Debug, Default)]
pub(super) struct OutageLog {
    logged: bool,
    attempts: u64,
}

impl OutageLog {
    pub(super) fn failed(&mut self, error: &DeviceError) {
        self.attempts += 1;
        if !self.logged {
            warn!("{}; retrying until the device appears", error);
            self.logged = true;
        } else {
            debug!("Open attempt {} failed: {}", self.attempts, error);
        }
    }

    pub(super) fn recovered(&mut self, device_id: &str) {
        if self.attempts > 0 {
            info!(
                "Device {} available after {} failed attempts",
                device_id, self.attempts
            );
        }
        self.logged = false;
        self.attempts = 0;
    }
}

/// Lets the first event through, then at most one per interval.
#[derive(Debug)]
pub(super) struct RateLimitedLog {
    interval: Duration,
    last: Option<Instant>,
    suppressed: u64,
}

impl RateLimitedLog {
    pub(super) fn new() -> Self {
        Self::with_interval(LOG_INTERVAL)
    }

    pub(super) fn with_interval(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
            suppressed: 0,
        }
    }

    /// Records one event. Returns the number of events suppressed since the
    /// last logged one when this event should be logged.
    pub(super) fn hit(&mut self) -> Option<u64> {
        let now = Instant::now();
        match self.last {
            Some(last) if now.duration_since(last) < self.interval => {
                self.suppressed += 1;
                None
            }
            _ => {
                self.last = Some(now);
                Some(std::mem::take(&mut self.suppressed))
            }
        }
    }
}

/// Hex dump of reports whose bytes changed.
#[derive(Debug)]
pub(super) struct RawTracer {
    enabled: bool,
    previous: Vec<u8>,
}

impl RawTracer {
    pub(super) fn new(enabled: bool) -> Self {
        Self {
            enabled,
            previous: Vec::new(),
        }
    }

    pub(super) fn reset(&mut self) {
        self.previous.clear();
    }

    /// Returns true when the report was logged.
    pub(super) fn trace(&mut self, bytes: &[u8]) -> bool {
        if !self.enabled || bytes == self.previous.as_slice() {
            return false;
        }
        debug!("Raw report ({} bytes): {}", bytes.len(), to_hex(bytes));
        self.previous.clear();
        self.previous.extend_from_slice(bytes);
        true
    }
}

fn to_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}
