//! # Channel Store
//!
//! The only state shared between the reader thread and its consumers.
//!
//! The lock is held for the duration of a copy only: the reader decodes and
//! normalizes before taking it, consumers copy the snapshot out and release
//! it. Every publish replaces the snapshot wholesale, so no reader can see a
//! half-updated value.
//!
//! On disconnect the snapshot is frozen at its last value rather than reset;
//! a stale throttle is safer than an artificial zero.

use std::sync::{Arc, Mutex, MutexGuard};

use super::ChannelSnapshot;
use crate::calibration::{RawState, RawStateProvider};
use crate::decoder::RawAxisVector;

#[derive(Debug, Default)]
struct Published {
    snapshot: ChannelSnapshot,
    raw: RawAxisVector,
    device_id: Option<String>,
    connected: bool,
    sequence: u64,
}

/// Cloneable handle to the published channels.
#[derive(Debug, Clone, Default)]
pub struct ChannelStore {
    inner: Arc<Mutex<Published>>,
}

impl ChannelStore {
    /// Creates an empty store; the snapshot starts zeroed.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Published> {
        // Writes are whole-value assignments, a poisoned lock still holds
        // consistent data.
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Replaces the snapshot and the raw axes it was computed from.
    pub fn publish(&self, device_id: &str, raw: RawAxisVector, snapshot: ChannelSnapshot) {
        let mut published = self.lock();
        published.snapshot = snapshot;
        published.raw = raw;
        if published.device_id.as_deref() != Some(device_id) {
            published.device_id = Some(device_id.to_string());
        }
        published.connected = true;
        published.sequence = published.sequence.wrapping_add(1);
    }

    /// Non-blocking copy of the latest snapshot.
    ///
    /// # Examples
    ///
    /// ```
    /// use flight_hid::channels::{ChannelSnapshot, ChannelStore};
    ///
    /// let store = ChannelStore::new();
    /// assert_eq!(store.get_channel_snapshot(), ChannelSnapshot::default());
    /// ```
    #[must_use]
    pub fn get_channel_snapshot(&self) -> ChannelSnapshot {
        self.lock().snapshot
    }

    /// Latest raw axes of the connected device.
    ///
    /// `None` while disconnected or before the first report.
    #[must_use]
    pub fn raw_state(&self) -> Option<RawState> {
        let published = self.lock();
        if !published.connected || published.raw.is_empty() {
            return None;
        }
        Some(RawState {
            device_id: published.device_id.clone()?,
            axes: published.raw.clone(),
        })
    }

    /// Records that a device session was opened.
    pub fn mark_connected(&self, device_id: &str) {
        let mut published = self.lock();
        published.device_id = Some(device_id.to_string());
        published.connected = true;
    }

    /// Records that the device went away. The snapshot keeps its last value.
    pub fn mark_disconnected(&self) {
        let mut published = self.lock();
        published.connected = false;
        published.raw.clear();
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.lock().connected
    }

    /// Device id of the current (or last) connection.
    #[must_use]
    pub fn device_id(&self) -> Option<String> {
        self.lock().device_id.clone()
    }

    /// Number of snapshots published so far.
    #[must_use]
    pub fn sequence(&self) -> u64 {
        self.lock().sequence
    }
}

impl RawStateProvider for ChannelStore {
    fn raw_state(&mut self) -> Option<RawState> {
        ChannelStore::raw_state(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(value: f32) -> ChannelSnapshot {
        ChannelSnapshot {
            roll: value,
            pitch: -value,
            yaw: value / 2.0,
            throttle: value.abs(),
        }
    }

    #[test]
    fn test_starts_zeroed() {
        let store = ChannelStore::new();
        assert_eq!(store.get_channel_snapshot(), ChannelSnapshot::default());
        assert_eq!(store.sequence(), 0);
        assert!(!store.is_connected());
        assert!(store.raw_state().is_none());
    }

    #[test]
    fn test_publish_replaces_snapshot() {
        let store = ChannelStore::new();
        store.publish("dev", vec![1.0, 2.0], snapshot(0.5));
        store.publish("dev", vec![3.0, 4.0], snapshot(0.25));

        assert_eq!(store.get_channel_snapshot(), snapshot(0.25));
        assert_eq!(store.sequence(), 2);
        assert_eq!(store.raw_state().unwrap().axes, vec![3.0, 4.0]);
    }

    #[test]
    fn test_get_snapshot_is_idempotent() {
        let store = ChannelStore::new();
        store.publish("dev", vec![1.0], snapshot(0.7));

        let first = store.get_channel_snapshot();
        let second = store.get_channel_snapshot();
        assert_eq!(first, second);
        assert_eq!(store.sequence(), 1);
    }

    #[test]
    fn test_disconnect_freezes_snapshot() {
        let store = ChannelStore::new();
        store.publish("dev", vec![1.0], snapshot(0.9));
        store.mark_disconnected();

        assert_eq!(store.get_channel_snapshot(), snapshot(0.9));
        assert!(!store.is_connected());
        assert!(store.raw_state().is_none());
        assert_eq!(store.device_id().as_deref(), Some("dev"));
    }

    #[test]
    fn test_clones_share_state() {
        let store = ChannelStore::new();
        let reader_side = store.clone();
        reader_side.publish("dev", vec![5.0], snapshot(0.1));

        assert_eq!(store.get_channel_snapshot(), snapshot(0.1));
    }

    #[test]
    fn test_store_as_raw_state_provider() {
        let mut store = ChannelStore::new();
        assert!(RawStateProvider::raw_state(&mut store).is_none());

        store.mark_connected("VID_2CA3_PID_1020");
        assert!(RawStateProvider::raw_state(&mut store).is_none());

        store.publish("VID_2CA3_PID_1020", vec![1024.0, 2048.0], snapshot(0.0));
        let state = RawStateProvider::raw_state(&mut store).unwrap();
        assert_eq!(state.device_id, "VID_2CA3_PID_1020");
        assert_eq!(state.axes, vec![1024.0, 2048.0]);
    }

    #[test]
    fn test_concurrent_readers_see_whole_snapshots() {
        let store = ChannelStore::new();
        let writer = store.clone();

        let handle = std::thread::spawn(move || {
            for i in 0..1000 {
                let v = i as f32 / 1000.0;
                writer.publish("dev", vec![f64::from(v)], snapshot(v));
            }
        });

        for _ in 0..1000 {
            let s = store.get_channel_snapshot();
            // Fields were written together
            assert_eq!(s.pitch, -s.roll);
            assert_eq!(s.throttle, s.roll.abs());
        }
        handle.join().unwrap();
    }
}
