//! # Calibration Persistence
//!
//! Stores finished calibrations as pretty-printed JSON, one file per device
//! id. Files are written to a temporary name and renamed into place so a
//! crash never leaves a truncated record behind.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::Calibration;
use crate::error::{FlightHidError, Result};

/// Directory of persisted calibration records.
#[derive(Debug, Clone)]
pub struct CalibrationStore {
    dir: PathBuf,
}

impl CalibrationStore {
    /// Creates a store rooted at `dir`. The directory is created on first save.
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the record for `device_id`.
    #[must_use]
    pub fn path_for(&self, device_id: &str) -> PathBuf {
        let file_stem: String = device_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.json", file_stem))
    }

    /// Saves a calibration, replacing any previous record of the same device.
    ///
    /// # Returns
    ///
    /// * `Result<PathBuf>` - Path of the written file
    ///
    /// # Errors
    ///
    /// Returns error if the directory or file cannot be written
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use flight_hid::calibration::{Calibration, CalibrationStore};
    ///
    /// let store = CalibrationStore::new("./calibrations");
    /// let path = store.save(&Calibration::new("VID_2CA3_PID_1020"))?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn save(&self, calibration: &Calibration) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;

        let path = self.path_for(&calibration.device_id);
        let tmp_path = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(calibration)?;

        fs::write(&tmp_path, json)?;
        fs::rename(&tmp_path, &path)?;

        info!(
            "Saved calibration for {} to {}",
            calibration.device_id,
            path.display()
        );
        Ok(path)
    }

    /// Loads the calibration of `device_id`.
    ///
    /// # Returns
    ///
    /// * `Result<Option<Calibration>>` - `None` when no record exists
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed, or if it belongs to
    /// another device
    pub fn load(&self, device_id: &str) -> Result<Option<Calibration>> {
        let path = self.path_for(device_id);
        if !path.exists() {
            debug!("No calibration stored at {}", path.display());
            return Ok(None);
        }

        let contents = fs::read_to_string(&path)?;
        let calibration: Calibration = serde_json::from_str(&contents)?;

        if calibration.device_id != device_id {
            return Err(FlightHidError::Calibration(format!(
                "{} holds calibration for {}, expected {}",
                path.display(),
                calibration.device_id,
                device_id
            )));
        }

        info!("Loaded calibration for {} from {}", device_id, path.display());
        Ok(Some(calibration.sanitized()))
    }
}
