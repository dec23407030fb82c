//! Persisted cumulative-counter baseline
//!
//! A single JSON object on disk records the counter value and wall-clock
//! time at which the user started a cumulative tracking session. Reads fail
//! closed: a missing, corrupt or half-written file degrades to "no session
//! running" instead of taking the display down. Writes are full rewrites
//! through a temp-file-then-rename so a crash mid-write cannot leave a
//! partial record behind.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::common;

/// Errors produced by [`BaselineStore`]
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Baseline file could not be written
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// Baseline record could not be serialized
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// The persisted baseline record. Both fields are set together by `start`
/// and cleared together by `stop`; a record with only one of them present
/// is treated as corrupt.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Baseline {
    /// Consumption counter at session start, kWh
    pub cum_counter_start_value: Option<f64>,
    /// Session start time, `dd.mm.yyyy, HH:MMh` in the display time zone
    pub cum_counter_start_time: Option<String>,
}

impl Baseline {
    /// True when a cumulative tracking session is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.cum_counter_start_value.is_some() && self.cum_counter_start_time.is_some()
    }

    fn is_consistent(&self) -> bool {
        self.cum_counter_start_value.is_some() == self.cum_counter_start_time.is_some()
    }
}

/// Owns the baseline file. There is one logical writer at a time, the
/// user-triggered start/stop toggle; no locking is needed.
#[derive(Debug)]
pub struct BaselineStore {
    path: PathBuf,
}

impl BaselineStore {
    /// Create a new [`BaselineStore`] instance backed by `path`. Nothing is
    /// touched on disk until the first load or write.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Read the persisted baseline.
    ///
    /// On first run the file is created holding the stopped state. Any read
    /// or parse failure is logged and yields the stopped state; the
    /// cumulative counter feature degrades rather than crashing the
    /// display.
    #[must_use]
    pub fn load(&self) -> Baseline {
        if !self.path.exists() {
            let empty = Baseline::default();
            if let Err(err) = self.write(&empty) {
                warn!(
                    "could not create baseline file {path}: {err}",
                    path = self.path.display()
                );
            }
            return empty;
        }
        match self.read() {
            Ok(baseline) if baseline.is_consistent() => baseline,
            Ok(_) => {
                warn!(
                    "baseline file {path} has mismatched fields, treating as stopped",
                    path = self.path.display()
                );
                Baseline::default()
            }
            Err(err) => {
                warn!(
                    "could not read baseline file {path}: {err}, treating as stopped",
                    path = self.path.display()
                );
                Baseline::default()
            }
        }
    }

    /// Start a session: record the current counter value and the current
    /// wall-clock time, overwriting any previous baseline.
    ///
    /// # Errors
    ///
    /// Function will error if the record cannot be persisted.
    pub fn set(&self, counter_kwh: f64) -> Result<Baseline, Error> {
        let now = Timestamp::now().to_zoned(common::display_zone());
        let baseline = Baseline {
            cum_counter_start_value: Some(counter_kwh),
            cum_counter_start_time: Some(common::format_baseline_time(&now)),
        };
        self.write(&baseline)?;
        Ok(baseline)
    }

    /// Stop the session: persist the stopped state.
    ///
    /// # Errors
    ///
    /// Function will error if the record cannot be persisted.
    pub fn reset(&self) -> Result<Baseline, Error> {
        let baseline = Baseline::default();
        self.write(&baseline)?;
        Ok(baseline)
    }

    /// The user-facing start/stop toggle: stops a running session, starts
    /// one otherwise with the given counter reading.
    ///
    /// # Errors
    ///
    /// Function will error if the record cannot be persisted.
    pub fn toggle(&self, counter_kwh: f64) -> Result<Baseline, Error> {
        if self.load().is_running() {
            info!("stopping cumulative counter session");
            self.reset()
        } else {
            info!("starting cumulative counter session at {counter_kwh} kWh");
            self.set(counter_kwh)
        }
    }

    fn read(&self) -> Result<Baseline, Error> {
        let contents = fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Full rewrite via temp file and atomic rename.
    fn write(&self, baseline: &Baseline) -> Result<(), Error> {
        let tmp = tmp_path(&self.path);
        fs::write(&tmp, serde_json::to_string(baseline)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_owned();
    os.push(".tmp");
    PathBuf::from(os)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn store(dir: &tempfile::TempDir) -> BaselineStore {
        BaselineStore::new(dir.path().join("data.json"))
    }

    #[test]
    fn first_load_creates_stopped_state() {
        let dir = tempdir().expect("tempdir");
        let store = store(&dir);
        let baseline = store.load();
        assert_eq!(baseline, Baseline::default());
        assert!(!baseline.is_running());
        assert!(dir.path().join("data.json").exists());
    }

    #[test]
    fn set_then_load_round_trips() {
        let dir = tempdir().expect("tempdir");
        let store = store(&dir);
        let written = store.set(123.4).expect("set succeeds");
        let loaded = store.load();
        assert_eq!(written, loaded);
        assert_eq!(loaded.cum_counter_start_value, Some(123.4));
        let time = loaded.cum_counter_start_time.expect("time recorded");
        // dd.mm.yyyy, HH:MMh
        assert_eq!(time.len(), "01.01.2024, 00:00h".len());
        assert!(time.ends_with('h'));
    }

    #[test]
    fn reset_is_idempotent() {
        let dir = tempdir().expect("tempdir");
        let store = store(&dir);
        store.set(50.0).expect("set succeeds");
        assert_eq!(store.reset().expect("reset"), Baseline::default());
        assert_eq!(store.reset().expect("reset again"), Baseline::default());
        assert_eq!(store.load(), Baseline::default());
    }

    #[test]
    fn toggle_starts_then_stops() {
        let dir = tempdir().expect("tempdir");
        let store = store(&dir);
        let started = store.toggle(120.0).expect("toggle starts");
        assert!(started.is_running());
        assert_eq!(started.cum_counter_start_value, Some(120.0));
        let stopped = store.toggle(125.0).expect("toggle stops");
        assert!(!stopped.is_running());
        assert_eq!(store.load(), Baseline::default());
    }

    #[test]
    fn stopping_uses_only_local_state() {
        // Stopping a session must not depend on a fresh counter reading;
        // it has to work while the database is unreachable.
        let dir = tempdir().expect("tempdir");
        let store = store(&dir);
        store.set(120.0).expect("set succeeds");
        let stopped = store.reset().expect("reset without any reading");
        assert!(!stopped.is_running());
        // The toggle's stop arm likewise ignores the counter argument.
        store.set(120.0).expect("set succeeds");
        let toggled = store.toggle(0.0).expect("toggle stops");
        assert_eq!(toggled, Baseline::default());
        assert_eq!(store.load(), Baseline::default());
    }

    #[test]
    fn corrupt_file_degrades_to_stopped() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("data.json");
        fs::write(&path, "{not json").expect("write junk");
        let baseline = BaselineStore::new(&path).load();
        assert_eq!(baseline, Baseline::default());
    }

    #[test]
    fn mismatched_fields_degrade_to_stopped() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("data.json");
        fs::write(
            &path,
            r#"{"cum_counter_start_value": 12.0, "cum_counter_start_time": null}"#,
        )
        .expect("write mixed record");
        let baseline = BaselineStore::new(&path).load();
        assert_eq!(baseline, Baseline::default());
    }

    #[test]
    fn file_holds_exactly_the_two_keys() {
        let dir = tempdir().expect("tempdir");
        let store = store(&dir);
        store.reset().expect("reset");
        let contents = fs::read_to_string(dir.path().join("data.json")).expect("read back");
        let value: serde_json::Value = serde_json::from_str(&contents).expect("valid json");
        let object = value.as_object().expect("object");
        assert_eq!(object.len(), 2);
        assert!(object["cum_counter_start_value"].is_null());
        assert!(object["cum_counter_start_time"].is_null());
    }

    #[test]
    fn no_temp_file_left_behind() {
        let dir = tempdir().expect("tempdir");
        let store = store(&dir);
        store.set(1.0).expect("set");
        assert!(!dir.path().join("data.json.tmp").exists());
    }
}
