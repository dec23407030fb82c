//! This module controls configuration parsing from the end user, providing a
//! convenience mechanism for the rest of the program. Crashes are most likely
//! to originate from this code, intentionally.

use std::{
    fs, io,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;

/// Errors produced by [`Config`]
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Error for a serde [`serde_yaml`].
    #[error("Failed to deserialize yaml: {0}")]
    SerdeYaml(#[from] serde_yaml::Error),
    /// Error reading config file
    #[error("Failed to read config file {path:?}: {source}")]
    ReadFile {
        /// File path
        path: PathBuf,
        /// Underlying IO error
        #[source]
        source: io::Error,
    },
}

fn default_snapshot_interval() -> u64 {
    10
}

fn default_series_interval() -> u64 {
    600
}

fn default_baseline_path() -> PathBuf {
    PathBuf::from("data.json")
}

/// Main configuration struct for this program
#[derive(Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// The InfluxDB instance to poll
    pub influx: InfluxConfig,
    /// The metering points to read
    pub meter: MeterConfig,
    /// Electricity price in euro per kWh, used for every cost derivation
    pub tariff_eur_per_kwh: f64,
    /// Cadence of the snapshot fetch, seconds
    #[serde(default = "default_snapshot_interval")]
    pub snapshot_interval_seconds: u64,
    /// Cadence of the power-history series fetch, seconds
    #[serde(default = "default_series_interval")]
    pub series_interval_seconds: u64,
    /// Path of the persisted cumulative-counter baseline
    #[serde(default = "default_baseline_path")]
    pub baseline_path: PathBuf,
}

/// Connection parameters for the InfluxDB 2.x instance. The access token is
/// deliberately not part of the file; it comes from the `INFLUX_TOKEN`
/// environment variable, read once at startup.
#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct InfluxConfig {
    /// Base URL, e.g. `http://localhost:8086`
    pub url: String,
    /// Organization identifier
    pub org: String,
    /// Bucket holding the metering measurement
    pub bucket: String,
}

/// Identifiers of the metering points within the measurement. Each is the
/// `uuid` tag the logger stamps on its series.
#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct MeterConfig {
    /// Measurement name, e.g. `vz_measurement`
    pub measurement: String,
    /// Series carrying instantaneous power draw in watts
    pub power_uuid: String,
    /// Series carrying the cumulative consumption counter in Wh
    pub counter_uuid: String,
    /// Series carrying the cumulative delivery (feed-in) counter in Wh
    pub delivery_uuid: String,
}

impl Config {
    /// Read and parse the configuration file at `path`.
    ///
    /// # Errors
    ///
    /// Function will error if the file cannot be read or is not valid yaml
    /// for this structure.
    pub fn load(path: &Path) -> Result<Self, Error> {
        let contents = fs::read_to_string(path).map_err(|source| Error::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&contents)
    }

    /// Parse configuration from a yaml string.
    ///
    /// # Errors
    ///
    /// Function will error if the string is not valid yaml for this
    /// structure.
    pub fn parse(contents: &str) -> Result<Self, Error> {
        Ok(serde_yaml::from_str(contents)?)
    }

    /// Cadence of the snapshot fetch.
    #[must_use]
    pub fn snapshot_interval(&self) -> Duration {
        Duration::from_secs(self.snapshot_interval_seconds)
    }

    /// Cadence of the series fetch.
    #[must_use]
    pub fn series_interval(&self) -> Duration {
        Duration::from_secs(self.series_interval_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
influx:
  url: http://localhost:8086
  org: home
  bucket: Strom
meter:
  measurement: vz_measurement
  power_uuid: 1810eb97-3799-46d8-9764-2ab1c4ea7cb4
  counter_uuid: 22792059-416a-4117-8b3a-420e34a841a1
  delivery_uuid: 86ef6af6-c13a-4084-beed-6183b44c0a17
tariff_eur_per_kwh: 0.31
"#;

    #[test]
    fn minimal_config_with_defaults() {
        let config = Config::parse(MINIMAL).expect("config parses");
        assert_eq!(config.influx.bucket, "Strom");
        assert_eq!(config.meter.measurement, "vz_measurement");
        assert!((config.tariff_eur_per_kwh - 0.31).abs() < f64::EPSILON);
        assert_eq!(config.snapshot_interval(), Duration::from_secs(10));
        assert_eq!(config.series_interval(), Duration::from_secs(600));
        assert_eq!(config.baseline_path, PathBuf::from("data.json"));
    }

    #[test]
    fn unknown_fields_rejected() {
        let contents = format!("{MINIMAL}\nkiosk_mode: true\n");
        assert!(Config::parse(&contents).is_err());
    }

    #[test]
    fn intervals_overridable() {
        let contents = format!(
            "{MINIMAL}\nsnapshot_interval_seconds: 5\nseries_interval_seconds: 60\n"
        );
        let config = Config::parse(&contents).expect("config parses");
        assert_eq!(config.snapshot_interval(), Duration::from_secs(5));
        assert_eq!(config.series_interval(), Duration::from_secs(60));
    }
}
