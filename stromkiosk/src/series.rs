//! Power-history series fetch
//!
//! Produces the point sequence behind the history chart: a trailing window
//! of power draw averaged into fixed-width buckets. Timestamps are
//! converted from the database's UTC storage into the display time zone;
//! values stay in watts. Gaps are left as gaps.

use jiff::{Zoned, tz::TimeZone};

use crate::{
    common,
    config::Config,
    influx::{self, Client, Credentials, FluxRecord},
    query,
};

/// One aggregated observation of the power-history series.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesPoint {
    /// Bucket timestamp in the display time zone
    pub time: Zoned,
    /// Mean power draw within the bucket, watts
    pub watts: f64,
}

/// Executes the series query against the configured instance.
#[derive(Debug)]
pub struct SeriesFetcher {
    credentials: Credentials,
    query: String,
    zone: TimeZone,
}

impl SeriesFetcher {
    /// Create a new [`SeriesFetcher`] instance.
    #[must_use]
    pub fn new(config: &Config, token: &str) -> Self {
        Self {
            credentials: Credentials {
                url: config.influx.url.clone(),
                org: config.influx.org.clone(),
                token: token.to_owned(),
            },
            query: query::series_query(&config.influx.bucket, &config.meter),
            zone: common::display_zone(),
        }
    }

    /// Execute the series query once.
    ///
    /// The returned sequence is ascending by timestamp and free of
    /// duplicate timestamps. Empty aggregation buckets simply do not
    /// appear; no zero-fill, no interpolation.
    ///
    /// # Errors
    ///
    /// Function will error if the database cannot be reached or rejects the
    /// query.
    pub async fn fetch(&self) -> Result<Vec<SeriesPoint>, influx::Error> {
        let client = Client::new(self.credentials.clone())?;
        let rows = client.query(&self.query).await?;
        Ok(normalize(rows, &self.zone))
    }
}

fn normalize(rows: Vec<FluxRecord>, zone: &TimeZone) -> Vec<SeriesPoint> {
    let mut points: Vec<SeriesPoint> = rows
        .into_iter()
        .map(|row| SeriesPoint {
            time: row.time.to_zoned(zone.clone()),
            watts: row.value,
        })
        .collect();
    points.sort_by_key(|p| p.time.timestamp());
    points.dedup_by(|a, b| a.time.timestamp() == b.time.timestamp());
    points
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustc_hash::FxHashMap;

    fn row(time: &str, value: f64) -> FluxRecord {
        FluxRecord {
            table: 0,
            time: time.parse().expect("valid timestamp"),
            value,
            field: "value".to_string(),
            measurement: "vz_measurement".to_string(),
            tags: FxHashMap::default(),
        }
    }

    #[test]
    fn sorted_ascending_without_duplicates() {
        let zone = common::display_zone();
        let points = normalize(
            vec![
                row("2024-01-01T12:02:00Z", 300.0),
                row("2024-01-01T12:00:00Z", 250.0),
                row("2024-01-01T12:02:00Z", 310.0),
                row("2024-01-01T12:01:00Z", 275.0),
            ],
            &zone,
        );
        assert_eq!(points.len(), 3);
        for pair in points.windows(2) {
            assert!(pair[0].time.timestamp() < pair[1].time.timestamp());
        }
    }

    #[test]
    fn timestamps_converted_to_display_zone() {
        let zone = common::display_zone();
        // Berlin is UTC+1 in January, UTC+2 in July.
        let points = normalize(
            vec![
                row("2024-01-01T12:00:00Z", 100.0),
                row("2024-07-01T12:00:00Z", 200.0),
            ],
            &zone,
        );
        assert_eq!(points[0].time.hour(), 13);
        assert_eq!(points[1].time.hour(), 14);
    }

    #[test]
    fn gaps_stay_gaps() {
        let zone = common::display_zone();
        let points = normalize(
            vec![
                row("2024-01-01T12:00:00Z", 100.0),
                row("2024-01-01T12:10:00Z", 110.0),
            ],
            &zone,
        );
        // Two points, not eleven minute buckets.
        assert_eq!(points.len(), 2);
    }
}
