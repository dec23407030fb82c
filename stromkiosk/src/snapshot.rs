//! Snapshot fetch and flattening
//!
//! One snapshot is one execution of the fixed aggregate query, flattened
//! into a mapping keyed by synthetic field name. A snapshot with some
//! expected keys absent is a valid, partial snapshot: the anomaly keys in
//! particular are missing whenever no detector writes to the bucket.

use jiff::Timestamp;
use rustc_hash::FxHashMap;

use crate::{
    config::Config,
    influx::{self, Client, Credentials, FluxRecord},
    query,
};

/// The synthetic field keys assigned by the snapshot query.
pub mod field {
    /// Last power draw reading, watts
    pub const LATEST_VALUE: &str = "latestValue";
    /// Minimum power draw over the trailing 24 h, watts
    pub const MIN_VALUE: &str = "minValue";
    /// Maximum power draw over the trailing 24 h, watts
    pub const MAX_VALUE: &str = "maxValue";
    /// Mean power draw over the trailing 24 h, watts
    pub const AVG_VALUE: &str = "avgValue";
    /// Last consumption counter reading, Wh
    pub const CURRENT_COUNTER: &str = "currentCounter";
    /// First consumption counter reading of the local day, Wh
    pub const STARTOFDAY_COUNTER: &str = "startofdayCounter";
    /// Last delivery (feed-in) counter reading, Wh
    pub const CURRENT_COUNTER_DELIVERY: &str = "currentCounterDelivery";
    /// Last anomaly-detector reconstruction error
    pub const LATEST_ERROR: &str = "latestError";
    /// Last anomaly-detector indicator, 0 or 1
    pub const LATEST_ANOMALY: &str = "latestAnomaly";
    /// 1 if any anomaly was flagged in the last five minutes
    pub const RECENT_ANOMALY: &str = "recentAnomaly";

    /// Every key the snapshot query can produce.
    pub const EXPECTED: [&str; 10] = [
        LATEST_VALUE,
        MIN_VALUE,
        MAX_VALUE,
        AVG_VALUE,
        CURRENT_COUNTER,
        STARTOFDAY_COUNTER,
        CURRENT_COUNTER_DELIVERY,
        LATEST_ERROR,
        LATEST_ANOMALY,
        RECENT_ANOMALY,
    ];
}

/// One observation extracted from a query result row.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricRecord {
    /// Synthetic field key assigned by the query
    pub field_key: String,
    /// Observation timestamp, UTC
    pub time: Timestamp,
    /// Observed value
    pub value: f64,
    /// Measurement the observation came from
    pub measurement: String,
    /// Metering-point identifier, the `uuid` tag
    pub series_id: Option<String>,
}

/// A field-keyed snapshot of the metering state, produced atomically per
/// fetch. Consumers must treat missing keys as unknown, never as zero.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Snapshot {
    records: FxHashMap<String, MetricRecord>,
}

impl Snapshot {
    /// Flatten query result rows into the field-keyed mapping. Should the
    /// query ever produce duplicate field keys, the later row wins.
    #[must_use]
    pub fn from_records(rows: Vec<FluxRecord>) -> Self {
        let mut records = FxHashMap::default();
        for row in rows {
            let series_id = row.tags.get("uuid").cloned();
            records.insert(
                row.field.clone(),
                MetricRecord {
                    field_key: row.field,
                    time: row.time,
                    value: row.value,
                    measurement: row.measurement,
                    series_id,
                },
            );
        }
        Self { records }
    }

    /// Look up the record for a field key.
    #[must_use]
    pub fn get(&self, field_key: &str) -> Option<&MetricRecord> {
        self.records.get(field_key)
    }

    /// Look up just the value for a field key.
    #[must_use]
    pub fn value(&self, field_key: &str) -> Option<f64> {
        self.records.get(field_key).map(|r| r.value)
    }

    /// Number of distinct field keys present.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True if the fetch produced no usable rows at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Executes the snapshot query against the configured instance.
#[derive(Debug)]
pub struct SnapshotFetcher {
    credentials: Credentials,
    query: String,
}

impl SnapshotFetcher {
    /// Create a new [`SnapshotFetcher`] instance. The query body is rendered
    /// once; only the relative time windows inside it move per execution.
    #[must_use]
    pub fn new(config: &Config, token: &str) -> Self {
        Self {
            credentials: Credentials {
                url: config.influx.url.clone(),
                org: config.influx.org.clone(),
                token: token.to_owned(),
            },
            query: query::snapshot_query(&config.influx.bucket, &config.meter),
        }
    }

    /// Execute the snapshot query once and flatten the result.
    ///
    /// A partial snapshot is a success; only transport and query rejection
    /// are errors. The client is dropped before returning on either path.
    ///
    /// # Errors
    ///
    /// Function will error if the database cannot be reached or rejects the
    /// query.
    pub async fn fetch(&self) -> Result<Snapshot, influx::Error> {
        let client = Client::new(self.credentials.clone())?;
        let rows = client.query(&self.query).await?;
        Ok(Snapshot::from_records(rows))
    }
}
