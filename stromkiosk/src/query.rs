//! The two fixed Flux queries
//!
//! Query bodies are templates parameterized only by the bucket, measurement
//! and metering-point identifiers from configuration. Time windows and
//! bucket widths are fixed; making them configurable is a non-goal.

use crate::config::MeterConfig;

/// Trailing window for the power min/max/mean statistics.
const POWER_RANGE: &str = "-24h";
/// Trailing window for the last anomaly-detector outputs.
const DETECTOR_RANGE: &str = "-10m";
/// Trailing window for the "was there any anomaly recently" reduction.
const RECENT_ANOMALY_RANGE: &str = "-5m";
/// Trailing window of the power-history series.
const SERIES_RANGE: &str = "-12h";
/// Aggregation bucket width of the power-history series.
const SERIES_EVERY: &str = "1m";

/// The snapshot query: a union of sub-queries, each reduced to one scalar
/// row and renamed to a synthetic field key so the flattened result maps
/// unambiguously by field name.
#[must_use]
pub fn snapshot_query(bucket: &str, meter: &MeterConfig) -> String {
    let MeterConfig {
        measurement,
        power_uuid,
        counter_uuid,
        delivery_uuid,
    } = meter;
    format!(
        r#"import "date"

dataWattage = from(bucket: "{bucket}")
  |> range(start: {POWER_RANGE})
  |> filter(fn: (r) => r["_measurement"] == "{measurement}")
  |> filter(fn: (r) => r["_field"] == "value")
  |> filter(fn: (r) => r["uuid"] == "{power_uuid}")
  |> group(columns: ["uuid"])

dataCounter = from(bucket: "{bucket}")
  |> range(start: date.truncate(t: now(), unit: 1d), stop: now())
  |> filter(fn: (r) => r["_measurement"] == "{measurement}")
  |> filter(fn: (r) => r["_field"] == "value")
  |> filter(fn: (r) => r["uuid"] == "{counter_uuid}")
  |> group(columns: ["uuid"])

dataCounterDeliver = from(bucket: "{bucket}")
  |> range(start: date.truncate(t: now(), unit: 1d), stop: now())
  |> filter(fn: (r) => r["_measurement"] == "{measurement}")
  |> filter(fn: (r) => r["_field"] == "value")
  |> filter(fn: (r) => r["uuid"] == "{delivery_uuid}")
  |> group(columns: ["uuid"])

latestError = from(bucket: "{bucket}")
  |> range(start: {DETECTOR_RANGE})
  |> filter(fn: (r) => r["_measurement"] == "{measurement}")
  |> filter(fn: (r) => r["_field"] == "error")
  |> filter(fn: (r) => r["uuid"] == "{power_uuid}")
  |> last()
  |> set(key: "_field", value: "latestError")

latestAnomaly = from(bucket: "{bucket}")
  |> range(start: {DETECTOR_RANGE})
  |> filter(fn: (r) => r["_measurement"] == "{measurement}")
  |> filter(fn: (r) => r["_field"] == "anomaly")
  |> filter(fn: (r) => r["uuid"] == "{power_uuid}")
  |> last()
  |> set(key: "_field", value: "latestAnomaly")

recentAnomaly = from(bucket: "{bucket}")
  |> range(start: {RECENT_ANOMALY_RANGE})
  |> filter(fn: (r) => r["_measurement"] == "{measurement}")
  |> filter(fn: (r) => r["_field"] == "anomaly")
  |> filter(fn: (r) => r["uuid"] == "{power_uuid}")
  |> max()
  |> set(key: "_field", value: "recentAnomaly")

latestCounterDelivery = dataCounterDeliver |> last() |> set(key: "_field", value: "currentCounterDelivery")
latestCounter = dataCounter |> last() |> set(key: "_field", value: "currentCounter")
startCounter = dataCounter |> first() |> set(key: "_field", value: "startofdayCounter")
minValue = dataWattage |> min() |> set(key: "_field", value: "minValue")
maxValue = dataWattage |> max() |> set(key: "_field", value: "maxValue")
avgValue = dataWattage |> mean() |> set(key: "_field", value: "avgValue")
latestValue = dataWattage |> last() |> set(key: "_field", value: "latestValue")

union(tables: [
  minValue,
  maxValue,
  avgValue,
  latestValue,
  latestCounter,
  startCounter,
  latestCounterDelivery,
  latestError,
  latestAnomaly,
  recentAnomaly
])
"#
    )
}

/// The power-history series query: trailing window of power draw, averaged
/// into fixed-width buckets, empty buckets omitted.
#[must_use]
pub fn series_query(bucket: &str, meter: &MeterConfig) -> String {
    let MeterConfig {
        measurement,
        power_uuid,
        ..
    } = meter;
    format!(
        r#"from(bucket: "{bucket}")
  |> range(start: {SERIES_RANGE})
  |> filter(fn: (r) => r["_measurement"] == "{measurement}")
  |> filter(fn: (r) => r["_field"] == "value")
  |> filter(fn: (r) => r["uuid"] == "{power_uuid}")
  |> aggregateWindow(every: {SERIES_EVERY}, fn: mean, createEmpty: false)
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::field;

    fn meter() -> MeterConfig {
        MeterConfig {
            measurement: "vz_measurement".to_string(),
            power_uuid: "power-uuid".to_string(),
            counter_uuid: "counter-uuid".to_string(),
            delivery_uuid: "delivery-uuid".to_string(),
        }
    }

    #[test]
    fn snapshot_query_embeds_identifiers() {
        let query = snapshot_query("Strom", &meter());
        assert!(query.contains(r#"from(bucket: "Strom")"#));
        assert!(query.contains(r#"r["_measurement"] == "vz_measurement""#));
        assert!(query.contains("power-uuid"));
        assert!(query.contains("counter-uuid"));
        assert!(query.contains("delivery-uuid"));
    }

    #[test]
    fn snapshot_query_tags_every_field_key() {
        let query = snapshot_query("Strom", &meter());
        for key in field::EXPECTED {
            assert!(
                query.contains(&format!(r#"value: "{key}""#)),
                "missing rename to {key}"
            );
        }
    }

    #[test]
    fn series_query_shape() {
        let query = series_query("Strom", &meter());
        assert!(query.contains("range(start: -12h)"));
        assert!(query.contains("aggregateWindow(every: 1m, fn: mean, createEmpty: false)"));
        assert!(query.contains("power-uuid"));
        assert!(!query.contains("counter-uuid"));
    }
}
