//! Derived metrics
//!
//! Pure computation over one snapshot and the persisted baseline; no I/O.
//! Every derivation treats a missing field key as unknown and yields `None`
//! for everything downstream of it. Nothing here substitutes zero for an
//! absent counter.
//!
//! Units are explicit: counters arrive in Wh and are converted to kWh
//! exactly once, here. The baseline stores kWh, so the cumulative delta and
//! cost are kWh-consistent as well.

use serde::Serialize;

use crate::{
    baseline::Baseline,
    common,
    snapshot::{Snapshot, field},
};

/// Cumulative-counter session figures, present only while a session is
/// running and the current counter is known.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cumulative {
    /// Consumption since session start, kWh
    pub delta_kwh: f64,
    /// Cost since session start, euro
    pub cost_eur: f64,
    /// Formatted session start time, as recorded in the baseline
    pub since: String,
}

/// Everything the presentation layer shows, derived from one snapshot.
/// `None` means unknown, to be rendered as a placeholder, never as zero.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Derived {
    /// Instantaneous power draw, watts
    pub power_w: Option<f64>,
    /// Local-time label of the power reading
    pub power_seen_at: Option<String>,
    /// Consumption counter, kWh
    pub counter_kwh: Option<f64>,
    /// Local-time label of the counter reading
    pub counter_seen_at: Option<String>,
    /// Delivery (feed-in) counter in its native Wh
    pub delivery_wh: Option<f64>,
    /// Minimum power draw over the trailing 24 h, watts
    pub min_w: Option<f64>,
    /// Maximum power draw over the trailing 24 h, watts
    pub max_w: Option<f64>,
    /// Mean power draw over the trailing 24 h, watts
    pub avg_w: Option<f64>,
    /// Consumption since the local start of day, kWh
    pub today_kwh: Option<f64>,
    /// Cost of today's consumption, euro
    pub today_cost_eur: Option<f64>,
    /// Cumulative session figures, when a session is running
    pub cumulative: Option<Cumulative>,
    /// Anomaly-detector verdict for the latest reading
    pub anomaly: Option<bool>,
    /// Whether any anomaly was flagged in the last five minutes
    pub recent_anomaly: Option<bool>,
    /// Anomaly-detector reconstruction error of the latest reading
    pub model_error: Option<f64>,
}

/// Derive display metrics from a snapshot, the baseline, and the tariff in
/// euro per kWh.
#[must_use]
pub fn derive(snapshot: &Snapshot, baseline: &Baseline, tariff_eur_per_kwh: f64) -> Derived {
    let counter_wh = snapshot.value(field::CURRENT_COUNTER);
    let counter_kwh = counter_wh.map(|wh| wh / common::WH_PER_KWH);

    let today_kwh = match (counter_wh, snapshot.value(field::STARTOFDAY_COUNTER)) {
        (Some(current), Some(start)) => Some((current - start) / common::WH_PER_KWH),
        _ => None,
    };
    let today_cost_eur = today_kwh.map(|kwh| kwh * tariff_eur_per_kwh);

    let cumulative = match (counter_kwh, baseline.cum_counter_start_value) {
        (Some(counter), Some(start)) => {
            let delta_kwh = counter - start;
            Some(Cumulative {
                delta_kwh,
                cost_eur: delta_kwh * tariff_eur_per_kwh,
                since: baseline.cum_counter_start_time.clone().unwrap_or_default(),
            })
        }
        _ => None,
    };

    Derived {
        power_w: snapshot.value(field::LATEST_VALUE),
        power_seen_at: snapshot
            .get(field::LATEST_VALUE)
            .map(|r| common::format_record_time(r.time)),
        counter_kwh,
        counter_seen_at: snapshot
            .get(field::CURRENT_COUNTER)
            .map(|r| common::format_record_time(r.time)),
        delivery_wh: snapshot.value(field::CURRENT_COUNTER_DELIVERY),
        min_w: snapshot.value(field::MIN_VALUE),
        max_w: snapshot.value(field::MAX_VALUE),
        avg_w: snapshot.value(field::AVG_VALUE),
        today_kwh,
        today_cost_eur,
        cumulative,
        anomaly: flag(snapshot.value(field::LATEST_ANOMALY)),
        recent_anomaly: flag(snapshot.value(field::RECENT_ANOMALY)),
        model_error: snapshot.value(field::LATEST_ERROR),
    }
}

/// Detector outputs are 0/1 indicators; anything else is "flagged" only
/// when it is exactly 1.
fn flag(value: Option<f64>) -> Option<bool> {
    value.map(|v| (v - 1.0).abs() < f64::EPSILON)
}
