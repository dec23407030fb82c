use jiff::{Timestamp, Zoned, tz::TimeZone};
use tracing::warn;

/// Counters arrive from the meter in watt-hours.
pub(crate) const WH_PER_KWH: f64 = 1000.0;

/// Fixed display time zone. The database stores UTC; everything shown to a
/// human is Central European time with tzdb DST rules.
pub(crate) const DISPLAY_TIME_ZONE: &str = "Europe/Berlin";

pub(crate) fn display_zone() -> TimeZone {
    // The name is a compile-time constant; lookup only fails on hosts with
    // a broken tzdb, in which case UTC is the least-bad rendering.
    match TimeZone::get(DISPLAY_TIME_ZONE) {
        Ok(zone) => zone,
        Err(err) => {
            warn!("time zone {DISPLAY_TIME_ZONE} unavailable, rendering in UTC: {err}");
            TimeZone::UTC
        }
    }
}

/// German baseline timestamp, e.g. `01.01.2024, 00:00h`.
pub(crate) fn format_baseline_time(zoned: &Zoned) -> String {
    zoned.strftime("%d.%m.%Y, %H:%Mh").to_string()
}

/// German record timestamp, e.g. `01.01.2024 13:37:00`.
pub(crate) fn format_record_time(ts: Timestamp) -> String {
    ts.to_zoned(display_zone())
        .strftime("%d.%m.%Y %H:%M:%S")
        .to_string()
}
