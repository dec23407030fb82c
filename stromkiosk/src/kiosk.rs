//! Periodic acquisition runtime
//!
//! Two independent interval loops drive the fetchers: a fast one for the
//! snapshot and a slow one for the power-history series. Each loop awaits
//! its fetch inline, so a fetcher is never pipelined with itself; a tick
//! that lands while a fetch is still in flight is simply absorbed.
//! Completed results are published through watch channels as immutable
//! values, so a consumer always observes the most recently completed fetch
//! and a failed fetch leaves the previous value standing.

use std::time::Duration;

use jiff::Timestamp;
use tokio::{
    sync::watch,
    time::{MissedTickBehavior, interval},
};
use tracing::{debug, info, warn};

use crate::{
    baseline::BaselineStore,
    config::Config,
    derive::{Derived, derive},
    series::{SeriesFetcher, SeriesPoint},
    snapshot::{Snapshot, SnapshotFetcher},
};

/// One completed snapshot cycle: the raw field-keyed snapshot plus the
/// metrics derived from it.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    /// The flattened query result
    pub snapshot: Snapshot,
    /// Metrics derived from the snapshot and the baseline
    pub derived: Derived,
    /// When the fetch completed
    pub fetched_at: Timestamp,
}

/// Receiver ends of the published data. `None` until the first fetch of the
/// respective kind completes.
#[derive(Debug, Clone)]
pub struct Feeds {
    /// Latest completed snapshot cycle
    pub readings: watch::Receiver<Option<Reading>>,
    /// Latest completed power-history series
    pub series: watch::Receiver<Option<Vec<SeriesPoint>>>,
}

/// The acquisition side of the kiosk: owns the fetchers, the baseline store
/// and the poll cadences.
#[derive(Debug)]
pub struct Kiosk {
    snapshot_fetcher: SnapshotFetcher,
    series_fetcher: SeriesFetcher,
    baseline: BaselineStore,
    tariff_eur_per_kwh: f64,
    snapshot_period: Duration,
    series_period: Duration,
}

impl Kiosk {
    /// Create a new [`Kiosk`] instance from configuration and the access
    /// token.
    #[must_use]
    pub fn new(config: &Config, token: &str) -> Self {
        Self {
            snapshot_fetcher: SnapshotFetcher::new(config, token),
            series_fetcher: SeriesFetcher::new(config, token),
            baseline: BaselineStore::new(&config.baseline_path),
            tariff_eur_per_kwh: config.tariff_eur_per_kwh,
            snapshot_period: config.snapshot_interval(),
            series_period: config.series_interval(),
        }
    }

    /// Spawn both poll loops and hand back the feeds. The loops run until
    /// the shutdown channel closes or every feed receiver is dropped.
    #[must_use]
    pub fn spawn(self, shutdown: watch::Receiver<()>) -> Feeds {
        let (reading_tx, reading_rx) = watch::channel(None);
        let (series_tx, series_rx) = watch::channel(None);

        tokio::spawn(snapshot_loop(
            self.snapshot_fetcher,
            self.baseline,
            self.tariff_eur_per_kwh,
            self.snapshot_period,
            reading_tx,
            shutdown.clone(),
        ));
        tokio::spawn(series_loop(
            self.series_fetcher,
            self.series_period,
            series_tx,
            shutdown,
        ));

        Feeds {
            readings: reading_rx,
            series: series_rx,
        }
    }
}

async fn snapshot_loop(
    fetcher: SnapshotFetcher,
    baseline: BaselineStore,
    tariff_eur_per_kwh: f64,
    period: Duration,
    tx: watch::Sender<Option<Reading>>,
    mut shutdown: watch::Receiver<()>,
) {
    info!("snapshot poll loop starting at {period:?} cadence");
    let mut poll = interval(period);
    poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = poll.tick() => {
                match fetcher.fetch().await {
                    Ok(snapshot) => {
                        // The baseline is re-read each cycle; it is written
                        // only by the user-triggered toggle.
                        let derived = derive(&snapshot, &baseline.load(), tariff_eur_per_kwh);
                        debug!("snapshot fetched with {n} fields", n = snapshot.len());
                        let reading = Reading {
                            snapshot,
                            derived,
                            fetched_at: Timestamp::now(),
                        };
                        if tx.send(Some(reading)).is_err() {
                            info!("all reading consumers gone, snapshot loop stopping");
                            return;
                        }
                    }
                    Err(err) => warn!("snapshot fetch failed: {err}"),
                }
            }
            _ = shutdown.changed() => {
                info!("shutdown signal received, snapshot loop stopping");
                return;
            }
        }
    }
}

async fn series_loop(
    fetcher: SeriesFetcher,
    period: Duration,
    tx: watch::Sender<Option<Vec<SeriesPoint>>>,
    mut shutdown: watch::Receiver<()>,
) {
    info!("series poll loop starting at {period:?} cadence");
    let mut poll = interval(period);
    poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = poll.tick() => {
                match fetcher.fetch().await {
                    Ok(points) => {
                        debug!("series fetched with {n} points", n = points.len());
                        if tx.send(Some(points)).is_err() {
                            info!("all series consumers gone, series loop stopping");
                            return;
                        }
                    }
                    Err(err) => warn!("series fetch failed: {err}"),
                }
            }
            _ = shutdown.changed() => {
                info!("shutdown signal received, series loop stopping");
                return;
            }
        }
    }
}
