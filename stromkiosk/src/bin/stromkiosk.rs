use std::{env, path::PathBuf};

use clap::{Parser, Subcommand};
use stromkiosk::{
    baseline::{self, Baseline, BaselineStore},
    config::{self, Config},
    derive::derive,
    influx,
    kiosk::Kiosk,
    snapshot::SnapshotFetcher,
};
use tokio::{runtime::Builder, signal, sync::watch};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, util::SubscriberInitExt};

#[derive(thiserror::Error, Debug)]
enum Error {
    #[error("Failed to load configuration: {0}")]
    Config(#[from] config::Error),
    #[error("INFLUX_TOKEN must be set in the environment: {0}")]
    MissingToken(env::VarError),
    #[error("Fetch failed: {0}")]
    Influx(#[from] influx::Error),
    #[error("Baseline store error: {0}")]
    Baseline(#[from] baseline::Error),
    #[error("Snapshot did not contain the consumption counter")]
    MissingCounter,
    #[error("Failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

fn default_config_path() -> PathBuf {
    PathBuf::from("stromkiosk.yaml")
}

#[derive(Parser)]
#[command(version, about = "Data acquisition for an electricity metering kiosk")]
struct Cli {
    /// Path to the configuration file
    #[arg(long, default_value_os_t = default_config_path())]
    config_path: PathBuf,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run both poll loops until interrupted (the default)
    Run,
    /// Fetch one snapshot, print the derived metrics as JSON and exit
    Once,
    /// Start or stop the cumulative counter session
    Toggle,
}

fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_ansi(false)
        .finish()
        .init();

    let version = env!("CARGO_PKG_VERSION");
    info!("Starting stromkiosk {version}.");

    let cli = Cli::parse();
    let config = Config::load(&cli.config_path)?;
    let token = env::var("INFLUX_TOKEN").map_err(Error::MissingToken)?;

    let runtime = Builder::new_multi_thread()
        .enable_io()
        .enable_time()
        .build()?;
    match cli.command.unwrap_or(Command::Run) {
        Command::Run => runtime.block_on(run(&config, &token)),
        Command::Once => runtime.block_on(once(&config, &token)),
        Command::Toggle => runtime.block_on(toggle(&config, &token)),
    }
}

async fn run(config: &Config, token: &str) -> Result<(), Error> {
    let (shutdown_tx, shutdown_rx) = watch::channel(());
    let mut feeds = Kiosk::new(config, token).spawn(shutdown_rx);

    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                info!("interrupt received, shutting down");
                drop(shutdown_tx);
                return Ok(());
            }
            changed = feeds.readings.changed() => {
                if changed.is_err() {
                    warn!("snapshot loop ended unexpectedly");
                    return Ok(());
                }
                let summary = feeds
                    .readings
                    .borrow_and_update()
                    .as_ref()
                    .map(|reading| reading.derived.clone());
                if let Some(derived) = summary {
                    info!(
                        power_w = ?derived.power_w,
                        today_kwh = ?derived.today_kwh,
                        today_cost_eur = ?derived.today_cost_eur,
                        anomaly = ?derived.anomaly,
                        "reading"
                    );
                }
            }
        }
    }
}

async fn once(config: &Config, token: &str) -> Result<(), Error> {
    let snapshot = SnapshotFetcher::new(config, token).fetch().await?;
    let baseline = BaselineStore::new(&config.baseline_path).load();
    let derived = derive(&snapshot, &baseline, config.tariff_eur_per_kwh);
    println!("{}", serde_json::to_string_pretty(&derived)?);
    Ok(())
}

async fn toggle(config: &Config, token: &str) -> Result<(), Error> {
    let store = BaselineStore::new(&config.baseline_path);
    // Stopping is a purely local operation; it must work while the
    // database is unreachable. Only starting needs a counter reading.
    if store.load().is_running() {
        store.reset()?;
        info!("session stopped");
        return Ok(());
    }
    let snapshot = SnapshotFetcher::new(config, token).fetch().await?;
    let derived = derive(&snapshot, &Baseline::default(), config.tariff_eur_per_kwh);
    let counter_kwh = derived.counter_kwh.ok_or(Error::MissingCounter)?;
    let baseline = store.set(counter_kwh)?;
    info!(
        "session running since {since}",
        since = baseline.cum_counter_start_time.as_deref().unwrap_or("now")
    );
    Ok(())
}
