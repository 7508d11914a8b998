pub mod advisor;
pub mod alerts;
pub mod assignments;
pub mod catalog;
pub mod db;
pub mod display;
pub mod error;
pub mod poller;
pub mod sensing;
pub mod sessions;
pub mod settings;

use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use chrono::Utc;
use log::{info, warn};
use tokio::{
    sync::watch,
    time::{self, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use alerts::LogNotifier;
use catalog::{import_seed_file, load_catalog};
use db::{Database, DatabaseOptions};
use display::{describe_snapshot, TemperatureUnit};
use poller::{DisplaySnapshot, Poller, PollerController, PollerDeps, StatusFlag};
use settings::SettingsStore;

const CONFIG_ENV: &str = "SMOKEGPT_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "smokegpt.json";
const SESSION_SWEEP_PERIOD: Duration = Duration::from_secs(60);

pub fn run() -> Result<()> {
    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    info!("SmokeGPT starting up...");

    let config_path = std::env::var_os(CONFIG_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    let settings_store = SettingsStore::load(config_path)?;
    let database = Database::open(DatabaseOptions::file(settings_store.current().database_path))?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("smokegpt-worker")
        .build()
        .context("failed to build tokio runtime")?;

    runtime.block_on(monitor(settings_store, database))
}

async fn monitor(settings_store: SettingsStore, database: Database) -> Result<()> {
    let settings = settings_store.current();

    if let Some(seed_path) = &settings.catalog_seed_path {
        match import_seed_file(&database, seed_path).await {
            Ok(count) => info!("Imported {count} item types from {}", seed_path.display()),
            Err(err) => warn!("Item type seed import failed: {err:#}"),
        }
    }
    let catalog = load_catalog(&database).await;
    if !catalog.is_empty() {
        let names: Vec<&str> = catalog.iter().map(|item| item.name.as_str()).collect();
        info!("Item types: {}", names.join(", "));
    }

    let store = Arc::new(database);
    let sweep_cancel = CancellationToken::new();
    let sweeper = tokio::spawn(sweep_stale_sessions(
        store.clone(),
        settings.session_end_after(),
        sweep_cancel.clone(),
    ));

    let deps = PollerDeps {
        sessions: store.clone(),
        samples: store.clone(),
        assignments: store,
        notifier: Arc::new(LogNotifier),
    };
    let controller = PollerController::new(
        Arc::new(Poller::new(deps, &settings)),
        settings.poll_interval(),
    );

    let display = tokio::spawn(log_snapshots(
        controller.subscribe(),
        settings.temperature_unit,
    ));

    controller.start().await?;
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;

    info!("Shutting down");
    sweep_cancel.cancel();
    controller.stop().await?;
    if let Err(err) = sweeper.await {
        warn!("Session sweep task ended abnormally: {err}");
    }

    // The display loop ends once the last snapshot sender is gone.
    drop(controller);
    if let Err(err) = display.await {
        warn!("Display task ended abnormally: {err}");
    }
    Ok(())
}

async fn sweep_stale_sessions(db: Arc<Database>, end_after: chrono::Duration, cancel: CancellationToken) {
    let mut ticker = time::interval(SESSION_SWEEP_PERIOD);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => match db.end_stale_sessions(Utc::now(), end_after).await {
                Ok(ended) => {
                    for session_id in ended {
                        info!("Session {session_id} ended after {} minutes without samples", end_after.num_minutes());
                    }
                }
                Err(err) => warn!("Stale session sweep failed: {err:#}"),
            },
            _ = cancel.cancelled() => break,
        }
    }
}

async fn log_snapshots(mut updates: watch::Receiver<DisplaySnapshot>, unit: TemperatureUnit) {
    while updates.changed().await.is_ok() {
        let snapshot = updates.borrow_and_update().clone();
        let line = describe_snapshot(&snapshot, unit);
        match snapshot.status {
            StatusFlag::Ok | StatusFlag::Loading => info!("{line}"),
            StatusFlag::NoSession | StatusFlag::Unavailable(_) => warn!("{line}"),
        }
    }
}
