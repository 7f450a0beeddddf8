//! ==============================================================================
//! main.rs - vitals host entry point
//! ==============================================================================
//!
//! purpose:
//!     pulls heart-rate / SpO2 readings from a pulse-oximeter node on a fixed
//!     interval, keeps every reading in sqlite, and serves the history over
//!     http.
//!
//! responsibilities:
//!     - load configuration (config.rs) and set up logging
//!     - open the reading store (store.rs), schema ensured on every start
//!     - build the device client (device.rs)
//!     - run the poll scheduler (scheduler.rs) and the history api (api.rs)
//!     - on ctrl+c / sigterm: stop ticking, abandon pending fetches, let
//!       in-progress writes finish, then exit
//!
//! architecture:
//!
//!     ┌─────────────────────────────────────────────────────────────┐
//!     │                    rust host (this file)                     │
//!     │  ┌──────────────────────┐        ┌─────────────────────┐    │
//!     │  │ poll scheduler       │        │ history api         │    │
//!     │  │ (1s tick, cap 2)     │        │ GET /data           │    │
//!     │  └──────┬─────────┬─────┘        └──────────┬──────────┘    │
//!     │         │ fetch   │ append                  │ read_all      │
//!     │         ▼         └───────────┐  ┌──────────┘               │
//!     │  ┌─────────────┐           ┌──┴──┴──────┐                   │
//!     │  │ device      │           │ store      │ <- sqlite         │
//!     │  │ client      │           └────────────┘                   │
//!     │  └──────┬──────┘                                            │
//!     └─────────┼───────────────────────────────────────────────────┘
//!               │ GET http://<node>/  (2s timeout)
//!               ▼
//!        ┌─────────────┐
//!        │ sensor node │  {"heart_rate": 72, "SpO2": 98}
//!        └─────────────┘
//!
//! ==============================================================================

mod api;
mod config;
mod device;
mod domain;
mod error;
mod scheduler;
mod store;

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // step 1: load configuration
    let config = config::VitalsConfig::load_or_default().context("failed to load configuration")?;

    // step 2: logging (RUST_LOG wins over the config file)
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .context("invalid log filter")?;
    tracing_subscriber::fmt().with_env_filter(filter).init();
    config.log_summary();

    // step 3: open the store
    let store = store::ReadingStore::open(&config.storage.path)
        .with_context(|| format!("failed to open store at {}", config.storage.path.display()))?;
    info!(readings = store.count().await?, "reading history available");

    // step 4: device client
    let client = device::DeviceClient::from_config(&config.device)
        .context("failed to build device client")?;
    info!(url = client.url(), timeout_ms = client.timeout().as_millis() as u64, "device client ready");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // step 5: history api in background
    let bind = config.server.bind.clone();
    let api_store = store.clone();
    let mut server_shutdown = shutdown_rx.clone();
    let mut server = tokio::spawn(async move {
        api::run_server(&bind, api_store, async move {
            let _ = server_shutdown.changed().await;
        })
        .await
    });

    // step 6: poll scheduler in background
    let scheduler = scheduler::PollScheduler::new(
        Arc::new(client),
        store,
        config.polling.interval(),
        config.polling.max_in_flight,
    )
    .show_readings(config.logging.show_readings);
    let stats = scheduler.stats();
    let poller = tokio::spawn(async move { scheduler.run(shutdown_rx).await });

    // step 7: wait for a signal, or for the server to die on its own
    let server_result = tokio::select! {
        _ = wait_for_shutdown() => {
            info!("shutdown signal received, stopping");
            None
        }
        joined = &mut server => Some(joined),
    };
    let _ = shutdown_tx.send(true);

    if let Err(e) = poller.await {
        error!(error = %e, "poll scheduler task failed");
    }
    let s = stats.snapshot();
    info!(
        ticks = s.ticks,
        started = s.started,
        skipped = s.skipped,
        stored = s.stored,
        fetch_failures = s.fetch_failures,
        storage_failures = s.storage_failures,
        cancelled = s.cancelled,
        "acquisition summary"
    );

    let server_result = match server_result {
        Some(joined) => joined,
        None => server.await,
    };
    server_result.context("history api task failed")??;

    info!("vitals host stopped");
    Ok(())
}

async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl+c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for sigterm");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
