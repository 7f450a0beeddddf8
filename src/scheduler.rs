//! ==============================================================================
//! scheduler.rs - periodic acquisition loop
//! ==============================================================================
//!
//! purpose:
//!     fires one acquisition cycle per tick. a cycle is:
//!
//!         fetch (bounded by the device timeout)  ->  append to store
//!
//!     cycles may overlap, up to `max_in_flight`. a tick that finds the cap
//!     reached is DROPPED, not queued: only the latest value matters, so a
//!     backlog of stale fetches is worthless.
//!
//! failure isolation:
//!     fetch and storage failures end their own cycle and are logged. the
//!     timer keeps firing no matter what a cycle does (a panicking cycle
//!     included).
//!
//! shutdown:
//!     when the watch channel flips, the timer stops, cycles still waiting on
//!     the network are abandoned, and cycles already writing are allowed to
//!     finish. `run` returns once every cycle has ended.
//!
//! relationships:
//!     - uses: device.rs (VitalsSource), store.rs (ReadingStore)
//!     - spawned by: main.rs
//!
//! ==============================================================================

use crate::device::VitalsSource;
use crate::error::{FetchError, StoreError};
use crate::store::ReadingStore;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// how one cycle ended
#[derive(Debug)]
pub enum CycleOutcome {
    Stored(i64),
    FetchFailed(FetchError),
    StoreFailed(StoreError),
    /// shutdown arrived while the fetch was still in flight
    Cancelled,
}

/// running counters, shared with whoever holds the scheduler
#[derive(Debug, Default)]
pub struct CycleStats {
    ticks: AtomicU64,
    started: AtomicU64,
    skipped: AtomicU64,
    stored: AtomicU64,
    fetch_failures: AtomicU64,
    storage_failures: AtomicU64,
    cancelled: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub ticks: u64,
    pub started: u64,
    pub skipped: u64,
    pub stored: u64,
    pub fetch_failures: u64,
    pub storage_failures: u64,
    pub cancelled: u64,
}

impl CycleStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            ticks: self.ticks.load(Ordering::Relaxed),
            started: self.started.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            stored: self.stored.load(Ordering::Relaxed),
            fetch_failures: self.fetch_failures.load(Ordering::Relaxed),
            storage_failures: self.storage_failures.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
        }
    }

    fn record(&self, outcome: &CycleOutcome) {
        let counter = match outcome {
            CycleOutcome::Stored(_) => &self.stored,
            CycleOutcome::FetchFailed(_) => &self.fetch_failures,
            CycleOutcome::StoreFailed(_) => &self.storage_failures,
            CycleOutcome::Cancelled => &self.cancelled,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

pub struct PollScheduler {
    source: Arc<dyn VitalsSource>,
    store: ReadingStore,
    interval: Duration,
    in_flight: Arc<Semaphore>,
    stats: Arc<CycleStats>,
    show_readings: bool,
}

impl PollScheduler {
    pub fn new(
        source: Arc<dyn VitalsSource>,
        store: ReadingStore,
        interval: Duration,
        max_in_flight: usize,
    ) -> Self {
        Self {
            source,
            store,
            interval,
            in_flight: Arc::new(Semaphore::new(max_in_flight)),
            stats: Arc::new(CycleStats::default()),
            show_readings: false,
        }
    }

    /// log every stored reading at info instead of debug
    pub fn show_readings(mut self, show: bool) -> Self {
        self.show_readings = show;
        self
    }

    pub fn stats(&self) -> Arc<CycleStats> {
        self.stats.clone()
    }

    /// Run the timer until `shutdown` flips (or its sender is dropped).
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut cycles = JoinSet::new();

        info!(interval_ms = self.interval.as_millis() as u64, "poll scheduler started");

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,

                _ = ticker.tick() => {
                    self.stats.ticks.fetch_add(1, Ordering::Relaxed);

                    let permit = match self.in_flight.clone().try_acquire_owned() {
                        Ok(permit) => permit,
                        Err(_) => {
                            self.stats.skipped.fetch_add(1, Ordering::Relaxed);
                            debug!("in-flight cap reached, skipping tick");
                            continue;
                        }
                    };

                    self.stats.started.fetch_add(1, Ordering::Relaxed);
                    let source = self.source.clone();
                    let store = self.store.clone();
                    let stats = self.stats.clone();
                    let cycle_shutdown = shutdown.clone();
                    let show_readings = self.show_readings;

                    cycles.spawn(async move {
                        let outcome = run_cycle(source.as_ref(), &store, cycle_shutdown).await;
                        report(&outcome, show_readings);
                        stats.record(&outcome);
                        drop(permit);
                    });
                }

                Some(joined) = cycles.join_next(), if !cycles.is_empty() => {
                    if let Err(e) = joined {
                        error!(error = %e, "acquisition cycle aborted");
                    }
                }
            }
        }

        info!(in_flight = cycles.len(), "poll scheduler stopping, draining cycles");
        while let Some(joined) = cycles.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "acquisition cycle aborted");
            }
        }

        info!("poll scheduler stopped");
    }
}

/// One acquisition: fetch, then append on success.
///
/// Only the fetch races against shutdown. Once the sample is in hand the
/// append always runs to completion.
pub async fn run_cycle(
    source: &dyn VitalsSource,
    store: &ReadingStore,
    mut shutdown: watch::Receiver<bool>,
) -> CycleOutcome {
    let fetched = tokio::select! {
        result = source.fetch() => result,
        _ = shutdown.changed() => return CycleOutcome::Cancelled,
    };

    let sample = match fetched {
        Ok(sample) => sample,
        Err(e) => return CycleOutcome::FetchFailed(e),
    };

    match store.append(sample.bpm, sample.spo2, None).await {
        Ok(id) => CycleOutcome::Stored(id),
        Err(e) => CycleOutcome::StoreFailed(e),
    }
}

fn report(outcome: &CycleOutcome, show_readings: bool) {
    match outcome {
        CycleOutcome::Stored(id) if show_readings => info!(id, "reading stored"),
        CycleOutcome::Stored(id) => debug!(id, "reading stored"),
        CycleOutcome::FetchFailed(e) => warn!(kind = e.kind(), error = %e, "device fetch failed"),
        CycleOutcome::StoreFailed(e) => error!(error = %e, "failed to persist reading"),
        CycleOutcome::Cancelled => debug!("cycle cancelled by shutdown"),
    }
}
