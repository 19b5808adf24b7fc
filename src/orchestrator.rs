//! Cache orchestration
//!
//! The orchestrator owns one harvest cycle: classify the four dataset files,
//! run the pipeline when any of them is not fresh, and persist all four under
//! the data-directory lock. [`Orchestrator::run_forever`] repeats that cycle
//! every freshness window until shutdown is requested.

use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::{ConfigError, HarvestConfig};
use crate::fares::import_fares;
use crate::fetcher::retrying::RetryingFetcher;
use crate::fetcher::transport::{HttpTransport, TransportError};
use crate::fetcher::SharedFetcher;
use crate::metrics::{record_snapshot_written, PipelineMetrics};
use crate::normalize::harvest_routes;
use crate::pool::WorkerPool;
use crate::sequence::{fetch_listings, sequence_routes};
use crate::shutdown::SharedShutdown;
use crate::snapshot::freshness::now_ms;
use crate::snapshot::{
    check_all, with_exclusive, Dataset, Freshness, HarvestOutput, Snapshot, SnapshotError,
    SnapshotStore,
};
use crate::stops::resolve_stops;

/// Top-level harvest errors
#[derive(Debug, thiserror::Error)]
pub enum HarvestError {
    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// HTTP client could not be built
    #[error("transport setup failed: {0}")]
    Transport(#[from] TransportError),

    /// Snapshot persistence failed
    #[error("persistence failed: {0}")]
    Snapshot(#[from] SnapshotError),

    /// The blocking persistence task died
    #[error("persistence task failed: {0}")]
    Task(String),
}

/// Record counts of a persisted run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HarvestSummary {
    /// Routes across providers
    pub routes: usize,
    /// Stops across providers
    pub stops: usize,
    /// Route keys with a sequence
    pub route_stops: usize,
    /// Fare rows
    pub fares: usize,
}

impl HarvestSummary {
    fn of(output: &HarvestOutput) -> Self {
        Self {
            routes: output.routes.len(),
            stops: output.stops.len(),
            route_stops: output.route_stops.len(),
            fares: output.fares.len(),
        }
    }
}

/// Result of one [`Orchestrator::tick`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Every dataset was fresh; nothing ran
    Skipped,
    /// The pipeline ran and all four datasets were written
    Refreshed(HarvestSummary),
    /// Shutdown arrived during the run; nothing was written
    Interrupted,
}

/// Drives freshness checks, pipeline runs and persistence
pub struct Orchestrator {
    config: HarvestConfig,
    fetcher: SharedFetcher,
    pool: WorkerPool,
    store: SnapshotStore,
    shutdown: SharedShutdown,
}

impl Orchestrator {
    /// Build the production orchestrator: HTTP transport plus retrying fetcher
    pub fn from_config(config: HarvestConfig, shutdown: SharedShutdown) -> Result<Self, HarvestError> {
        config.validate()?;
        let transport = HttpTransport::new(config.connect_timeout, config.fetch_timeout)?;
        let fetcher: SharedFetcher = Arc::new(RetryingFetcher::new(Arc::new(transport), config.retry));
        Ok(Self::new(config, fetcher, shutdown))
    }

    /// Build an orchestrator around any fetcher
    pub fn new(config: HarvestConfig, fetcher: SharedFetcher, shutdown: SharedShutdown) -> Self {
        let pool = WorkerPool::new(config.concurrency);
        let store = SnapshotStore::new(config.data_dir.clone());
        Self {
            config,
            fetcher,
            pool,
            store,
            shutdown,
        }
    }

    /// Active configuration
    pub fn config(&self) -> &HarvestConfig {
        &self.config
    }

    /// Snapshot store of the data directory
    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    /// Freshness of every dataset as of `now_ms`
    pub fn check_at(&self, now_ms: i64) -> Vec<(Dataset, Freshness)> {
        check_all(&self.store, self.config.freshness_window, now_ms)
    }

    /// Freshness of every dataset now
    pub fn check(&self) -> Vec<(Dataset, Freshness)> {
        self.check_at(now_ms())
    }

    /// Run the full pipeline without persisting.
    ///
    /// Routes drive one fetch of every route-stop listing, which then feeds
    /// the stop resolver and the sequencer side by side; the fare import runs
    /// alongside all of it.
    pub async fn run_pipeline(&self) -> HarvestOutput {
        let endpoints = &self.config.endpoints;
        let fetcher = &self.fetcher;
        let pool = &self.pool;

        let route_pipeline = async {
            let routes = harvest_routes(fetcher, endpoints, pool).await;
            let listings = fetch_listings(fetcher, endpoints, pool, &routes).await;
            let (stops, route_stops) = tokio::join!(
                resolve_stops(fetcher, endpoints, pool, &listings),
                sequence_routes(fetcher, endpoints, &routes, &listings),
            );
            (routes, stops, route_stops)
        };

        let ((routes, stops, route_stops), fares) =
            tokio::join!(route_pipeline, import_fares(fetcher, endpoints));

        HarvestOutput {
            routes,
            stops,
            route_stops,
            fares,
        }
    }

    /// Write all four datasets under the directory lock.
    ///
    /// Every dataset is staged before any is renamed into place, so a
    /// serialization or disk error leaves all previous files untouched.
    pub async fn persist(&self, output: HarvestOutput) -> Result<Vec<PathBuf>, HarvestError> {
        let store = self.store.clone();
        let timestamp = now_ms();

        let task = tokio::task::spawn_blocking(move || {
            with_exclusive(store.dir(), || {
                let HarvestOutput {
                    routes,
                    stops,
                    route_stops,
                    fares,
                } = output;
                let counts = [
                    (Dataset::Routes, routes.len()),
                    (Dataset::Stops, stops.len()),
                    (Dataset::RouteStops, route_stops.len()),
                    (Dataset::Fares, fares.len()),
                ];

                let staged = [
                    store.stage(Dataset::Routes, &Snapshot::new(routes, timestamp))?,
                    store.stage(Dataset::Stops, &Snapshot::new(stops, timestamp))?,
                    store.stage(Dataset::RouteStops, &Snapshot::new(route_stops, timestamp))?,
                    store.stage(Dataset::Fares, &Snapshot::new(fares, timestamp))?,
                ];

                let mut paths = Vec::with_capacity(staged.len());
                for (snapshot, (dataset, records)) in staged.into_iter().zip(counts) {
                    paths.push(snapshot.commit()?);
                    record_snapshot_written(dataset.label(), records);
                }
                Ok(paths)
            })
        });

        task.await
            .map_err(|e| HarvestError::Task(e.to_string()))?
            .map_err(HarvestError::from)
    }

    /// One poll cycle.
    ///
    /// Runs the pipeline when any dataset is not fresh (or `force` is set)
    /// and persists the result. A shutdown request during the run drops it
    /// before anything is written; persistence itself is never interrupted.
    pub async fn tick(&self, force: bool) -> Result<TickOutcome, HarvestError> {
        let states = self.check();
        for (dataset, freshness) in &states {
            info!(dataset = %dataset, state = %freshness, "Dataset checked");
        }
        if !force && states.iter().all(|(_, freshness)| freshness.is_fresh()) {
            info!("All datasets fresh, skipping run");
            return Ok(TickOutcome::Skipped);
        }

        let metrics = PipelineMetrics::start();
        let Some(output) = self.shutdown.run_until_shutdown(self.run_pipeline()).await else {
            metrics.record_interrupted();
            return Ok(TickOutcome::Interrupted);
        };

        let summary = HarvestSummary::of(&output);
        match self.persist(output).await {
            Ok(_) => {
                metrics.record_success();
                info!(
                    routes = summary.routes,
                    stops = summary.stops,
                    route_stops = summary.route_stops,
                    fares = summary.fares,
                    "Datasets refreshed"
                );
                Ok(TickOutcome::Refreshed(summary))
            }
            Err(e) => {
                metrics.record_failure(&e.to_string());
                Err(e)
            }
        }
    }

    /// Tick, then sleep one freshness window, until shutdown.
    ///
    /// A failed tick is logged and retried on the next cycle.
    pub async fn run_forever(&self) {
        let mut consecutive_failures = 0u32;
        info!(
            data_dir = %self.config.data_dir.display(),
            window_secs = self.config.freshness_window.as_secs(),
            "Harvester started"
        );

        while !self.shutdown.is_shutdown_requested() {
            match self.tick(false).await {
                Ok(TickOutcome::Interrupted) => break,
                Ok(_) => consecutive_failures = 0,
                Err(e) => {
                    consecutive_failures += 1;
                    error!(
                        error = %e,
                        consecutive_failures,
                        "Harvest cycle failed, retrying next cycle"
                    );
                }
            }

            if !self.shutdown.sleep(self.config.freshness_window).await {
                break;
            }
        }

        warn!("Shutdown requested, harvester stopped");
    }
}
