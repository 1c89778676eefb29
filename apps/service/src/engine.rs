//! Engine facade - wires registry, executor, store, scheduler and aggregator
//! together and exposes the query surface used by front-ends.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::config::Config;
use crate::database::{LibsqlStore, ObservationStore, initialize_database};
use crate::monitoring::{MonitoringScheduler, Observation, ProbeExecutor, StatusSnapshot};
use crate::pool;
use crate::registry::TargetRegistry;
use crate::status::StatusAggregator;

pub struct PulseEngine {
    registry: TargetRegistry,
    store: Arc<LibsqlStore>,
    scheduler: Arc<MonitoringScheduler>,
    aggregator: StatusAggregator,
}

impl PulseEngine {
    /// Open the store, make sure its schema exists and build every component.
    ///
    /// Calling this again against an already initialised database is a no-op
    /// for the schema and keeps all stored observations.
    pub async fn initialize(config: Config) -> Result<Self> {
        config.validate()?;

        let registry = TargetRegistry::new(config.targets.clone())
            .context("Invalid target registry")?;

        let pool = pool::open(&config.database.path, config.database.pool_size).await?;

        info!("Initializing database schema...");
        {
            let conn = pool.get().await?;
            initialize_database(&conn).await?;
        }

        let store = Arc::new(LibsqlStore::new_from_pool(pool));
        let executor = Arc::new(ProbeExecutor::new(&config.probe)?);

        let scheduler = Arc::new(MonitoringScheduler::new(
            registry.clone(),
            executor.clone(),
            store.clone(),
            Duration::from_secs(config.probe.interval_secs),
        ));
        let aggregator = StatusAggregator::new(registry.clone(), executor, store.clone());

        info!(
            "Engine ready: {} targets, {} probes, {} observations on record",
            registry.len(),
            config.probe.mode,
            store.count().await?
        );

        Ok(Self { registry, store, scheduler, aggregator })
    }

    /// Start the background probing loop
    pub fn start_scheduler(&self) -> tokio::task::JoinHandle<()> {
        Arc::clone(&self.scheduler).start()
    }

    /// Current status of every target, in registry order
    pub async fn get_current_status(&self) -> Result<Vec<StatusSnapshot>> {
        Ok(self.aggregator.current_status().await?)
    }

    /// Most recent observations, newest first. `None` means the default of 50.
    pub async fn get_history(&self, limit: Option<usize>) -> Result<Vec<Observation>> {
        Ok(self.aggregator.history(limit).await?)
    }

    pub fn registry(&self) -> &TargetRegistry {
        &self.registry
    }

    pub fn store(&self) -> Arc<dyn ObservationStore> {
        self.store.clone()
    }

    pub fn scheduler(&self) -> Arc<MonitoringScheduler> {
        Arc::clone(&self.scheduler)
    }
}
