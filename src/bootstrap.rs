//! # Crawl System Bootstrap
//!
//! Wires stores, pools, the retry orchestrator and the coordinator from a
//! loaded configuration, and owns the background sweepers.
//!
//! ```text
//! CrawlerConfig ──▶ stores (postgres | in-memory)
//!                   ├─▶ ResourcePoolManager ──▶ RetryOrchestrator ─┐
//!                   └─▶ TaskRegistry ──────────────────────────────┴─▶ MultiPlatformCoordinator
//! ```

use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::adapters::HttpPlatformAdapter;
use crate::config::CrawlerConfig;
use crate::database::{DatabaseConnection, PgLeaseStore, PgTaskStore};
use crate::error::Result;
use crate::orchestration::{AdapterRegistry, MultiPlatformCoordinator, RetryOrchestrator};
use crate::registry::{InMemoryTaskStore, TaskRegistry, TaskStore};
use crate::resources::{
    HttpProxyProvisioner, InMemoryLeaseStore, LeaseStore, NullProvisioner, ResourcePoolManager,
    ResourceProvisioner,
};
use crate::web::AppState;

/// Running system plus the handles needed to stop it
#[derive(Debug)]
pub struct CrawlSystemHandle {
    pub coordinator: Arc<MultiPlatformCoordinator>,
    pub pool: Arc<ResourcePoolManager>,
    pub registry: Arc<TaskRegistry>,
    pub config: Arc<CrawlerConfig>,
    database: Option<DatabaseConnection>,
    shutdown: CancellationToken,
    sweepers: Vec<JoinHandle<()>>,
}

impl CrawlSystemHandle {
    pub fn app_state(&self) -> AppState {
        AppState::new(
            Arc::clone(&self.coordinator),
            Arc::clone(&self.pool),
            Arc::clone(&self.config),
        )
    }

    pub fn is_persistent(&self) -> bool {
        self.database.is_some()
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Cancel running tasks, stop sweepers and close the database pool
    pub async fn stop(self) {
        self.coordinator.shutdown();
        self.shutdown.cancel();
        for sweeper in self.sweepers {
            if let Err(e) = sweeper.await {
                warn!(error = %e, "Sweeper task ended abnormally");
            }
        }
        if let Some(database) = self.database {
            database.close().await;
        }
        info!("🛑 BOOTSTRAP: Crawl system stopped");
    }
}

pub struct CrawlBootstrap;

impl CrawlBootstrap {
    /// Build the full system from configuration. Uses Postgres when
    /// `database.url` is set, in-memory stores otherwise. When
    /// `web.adapter_base_url` is set, every supported platform gets an
    /// HTTP sidecar adapter unless `adapters` already has one.
    pub async fn bootstrap(
        config: CrawlerConfig,
        adapters: Arc<AdapterRegistry>,
    ) -> Result<CrawlSystemHandle> {
        info!(
            environment = %config.environment,
            "🚀 BOOTSTRAP: Starting crawl system"
        );

        let (database, task_store, lease_store): (
            Option<DatabaseConnection>,
            Arc<dyn TaskStore>,
            Arc<dyn LeaseStore>,
        ) = match &config.database.url {
            Some(url) => {
                let database = DatabaseConnection::connect(url, &config.database).await?;
                if config.database.run_migrations {
                    database.run_migrations().await?;
                }
                let pool = database.pool().clone();
                (
                    Some(database),
                    Arc::new(PgTaskStore::new(pool.clone())),
                    Arc::new(PgLeaseStore::new(pool)),
                )
            }
            None => {
                warn!("⚠️ BOOTSTRAP: No database.url configured, state will not survive restarts");
                (
                    None,
                    Arc::new(InMemoryTaskStore::new()),
                    Arc::new(InMemoryLeaseStore::new()),
                )
            }
        };

        if let Some(base_url) = &config.web.adapter_base_url {
            let missing: Vec<String> = config
                .coordinator
                .supported_platforms
                .iter()
                .filter(|p| !adapters.contains(p))
                .cloned()
                .collect();
            HttpPlatformAdapter::register_all(
                &adapters,
                &missing,
                base_url,
                config.web.adapter_timeout(),
            )?;
        }

        Self::assemble(config, adapters, task_store, lease_store, database)
    }

    /// Build a system over in-memory stores without starting sweepers
    pub fn in_memory(config: CrawlerConfig, adapters: Arc<AdapterRegistry>) -> Result<CrawlSystemHandle> {
        let mut config = config;
        config.retention.enabled = false;
        config.resource_pool.expiry_sweep_interval_seconds = 0;
        Self::assemble(
            config,
            adapters,
            Arc::new(InMemoryTaskStore::new()),
            Arc::new(InMemoryLeaseStore::new()),
            None,
        )
    }

    fn assemble(
        config: CrawlerConfig,
        adapters: Arc<AdapterRegistry>,
        task_store: Arc<dyn TaskStore>,
        lease_store: Arc<dyn LeaseStore>,
        database: Option<DatabaseConnection>,
    ) -> Result<CrawlSystemHandle> {
        let provisioner: Arc<dyn ResourceProvisioner> =
            if config.resource_pool.provisioning.endpoint.is_some() {
                Arc::new(HttpProxyProvisioner::new(
                    &config.resource_pool.provisioning,
                    config.resource_pool.lease_ttl(),
                )?)
            } else {
                Arc::new(NullProvisioner)
            };

        let pool = Arc::new(ResourcePoolManager::new(
            lease_store,
            provisioner,
            &config.resource_pool,
        ));
        let registry = Arc::new(TaskRegistry::new(task_store, &config.cache));
        let orchestrator = Arc::new(RetryOrchestrator::new(
            Arc::clone(&pool),
            config.retry.clone(),
        ));
        let coordinator = Arc::new(MultiPlatformCoordinator::new(
            Arc::clone(&registry),
            orchestrator,
            adapters,
            config.coordinator.clone(),
        ));

        let shutdown = CancellationToken::new();
        let mut sweepers = Vec::new();
        if config.resource_pool.expiry_sweep_interval_seconds > 0 {
            sweepers.push(pool.spawn_expiry_sweeper(
                config.resource_pool.expiry_sweep_interval(),
                shutdown.child_token(),
            ));
        }
        if config.retention.enabled {
            sweepers.push(registry.spawn_retention_sweeper(&config.retention, shutdown.child_token()));
        }

        info!(
            persistent = database.is_some(),
            sweepers = sweepers.len(),
            "✅ BOOTSTRAP: Crawl system assembled"
        );

        Ok(CrawlSystemHandle {
            coordinator,
            pool,
            registry,
            config: Arc::new(config),
            database,
            shutdown,
            sweepers,
        })
    }
}
