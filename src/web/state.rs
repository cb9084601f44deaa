//! # Web API Application State

use std::sync::Arc;

use crate::config::CrawlerConfig;
use crate::orchestration::MultiPlatformCoordinator;
use crate::resources::ResourcePoolManager;

/// Shared handles cloned into every handler
#[derive(Debug, Clone)]
pub struct AppState {
    pub coordinator: Arc<MultiPlatformCoordinator>,
    pub pool: Arc<ResourcePoolManager>,
    pub config: Arc<CrawlerConfig>,
}

impl AppState {
    pub fn new(
        coordinator: Arc<MultiPlatformCoordinator>,
        pool: Arc<ResourcePoolManager>,
        config: Arc<CrawlerConfig>,
    ) -> Self {
        Self {
            coordinator,
            pool,
            config,
        }
    }
}
