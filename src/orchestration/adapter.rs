//! # Platform Adapters
//!
//! The seam between the orchestration core and platform-specific crawling.
//!
//! An adapter executes one operation with the leases it is given and reports
//! either an item count or a tagged `AdapterError`. It never acquires or
//! retires leases itself; the retry orchestrator owns that.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::error_classifier::AdapterError;
use crate::constants::defaults;
use crate::models::ResourceLease;

/// Parameters for one platform crawl
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlOperation {
    /// Comma-separated search keywords
    pub keywords: String,
    pub max_count: u32,
    /// "search", "detail" or "creator"
    pub crawler_type: String,
    pub enable_comments: bool,
    pub enable_images: bool,
    pub use_proxy: bool,
    /// Platform-specific extras passed through untouched
    pub extra: serde_json::Value,
}

impl Default for CrawlOperation {
    fn default() -> Self {
        Self {
            keywords: String::new(),
            max_count: defaults::MAX_COUNT_PER_PLATFORM,
            crawler_type: "search".to_string(),
            enable_comments: true,
            enable_images: false,
            use_proxy: false,
            extra: serde_json::Value::Null,
        }
    }
}

impl CrawlOperation {
    /// Build an operation from submitted task params, ignoring unknown fields
    pub fn from_params(params: &serde_json::Value) -> Self {
        serde_json::from_value(params.clone()).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CrawlResult {
    pub item_count: u32,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl CrawlResult {
    pub fn items(item_count: u32) -> Self {
        Self {
            item_count,
            metadata: serde_json::Value::Null,
        }
    }
}

/// Everything an adapter may use for one attempt
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub task_id: Uuid,
    pub platform: String,
    /// 1-based attempt number within the branch
    pub attempt: u32,
    pub account: ResourceLease,
    pub proxy: Option<ResourceLease>,
    /// Fires when the task is cancelled or the watchdog expires
    pub cancel: CancellationToken,
}

#[async_trait]
pub trait PlatformAdapter: Send + Sync {
    fn platform(&self) -> &str;

    async fn execute(
        &self,
        ctx: &ExecutionContext,
        operation: &CrawlOperation,
    ) -> Result<CrawlResult, AdapterError>;

    /// Release adapter-held state. Called once for every execution context
    /// the branch stops using, whatever the outcome.
    async fn close(&self, _ctx: &ExecutionContext) {}
}

/// Builds the per-platform operation for a task
pub trait OperationFactory: Send + Sync {
    fn build(&self, platform: &str) -> CrawlOperation;
}

impl<F> OperationFactory for F
where
    F: Fn(&str) -> CrawlOperation + Send + Sync,
{
    fn build(&self, platform: &str) -> CrawlOperation {
        self(platform)
    }
}

/// Same operation for every platform
#[derive(Debug, Clone)]
pub struct StaticOperation(pub CrawlOperation);

impl OperationFactory for StaticOperation {
    fn build(&self, _platform: &str) -> CrawlOperation {
        self.0.clone()
    }
}

/// Adapters keyed by platform code
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: RwLock<HashMap<String, Arc<dyn PlatformAdapter>>>,
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("platforms", &self.platforms())
            .finish()
    }
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register under the adapter's own platform code, replacing any previous one
    pub fn register(&self, adapter: Arc<dyn PlatformAdapter>) {
        let platform = adapter.platform().to_string();
        tracing::debug!(platform = %platform, "Platform adapter registered");
        self.adapters.write().insert(platform, adapter);
    }

    pub fn get(&self, platform: &str) -> Option<Arc<dyn PlatformAdapter>> {
        self.adapters.read().get(platform).cloned()
    }

    pub fn contains(&self, platform: &str) -> bool {
        self.adapters.read().contains_key(platform)
    }

    pub fn platforms(&self) -> Vec<String> {
        let mut platforms: Vec<String> = self.adapters.read().keys().cloned().collect();
        platforms.sort();
        platforms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoAdapter;

    #[async_trait]
    impl PlatformAdapter for EchoAdapter {
        fn platform(&self) -> &str {
            "xhs"
        }

        async fn execute(
            &self,
            _ctx: &ExecutionContext,
            operation: &CrawlOperation,
        ) -> Result<CrawlResult, AdapterError> {
            Ok(CrawlResult::items(operation.max_count))
        }
    }

    #[test]
    fn test_operation_from_params() {
        let op = CrawlOperation::from_params(&serde_json::json!({
            "keywords": "coffee,tea",
            "max_count": 20,
            "unrelated": true
        }));
        assert_eq!(op.keywords, "coffee,tea");
        assert_eq!(op.max_count, 20);
        assert_eq!(op.crawler_type, "search");
        assert!(op.enable_comments);

        let fallback = CrawlOperation::from_params(&serde_json::json!("not an object"));
        assert_eq!(fallback, CrawlOperation::default());
    }

    #[test]
    fn test_closure_factory() {
        let factory = |platform: &str| CrawlOperation {
            keywords: format!("{platform}-kw"),
            ..CrawlOperation::default()
        };
        assert_eq!(factory.build("dy").keywords, "dy-kw");
    }

    #[tokio::test]
    async fn test_registry_lookup() {
        let registry = AdapterRegistry::new();
        registry.register(Arc::new(EchoAdapter));

        assert!(registry.contains("xhs"));
        assert!(registry.get("dy").is_none());
        assert_eq!(registry.platforms(), vec!["xhs".to_string()]);

        let adapter = registry.get("xhs").unwrap();
        let ctx = ExecutionContext {
            task_id: Uuid::new_v4(),
            platform: "xhs".into(),
            attempt: 1,
            account: ResourceLease::account("xhs", "a1"),
            proxy: None,
            cancel: CancellationToken::new(),
        };
        let result = adapter
            .execute(&ctx, &CrawlOperation::default())
            .await
            .unwrap();
        assert_eq!(result.item_count, defaults::MAX_COUNT_PER_PLATFORM);
    }
}
