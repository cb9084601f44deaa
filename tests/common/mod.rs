//! Shared fixtures for integration tests: scripted adapters and an
//! in-memory crawl system.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

use mediacrawl_core::bootstrap::{CrawlBootstrap, CrawlSystemHandle};
use mediacrawl_core::config::CrawlerConfig;
use mediacrawl_core::models::{ResourceLease, Task};
use mediacrawl_core::orchestration::{
    AdapterError, AdapterRegistry, CrawlOperation, CrawlResult, ExecutionContext, PlatformAdapter,
    StaticOperation, TaskRequest,
};

/// One scripted adapter response
#[derive(Debug, Clone)]
pub enum Step {
    Items(u32),
    Fail(AdapterError),
    /// Sleep, then return the item count
    Slow(Duration, u32),
    Panic(&'static str),
}

/// Replays a script per call and records what it was called with
#[derive(Debug)]
pub struct ScriptedAdapter {
    platform: String,
    script: Mutex<VecDeque<Step>>,
    /// Used once the script runs dry
    fallback: Step,
    pub calls: Mutex<Vec<Call>>,
    pub closes: Mutex<u32>,
}

#[derive(Debug, Clone)]
pub struct Call {
    pub attempt: u32,
    pub account_id: Uuid,
    pub proxy_id: Option<Uuid>,
    pub at: Instant,
}

impl ScriptedAdapter {
    pub fn new(platform: &str, script: Vec<Step>) -> Arc<Self> {
        Self::with_fallback(platform, script, Step::Fail(AdapterError::other("script exhausted")))
    }

    pub fn always(platform: &str, step: Step) -> Arc<Self> {
        Self::with_fallback(platform, Vec::new(), step)
    }

    pub fn with_fallback(platform: &str, script: Vec<Step>, fallback: Step) -> Arc<Self> {
        Arc::new(Self {
            platform: platform.to_string(),
            script: Mutex::new(script.into()),
            fallback,
            calls: Mutex::new(Vec::new()),
            closes: Mutex::new(0),
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn close_count(&self) -> u32 {
        *self.closes.lock()
    }
}

#[async_trait]
impl PlatformAdapter for ScriptedAdapter {
    fn platform(&self) -> &str {
        &self.platform
    }

    async fn execute(
        &self,
        ctx: &ExecutionContext,
        _operation: &CrawlOperation,
    ) -> Result<CrawlResult, AdapterError> {
        self.calls.lock().push(Call {
            attempt: ctx.attempt,
            account_id: ctx.account.lease_id,
            proxy_id: ctx.proxy.as_ref().map(|p| p.lease_id),
            at: Instant::now(),
        });
        let step = self
            .script
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        match step {
            Step::Items(n) => Ok(CrawlResult::items(n)),
            Step::Fail(err) => Err(err),
            Step::Slow(delay, n) => {
                tokio::time::sleep(delay).await;
                Ok(CrawlResult::items(n))
            }
            Step::Panic(message) => panic!("{message}"),
        }
    }

    async fn close(&self, _ctx: &ExecutionContext) {
        *self.closes.lock() += 1;
    }
}

/// Test configuration: no backoff, no inter-branch delay, cache off
pub fn test_config() -> CrawlerConfig {
    CrawlerConfig::for_test()
}

pub fn build_system(config: CrawlerConfig, adapters: &[Arc<ScriptedAdapter>]) -> CrawlSystemHandle {
    let registry = Arc::new(AdapterRegistry::new());
    for adapter in adapters {
        registry.register(adapter.clone());
    }
    CrawlBootstrap::in_memory(config, registry).unwrap()
}

/// Seed `count` accounts for `platform`
pub async fn seed_accounts(system: &CrawlSystemHandle, platform: &str, count: usize) -> Vec<ResourceLease> {
    let mut leases = Vec::with_capacity(count);
    for i in 0..count {
        let lease = system
            .pool
            .register(ResourceLease::account(platform, format!("{platform}-acct-{i}")))
            .await
            .unwrap();
        leases.push(lease);
    }
    leases
}

pub async fn submit(system: &CrawlSystemHandle, request: TaskRequest) -> Uuid {
    system
        .coordinator
        .submit(request, Arc::new(StaticOperation(CrawlOperation::default())))
        .await
        .unwrap()
}

/// Poll until the task is terminal or `limit` elapses
pub async fn wait_for_terminal(system: &CrawlSystemHandle, task_id: Uuid, limit: Duration) -> Task {
    let deadline = Instant::now() + limit;
    loop {
        let task = system.coordinator.get_status(task_id).await.unwrap();
        if task.is_terminal() && !system.coordinator.is_running(task_id) {
            return task;
        }
        assert!(
            Instant::now() < deadline,
            "task {task_id} still {} after {limit:?}",
            task.status
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
