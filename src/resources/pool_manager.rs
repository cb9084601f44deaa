//! # Resource Pool Manager
//!
//! Owns the lifecycle of account and proxy leases per platform.
//!
//! ## Overview
//!
//! The manager is the sole mutator of lease state. It hands out leases,
//! tracks which ones are checked out, and folds success/failure feedback into
//! the lease counters. Every mutation is written through the `LeaseStore`
//! before the call returns.
//!
//! ## Concurrency
//!
//! - Checkout state lives in memory for the process lifetime (`DashMap`)
//! - Selection and every read-modify-write run under one async mutex, so two
//!   callers can never check out the same lease
//! - Upstream provisioning runs outside that mutex
//! - No lock is held while an adapter runs

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::provisioner::{NullProvisioner, ResourceProvisioner};
use super::selection::LeaseSelector;
use super::store::LeaseStore;
use crate::config::ResourcePoolConfig;
use crate::constants::{events, DEFAULT_FAIL_THRESHOLD};
use crate::error::{CrawlError, Result, StoreError};
use crate::logging::log_lease_operation;
use crate::models::{
    AccountStrategy, ErrorRecord, LeaseAuditEntry, LeaseStatus, ResourceKind, ResourceLease,
};

/// Result of an allocation attempt. `NotAvailable` is an expected outcome,
/// not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum Acquisition {
    Acquired(ResourceLease),
    NotAvailable,
}

impl Acquisition {
    pub fn into_lease(self) -> Option<ResourceLease> {
        match self {
            Self::Acquired(lease) => Some(lease),
            Self::NotAvailable => None,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Self::Acquired(_))
    }
}

#[derive(Debug, Clone)]
struct Checkout {
    since: DateTime<Utc>,
}

/// Lease counts for one (platform, kind)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub platform: String,
    pub kind: String,
    pub active: usize,
    pub exhausted: usize,
    pub expired: usize,
    pub disabled: usize,
    pub checked_out: usize,
}

pub struct ResourcePoolManager {
    store: Arc<dyn LeaseStore>,
    provisioner: Arc<dyn ResourceProvisioner>,
    selector: LeaseSelector,
    checked_out: DashMap<Uuid, Checkout>,
    state_lock: Mutex<()>,
    fail_threshold: u32,
}

impl std::fmt::Debug for ResourcePoolManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourcePoolManager")
            .field("provisioner", &self.provisioner.provisioner_name())
            .field("checked_out", &self.checked_out.len())
            .field("fail_threshold", &self.fail_threshold)
            .finish()
    }
}

impl ResourcePoolManager {
    pub fn new(
        store: Arc<dyn LeaseStore>,
        provisioner: Arc<dyn ResourceProvisioner>,
        config: &ResourcePoolConfig,
    ) -> Self {
        info!(
            provisioner = provisioner.provisioner_name(),
            fail_threshold = config.fail_threshold,
            "🏊 POOL: Resource pool manager initialized"
        );

        Self {
            store,
            provisioner,
            selector: LeaseSelector::new(),
            checked_out: DashMap::new(),
            state_lock: Mutex::new(()),
            fail_threshold: config.fail_threshold.max(1),
        }
    }

    /// Pool backed by `store` with no upstream provisioning
    pub fn with_store(store: Arc<dyn LeaseStore>) -> Self {
        Self::new(
            store,
            Arc::new(NullProvisioner),
            &ResourcePoolConfig {
                fail_threshold: DEFAULT_FAIL_THRESHOLD,
                ..ResourcePoolConfig::default()
            },
        )
    }

    pub fn fail_threshold(&self) -> u32 {
        self.fail_threshold
    }

    /// Seed a lease administratively
    pub async fn register(&self, lease: ResourceLease) -> std::result::Result<ResourceLease, StoreError> {
        self.store.insert(&lease).await?;
        debug!(
            lease_id = %lease.lease_id,
            platform = %lease.platform,
            kind = %lease.kind,
            "Lease registered"
        );
        Ok(lease)
    }

    pub async fn get(&self, lease_id: Uuid) -> std::result::Result<Option<ResourceLease>, StoreError> {
        self.store.get(lease_id).await
    }

    pub fn is_checked_out(&self, lease_id: Uuid) -> bool {
        self.checked_out.contains_key(&lease_id)
    }

    pub fn checked_out_count(&self) -> usize {
        self.checked_out.len()
    }

    /// Least-recently-used allocatable lease for (platform, kind)
    pub async fn acquire(
        &self,
        platform: &str,
        kind: ResourceKind,
    ) -> std::result::Result<Acquisition, StoreError> {
        self.acquire_with(platform, kind, AccountStrategy::Lru, &HashSet::new())
            .await
    }

    /// Allocate using `strategy`, never returning a lease in `exclude`
    pub async fn acquire_with(
        &self,
        platform: &str,
        kind: ResourceKind,
        strategy: AccountStrategy,
        exclude: &HashSet<Uuid>,
    ) -> std::result::Result<Acquisition, StoreError> {
        {
            let _guard = self.state_lock.lock().await;
            let now = Utc::now();

            let candidates: Vec<ResourceLease> = self
                .store
                .list_for(platform, kind)
                .await?
                .into_iter()
                .filter(|lease| lease.is_allocatable_at(now))
                .filter(|lease| !self.checked_out.contains_key(&lease.lease_id))
                .filter(|lease| !exclude.contains(&lease.lease_id))
                .collect();

            if let Some(lease) = self.selector.select(strategy, platform, kind, candidates) {
                let lease = self.check_out(lease, now).await?;
                log_lease_operation(
                    events::LEASE_ACQUIRED,
                    lease.lease_id,
                    platform,
                    &kind.to_string(),
                    &lease.status.to_string(),
                    Some(&format!("strategy={strategy}")),
                );
                return Ok(Acquisition::Acquired(lease));
            }
        }

        self.provision(platform, kind).await
    }

    async fn provision(
        &self,
        platform: &str,
        kind: ResourceKind,
    ) -> std::result::Result<Acquisition, StoreError> {
        let provisioned = match self.provisioner.provision(platform, kind).await {
            Ok(Some(lease)) => lease,
            Ok(None) => {
                debug!(platform = %platform, kind = %kind, "No lease available and upstream declined");
                return Ok(Acquisition::NotAvailable);
            }
            Err(e) => {
                warn!(
                    platform = %platform,
                    kind = %kind,
                    error = %e,
                    "⚠️ POOL: Upstream provisioning failed"
                );
                return Ok(Acquisition::NotAvailable);
            }
        };

        self.store.insert(&provisioned).await?;

        let _guard = self.state_lock.lock().await;
        let lease = self.check_out(provisioned, Utc::now()).await?;
        log_lease_operation(
            events::LEASE_PROVISIONED,
            lease.lease_id,
            platform,
            &kind.to_string(),
            &lease.status.to_string(),
            Some(self.provisioner.provisioner_name()),
        );
        Ok(Acquisition::Acquired(lease))
    }

    /// Caller must hold `state_lock`
    async fn check_out(
        &self,
        mut lease: ResourceLease,
        now: DateTime<Utc>,
    ) -> std::result::Result<ResourceLease, StoreError> {
        lease.usage_count += 1;
        lease.last_used_at = Some(now);
        lease.updated_at = now;
        self.store.update(&lease).await?;
        self.checked_out
            .insert(lease.lease_id, Checkout { since: now });
        Ok(lease)
    }

    /// Return a lease to the available pool without retiring it
    pub async fn release(&self, lease_id: Uuid) {
        let _guard = self.state_lock.lock().await;
        if let Some((_, checkout)) = self.checked_out.remove(&lease_id) {
            let held_ms = (Utc::now() - checkout.since).num_milliseconds();
            debug!(lease_id = %lease_id, held_ms = held_ms, "Lease released");
        } else {
            debug!(lease_id = %lease_id, "Release of lease that was not checked out");
        }
    }

    /// Record a successful operation; resets the consecutive failure count
    pub async fn report_success(&self, lease_id: Uuid) -> Result<ResourceLease> {
        let _guard = self.state_lock.lock().await;
        let mut lease = self.load(lease_id).await?;

        lease.success_count += 1;
        lease.fail_count = 0;
        lease.updated_at = Utc::now();
        self.store.update(&lease).await?;

        debug!(
            lease_id = %lease_id,
            success_count = lease.success_count,
            "✅ POOL: Lease success recorded"
        );
        Ok(lease)
    }

    /// Record a failed operation; exhausts the lease at the failure threshold
    pub async fn report_failure(&self, lease_id: Uuid, error: &ErrorRecord) -> Result<ResourceLease> {
        let _guard = self.state_lock.lock().await;
        let mut lease = self.load(lease_id).await?;

        lease.fail_count += 1;
        lease.updated_at = Utc::now();

        let exhausted_now =
            lease.status == LeaseStatus::Active && lease.fail_count >= self.fail_threshold;
        if exhausted_now {
            lease.status = LeaseStatus::Exhausted;
        }
        self.store.update(&lease).await?;

        if exhausted_now {
            let entry = LeaseAuditEntry::new(&lease, events::LEASE_EXHAUSTED, Some(error.summary()));
            self.store.append_audit(&entry).await?;
            warn!(
                lease_id = %lease_id,
                platform = %lease.platform,
                kind = %lease.kind,
                fail_count = lease.fail_count,
                last_error = %error.kind,
                "🚫 POOL: Lease exhausted"
            );
            log_lease_operation(
                events::LEASE_EXHAUSTED,
                lease_id,
                &lease.platform,
                &lease.kind.to_string(),
                &lease.status.to_string(),
                Some(&error.summary()),
            );
        } else {
            debug!(
                lease_id = %lease_id,
                fail_count = lease.fail_count,
                error_kind = %error.kind,
                "Lease failure recorded"
            );
        }

        Ok(lease)
    }

    /// Administrative override: exclude from allocation
    pub async fn disable(&self, lease_id: Uuid, reason: Option<&str>) -> Result<ResourceLease> {
        self.set_status(lease_id, LeaseStatus::Disabled, events::LEASE_DISABLED, reason)
            .await
    }

    /// Administrative override: return to service with a clean failure count
    pub async fn enable(&self, lease_id: Uuid) -> Result<ResourceLease> {
        self.set_status(lease_id, LeaseStatus::Active, events::LEASE_ENABLED, None)
            .await
    }

    async fn set_status(
        &self,
        lease_id: Uuid,
        status: LeaseStatus,
        action: &str,
        reason: Option<&str>,
    ) -> Result<ResourceLease> {
        let _guard = self.state_lock.lock().await;
        let mut lease = self.load(lease_id).await?;

        lease.status = status;
        if status == LeaseStatus::Active {
            lease.fail_count = 0;
        }
        lease.updated_at = Utc::now();
        self.store.update(&lease).await?;
        self.store
            .append_audit(&LeaseAuditEntry::new(&lease, action, reason.map(String::from)))
            .await?;

        log_lease_operation(
            action,
            lease_id,
            &lease.platform,
            &lease.kind.to_string(),
            &status.to_string(),
            reason,
        );
        Ok(lease)
    }

    /// Mark every active lease past its expiry as expired
    pub async fn expire_stale(&self) -> std::result::Result<usize, StoreError> {
        let _guard = self.state_lock.lock().await;
        let now = Utc::now();
        let mut expired = 0;

        for mut lease in self.store.list_all().await? {
            if lease.status != LeaseStatus::Active || !lease.is_expired_at(now) {
                continue;
            }
            lease.status = LeaseStatus::Expired;
            lease.updated_at = now;
            self.store.update(&lease).await?;
            self.store
                .append_audit(&LeaseAuditEntry::new(&lease, events::LEASE_EXPIRED, None))
                .await?;
            expired += 1;
        }

        if expired > 0 {
            info!(expired = expired, "🧹 POOL: Expired stale leases");
        }
        Ok(expired)
    }

    /// Lease counts grouped by (platform, kind)
    pub async fn stats(&self) -> std::result::Result<Vec<PoolStats>, StoreError> {
        let mut grouped: BTreeMap<(String, String), PoolStats> = BTreeMap::new();

        for lease in self.store.list_all().await? {
            let key = (lease.platform.clone(), lease.kind.to_string());
            let entry = grouped.entry(key).or_insert_with(|| PoolStats {
                platform: lease.platform.clone(),
                kind: lease.kind.to_string(),
                ..PoolStats::default()
            });
            match lease.status {
                LeaseStatus::Active => entry.active += 1,
                LeaseStatus::Exhausted => entry.exhausted += 1,
                LeaseStatus::Expired => entry.expired += 1,
                LeaseStatus::Disabled => entry.disabled += 1,
            }
            if self.checked_out.contains_key(&lease.lease_id) {
                entry.checked_out += 1;
            }
        }

        Ok(grouped.into_values().collect())
    }

    pub async fn audit_log(&self, lease_id: Uuid) -> std::result::Result<Vec<LeaseAuditEntry>, StoreError> {
        self.store.audit_log(lease_id).await
    }

    async fn load(&self, lease_id: Uuid) -> Result<ResourceLease> {
        self.store
            .get(lease_id)
            .await?
            .ok_or(CrawlError::LeaseNotFound(lease_id))
    }

    /// Periodically expire stale leases until `shutdown` is cancelled
    pub fn spawn_expiry_sweeper(
        self: &Arc<Self>,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let pool = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = pool.expire_stale().await {
                            error!(error = %e, "❌ POOL: Lease expiry sweep failed");
                        }
                    }
                }
            }
            debug!("Lease expiry sweeper stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ErrorKind;
    use crate::resources::store::InMemoryLeaseStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn create_test_pool() -> ResourcePoolManager {
        ResourcePoolManager::with_store(Arc::new(InMemoryLeaseStore::new()))
    }

    fn network_error(lease: &ResourceLease) -> ErrorRecord {
        ErrorRecord::new(
            ErrorKind::NetworkError,
            "connection reset",
            &lease.platform,
            Some(lease.lease_id),
            0,
        )
    }

    struct CountingProvisioner {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ResourceProvisioner for CountingProvisioner {
        async fn provision(&self, platform: &str, kind: ResourceKind) -> Result<Option<ResourceLease>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Some(ResourceLease::new(kind, platform, "http://1.1.1.1:80", None)))
        }

        fn provisioner_name(&self) -> &'static str {
            "counting"
        }
    }

    #[tokio::test]
    async fn test_acquire_marks_checkout_and_usage() {
        let pool = create_test_pool();
        let lease = pool.register(ResourceLease::account("xhs", "a1")).await.unwrap();

        let acquired = pool
            .acquire("xhs", ResourceKind::Account)
            .await
            .unwrap()
            .into_lease()
            .unwrap();
        assert_eq!(acquired.lease_id, lease.lease_id);
        assert_eq!(acquired.usage_count, 1);
        assert!(acquired.last_used_at.is_some());
        assert!(pool.is_checked_out(lease.lease_id));

        // Checked-out lease is not handed out twice
        let second = pool.acquire("xhs", ResourceKind::Account).await.unwrap();
        assert_eq!(second, Acquisition::NotAvailable);

        pool.release(lease.lease_id).await;
        assert!(!pool.is_checked_out(lease.lease_id));
        assert!(pool
            .acquire("xhs", ResourceKind::Account)
            .await
            .unwrap()
            .is_available());
    }

    #[tokio::test]
    async fn test_success_resets_fail_count() {
        let pool = create_test_pool();
        let lease = pool.register(ResourceLease::account("xhs", "a1")).await.unwrap();

        pool.report_failure(lease.lease_id, &network_error(&lease)).await.unwrap();
        let failed = pool
            .report_failure(lease.lease_id, &network_error(&lease))
            .await
            .unwrap();
        assert_eq!(failed.fail_count, 2);

        let recovered = pool.report_success(lease.lease_id).await.unwrap();
        assert_eq!(recovered.fail_count, 0);
        assert_eq!(recovered.success_count, 1);
        assert_eq!(recovered.status, LeaseStatus::Active);
    }

    #[tokio::test]
    async fn test_threshold_exhausts_and_audits() {
        let pool = create_test_pool();
        let lease = pool.register(ResourceLease::account("dy", "a1")).await.unwrap();

        for _ in 0..3 {
            pool.report_failure(lease.lease_id, &network_error(&lease))
                .await
                .unwrap();
        }

        let stored = pool.get(lease.lease_id).await.unwrap().unwrap();
        assert_eq!(stored.status, LeaseStatus::Exhausted);

        let audit = pool.audit_log(lease.lease_id).await.unwrap();
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].action, events::LEASE_EXHAUSTED);
        assert_eq!(audit[0].fail_count, 3);

        assert_eq!(
            pool.acquire("dy", ResourceKind::Account).await.unwrap(),
            Acquisition::NotAvailable
        );

        pool.enable(lease.lease_id).await.unwrap();
        let reacquired = pool
            .acquire("dy", ResourceKind::Account)
            .await
            .unwrap()
            .into_lease()
            .unwrap();
        assert_eq!(reacquired.fail_count, 0);
    }

    #[tokio::test]
    async fn test_disable_excludes_from_allocation() {
        let pool = create_test_pool();
        let lease = pool.register(ResourceLease::account("ks", "a1")).await.unwrap();
        pool.disable(lease.lease_id, Some("operator request")).await.unwrap();

        assert_eq!(
            pool.acquire("ks", ResourceKind::Account).await.unwrap(),
            Acquisition::NotAvailable
        );
        let audit = pool.audit_log(lease.lease_id).await.unwrap();
        assert_eq!(audit[0].reason.as_deref(), Some("operator request"));
    }

    #[tokio::test]
    async fn test_excluded_leases_are_never_returned() {
        let pool = create_test_pool();
        let a = pool.register(ResourceLease::account("xhs", "a")).await.unwrap();
        let b = pool.register(ResourceLease::account("xhs", "b")).await.unwrap();

        let exclude = HashSet::from([a.lease_id]);
        let picked = pool
            .acquire_with("xhs", ResourceKind::Account, AccountStrategy::Lru, &exclude)
            .await
            .unwrap()
            .into_lease()
            .unwrap();
        assert_eq!(picked.lease_id, b.lease_id);

        pool.release(b.lease_id).await;
        let exclude = HashSet::from([a.lease_id, b.lease_id]);
        assert_eq!(
            pool.acquire_with("xhs", ResourceKind::Account, AccountStrategy::Lru, &exclude)
                .await
                .unwrap(),
            Acquisition::NotAvailable
        );
    }

    #[tokio::test]
    async fn test_provisioning_only_when_pool_is_empty() {
        let provisioner = Arc::new(CountingProvisioner {
            calls: AtomicUsize::new(0),
        });
        let store = Arc::new(InMemoryLeaseStore::new());
        let pool = ResourcePoolManager::new(
            store.clone(),
            provisioner.clone(),
            &ResourcePoolConfig::default(),
        );

        let provisioned = pool
            .acquire("bili", ResourceKind::Proxy)
            .await
            .unwrap()
            .into_lease()
            .unwrap();
        assert_eq!(provisioner.calls.load(Ordering::SeqCst), 1);
        // Persisted before being returned
        assert!(store.get(provisioned.lease_id).await.unwrap().is_some());
        assert!(pool.is_checked_out(provisioned.lease_id));

        pool.release(provisioned.lease_id).await;
        pool.acquire("bili", ResourceKind::Proxy).await.unwrap();
        assert_eq!(provisioner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_expire_stale() {
        let pool = create_test_pool();
        let stale = pool
            .register(ResourceLease::proxy("xhs", "http://p1", chrono::Duration::seconds(-5)))
            .await
            .unwrap();
        pool.register(ResourceLease::proxy("xhs", "http://p2", chrono::Duration::hours(1)))
            .await
            .unwrap();

        assert_eq!(pool.expire_stale().await.unwrap(), 1);
        let stored = pool.get(stale.lease_id).await.unwrap().unwrap();
        assert_eq!(stored.status, LeaseStatus::Expired);
        assert_eq!(pool.expire_stale().await.unwrap(), 0);

        let stats = pool.stats().await.unwrap();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].active, 1);
        assert_eq!(stats[0].expired, 1);
    }

    #[tokio::test]
    async fn test_unknown_lease_feedback() {
        let pool = create_test_pool();
        let result = pool.report_success(Uuid::new_v4()).await;
        assert!(matches!(result, Err(CrawlError::LeaseNotFound(_))));
    }

    #[tokio::test]
    async fn test_concurrent_acquire_never_double_books() {
        let pool = Arc::new(create_test_pool());
        for i in 0..4 {
            pool.register(ResourceLease::account("xhs", format!("a{i}")))
                .await
                .unwrap();
        }

        let mut handles = Vec::new();
        for _ in 0..8 {
            let pool = Arc::clone(&pool);
            handles.push(tokio::spawn(async move {
                pool.acquire("xhs", ResourceKind::Account).await.unwrap().into_lease()
            }));
        }

        let mut ids = HashSet::new();
        let mut granted = 0;
        for handle in handles {
            if let Some(lease) = handle.await.unwrap() {
                granted += 1;
                assert!(ids.insert(lease.lease_id), "lease handed out twice");
            }
        }
        assert_eq!(granted, 4);
    }
}
