//! # Lease Store
//!
//! Narrow persistence contract for resource leases and their audit log. The
//! pool manager writes through this trait before any mutating call returns.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{LeaseAuditEntry, ResourceKind, ResourceLease};

#[async_trait]
pub trait LeaseStore: Send + Sync {
    async fn insert(&self, lease: &ResourceLease) -> Result<(), StoreError>;

    /// Overwrite the stored lease with the given record
    async fn update(&self, lease: &ResourceLease) -> Result<(), StoreError>;

    async fn get(&self, lease_id: Uuid) -> Result<Option<ResourceLease>, StoreError>;

    /// Every lease for (platform, kind) regardless of status
    async fn list_for(
        &self,
        platform: &str,
        kind: ResourceKind,
    ) -> Result<Vec<ResourceLease>, StoreError>;

    async fn list_all(&self) -> Result<Vec<ResourceLease>, StoreError>;

    async fn append_audit(&self, entry: &LeaseAuditEntry) -> Result<(), StoreError>;

    async fn audit_log(&self, lease_id: Uuid) -> Result<Vec<LeaseAuditEntry>, StoreError>;
}

/// Process-local lease store
#[derive(Debug, Default)]
pub struct InMemoryLeaseStore {
    leases: DashMap<Uuid, ResourceLease>,
    audit: RwLock<Vec<LeaseAuditEntry>>,
}

impl InMemoryLeaseStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LeaseStore for InMemoryLeaseStore {
    async fn insert(&self, lease: &ResourceLease) -> Result<(), StoreError> {
        self.leases.insert(lease.lease_id, lease.clone());
        Ok(())
    }

    async fn update(&self, lease: &ResourceLease) -> Result<(), StoreError> {
        match self.leases.get_mut(&lease.lease_id) {
            Some(mut existing) => {
                *existing = lease.clone();
                Ok(())
            }
            None => Err(StoreError::not_found("lease", lease.lease_id)),
        }
    }

    async fn get(&self, lease_id: Uuid) -> Result<Option<ResourceLease>, StoreError> {
        Ok(self.leases.get(&lease_id).map(|entry| entry.clone()))
    }

    async fn list_for(
        &self,
        platform: &str,
        kind: ResourceKind,
    ) -> Result<Vec<ResourceLease>, StoreError> {
        Ok(self
            .leases
            .iter()
            .filter(|entry| entry.matches(platform, kind))
            .map(|entry| entry.clone())
            .collect())
    }

    async fn list_all(&self) -> Result<Vec<ResourceLease>, StoreError> {
        Ok(self.leases.iter().map(|entry| entry.clone()).collect())
    }

    async fn append_audit(&self, entry: &LeaseAuditEntry) -> Result<(), StoreError> {
        self.audit.write().push(entry.clone());
        Ok(())
    }

    async fn audit_log(&self, lease_id: Uuid) -> Result<Vec<LeaseAuditEntry>, StoreError> {
        Ok(self
            .audit
            .read()
            .iter()
            .filter(|entry| entry.lease_id == lease_id)
            .cloned()
            .collect())
    }
}
