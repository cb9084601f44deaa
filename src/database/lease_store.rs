//! Postgres-backed `LeaseStore`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{LeaseAuditEntry, ResourceKind, ResourceLease};
use crate::resources::LeaseStore;

const LEASE_COLUMNS: &str = "lease_id, kind, platform, identity_ref, metadata, expires_at, \
     usage_count, success_count, fail_count, status, priority, last_used_at, created_at, updated_at";

#[derive(Debug, FromRow)]
struct LeaseRow {
    lease_id: Uuid,
    kind: String,
    platform: String,
    identity_ref: String,
    metadata: serde_json::Value,
    expires_at: Option<DateTime<Utc>>,
    usage_count: i32,
    success_count: i32,
    fail_count: i32,
    status: String,
    priority: i32,
    last_used_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

fn counter(value: i32, column: &str) -> Result<u32, StoreError> {
    u32::try_from(value)
        .map_err(|_| StoreError::corrupt("resource_leases", format!("negative {column}: {value}")))
}

impl TryFrom<LeaseRow> for ResourceLease {
    type Error = StoreError;

    fn try_from(row: LeaseRow) -> Result<Self, Self::Error> {
        Ok(Self {
            lease_id: row.lease_id,
            kind: row
                .kind
                .parse()
                .map_err(|e: String| StoreError::corrupt("resource_leases", e))?,
            platform: row.platform,
            identity_ref: row.identity_ref,
            metadata: row.metadata,
            expires_at: row.expires_at,
            usage_count: counter(row.usage_count, "usage_count")?,
            success_count: counter(row.success_count, "success_count")?,
            fail_count: counter(row.fail_count, "fail_count")?,
            status: row
                .status
                .parse()
                .map_err(|e: String| StoreError::corrupt("resource_leases", e))?,
            priority: row.priority,
            last_used_at: row.last_used_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct AuditRow {
    audit_id: Uuid,
    lease_id: Uuid,
    action: String,
    reason: Option<String>,
    fail_count: i32,
    created_at: DateTime<Utc>,
}

impl From<AuditRow> for LeaseAuditEntry {
    fn from(row: AuditRow) -> Self {
        Self {
            audit_id: row.audit_id,
            lease_id: row.lease_id,
            action: row.action,
            reason: row.reason,
            fail_count: row.fail_count.max(0) as u32,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PgLeaseStore {
    pool: PgPool,
}

impl PgLeaseStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn collect(rows: Vec<LeaseRow>) -> Result<Vec<ResourceLease>, StoreError> {
        rows.into_iter().map(ResourceLease::try_from).collect()
    }
}

#[async_trait]
impl LeaseStore for PgLeaseStore {
    async fn insert(&self, lease: &ResourceLease) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO resource_leases (
                lease_id, kind, platform, identity_ref, metadata, expires_at,
                usage_count, success_count, fail_count, status, priority,
                last_used_at, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(lease.lease_id)
        .bind(lease.kind.to_string())
        .bind(&lease.platform)
        .bind(&lease.identity_ref)
        .bind(&lease.metadata)
        .bind(lease.expires_at)
        .bind(lease.usage_count as i32)
        .bind(lease.success_count as i32)
        .bind(lease.fail_count as i32)
        .bind(lease.status.to_string())
        .bind(lease.priority)
        .bind(lease.last_used_at)
        .bind(lease.created_at)
        .bind(lease.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update(&self, lease: &ResourceLease) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE resource_leases
            SET metadata = $2,
                expires_at = $3,
                usage_count = $4,
                success_count = $5,
                fail_count = $6,
                status = $7,
                priority = $8,
                last_used_at = $9,
                updated_at = $10
            WHERE lease_id = $1
            "#,
        )
        .bind(lease.lease_id)
        .bind(&lease.metadata)
        .bind(lease.expires_at)
        .bind(lease.usage_count as i32)
        .bind(lease.success_count as i32)
        .bind(lease.fail_count as i32)
        .bind(lease.status.to_string())
        .bind(lease.priority)
        .bind(lease.last_used_at)
        .bind(lease.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("lease", lease.lease_id));
        }
        Ok(())
    }

    async fn get(&self, lease_id: Uuid) -> Result<Option<ResourceLease>, StoreError> {
        let query = format!("SELECT {LEASE_COLUMNS} FROM resource_leases WHERE lease_id = $1");
        sqlx::query_as::<_, LeaseRow>(&query)
            .bind(lease_id)
            .fetch_optional(&self.pool)
            .await?
            .map(ResourceLease::try_from)
            .transpose()
    }

    async fn list_for(
        &self,
        platform: &str,
        kind: ResourceKind,
    ) -> Result<Vec<ResourceLease>, StoreError> {
        let query = format!(
            "SELECT {LEASE_COLUMNS} FROM resource_leases WHERE platform = $1 AND kind = $2 ORDER BY created_at"
        );
        let rows = sqlx::query_as::<_, LeaseRow>(&query)
            .bind(platform)
            .bind(kind.to_string())
            .fetch_all(&self.pool)
            .await?;
        Self::collect(rows)
    }

    async fn list_all(&self) -> Result<Vec<ResourceLease>, StoreError> {
        let query = format!("SELECT {LEASE_COLUMNS} FROM resource_leases ORDER BY platform, kind, created_at");
        let rows = sqlx::query_as::<_, LeaseRow>(&query)
            .fetch_all(&self.pool)
            .await?;
        Self::collect(rows)
    }

    async fn append_audit(&self, entry: &LeaseAuditEntry) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO lease_audit_log (audit_id, lease_id, action, reason, fail_count, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(entry.audit_id)
        .bind(entry.lease_id)
        .bind(&entry.action)
        .bind(&entry.reason)
        .bind(entry.fail_count as i32)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn audit_log(&self, lease_id: Uuid) -> Result<Vec<LeaseAuditEntry>, StoreError> {
        let rows = sqlx::query_as::<_, AuditRow>(
            r#"
            SELECT audit_id, lease_id, action, reason, fail_count, created_at
            FROM lease_audit_log
            WHERE lease_id = $1
            ORDER BY created_at
            "#,
        )
        .bind(lease_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(LeaseAuditEntry::from).collect())
    }
}
