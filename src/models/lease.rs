//! # Resource Leases
//!
//! A lease is a time-bounded claim on one account or one proxy for one
//! platform. The resource pool manager is the only component that mutates
//! lease counters and status; everything else treats leases as opaque handles.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Account,
    Proxy,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Account => write!(f, "account"),
            Self::Proxy => write!(f, "proxy"),
        }
    }
}

impl std::str::FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "account" => Ok(Self::Account),
            "proxy" => Ok(Self::Proxy),
            _ => Err(format!("Invalid resource kind: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaseStatus {
    Active,
    /// Failure threshold reached; excluded until re-enabled
    Exhausted,
    Expired,
    Disabled,
}

impl fmt::Display for LeaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Exhausted => write!(f, "exhausted"),
            Self::Expired => write!(f, "expired"),
            Self::Disabled => write!(f, "disabled"),
        }
    }
}

impl std::str::FromStr for LeaseStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "exhausted" => Ok(Self::Exhausted),
            "expired" => Ok(Self::Expired),
            "disabled" => Ok(Self::Disabled),
            _ => Err(format!("Invalid lease status: {s}")),
        }
    }
}

/// How a branch picks among eligible account leases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStrategy {
    /// Least recently used first
    #[default]
    Lru,
    Random,
    RoundRobin,
    /// Highest `priority` first, least recently used on ties
    Priority,
    /// Fewest failures first, newest lease on ties
    Smart,
    /// Always the first stable candidate, no switching
    Single,
}

impl AccountStrategy {
    pub const SELECTABLE: [AccountStrategy; 5] = [
        Self::Random,
        Self::RoundRobin,
        Self::Priority,
        Self::Smart,
        Self::Single,
    ];

    pub fn allows_switching(&self) -> bool {
        !matches!(self, Self::Single)
    }
}

impl fmt::Display for AccountStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lru => write!(f, "lru"),
            Self::Random => write!(f, "random"),
            Self::RoundRobin => write!(f, "round_robin"),
            Self::Priority => write!(f, "priority"),
            Self::Smart => write!(f, "smart"),
            Self::Single => write!(f, "single"),
        }
    }
}

impl std::str::FromStr for AccountStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lru" => Ok(Self::Lru),
            "random" => Ok(Self::Random),
            "round_robin" => Ok(Self::RoundRobin),
            "priority" => Ok(Self::Priority),
            "smart" => Ok(Self::Smart),
            "single" => Ok(Self::Single),
            _ => Err(format!("Invalid account strategy: {s}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceLease {
    pub lease_id: Uuid,
    pub kind: ResourceKind,
    pub platform: String,
    /// Opaque credential/session handle (account id or proxy endpoint)
    pub identity_ref: String,
    /// Adapter-facing extras such as proxy credentials
    pub metadata: serde_json::Value,
    pub expires_at: Option<DateTime<Utc>>,
    pub usage_count: u32,
    pub success_count: u32,
    pub fail_count: u32,
    pub status: LeaseStatus,
    pub priority: i32,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ResourceLease {
    pub fn new(
        kind: ResourceKind,
        platform: impl Into<String>,
        identity_ref: impl Into<String>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Self {
        let now = Utc::now();
        Self {
            lease_id: Uuid::new_v4(),
            kind,
            platform: platform.into(),
            identity_ref: identity_ref.into(),
            metadata: serde_json::Value::Null,
            expires_at,
            usage_count: 0,
            success_count: 0,
            fail_count: 0,
            status: LeaseStatus::Active,
            priority: 0,
            last_used_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn account(platform: impl Into<String>, identity_ref: impl Into<String>) -> Self {
        Self::new(ResourceKind::Account, platform, identity_ref, None)
    }

    pub fn proxy(
        platform: impl Into<String>,
        endpoint: impl Into<String>,
        ttl: Duration,
    ) -> Self {
        Self::new(
            ResourceKind::Proxy,
            platform,
            endpoint,
            Some(Utc::now() + ttl),
        )
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expiry| expiry <= now)
    }

    /// Active and not past expiry
    pub fn is_allocatable_at(&self, now: DateTime<Utc>) -> bool {
        self.status == LeaseStatus::Active && !self.is_expired_at(now)
    }

    pub fn matches(&self, platform: &str, kind: ResourceKind) -> bool {
        self.kind == kind && self.platform == platform
    }
}

/// Audit row appended on exhaustion, expiry and administrative overrides
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaseAuditEntry {
    pub audit_id: Uuid,
    pub lease_id: Uuid,
    pub action: String,
    pub reason: Option<String>,
    pub fail_count: u32,
    pub created_at: DateTime<Utc>,
}

impl LeaseAuditEntry {
    pub fn new(lease: &ResourceLease, action: &str, reason: Option<String>) -> Self {
        Self {
            audit_id: Uuid::new_v4(),
            lease_id: lease.lease_id,
            action: action.to_string(),
            reason,
            fail_count: lease.fail_count,
            created_at: Utc::now(),
        }
    }
}
