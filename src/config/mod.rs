//! # Crawler Configuration System
//!
//! YAML-based configuration for the orchestration core with environment
//! overrides and validation.
//!
//! ## Architecture
//!
//! - **Single file**: `config/crawler-config.yaml` holds every section
//! - **Environment awareness**: `development` / `test` / `production` sections
//!   are deep-merged over the base document
//! - **Variable overrides**: `CRAWLER__SECTION__KEY` environment variables win
//!   over both
//! - **Explicit validation**: inconsistent values fail loading
//!
//! ## Usage
//!
//! ```rust,no_run
//! use mediacrawl_core::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let retry = &manager.config().retry;
//! println!("max retries: {}", retry.max_retries);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::constants::{defaults, platforms, DEFAULT_FAIL_THRESHOLD};
use crate::models::AccountStrategy;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Root configuration structure mirroring crawler-config.yaml
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// Environment name, filled in by the loader
    pub environment: String,
    pub database: DatabaseConfig,
    pub cache: CacheConfig,
    pub retry: RetryPolicy,
    pub resource_pool: ResourcePoolConfig,
    pub coordinator: CoordinatorConfig,
    pub retention: RetentionConfig,
    pub web: WebConfig,
}

/// Relational store settings. Without a `url` the in-memory stores are used.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub max_connections: u32,
    pub connect_timeout_seconds: u64,
    pub run_migrations: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 10,
            connect_timeout_seconds: 5,
            run_migrations: true,
        }
    }
}

impl DatabaseConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub status_ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            status_ttl_seconds: defaults::STATUS_CACHE_TTL_SECONDS,
        }
    }
}

impl CacheConfig {
    pub fn status_ttl(&self) -> Duration {
        Duration::from_secs(self.status_ttl_seconds)
    }
}

/// Retry policy applied to every branch
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Same-lease retries allowed per error kind
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub exponential_base: f64,
    pub jitter: bool,
    pub resource_switch_enabled: bool,
    /// Lease substitutions allowed per branch
    pub max_resource_switches: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: defaults::MAX_RETRIES,
            base_delay_ms: defaults::BASE_DELAY_MS,
            max_delay_ms: defaults::MAX_DELAY_MS,
            exponential_base: defaults::EXPONENTIAL_BASE,
            jitter: true,
            resource_switch_enabled: true,
            max_resource_switches: defaults::MAX_RESOURCE_SWITCHES,
        }
    }
}

impl RetryPolicy {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    /// Upper bound on adapter invocations for one branch
    pub fn max_attempts(&self) -> u32 {
        let switches = if self.resource_switch_enabled {
            self.max_resource_switches
        } else {
            0
        };
        self.max_retries + switches + 1
    }

    /// Switching only counts when it is enabled and budget remains
    pub fn can_switch(&self, switches_used: u32) -> bool {
        self.resource_switch_enabled && switches_used < self.max_resource_switches
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ResourcePoolConfig {
    pub fail_threshold: u32,
    /// Lifetime given to leases created without an explicit expiry
    pub lease_ttl_seconds: i64,
    pub expiry_sweep_interval_seconds: u64,
    pub provisioning: ProvisioningConfig,
}

impl Default for ResourcePoolConfig {
    fn default() -> Self {
        Self {
            fail_threshold: DEFAULT_FAIL_THRESHOLD,
            lease_ttl_seconds: defaults::LEASE_TTL_SECONDS,
            expiry_sweep_interval_seconds: defaults::LEASE_EXPIRY_SWEEP_SECONDS,
            provisioning: ProvisioningConfig::default(),
        }
    }
}

impl ResourcePoolConfig {
    pub fn expiry_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.expiry_sweep_interval_seconds)
    }

    pub fn lease_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.lease_ttl_seconds)
    }
}

/// Upstream proxy provisioning endpoint
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ProvisioningConfig {
    pub endpoint: Option<String>,
    pub api_token: Option<String>,
    pub region: Option<String>,
    pub carrier: Option<String>,
    pub timeout_seconds: u64,
}

impl ProvisioningConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds.max(1))
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    pub supported_platforms: Vec<String>,
    pub max_parallel_branches: usize,
    pub inter_branch_delay_ms: u64,
    pub watchdog_timeout_seconds: u64,
    pub default_account_strategy: AccountStrategy,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            supported_platforms: platforms::DEFAULT_SUPPORTED
                .iter()
                .map(|p| p.to_string())
                .collect(),
            max_parallel_branches: defaults::MAX_PARALLEL_BRANCHES,
            inter_branch_delay_ms: defaults::INTER_BRANCH_DELAY_MS,
            watchdog_timeout_seconds: defaults::WATCHDOG_TIMEOUT_SECONDS,
            default_account_strategy: AccountStrategy::Smart,
        }
    }
}

impl CoordinatorConfig {
    pub fn inter_branch_delay(&self) -> Duration {
        Duration::from_millis(self.inter_branch_delay_ms)
    }

    pub fn watchdog_timeout(&self) -> Duration {
        Duration::from_secs(self.watchdog_timeout_seconds)
    }

    pub fn supports(&self, platform: &str) -> bool {
        self.supported_platforms.iter().any(|p| p == platform)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetentionConfig {
    pub enabled: bool,
    pub max_age_hours: u64,
    pub sweep_interval_seconds: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_age_hours: defaults::RETENTION_MAX_AGE_HOURS,
            sweep_interval_seconds: defaults::RETENTION_SWEEP_INTERVAL_SECONDS,
        }
    }
}

impl RetentionConfig {
    pub fn max_age(&self) -> chrono::Duration {
        chrono::Duration::hours(self.max_age_hours as i64)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WebConfig {
    pub bind_address: String,
    /// Crawler sidecar that executes platform operations over HTTP
    pub adapter_base_url: Option<String>,
    pub adapter_timeout_seconds: u64,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8100".to_string(),
            adapter_base_url: None,
            adapter_timeout_seconds: 600,
        }
    }
}

impl WebConfig {
    pub fn adapter_timeout(&self) -> Duration {
        Duration::from_secs(self.adapter_timeout_seconds)
    }
}

impl CrawlerConfig {
    /// Configuration tuned for tests: no backoff, no inter-branch delay, no jitter
    pub fn for_test() -> Self {
        Self {
            environment: "test".to_string(),
            retry: RetryPolicy {
                base_delay_ms: 0,
                max_delay_ms: 0,
                jitter: false,
                ..RetryPolicy::default()
            },
            coordinator: CoordinatorConfig {
                inter_branch_delay_ms: 0,
                watchdog_timeout_seconds: 60,
                ..CoordinatorConfig::default()
            },
            cache: CacheConfig {
                enabled: false,
                ..CacheConfig::default()
            },
            ..Self::default()
        }
    }

    /// Validate configuration for consistency and required fields
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.coordinator.supported_platforms.is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "coordinator.supported_platforms",
                "at least one platform must be supported",
            ));
        }

        if self.coordinator.max_parallel_branches == 0 {
            return Err(ConfigurationError::invalid_value(
                "coordinator.max_parallel_branches",
                "0",
                "must be greater than 0",
            ));
        }

        if self.coordinator.watchdog_timeout_seconds == 0 {
            return Err(ConfigurationError::invalid_value(
                "coordinator.watchdog_timeout_seconds",
                "0",
                "must be greater than 0",
            ));
        }

        if self.resource_pool.fail_threshold == 0 {
            return Err(ConfigurationError::invalid_value(
                "resource_pool.fail_threshold",
                "0",
                "must be greater than 0",
            ));
        }

        if self.retry.exponential_base < 1.0 {
            return Err(ConfigurationError::invalid_value(
                "retry.exponential_base",
                self.retry.exponential_base.to_string(),
                "must be at least 1.0",
            ));
        }

        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(ConfigurationError::invalid_value(
                "retry.base_delay_ms",
                self.retry.base_delay_ms.to_string(),
                "must not exceed retry.max_delay_ms",
            ));
        }

        if self.database.max_connections == 0 {
            return Err(ConfigurationError::invalid_value(
                "database.max_connections",
                "0",
                "must be greater than 0",
            ));
        }

        Ok(())
    }

    pub fn is_test_environment(&self) -> bool {
        self.environment == "test"
    }

    pub fn is_production_environment(&self) -> bool {
        self.environment == "production"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(CrawlerConfig::default().validate().is_ok());
        assert!(CrawlerConfig::for_test().validate().is_ok());
    }

    #[test]
    fn test_retry_policy_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.base_delay(), Duration::from_secs(2));
        assert_eq!(policy.max_delay(), Duration::from_secs(30));
        assert!(policy.jitter);
        assert_eq!(policy.max_attempts(), 7);
    }

    #[test]
    fn test_switching_disabled_shrinks_attempt_bound() {
        let policy = RetryPolicy {
            resource_switch_enabled: false,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.max_attempts(), 4);
        assert!(!policy.can_switch(0));
    }

    #[test]
    fn test_validation_rejects_inverted_delays() {
        let mut config = CrawlerConfig::default();
        config.retry.base_delay_ms = 60_000;
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_validation_rejects_empty_platforms() {
        let mut config = CrawlerConfig::default();
        config.coordinator.supported_platforms.clear();
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::MissingRequiredField { .. })
        ));
    }

    #[test]
    fn test_duration_helpers() {
        let config = CrawlerConfig::default();
        assert_eq!(config.coordinator.watchdog_timeout(), Duration::from_secs(2700));
        assert_eq!(config.retention.sweep_interval(), Duration::from_secs(3600));
        assert_eq!(config.retention.max_age(), chrono::Duration::hours(24));
        assert_eq!(config.cache.status_ttl(), Duration::from_secs(30));
    }
}
