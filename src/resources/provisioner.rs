//! # Upstream Resource Provisioning
//!
//! When the pool has nothing allocatable for (platform, kind) it asks a
//! provisioner for a fresh resource. Any provisioning failure is reported to
//! the caller as `NotAvailable`, never as a crash.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::ProvisioningConfig;
use crate::error::{CrawlError, Result};
use crate::models::{ResourceKind, ResourceLease};

#[async_trait]
pub trait ResourceProvisioner: Send + Sync {
    /// `Ok(None)` means the upstream has nothing to give for this request
    async fn provision(&self, platform: &str, kind: ResourceKind) -> Result<Option<ResourceLease>>;

    fn provisioner_name(&self) -> &'static str;
}

/// Provisioner for deployments with a fixed, pre-seeded pool
#[derive(Debug, Default, Clone, Copy)]
pub struct NullProvisioner;

#[async_trait]
impl ResourceProvisioner for NullProvisioner {
    async fn provision(&self, _platform: &str, _kind: ResourceKind) -> Result<Option<ResourceLease>> {
        Ok(None)
    }

    fn provisioner_name(&self) -> &'static str {
        "null"
    }
}

#[derive(Debug, Serialize)]
struct ProvisionRequest<'a> {
    platform: &'a str,
    region: Option<&'a str>,
    carrier: Option<&'a str>,
}

/// Proxy allocation as returned by the upstream provider
#[derive(Debug, Deserialize)]
struct ProvisionedProxy {
    ip: String,
    port: u16,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    password: Option<String>,
    /// Unix seconds
    #[serde(default)]
    expire_ts: Option<i64>,
    #[serde(default)]
    area: Option<String>,
}

/// Allocates egress proxies from an HTTP provider given a region/carrier hint
pub struct HttpProxyProvisioner {
    client: reqwest::Client,
    endpoint: String,
    api_token: Option<String>,
    region: Option<String>,
    carrier: Option<String>,
    default_ttl: chrono::Duration,
}

impl HttpProxyProvisioner {
    pub fn new(config: &ProvisioningConfig, default_ttl: chrono::Duration) -> Result<Self> {
        let endpoint = config.endpoint.clone().ok_or_else(|| {
            CrawlError::validation("resource_pool.provisioning.endpoint is not set")
        })?;

        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| CrawlError::Provisioning(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint,
            api_token: config.api_token.clone(),
            region: config.region.clone(),
            carrier: config.carrier.clone(),
            default_ttl,
        })
    }

    fn to_lease(&self, platform: &str, proxy: ProvisionedProxy) -> ResourceLease {
        let expires_at: DateTime<Utc> = proxy
            .expire_ts
            .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
            .unwrap_or_else(|| Utc::now() + self.default_ttl);

        let endpoint = format!("http://{}:{}", proxy.ip, proxy.port);
        let mut lease = ResourceLease::new(ResourceKind::Proxy, platform, endpoint, Some(expires_at));
        lease.metadata = serde_json::json!({
            "username": proxy.username,
            "password": proxy.password,
            "area": proxy.area,
            "provider": self.endpoint,
        });
        lease
    }
}

#[async_trait]
impl ResourceProvisioner for HttpProxyProvisioner {
    async fn provision(&self, platform: &str, kind: ResourceKind) -> Result<Option<ResourceLease>> {
        // Accounts require a human login flow and are never provisioned here
        if kind != ResourceKind::Proxy {
            return Ok(None);
        }

        let body = ProvisionRequest {
            platform,
            region: self.region.as_deref(),
            carrier: self.carrier.as_deref(),
        };

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| CrawlError::Provisioning(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            warn!(
                platform = %platform,
                status = status.as_u16(),
                "⚠️ PROVISIONER: Upstream declined proxy allocation"
            );
            return Err(CrawlError::Provisioning(format!(
                "upstream returned HTTP {status}"
            )));
        }

        let proxy: ProvisionedProxy = response
            .json()
            .await
            .map_err(|e| CrawlError::Provisioning(format!("invalid upstream response: {e}")))?;

        debug!(platform = %platform, ip = %proxy.ip, port = proxy.port, "Proxy provisioned");
        Ok(Some(self.to_lease(platform, proxy)))
    }

    fn provisioner_name(&self) -> &'static str {
        "http_proxy"
    }
}
