//! # HTTP Platform Adapter
//!
//! Forwards operations to a crawler sidecar that owns the browser sessions.
//!
//! ```text
//! POST {base_url}/v1/crawl/{platform}
//!   { task_id, attempt, account, proxy, operation }
//! 2xx  -> { item_count, metadata }
//! else -> { error_kind?, message? }
//! ```
//!
//! A sidecar that already knows the failure kind sends `error_kind`; anything
//! else is classified from the status and message.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

use crate::error::{CrawlError, Result};
use crate::models::{ErrorKind, ResourceLease};
use crate::orchestration::{
    AdapterError, AdapterRegistry, CrawlOperation, CrawlResult, ExecutionContext, PlatformAdapter,
};

#[derive(Debug, Serialize)]
struct LeaseRef<'a> {
    lease_id: Uuid,
    identity_ref: &'a str,
    metadata: &'a serde_json::Value,
}

impl<'a> From<&'a ResourceLease> for LeaseRef<'a> {
    fn from(lease: &'a ResourceLease) -> Self {
        Self {
            lease_id: lease.lease_id,
            identity_ref: &lease.identity_ref,
            metadata: &lease.metadata,
        }
    }
}

#[derive(Debug, Serialize)]
struct CrawlRequest<'a> {
    task_id: Uuid,
    attempt: u32,
    account: LeaseRef<'a>,
    proxy: Option<LeaseRef<'a>>,
    operation: &'a CrawlOperation,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error_kind: Option<ErrorKind>,
    #[serde(default)]
    message: Option<String>,
}

/// Map a non-success sidecar response onto an `AdapterError`
fn error_from_response(status: u16, body: &str) -> AdapterError {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    let message = parsed
        .message
        .unwrap_or_else(|| body.chars().take(512).collect());

    match parsed.error_kind {
        Some(kind) => AdapterError::declared(kind, message),
        None => AdapterError::http(status, message),
    }
}

fn error_from_transport(err: &reqwest::Error) -> AdapterError {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        AdapterError::Transport(err.to_string())
    } else {
        AdapterError::other(err.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct HttpPlatformAdapter {
    client: reqwest::Client,
    platform: String,
    url: String,
}

impl HttpPlatformAdapter {
    pub fn new(platform: impl Into<String>, base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CrawlError::validation(format!("failed to build HTTP client: {e}")))?;
        Ok(Self::with_client(client, platform, base_url))
    }

    pub fn with_client(client: reqwest::Client, platform: impl Into<String>, base_url: &str) -> Self {
        let platform = platform.into();
        let url = format!("{}/v1/crawl/{}", base_url.trim_end_matches('/'), platform);
        Self {
            client,
            platform,
            url,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Register one sidecar adapter per platform, sharing a client
    pub fn register_all(
        registry: &AdapterRegistry,
        platforms: &[String],
        base_url: &str,
        timeout: Duration,
    ) -> Result<()> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CrawlError::validation(format!("failed to build HTTP client: {e}")))?;
        for platform in platforms {
            registry.register(std::sync::Arc::new(Self::with_client(
                client.clone(),
                platform.as_str(),
                base_url,
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl PlatformAdapter for HttpPlatformAdapter {
    fn platform(&self) -> &str {
        &self.platform
    }

    async fn execute(
        &self,
        ctx: &ExecutionContext,
        operation: &CrawlOperation,
    ) -> std::result::Result<CrawlResult, AdapterError> {
        let body = CrawlRequest {
            task_id: ctx.task_id,
            attempt: ctx.attempt,
            account: LeaseRef::from(&ctx.account),
            proxy: ctx.proxy.as_ref().map(LeaseRef::from),
            operation,
        };

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| error_from_transport(&e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            debug!(
                platform = %self.platform,
                status = status.as_u16(),
                attempt = ctx.attempt,
                "Sidecar returned failure"
            );
            return Err(error_from_response(status.as_u16(), &text));
        }

        response
            .json::<CrawlResult>()
            .await
            .map_err(|e| AdapterError::other(format!("invalid sidecar response: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_util::sync::CancellationToken;

    #[test]
    fn test_declared_kind_wins() {
        let err = error_from_response(
            500,
            r#"{"error_kind": "captcha_required", "message": "slider shown"}"#,
        );
        assert_eq!(
            err,
            AdapterError::declared(ErrorKind::CaptchaRequired, "slider shown")
        );
    }

    #[test]
    fn test_plain_body_becomes_http_error() {
        let err = error_from_response(429, "slow down");
        assert_eq!(err, AdapterError::http(429, "slow down"));
    }

    #[test]
    fn test_url_joins_base_and_platform() {
        let adapter =
            HttpPlatformAdapter::new("dy", "http://sidecar:8080/", Duration::from_secs(1)).unwrap();
        assert_eq!(adapter.url(), "http://sidecar:8080/v1/crawl/dy");
        assert_eq!(adapter.platform(), "dy");
    }

    #[test]
    fn test_register_all() {
        let registry = AdapterRegistry::new();
        HttpPlatformAdapter::register_all(
            &registry,
            &["xhs".to_string(), "bili".to_string()],
            "http://sidecar",
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(registry.platforms(), vec!["bili".to_string(), "xhs".to_string()]);
    }

    #[tokio::test]
    async fn test_unreachable_sidecar_is_transport_error() {
        let adapter =
            HttpPlatformAdapter::new("xhs", "http://127.0.0.1:9", Duration::from_secs(1)).unwrap();
        let ctx = ExecutionContext {
            task_id: Uuid::new_v4(),
            platform: "xhs".into(),
            attempt: 1,
            account: ResourceLease::account("xhs", "acct-1"),
            proxy: None,
            cancel: CancellationToken::new(),
        };
        let err = adapter
            .execute(&ctx, &CrawlOperation::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::Transport(_)));
    }
}
