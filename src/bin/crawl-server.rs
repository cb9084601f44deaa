//! # Crawl Server
//!
//! Standalone HTTP server around the crawl orchestration core.
//!
//! ## Usage
//!
//! ```bash
//! # Run with config/crawler-config.yaml and the development section
//! cargo run --bin crawl-server
//!
//! # Production section, Postgres from the environment
//! CRAWLER_ENV=production CRAWLER__DATABASE__URL=postgresql://... cargo run --bin crawl-server
//! ```

use anyhow::Context;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

use mediacrawl_core::bootstrap::CrawlBootstrap;
use mediacrawl_core::config::ConfigManager;
use mediacrawl_core::logging;
use mediacrawl_core::orchestration::AdapterRegistry;
use mediacrawl_core::web;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init_structured_logging();

    info!("🚀 Starting Crawl Server...");
    info!("   Version: {}", env!("CARGO_PKG_VERSION"));
    info!(
        "   Build Mode: {}",
        if cfg!(debug_assertions) {
            "Debug"
        } else {
            "Release"
        }
    );

    let config_manager =
        ConfigManager::initialize_global(None).context("failed to load crawler configuration")?;
    let config = config_manager.config().clone();
    let bind_address = config.web.bind_address.clone();

    let system = CrawlBootstrap::bootstrap(config, Arc::new(AdapterRegistry::new()))
        .await
        .context("failed to bootstrap crawl system")?;

    let app = web::create_app(system.app_state());
    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("failed to bind {bind_address}"))?;

    info!("🎉 Crawl Server started successfully!");
    info!("   Environment: {}", config_manager.environment());
    info!("   Listening on: {}", bind_address);
    info!("   Persistent stores: {}", system.is_persistent());
    info!("   Press Ctrl+C to shutdown gracefully");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    info!("🛑 Shutdown signal received, stopping crawl system...");
    system.stop().await;
    info!("👋 Crawl Server shutdown complete");

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C");
        },
        _ = terminate => {
            info!("Received SIGTERM");
        },
    }
}
