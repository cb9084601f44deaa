//! # Crawler Configuration Validator
//!
//! Command-line tool for validating `crawler-config.yaml` per environment
//! before starting the crawl server.

use clap::{Parser, Subcommand};
use mediacrawl_core::config::{ConfigManager, CrawlerConfig};
use std::path::PathBuf;
use std::process;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

type CheckResult = Result<(), Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(name = "config-validator")]
#[command(about = "Validate crawler configuration files")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Environment section to merge (development, test, production)
    #[arg(short, long, default_value = "development")]
    environment: String,

    /// Directory holding crawler-config.yaml (default: ./config)
    #[arg(short, long)]
    config_dir: Option<PathBuf>,

    /// Verbose output level (use multiple times for more verbosity)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Validate every section
    Validate {
        /// Only check one section (database, retry, resource_pool, coordinator, retention, web)
        #[arg(short, long)]
        section: Option<String>,
    },

    /// Print the merged configuration with secrets masked
    Show,
}

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let _subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .try_init();

    let result = match &cli.command {
        Some(Commands::Validate { section }) => validate(&cli, section.as_deref()),
        Some(Commands::Show) => show(&cli),
        None => validate(&cli, None),
    };

    match result {
        Ok(()) => {
            info!("Configuration validation completed successfully");
            process::exit(0);
        }
        Err(e) => {
            error!("Configuration validation failed: {}", e);
            process::exit(1);
        }
    }
}

fn load(cli: &Cli) -> Result<std::sync::Arc<ConfigManager>, Box<dyn std::error::Error>> {
    match ConfigManager::load_from_directory_with_env(cli.config_dir.clone(), &cli.environment) {
        Ok(manager) => {
            println!("✅ Configuration loaded for '{}'", manager.environment());
            Ok(manager)
        }
        Err(e) => {
            println!("❌ Failed to load configuration: {}", e);
            println!("   This is the same error the crawl server would encounter");
            Err(Box::new(e))
        }
    }
}

fn validate(cli: &Cli, section: Option<&str>) -> CheckResult {
    println!("🔧 Validating Crawler Configuration");
    println!("Environment: {}", cli.environment);
    if let Some(dir) = &cli.config_dir {
        println!("Config Directory: {}", dir.display());
    }
    println!();

    let manager = load(cli)?;
    let config = manager.config();

    match section {
        None => {
            validate_database(config)?;
            validate_retry(config)?;
            validate_resource_pool(config)?;
            validate_coordinator(config)?;
            validate_retention(config)?;
            validate_web(config)?;
            println!("\n🎉 All configuration validation checks passed!");
        }
        Some(name) => {
            match name.to_lowercase().replace('-', "_").as_str() {
                "database" => validate_database(config)?,
                "retry" => validate_retry(config)?,
                "resource_pool" => validate_resource_pool(config)?,
                "coordinator" => validate_coordinator(config)?,
                "retention" => validate_retention(config)?,
                "web" => validate_web(config)?,
                _ => return Err(format!("Unknown section: {name}").into()),
            }
            println!("✅ Section '{name}' validation passed!");
        }
    }
    Ok(())
}

fn show(cli: &Cli) -> CheckResult {
    let manager = load(cli)?;
    println!("{}", serde_json::to_string_pretty(&manager.debug_config())?);
    Ok(())
}

fn validate_database(config: &CrawlerConfig) -> CheckResult {
    println!("🗄️  Validating Database Configuration...");
    match &config.database.url {
        Some(url) if url.is_empty() => return Err("database.url is configured but empty".into()),
        Some(_) => println!("   ✅ Postgres store, max {} connections", config.database.max_connections),
        None => println!("   ℹ️  No database.url: in-memory stores will be used"),
    }
    Ok(())
}

fn validate_retry(config: &CrawlerConfig) -> CheckResult {
    println!("🔁 Validating Retry Policy...");
    let retry = &config.retry;
    println!(
        "   ✅ max_retries={} base={}ms max={}ms base^n={} jitter={}",
        retry.max_retries, retry.base_delay_ms, retry.max_delay_ms, retry.exponential_base, retry.jitter
    );
    println!(
        "   ✅ resource switching {} (max {} switches, {} attempts per branch)",
        if retry.resource_switch_enabled { "enabled" } else { "disabled" },
        retry.max_resource_switches,
        retry.max_attempts()
    );
    Ok(())
}

fn validate_resource_pool(config: &CrawlerConfig) -> CheckResult {
    println!("🏊 Validating Resource Pool Configuration...");
    let pool = &config.resource_pool;
    println!("   ✅ fail_threshold={}", pool.fail_threshold);
    match &pool.provisioning.endpoint {
        Some(endpoint) => println!("   ✅ Proxy provisioning via {endpoint}"),
        None => println!("   ℹ️  Proxy provisioning disabled"),
    }
    Ok(())
}

fn validate_coordinator(config: &CrawlerConfig) -> CheckResult {
    println!("🚀 Validating Coordinator Configuration...");
    let coordinator = &config.coordinator;
    println!(
        "   ✅ Platforms: {}",
        coordinator.supported_platforms.join(", ")
    );
    println!(
        "   ✅ watchdog={}s parallel_branches={} default_strategy={}",
        coordinator.watchdog_timeout_seconds,
        coordinator.max_parallel_branches,
        coordinator.default_account_strategy
    );
    Ok(())
}

fn validate_retention(config: &CrawlerConfig) -> CheckResult {
    println!("🧹 Validating Retention Configuration...");
    if config.retention.enabled {
        println!(
            "   ✅ Terminal tasks purged after {}h",
            config.retention.max_age_hours
        );
    } else {
        println!("   ℹ️  Retention sweeper disabled");
    }
    Ok(())
}

fn validate_web(config: &CrawlerConfig) -> CheckResult {
    println!("🌐 Validating Web Configuration...");
    config
        .web
        .bind_address
        .parse::<std::net::SocketAddr>()
        .map_err(|e| format!("web.bind_address '{}' is invalid: {e}", config.web.bind_address))?;
    println!("   ✅ Bind address: {}", config.web.bind_address);
    match &config.web.adapter_base_url {
        Some(url) => println!("   ✅ Adapter sidecar: {url}"),
        None => println!("   ⚠️  No adapter sidecar configured; submissions will be rejected"),
    }
    Ok(())
}
