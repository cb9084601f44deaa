//! The shipped crawler-config.yaml loads and merges for every environment.

use std::path::PathBuf;

use mediacrawl_core::config::ConfigManager;
use mediacrawl_core::models::AccountStrategy;

fn config_dir() -> Option<PathBuf> {
    Some(PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("config"))
}

#[test]
fn test_environment_overrides_base() {
    let manager = ConfigManager::load_from_directory_with_env(config_dir(), "test").unwrap();
    let config = manager.config();

    assert_eq!(manager.environment(), "test");
    assert!(!config.cache.enabled);
    assert_eq!(config.retry.base_delay_ms, 0);
    assert!(!config.retry.jitter);
    assert_eq!(config.coordinator.watchdog_timeout_seconds, 60);
    assert!(!config.retention.enabled);

    // Untouched base values survive the merge
    assert_eq!(config.retry.max_retries, 3);
    assert_eq!(config.retry.max_resource_switches, 3);
    assert_eq!(config.resource_pool.fail_threshold, 3);
    assert_eq!(
        config.coordinator.supported_platforms,
        vec!["xhs", "dy", "ks", "bili"]
    );
    assert_eq!(
        config.coordinator.default_account_strategy,
        AccountStrategy::Smart
    );
}

#[test]
fn production_keeps_real_delays() {
    let manager = ConfigManager::load_from_directory_with_env(config_dir(), "production").unwrap();
    let config = manager.config();

    assert_eq!(config.database.max_connections, 25);
    assert_eq!(config.retry.base_delay_ms, 2_000);
    assert_eq!(config.retry.max_delay_ms, 30_000);
    assert_eq!(config.coordinator.watchdog_timeout_seconds, 2_700);
    assert!(config.retention.enabled);
    assert!(config.web.bind_address.parse::<std::net::SocketAddr>().is_ok());
}

#[test]
fn directory_without_config_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let result = ConfigManager::load_from_directory_with_env(Some(dir.path().to_path_buf()), "test");
    assert!(result.is_err());
}
