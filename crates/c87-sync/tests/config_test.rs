//! Config file loading integration tests

use c87_api_client::{FeedSource, TokenAmount};
use c87_sync::{SyncConfig, SyncError};
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn test_load_full_config_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("c87.toml");
    std::fs::write(
        &path,
        r#"
[api]
base_url = "https://api.c87.example/api/v1"
timeout_secs = 10

[feed]
page_size = 25
refresh_interval_secs = 120
source = "watchlist_only"

[notifier]
poll_interval_secs = 15

[economy]
vote_reward_estimate = 0.25
unlock_cost = 40
boost_cost = 80.5
paywall_enabled = true
"#,
    )
    .unwrap();

    let config = SyncConfig::load(&path).unwrap();

    assert_eq!(config.api.base_url, "https://api.c87.example/api/v1");
    assert_eq!(config.api.client_config().timeout_secs, 10);
    assert_eq!(config.feed.page_size, 25);
    assert_eq!(config.feed.refresh_interval(), Duration::from_secs(120));
    assert_eq!(config.feed.source, FeedSource::WatchlistOnly);
    assert_eq!(config.notifier.poll_interval(), Duration::from_secs(15));
    assert_eq!(config.economy.vote_reward_estimate, TokenAmount::from_hundredths(25));
    assert_eq!(config.economy.unlock_cost, TokenAmount::from_tokens(40));
    assert_eq!(config.economy.boost_cost, TokenAmount::from_hundredths(8_050));
    assert!(config.economy.paywall_enabled);
}

#[test]
fn test_missing_file_uses_defaults() {
    let dir = TempDir::new().unwrap();
    let config = SyncConfig::load(dir.path().join("absent.toml")).unwrap();

    assert_eq!(config.api.base_url, "http://localhost:9010/api/v1");
    assert_eq!(config.feed.page_size, 10);
    assert_eq!(config.feed.source, FeedSource::Latest);
    assert!(!config.economy.paywall_enabled);
}

#[test]
fn test_invalid_toml_is_config_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.toml");
    std::fs::write(&path, "[feed\npage_size = ").unwrap();

    let err = SyncConfig::load(&path).unwrap_err();
    assert!(matches!(err, SyncError::Config(_)));
}

#[test]
fn test_zero_interval_rejected() {
    let err = SyncConfig::from_toml_str("[notifier]\npoll_interval_secs = 0\n").unwrap_err();
    assert!(matches!(err, SyncError::Config(_)));
}

#[test]
fn test_env_overrides() {
    std::env::set_var("C87_API_BASE_URL", "http://10.0.0.5:9010/api/v1");
    std::env::set_var("C87_API_KEY", "sk-live-123");

    let config = SyncConfig::default().with_env_overrides();

    std::env::remove_var("C87_API_BASE_URL");
    std::env::remove_var("C87_API_KEY");

    assert_eq!(config.api.base_url, "http://10.0.0.5:9010/api/v1");
    assert_eq!(config.api.api_key.as_deref(), Some("sk-live-123"));
}
