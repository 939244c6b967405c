//! Sync core configuration

use crate::error::{Result, SyncError};
use c87_api_client::{ApiConfig, FeedSource, TokenAmount};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub api: ApiSection,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub notifier: NotifierConfig,
    #[serde(default)]
    pub economy: EconomyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiSection {
    /// Versioned API root
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// HTTP request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Identity token (normally supplied via env or CLI)
    #[serde(default)]
    pub api_key: Option<String>,
}

impl Default for ApiSection {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout(),
            api_key: None,
        }
    }
}

impl ApiSection {
    pub fn client_config(&self) -> ApiConfig {
        ApiConfig {
            base_url: self.base_url.clone(),
            timeout_secs: self.timeout_secs,
        }
    }
}

/// Feed paginator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Items requested per page; a shorter page ends the stream
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// First-page refresh interval in seconds
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,

    /// Listing to page through at startup
    #[serde(default)]
    pub source: FeedSource,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            refresh_interval_secs: default_refresh_interval(),
            source: FeedSource::default(),
        }
    }
}

impl FeedConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }
}

/// Dashboard notifier configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifierConfig {
    /// Dashboard poll interval in seconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
        }
    }
}

impl NotifierConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

/// Client-known economy constants
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EconomyConfig {
    /// Reward credited optimistically on vote, corrected on confirmation
    #[serde(default = "default_vote_reward")]
    pub vote_reward_estimate: TokenAmount,

    #[serde(default = "default_unlock_cost")]
    pub unlock_cost: TokenAmount,

    #[serde(default = "default_boost_cost")]
    pub boost_cost: TokenAmount,

    /// When false every item is readable without unlocking
    #[serde(default)]
    pub paywall_enabled: bool,
}

impl Default for EconomyConfig {
    fn default() -> Self {
        Self {
            vote_reward_estimate: default_vote_reward(),
            unlock_cost: default_unlock_cost(),
            boost_cost: default_boost_cost(),
            paywall_enabled: false,
        }
    }
}

// Defaults
fn default_base_url() -> String { "http://localhost:9010/api/v1".to_string() }
fn default_timeout() -> u64 { 30 }
fn default_page_size() -> usize { 10 }
fn default_refresh_interval() -> u64 { 60 }
fn default_poll_interval() -> u64 { 30 }
fn default_vote_reward() -> TokenAmount { TokenAmount::from_hundredths(10) }
fn default_unlock_cost() -> TokenAmount { TokenAmount::from_tokens(50) }
fn default_boost_cost() -> TokenAmount { TokenAmount::from_tokens(100) }

impl SyncConfig {
    /// Parse from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: SyncConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file, falling back to defaults when it does not exist
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            info!("Config file {} not found, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| SyncError::Config(format!("reading {}: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    /// Apply `C87_API_BASE_URL` and `C87_API_KEY` overrides
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var("C87_API_BASE_URL") {
            self.api.base_url = url;
        }
        if let Ok(key) = std::env::var("C87_API_KEY") {
            if !key.trim().is_empty() {
                self.api.api_key = Some(key);
            }
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.feed.page_size == 0 {
            return Err(SyncError::Config("feed.page_size must be at least 1".into()));
        }
        if self.feed.refresh_interval_secs == 0 || self.notifier.poll_interval_secs == 0 {
            return Err(SyncError::Config("intervals must be at least 1 second".into()));
        }
        if self.economy.unlock_cost.is_negative() || self.economy.boost_cost.is_negative() {
            return Err(SyncError::Config("spend costs must not be negative".into()));
        }
        Ok(())
    }
}
