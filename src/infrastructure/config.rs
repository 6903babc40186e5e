//! Configuration infrastructure.
//!
//! Configuration is a single JSON document under the user config directory,
//! loaded and persisted with `tokio::fs`. A missing file is repaired by
//! writing the defaults back, so a fresh install always starts from a
//! readable document.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, info, warn};

use crate::domain::model::FeatureConfig;
use crate::domain::SettingsProvider;

/// Built-in default values. Tunables live here, site facts in
/// `domain::constants`.
pub mod defaults {
    /// Base auto-refresh interval (10 minutes).
    pub const REFRESH_INTERVAL_SECS: u64 = 600;
    /// Request-dedup freshness window (5 minutes).
    pub const CACHE_FRESHNESS_SECS: u64 = 300;
    /// Upper bound for exponential error backoff (30 minutes).
    pub const ERROR_BACKOFF_CAP_SECS: u64 = 1800;
    /// Upper bound for linear empty-result backoff (60 minutes).
    pub const EMPTY_BACKOFF_CAP_SECS: u64 = 3600;
    /// Debounce window for table mutation bursts.
    pub const MUTATION_DEBOUNCE_MS: u64 = 1500;
    /// Debounce window for scroll input.
    pub const SCROLL_DEBOUNCE_MS: u64 = 1000;
    /// Pause after navigation before the first extraction.
    pub const SETTLE_DELAY_MS: u64 = 500;
    /// Pause after initialization before the first data load.
    pub const INITIAL_LOAD_DELAY_MS: u64 = 1000;
    /// Poll step while waiting for the page anchors to appear.
    pub const READINESS_POLL_MS: u64 = 500;
    /// Give up waiting for page anchors after this long.
    pub const READINESS_TIMEOUT_SECS: u64 = 60;
    /// In-memory TTL for the feature-toggle cache.
    pub const FEATURE_CACHE_TTL_SECS: u64 = 5;

    pub const API_TIMEOUT_SECS: u64 = 30;
    pub const API_MAX_REQUESTS_PER_SECOND: u32 = 2;

    pub const LOG_LEVEL: &str = "info";
    pub const LOG_CONSOLE_OUTPUT: bool = true;
    pub const LOG_FILE_OUTPUT: bool = false;
    pub const LOG_JSON_FORMAT: bool = false;
}

/// Complete application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Metrics API endpoint settings.
    pub api: ApiConfig,
    /// Feature toggles (also reachable through [`FileSettingsProvider`]).
    pub features: FeatureConfig,
    /// Refresh/backoff/debounce timing.
    pub refresh: RefreshConfig,
    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Metrics API endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of the metrics backend. Empty means "not configured".
    pub base_url: String,
    /// Bearer token sent with every request when non-empty.
    pub api_key: String,
    pub timeout_seconds: u64,
    pub max_requests_per_second: u32,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key: String::new(),
            timeout_seconds: defaults::API_TIMEOUT_SECS,
            max_requests_per_second: defaults::API_MAX_REQUESTS_PER_SECOND,
        }
    }
}

/// Timing knobs of the refresh pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    pub refresh_interval_secs: u64,
    pub cache_freshness_secs: u64,
    pub error_backoff_cap_secs: u64,
    pub empty_backoff_cap_secs: u64,
    pub mutation_debounce_ms: u64,
    pub scroll_debounce_ms: u64,
    pub settle_delay_ms: u64,
    pub initial_load_delay_ms: u64,
    pub readiness_poll_ms: u64,
    pub readiness_timeout_secs: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: defaults::REFRESH_INTERVAL_SECS,
            cache_freshness_secs: defaults::CACHE_FRESHNESS_SECS,
            error_backoff_cap_secs: defaults::ERROR_BACKOFF_CAP_SECS,
            empty_backoff_cap_secs: defaults::EMPTY_BACKOFF_CAP_SECS,
            mutation_debounce_ms: defaults::MUTATION_DEBOUNCE_MS,
            scroll_debounce_ms: defaults::SCROLL_DEBOUNCE_MS,
            settle_delay_ms: defaults::SETTLE_DELAY_MS,
            initial_load_delay_ms: defaults::INITIAL_LOAD_DELAY_MS,
            readiness_poll_ms: defaults::READINESS_POLL_MS,
            readiness_timeout_secs: defaults::READINESS_TIMEOUT_SECS,
        }
    }
}

impl RefreshConfig {
    #[must_use]
    pub fn base_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    #[must_use]
    pub fn cache_freshness(&self) -> Duration {
        Duration::from_secs(self.cache_freshness_secs)
    }

    #[must_use]
    pub fn error_backoff_cap(&self) -> Duration {
        Duration::from_secs(self.error_backoff_cap_secs)
    }

    #[must_use]
    pub fn empty_backoff_cap(&self) -> Duration {
        Duration::from_secs(self.empty_backoff_cap_secs)
    }

    #[must_use]
    pub fn mutation_debounce(&self) -> Duration {
        Duration::from_millis(self.mutation_debounce_ms)
    }

    #[must_use]
    pub fn scroll_debounce(&self) -> Duration {
        Duration::from_millis(self.scroll_debounce_ms)
    }

    #[must_use]
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    #[must_use]
    pub fn initial_load_delay(&self) -> Duration {
        Duration::from_millis(self.initial_load_delay_ms)
    }

    #[must_use]
    pub fn readiness_poll(&self) -> Duration {
        Duration::from_millis(self.readiness_poll_ms)
    }

    #[must_use]
    pub fn readiness_timeout(&self) -> Duration {
        Duration::from_secs(self.readiness_timeout_secs)
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (`trace` .. `error`), overridable via `RUST_LOG`.
    pub level: String,
    pub console_output: bool,
    pub file_output: bool,
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::LOG_LEVEL.to_string(),
            console_output: defaults::LOG_CONSOLE_OUTPUT,
            file_output: defaults::LOG_FILE_OUTPUT,
            json_format: defaults::LOG_JSON_FORMAT,
        }
    }
}

/// Loads and persists [`AppConfig`].
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Manager rooted at the default per-user config location.
    pub fn new() -> Result<Self> {
        let config_dir = dirs::config_dir()
            .context("Could not determine user config directory")?
            .join("ads-metrics-overlay");
        Ok(Self { config_path: config_dir.join("config.json") })
    }

    /// Manager rooted at an explicit file path.
    #[must_use]
    pub fn with_path(config_path: PathBuf) -> Self {
        Self { config_path }
    }

    #[must_use]
    pub fn config_path(&self) -> &PathBuf {
        &self.config_path
    }

    /// Load the configuration, creating the file with defaults when missing.
    pub async fn load_config(&self) -> Result<AppConfig> {
        if !self.config_path.exists() {
            info!("No config file found, creating defaults at {}", self.config_path.display());
            let config = AppConfig::default();
            self.save_config(&config).await?;
            return Ok(config);
        }

        let raw = fs::read_to_string(&self.config_path)
            .await
            .with_context(|| format!("Failed to read config file {}", self.config_path.display()))?;
        let config: AppConfig = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid config file {}", self.config_path.display()))?;
        debug!("Loaded configuration from {}", self.config_path.display());
        Ok(config)
    }

    /// Persist the configuration as pretty JSON.
    pub async fn save_config(&self, config: &AppConfig) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create config directory {}", parent.display()))?;
        }
        let raw = serde_json::to_string_pretty(config).context("Failed to serialize config")?;
        fs::write(&self.config_path, raw)
            .await
            .with_context(|| format!("Failed to write config file {}", self.config_path.display()))?;
        Ok(())
    }

    /// Overwrite the file with defaults (useful for troubleshooting).
    pub async fn reset_to_defaults(&self) -> Result<AppConfig> {
        let config = AppConfig::default();
        self.save_config(&config).await?;
        Ok(config)
    }
}

/// [`SettingsProvider`] backed by the config file, with a short in-memory
/// cache so a scheduler tick does not hit the filesystem more than once per
/// TTL.
pub struct FileSettingsProvider {
    manager: ConfigManager,
    ttl: Duration,
    cache: tokio::sync::Mutex<Option<(FeatureConfig, Instant)>>,
}

impl FileSettingsProvider {
    #[must_use]
    pub fn new(manager: ConfigManager) -> Self {
        Self::with_ttl(manager, Duration::from_secs(defaults::FEATURE_CACHE_TTL_SECS))
    }

    #[must_use]
    pub fn with_ttl(manager: ConfigManager, ttl: Duration) -> Self {
        Self { manager, ttl, cache: tokio::sync::Mutex::new(None) }
    }

    /// Drop the cached toggles so the next read hits the file again.
    pub async fn clear_cache(&self) {
        *self.cache.lock().await = None;
    }
}

#[async_trait::async_trait]
impl SettingsProvider for FileSettingsProvider {
    async fn feature_config(&self) -> FeatureConfig {
        let mut cache = self.cache.lock().await;
        if let Some((features, read_at)) = cache.as_ref() {
            if read_at.elapsed() < self.ttl {
                return *features;
            }
        }
        let features = match self.manager.load_config().await {
            Ok(config) => config.features,
            Err(e) => {
                warn!("Failed to load feature config, falling back to defaults: {e:#}");
                FeatureConfig::default()
            }
        };
        *cache = Some((features, Instant::now()));
        features
    }
}

/// [`SettingsProvider`] holding toggles in memory. Used by embedders without
/// a config file and throughout the test suites.
#[derive(Debug, Default)]
pub struct InMemorySettingsProvider {
    features: std::sync::RwLock<FeatureConfig>,
}

impl InMemorySettingsProvider {
    #[must_use]
    pub fn new(features: FeatureConfig) -> Self {
        Self { features: std::sync::RwLock::new(features) }
    }

    pub fn set(&self, features: FeatureConfig) {
        if let Ok(mut guard) = self.features.write() {
            *guard = features;
        }
    }
}

#[async_trait::async_trait]
impl SettingsProvider for InMemorySettingsProvider {
    async fn feature_config(&self) -> FeatureConfig {
        self.features.read().map(|f| *f).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_is_repaired_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ConfigManager::with_path(dir.path().join("config.json"));

        let config = manager.load_config().await.unwrap();
        assert!(manager.config_path().exists());
        assert_eq!(config.refresh.refresh_interval_secs, defaults::REFRESH_INTERVAL_SECS);
        assert!(config.features.enable_reporting);
    }

    #[tokio::test]
    async fn config_round_trips_through_json() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ConfigManager::with_path(dir.path().join("config.json"));

        let mut config = AppConfig::default();
        config.api.base_url = "https://metrics.example".to_string();
        config.refresh.refresh_interval_secs = 120;
        config.features.auto_refresh = false;
        manager.save_config(&config).await.unwrap();

        let loaded = manager.load_config().await.unwrap();
        assert_eq!(loaded.api.base_url, "https://metrics.example");
        assert_eq!(loaded.refresh.refresh_interval_secs, 120);
        assert!(!loaded.features.auto_refresh);
    }

    #[tokio::test]
    async fn partial_config_files_fill_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        tokio::fs::write(&path, r#"{"api": {"base_url": "https://m.example"}}"#).await.unwrap();

        let manager = ConfigManager::with_path(path);
        let config = manager.load_config().await.unwrap();
        assert_eq!(config.api.base_url, "https://m.example");
        assert_eq!(config.refresh.cache_freshness_secs, defaults::CACHE_FRESHNESS_SECS);
    }

    #[tokio::test]
    async fn file_settings_provider_serves_cached_toggles_within_ttl() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ConfigManager::with_path(dir.path().join("config.json"));
        let mut config = AppConfig::default();
        config.features.auto_refresh = false;
        manager.save_config(&config).await.unwrap();

        let provider = FileSettingsProvider::with_ttl(manager.clone(), Duration::from_secs(60));
        assert!(!provider.feature_config().await.auto_refresh);

        // A file change within the TTL is not observed until the cache clears.
        config.features.auto_refresh = true;
        manager.save_config(&config).await.unwrap();
        assert!(!provider.feature_config().await.auto_refresh);

        provider.clear_cache().await;
        assert!(provider.feature_config().await.auto_refresh);
    }
}
