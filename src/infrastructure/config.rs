//! Configuration infrastructure
//!
//! Contains configuration loading and management for review harvesting.
//!
//! Configuration is organized into four sections:
//! 1. HTTP identity and timeouts
//! 2. Anti-bot relay service settings
//! 3. Per-marketplace pacing and pagination settings
//! 4. Logging

#![allow(clippy::uninlined_format_args)]

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use anyhow::{Result, Context};
use tokio::fs;
use tracing::{info, warn};

use crate::domain::SourceKind;
use crate::infrastructure::errors::ScrapeError;

/// Complete application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub http: HttpConfig,
    pub relay: RelayConfig,
    pub sources: SourcesConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Reject combinations that can only be programmer mistakes.
    pub fn validate(&self) -> Result<(), ScrapeError> {
        self.relay.validate()?;
        for kind in SourceKind::ALL {
            self.sources.for_source(kind).validate(kind)?;
        }
        Ok(())
    }
}

/// HTTP identity and timeout settings shared by every source
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Timeout for direct (non-relayed) requests
    pub timeout_seconds: u64,

    /// Identity pool; one entry is picked at random per request
    pub user_agents: Vec<String>,

    /// Accept-Language header sent with HTML requests
    pub accept_language: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: defaults::REQUEST_TIMEOUT_SECONDS,
            user_agents: defaults::USER_AGENTS.iter().map(|s| s.to_string()).collect(),
            accept_language: defaults::ACCEPT_LANGUAGE.to_string(),
        }
    }
}

/// Third-party anti-bot relay settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub enabled: bool,

    /// "scraperapi", "zyte" or "brightdata" (case-insensitive)
    pub provider: String,

    pub api_key: Option<String>,

    /// Ask the relay to execute JavaScript before returning the page
    pub render_js: bool,

    /// Exit-node country, e.g. "us"
    pub country_code: Option<String>,

    /// Use the relay's residential/premium pool
    pub premium_proxy: bool,

    /// Timeout for relayed requests; relays render pages and are slow
    pub timeout_seconds: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: defaults::RELAY_PROVIDER.to_string(),
            api_key: None,
            render_js: true,
            country_code: Some(defaults::RELAY_COUNTRY_CODE.to_string()),
            premium_proxy: false,
            timeout_seconds: defaults::RELAY_TIMEOUT_SECONDS,
        }
    }
}

impl RelayConfig {
    /// Relay is only usable with a non-blank key.
    pub fn is_active(&self) -> bool {
        self.enabled && self.api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn validate(&self) -> Result<(), ScrapeError> {
        if !self.enabled {
            return Ok(());
        }
        self.provider.parse::<crate::infrastructure::relay::RelayProvider>()?;
        if !self.is_active() {
            return Err(ScrapeError::InvalidConfiguration {
                field: "relay.api_key".to_string(),
                message: "relay is enabled but no API key is set".to_string(),
            });
        }
        Ok(())
    }
}

/// Per-marketplace settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    pub amazon: SourceSettings,
    pub aliexpress: SourceSettings,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            amazon: SourceSettings::amazon(),
            aliexpress: SourceSettings::aliexpress(),
        }
    }
}

impl SourcesConfig {
    pub fn for_source(&self, kind: SourceKind) -> &SourceSettings {
        match kind {
            SourceKind::Amazon => &self.amazon,
            SourceKind::AliExpress => &self.aliexpress,
        }
    }
}

/// Pacing, retry and pagination settings for one marketplace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceSettings {
    /// Scheme and host used to build review URLs
    pub base_url: String,

    /// Lower bound of the randomized delay before every page after the first
    pub min_delay_ms: u64,

    /// Upper bound of the randomized delay
    pub max_delay_ms: u64,

    /// Attempts per page before the scrape aborts
    pub max_retries: u32,

    /// Base of the escalating retry delay (attempt N waits N * base)
    pub retry_delay_ms: u64,

    /// Extra factor applied to the retry delay after an HTTP 429
    pub rate_limit_backoff_multiplier: u32,

    /// Item count of a full page; fewer items means the last page
    pub reviews_per_page: usize,

    /// Bodies shorter than this are treated as soft failures
    pub min_body_bytes: usize,

    /// Route this source's requests through the relay when it is active
    pub use_relay: bool,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self::amazon()
    }
}

impl SourceSettings {
    pub fn amazon() -> Self {
        Self {
            base_url: defaults::AMAZON_BASE_URL.to_string(),
            min_delay_ms: defaults::AMAZON_MIN_DELAY_MS,
            max_delay_ms: defaults::AMAZON_MAX_DELAY_MS,
            max_retries: defaults::MAX_RETRIES,
            retry_delay_ms: defaults::AMAZON_MIN_DELAY_MS,
            rate_limit_backoff_multiplier: defaults::RATE_LIMIT_BACKOFF_MULTIPLIER,
            reviews_per_page: defaults::REVIEWS_PER_PAGE,
            min_body_bytes: defaults::AMAZON_MIN_BODY_BYTES,
            use_relay: true,
        }
    }

    pub fn aliexpress() -> Self {
        Self {
            base_url: defaults::ALIEXPRESS_BASE_URL.to_string(),
            min_delay_ms: defaults::ALIEXPRESS_MIN_DELAY_MS,
            max_delay_ms: defaults::ALIEXPRESS_MAX_DELAY_MS,
            max_retries: defaults::MAX_RETRIES,
            retry_delay_ms: defaults::ALIEXPRESS_MIN_DELAY_MS,
            rate_limit_backoff_multiplier: defaults::RATE_LIMIT_BACKOFF_MULTIPLIER,
            reviews_per_page: defaults::REVIEWS_PER_PAGE,
            min_body_bytes: 0,
            use_relay: false,
        }
    }

    /// Same settings with every delay set to zero, for deterministic tests.
    pub fn without_delays(mut self) -> Self {
        self.min_delay_ms = 0;
        self.max_delay_ms = 0;
        self.retry_delay_ms = 0;
        self
    }

    pub fn validate(&self, kind: SourceKind) -> Result<(), ScrapeError> {
        let invalid = |field: &str, message: &str| ScrapeError::InvalidConfiguration {
            field: format!("sources.{}.{}", kind, field),
            message: message.to_string(),
        };
        if self.min_delay_ms > self.max_delay_ms {
            return Err(invalid("min_delay_ms", "minimum delay exceeds maximum delay"));
        }
        if self.max_retries == 0 {
            return Err(invalid("max_retries", "at least one attempt is required"));
        }
        if self.reviews_per_page == 0 {
            return Err(invalid("reviews_per_page", "page size must be positive"));
        }
        url::Url::parse(&self.base_url).map_err(|e| invalid("base_url", &e.to_string()))?;
        Ok(())
    }

    /// Random delay in `[min_delay_ms, max_delay_ms]`.
    pub fn jitter_delay(&self) -> Duration {
        if self.max_delay_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(fastrand::u64(self.min_delay_ms..=self.max_delay_ms))
    }

    /// Delay before retry number `retry` (1-based), escalating linearly.
    pub fn retry_delay(&self, retry: u32, rate_limited: bool) -> Duration {
        let factor = if rate_limited { u64::from(self.rate_limit_backoff_multiplier.max(1)) } else { 1 };
        Duration::from_millis(self.retry_delay_ms * u64::from(retry) * factor)
    }
}

/// Logging configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    pub level: String,

    /// Enable JSON formatted logs
    pub json_format: bool,

    /// Enable console output (stderr, so stdout stays clean for data)
    pub console_output: bool,

    /// Enable file output
    pub file_output: bool,

    /// Directory for log files; defaults to the application data directory
    pub directory: Option<PathBuf>,

    /// Module-specific log level filters (e.g., "reqwest": "warn")
    pub module_filters: HashMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::LOG_LEVEL.to_string(),
            json_format: false,
            console_output: true,
            file_output: false,
            directory: None,
            module_filters: {
                let mut filters = HashMap::new();
                filters.insert("reqwest".to_string(), "warn".to_string());
                filters.insert("hyper".to_string(), "warn".to_string());
                filters.insert("h2".to_string(), "warn".to_string());
                filters.insert("html5ever".to_string(), "error".to_string());
                filters.insert("selectors".to_string(), "warn".to_string());
                filters
            },
        }
    }
}

/// Configuration manager for loading and saving settings
pub struct ConfigManager {
    pub config_path: PathBuf,
}

impl ConfigManager {
    /// Get the application configuration directory
    pub fn get_config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get user config directory")?
            .join(defaults::APP_DIR_NAME);

        Ok(config_dir)
    }

    /// Get application data directory
    pub fn get_app_data_dir() -> Result<PathBuf> {
        let data_dir = dirs::data_local_dir()
            .context("Failed to get user data directory")?
            .join(defaults::APP_DIR_NAME);

        Ok(data_dir)
    }

    /// Create a configuration manager pointing at the user config directory
    pub fn new() -> Result<Self> {
        let config_path = Self::get_config_dir()?.join(defaults::CONFIG_FILE_NAME);
        Ok(Self { config_path })
    }

    /// Manager for an explicit file, e.g. one passed on the command line
    pub fn with_path(config_path: impl Into<PathBuf>) -> Self {
        Self { config_path: config_path.into() }
    }

    /// Load configuration from file, creating default if it doesn't exist
    pub async fn load_config(&self) -> Result<AppConfig> {
        if !fs::try_exists(&self.config_path).await.unwrap_or(false) {
            info!("Configuration file not found, creating default: {:?}", self.config_path);
            let default_config = AppConfig::default();
            self.save_config(&default_config).await?;
            return Ok(default_config);
        }

        let content = fs::read_to_string(&self.config_path).await
            .context("Failed to read configuration file")?;

        match serde_json::from_str::<AppConfig>(&content) {
            Ok(config) => {
                info!("Loaded configuration from: {:?}", self.config_path);
                Ok(config)
            }
            Err(parse_error) => {
                warn!("⚠️  Configuration file is unreadable: {}", parse_error);

                let backup_path = self.config_path.with_extension("json.corrupted");
                if let Err(e) = fs::copy(&self.config_path, &backup_path).await {
                    warn!("Failed to create backup of corrupted config: {}", e);
                } else {
                    info!("Backed up corrupted config to: {:?}", backup_path);
                }

                let default_config = AppConfig::default();
                self.save_config(&default_config).await
                    .context("Failed to save default configuration")?;

                info!("✅ Reset to default configuration");
                Ok(default_config)
            }
        }
    }

    /// Save configuration to file
    pub async fn save_config(&self, config: &AppConfig) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent).await
                .context("Failed to create config directory")?;
        }

        let content = serde_json::to_string_pretty(config)
            .context("Failed to serialize configuration")?;

        fs::write(&self.config_path, content).await
            .context("Failed to write configuration file")?;

        info!("Saved configuration to: {:?}", self.config_path);
        Ok(())
    }

    /// Update relay settings in place (e.g. after the user pastes an API key)
    pub async fn update_relay<F>(&self, updater: F) -> Result<()>
    where
        F: FnOnce(&mut RelayConfig),
    {
        let mut config = self.load_config().await?;
        updater(&mut config.relay);
        self.save_config(&config).await
    }

    /// Get the configuration file path
    pub fn config_path(&self) -> &PathBuf {
        &self.config_path
    }
}

/// Default configuration values
pub mod defaults {
    pub const APP_DIR_NAME: &str = "review-harvest";
    pub const CONFIG_FILE_NAME: &str = "config.json";

    /// Default request timeout in seconds
    pub const REQUEST_TIMEOUT_SECONDS: u64 = 30;

    pub const ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9";

    pub const USER_AGENTS: &[&str] = &[
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    ];

    pub const RELAY_PROVIDER: &str = "scraperapi";
    pub const RELAY_COUNTRY_CODE: &str = "us";
    pub const RELAY_TIMEOUT_SECONDS: u64 = 60;

    /// Default retry attempts per page
    pub const MAX_RETRIES: u32 = 3;

    /// Retry delay multiplier after HTTP 429
    pub const RATE_LIMIT_BACKOFF_MULTIPLIER: u32 = 3;

    /// Both marketplaces serve ten reviews per page
    pub const REVIEWS_PER_PAGE: usize = 10;

    pub const AMAZON_BASE_URL: &str = "https://www.amazon.com";
    pub const AMAZON_MIN_DELAY_MS: u64 = 1000;
    pub const AMAZON_MAX_DELAY_MS: u64 = 2000;

    /// Real review pages are far larger; captcha and error shells are not
    pub const AMAZON_MIN_BODY_BYTES: usize = 10_000;

    pub const ALIEXPRESS_BASE_URL: &str = "https://www.aliexpress.com";
    pub const ALIEXPRESS_MIN_DELAY_MS: u64 = 3000;
    pub const ALIEXPRESS_MAX_DELAY_MS: u64 = 6000;

    /// Default log level
    pub const LOG_LEVEL: &str = "info";
}
