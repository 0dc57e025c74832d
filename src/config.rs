use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use crate::error::{ConfigError, Result};

pub const MIN_PAGE_SIZE: usize = 1;
pub const MAX_PAGE_SIZE: usize = 20;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub storage: StorageSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub site: SiteConfig,
}

/// Upstream news API settings, supplied by the site administrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_api_endpoint")]
    pub api_endpoint: String,

    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Effective per-request deadline applied around the upstream call.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Transport-level timeout of the HTTP client itself.
    #[serde(default = "default_http_timeout")]
    pub http_timeout: u64,

    #[serde(default)]
    pub accept_invalid_certs: bool,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Seconds a fetched article list stays valid.
    #[serde(default = "default_cache_ttl")]
    pub ttl: u64,

    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    #[serde(default = "default_persist")]
    pub persist: bool,

    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StorageSettings {
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub log_to_file: bool,

    #[serde(default = "default_log_file")]
    pub log_file: String,

    #[serde(default)]
    pub json_format: bool,

    /// Directory holding the per-customer activity logs.
    #[serde(default)]
    pub activity_log_dir: Option<PathBuf>,

    #[serde(default = "default_activity_timestamps")]
    pub activity_timestamps: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    #[serde(default)]
    pub token_secret: String,

    /// Seconds a request token stays valid at most.
    #[serde(default = "default_token_lifetime")]
    pub token_lifetime: u64,
}

/// Details shown to customers when something goes wrong.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SiteConfig {
    #[serde(default)]
    pub admin_email: String,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .map_err(|_| ConfigError::NotFound(path.as_ref().display().to_string()))?;

        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .map_err(|_| ConfigError::NotFound(path.as_ref().display().to_string()))?;

        let mut config: Config = toml::from_str(&content)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.api.validate()?;

        if self.cache.ttl == 0 {
            return Err(ConfigError::Config("Cache TTL must be greater than 0".to_string()));
        }

        if self.cache.max_entries == 0 {
            return Err(ConfigError::Config("Cache max entries must be greater than 0".to_string()));
        }

        if self.security.token_lifetime < 2 {
            return Err(ConfigError::Config("Token lifetime must be at least 2 seconds".to_string()));
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var("CUSTOMER_NEWS_API_KEY") {
            self.api.api_key = key;
        }

        if let Ok(endpoint) = std::env::var("CUSTOMER_NEWS_API_ENDPOINT") {
            self.api.api_endpoint = endpoint;
        }

        if let Ok(page_size) = std::env::var("CUSTOMER_NEWS_PAGE_SIZE") {
            if let Ok(val) = page_size.parse() {
                self.api.page_size = val;
            }
        }

        if let Ok(level) = std::env::var("CUSTOMER_NEWS_LOG_LEVEL") {
            self.logging.level = level;
        }
    }

    pub fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            cache: CacheSettings::default(),
            storage: StorageSettings::default(),
            logging: LoggingConfig::default(),
            security: SecurityConfig::default(),
            site: SiteConfig::default(),
        }
    }

    pub fn config_dir() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join("customer-news"))
            .ok_or_else(|| ConfigError::Config("Could not determine config directory".to_string()))
    }

    pub fn data_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.storage.data_dir {
            return Ok(dir.clone());
        }
        dirs::data_dir()
            .map(|dir| dir.join("customer-news"))
            .ok_or_else(|| ConfigError::Config("Could not determine data directory".to_string()))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.cache.cache_dir {
            return Ok(dir.clone());
        }
        dirs::cache_dir()
            .map(|dir| dir.join("customer-news"))
            .ok_or_else(|| ConfigError::Config("Could not determine cache directory".to_string()))
    }

    pub fn activity_log_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.logging.activity_log_dir {
            return Ok(dir.clone());
        }
        Ok(self.data_dir()?.join("logs"))
    }
}

impl ApiConfig {
    pub fn new(api_key: impl Into<String>, api_endpoint: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_endpoint: api_endpoint.into(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            return Err(ConfigError::Config("API key must not be empty".to_string()));
        }

        if self.api_endpoint.trim().is_empty() {
            return Err(ConfigError::Config("API endpoint must not be empty".to_string()));
        }

        let endpoint = url::Url::parse(&self.api_endpoint)
            .map_err(|_| ConfigError::InvalidUrl(self.api_endpoint.clone()))?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidUrl(format!(
                "API endpoint must use http or https: {}",
                self.api_endpoint
            )));
        }

        if !(MIN_PAGE_SIZE..=MAX_PAGE_SIZE).contains(&self.page_size) {
            return Err(ConfigError::Config(format!(
                "Page size must be between {} and {}, got {}",
                MIN_PAGE_SIZE, MAX_PAGE_SIZE, self.page_size
            )));
        }

        if self.timeout == 0 {
            return Err(ConfigError::Config("Timeout must be greater than 0".to_string()));
        }

        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout)
    }
}

impl CacheSettings {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl)
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_endpoint: default_api_endpoint(),
            page_size: default_page_size(),
            timeout: default_timeout(),
            http_timeout: default_http_timeout(),
            accept_invalid_certs: false,
            user_agent: default_user_agent(),
        }
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl: default_cache_ttl(),
            max_entries: default_max_entries(),
            persist: default_persist(),
            cache_dir: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            log_to_file: false,
            log_file: default_log_file(),
            json_format: false,
            activity_log_dir: None,
            activity_timestamps: default_activity_timestamps(),
        }
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            token_secret: String::new(),
            token_lifetime: default_token_lifetime(),
        }
    }
}

fn default_api_endpoint() -> String { "https://newsapi.org/v2/everything".to_string() }
fn default_page_size() -> usize { 5 }
fn default_timeout() -> u64 { 30 }
fn default_http_timeout() -> u64 { 3600 }
fn default_user_agent() -> String {
    format!("customer-news/{}", env!("CARGO_PKG_VERSION"))
}

fn default_cache_ttl() -> u64 { 4 * 60 * 60 }
fn default_max_entries() -> usize { 10_000 }
fn default_persist() -> bool { true }

fn default_log_level() -> String { "warn".to_string() }
fn default_log_file() -> String { "logs/customer-news.log".to_string() }
fn default_activity_timestamps() -> bool { true }

fn default_token_lifetime() -> u64 { 24 * 60 * 60 }
