//! Configuration loading and validation for the sitewatch server

use serde::{Deserialize, Serialize};
use sitecheck::{BatchConfig, CheckerConfig, SiteId, TrackedSite};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use validator::{Validate, ValidationError, ValidationErrors};

/// Environment variable naming an explicit configuration file
pub const CONFIG_ENV: &str = "SITEWATCH_CONFIG";

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(#[from] ValidationErrors),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerSettings,

    #[serde(default)]
    pub checker: CheckerConfig,

    #[serde(default)]
    pub batch: BatchConfig,

    #[serde(default)]
    pub schedule: ScheduleSettings,

    #[serde(default)]
    pub logging: LoggingSettings,

    /// Sites tracked from startup
    #[serde(default)]
    pub sites: Vec<SiteSeed>,
}

impl Validate for Config {
    fn validate(&self) -> Result<(), ValidationErrors> {
        self.server.validate()?;
        self.schedule.validate()?;
        for site in &self.sites {
            site.validate()?;
        }

        let mut errors = ValidationErrors::new();

        if !(1..=1024).contains(&self.batch.concurrency) {
            errors.add("concurrency", ValidationError::new("concurrency_out_of_range"));
        }
        if let Some(deadline) = self.batch.deadline {
            if let Err(e) = validate_deadline(&deadline) {
                errors.add("deadline", e);
            }
        }
        for (field, timeout) in [
            ("http_timeout", self.checker.http_timeout),
            ("tls_timeout", self.checker.tls_timeout),
            ("whois_timeout", self.checker.whois_timeout),
            ("probe_deadline", self.checker.probe_deadline),
        ] {
            if let Err(e) = validate_timeout(&timeout) {
                errors.add(field, e);
            }
        }

        let mut seen = HashSet::new();
        if self.sites.iter().any(|site| !seen.insert(site.id)) {
            errors.add("sites", ValidationError::new("duplicate_site_id"));
        }

        if errors.errors().is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Server-level settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ServerSettings {
    /// Address for the metrics and status endpoint
    #[validate(custom = "validate_listen_addr")]
    pub listen_addr: String,
}

/// Periodic check settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ScheduleSettings {
    pub enabled: bool,

    #[serde(with = "humantime_serde")]
    #[validate(custom = "validate_interval")]
    pub interval: Duration,

    /// Check every site once at startup instead of waiting one interval
    pub run_on_start: bool,
}

/// Logging settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingSettings {
    pub level: Option<String>,
    pub format: Option<String>,
}

/// A site tracked from startup
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SiteSeed {
    pub id: SiteId,

    #[validate(length(min = 1))]
    pub name: String,

    #[validate(custom = "validate_site_url")]
    pub url: String,
}

impl SiteSeed {
    pub fn to_tracked_site(&self) -> TrackedSite {
        TrackedSite::new(self.id, self.name.clone(), self.url.clone())
    }
}

// Default implementations

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:9464".to_string(),
        }
    }
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(300),
            run_on_start: true,
        }
    }
}

// Custom validators

fn validate_listen_addr(addr: &str) -> Result<(), ValidationError> {
    addr.trim()
        .parse::<SocketAddr>()
        .map(|_| ())
        .map_err(|_| ValidationError::new("listen_addr_invalid"))
}

fn validate_interval(interval: &Duration) -> Result<(), ValidationError> {
    let secs = interval.as_secs();
    if !(5..=86_400).contains(&secs) {
        return Err(ValidationError::new("interval_out_of_range"));
    }
    Ok(())
}

fn validate_timeout(timeout: &Duration) -> Result<(), ValidationError> {
    let millis = timeout.as_millis();
    if !(100..=120_000).contains(&millis) {
        return Err(ValidationError::new("timeout_out_of_range"));
    }
    Ok(())
}

fn validate_deadline(deadline: &Duration) -> Result<(), ValidationError> {
    if deadline.as_secs() < 1 || deadline.as_secs() > 3_600 {
        return Err(ValidationError::new("deadline_out_of_range"));
    }
    Ok(())
}

/// Absolute http(s) URL with a host
pub fn validate_site_url(url: &str) -> Result<(), ValidationError> {
    let parsed =
        reqwest::Url::parse(url.trim()).map_err(|_| ValidationError::new("site_url_invalid"))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ValidationError::new("site_url_scheme"));
    }
    if sitecheck::target::hostname(url).is_none() {
        return Err(ValidationError::new("site_url_no_host"));
    }
    Ok(())
}

// Configuration loading implementation

impl Config {
    /// Load configuration from `SITEWATCH_CONFIG` or the default search paths
    pub fn load() -> Result<Self, ConfigError> {
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            let path = PathBuf::from(path);
            if !path.is_file() {
                return Err(ConfigError::FileNotFound(path));
            }
            tracing::info!("Loading configuration from: {}", path.display());
            return Self::load_from_file(&path);
        }

        match Self::find_config_file() {
            Some(path) => {
                tracing::info!("Loading configuration from: {}", path.display());
                Self::load_from_file(&path)
            }
            None => {
                tracing::info!("No configuration file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&contents)
    }

    /// Parse and validate configuration from YAML text
    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Find configuration file in standard locations
    fn find_config_file() -> Option<PathBuf> {
        let mut paths = vec![PathBuf::from("/etc/sitewatch/sitewatch.yaml")];

        if let Some(home_path) = Self::home_config_path() {
            paths.push(home_path);
        }

        paths.push(PathBuf::from("./sitewatch.yaml"));

        paths.into_iter().find(|p: &PathBuf| p.is_file())
    }

    /// Get home directory config path
    fn home_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".config/sitewatch/sitewatch.yaml"))
    }

    /// Log level, defaulting to info
    pub fn log_level(&self) -> &str {
        self.logging.level.as_deref().unwrap_or("info")
    }
}
