use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{HaulerError, Result};

/// Hauler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HaulerConfig {
    /// Root directory content is pushed into
    pub store_dir: PathBuf,

    /// Layer cache directory (no caching when unset)
    pub cache_dir: Option<PathBuf>,

    /// Log level
    pub log_level: LogLevel,

    /// Registry access
    pub registry: RegistryConfig,
}

impl Default for HaulerConfig {
    fn default() -> Self {
        Self {
            store_dir: PathBuf::from("./store"),
            cache_dir: None,
            log_level: LogLevel::Info,
            registry: RegistryConfig::default(),
        }
    }
}

impl HaulerConfig {
    /// Load configuration from a YAML or JSON file.
    ///
    /// Files ending in `.json` are parsed as JSON, everything else as YAML.
    pub fn from_file(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .map_err(|e| HaulerError::io(format!("read config {}", path.display()), e))?;

        let is_json = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        let config = if is_json {
            serde_json::from_str(&data)?
        } else {
            serde_yaml::from_str(&data)?
        };
        Ok(config)
    }

    /// Build configuration from defaults overlaid with environment variables.
    ///
    /// Reads `HAULER_STORE_DIR`, `HAULER_CACHE_DIR`, `HAULER_LOG_LEVEL`,
    /// `HAULER_REGISTRY_INSECURE`, `REGISTRY_USERNAME` and `REGISTRY_PASSWORD`.
    pub fn from_env() -> Result<Self> {
        Self::default().with_env_overrides(|key| std::env::var(key).ok())
    }

    fn with_env_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(dir) = lookup("HAULER_STORE_DIR") {
            self.store_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("HAULER_CACHE_DIR") {
            self.cache_dir = Some(PathBuf::from(dir));
        }
        if let Some(level) = lookup("HAULER_LOG_LEVEL") {
            self.log_level = level.parse()?;
        }
        if let Some(insecure) = lookup("HAULER_REGISTRY_INSECURE") {
            self.registry.insecure = matches!(
                insecure.to_ascii_lowercase().as_str(),
                "1" | "true" | "yes"
            );
        }
        let username = lookup("REGISTRY_USERNAME");
        let password = lookup("REGISTRY_PASSWORD");
        if username.is_some() && password.is_some() {
            self.registry.username = username;
            self.registry.password = password;
        }
        Ok(self)
    }
}

/// Registry configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Talk plain HTTP to registries
    pub insecure: bool,

    /// Basic auth username
    pub username: Option<String>,

    /// Basic auth password
    pub password: Option<String>,
}

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Debug => write!(f, "debug"),
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = HaulerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            other => Err(HaulerError::Config(format!(
                "unknown log level: '{}' (supported: debug, info, warn, error)",
                other
            ))),
        }
    }
}
