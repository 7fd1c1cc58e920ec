//! Configuration management
//!
//! Defaults, then an optional TOML file, then `SB_*` environment overrides.
//! CLI flags are applied last by the binary.

use crate::core::error::{Error, Result};
use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Config file looked up in the working directory when none is given
pub const DEFAULT_CONFIG_FILE: &str = "studio-blocks.toml";

/// Longest accepted admin session lifetime
pub const MAX_SESSION_TTL: Duration = Duration::from_secs(365 * 24 * 3600);

/// Available storage backend types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageType {
    /// In-process DashMap storage, lost on restart
    Memory,
    /// SQLite database file under `data_dir`
    Sqlite,
}

impl std::str::FromStr for StorageType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(StorageType::Memory),
            "sqlite" => Ok(StorageType::Sqlite),
            other => Err(Error::config(format!(
                "Invalid storage type: {}. Valid options: memory, sqlite",
                other
            ))),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,

    /// Storage configuration
    pub storage: StorageConfig,

    /// Admin authentication
    pub admin: AdminConfig,

    /// Per-IP request limits for admin endpoints
    pub rate_limit: RateLimitConfig,

    /// Metrics configuration
    pub metrics: MetricsConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// HTTP server bind address
    pub http_addr: SocketAddr,

    /// Return internal error messages to clients (development only)
    pub expose_errors: bool,

    /// Allowed CORS origins; empty allows any origin
    pub cors_origins: Vec<String>,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Storage backend type
    pub storage_type: StorageType,

    /// Data directory path
    pub data_dir: PathBuf,

    /// SQLite file name inside `data_dir`
    pub database_file: String,
}

/// Admin session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Admin password; login is disabled while empty
    pub password: String,

    /// Session lifetime
    #[serde(
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub session_ttl: Duration,

    /// Name of the session cookie
    pub cookie_name: String,

    /// Mark the session cookie `Secure`
    pub secure_cookie: bool,
}

/// Rate limit configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Length of one counting window
    #[serde(
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub window: Duration,

    /// Requests allowed per client per window
    pub max_requests: u32,
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Serve Prometheus metrics at `/metrics`
    pub enabled: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (pretty, json)
    pub format: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            expose_errors: false,
            cors_origins: Vec::new(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            storage_type: StorageType::Memory,
            data_dir: PathBuf::from("./data"),
            database_file: "blocks.db".to_string(),
        }
    }
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            password: String::new(),
            session_ttl: Duration::from_secs(12 * 3600),
            cookie_name: "admin_session".to_string(),
            secure_cookie: true,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(60),
            max_requests: 30,
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl StorageConfig {
    /// Full path of the SQLite database file
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(&self.database_file)
    }
}

impl Config {
    /// Load configuration from an explicit file, or the default file if it
    /// exists, then apply environment overrides and validate.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let config = Self::from_file(path)?;
                tracing::info!("Loaded configuration from: {}", path);
                config
            }
            None if std::path::Path::new(DEFAULT_CONFIG_FILE).exists() => {
                let config = Self::from_file(DEFAULT_CONFIG_FILE)?;
                tracing::info!("Loaded configuration from: {}", DEFAULT_CONFIG_FILE);
                config
            }
            None => {
                tracing::info!("No config file found, using defaults");
                Config::default()
            }
        };

        config.apply_env_overrides()?;
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("Failed to read config file: {}", e)))?;

        Self::from_toml(&contents)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(contents: &str) -> Result<Self> {
        toml::from_str(contents)
            .map_err(|e| Error::config(format!("Failed to parse config file: {}", e)))
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup; split out so tests avoid the process environment
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(addr) = lookup("SB_HTTP_ADDR") {
            self.server.http_addr = addr
                .parse()
                .map_err(|e| Error::config(format!("Invalid HTTP address: {}", e)))?;
        }

        if let Some(storage_type) = lookup("SB_STORAGE_TYPE") {
            self.storage.storage_type = storage_type.parse()?;
        }

        if let Some(data_dir) = lookup("SB_DATA_DIR") {
            self.storage.data_dir = PathBuf::from(data_dir);
        }

        if let Some(password) = lookup("SB_ADMIN_PASSWORD") {
            self.admin.password = password;
        }

        if let Some(level) = lookup("SB_LOG_LEVEL") {
            self.logging.level = level;
        }

        if let Some(format) = lookup("SB_LOG_FORMAT") {
            self.logging.format = format;
        }

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.rate_limit.max_requests == 0 {
            return Err(Error::config("rate_limit.max_requests must be at least 1"));
        }

        if self.rate_limit.window.is_zero() {
            return Err(Error::config("rate_limit.window must be non-zero"));
        }

        if self.admin.session_ttl.is_zero() {
            return Err(Error::config("admin.session_ttl must be non-zero"));
        }

        if self.admin.session_ttl > MAX_SESSION_TTL {
            return Err(Error::config("admin.session_ttl must be at most 365 days"));
        }

        if self.admin.cookie_name.trim().is_empty() {
            return Err(Error::config("admin.cookie_name must not be empty"));
        }

        match self.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => return Err(Error::config("Invalid log level")),
        }

        match self.logging.format.as_str() {
            "pretty" | "json" => {}
            _ => return Err(Error::config("Invalid log format")),
        }

        Ok(())
    }
}

// Custom deserializer for Duration from string
fn deserialize_duration<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    struct DurationVisitor;

    impl<'de> Visitor<'de> for DurationVisitor {
        type Value = Duration;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a duration string like '30s' or '5m', or seconds")
        }

        fn visit_str<E>(self, value: &str) -> std::result::Result<Duration, E>
        where
            E: de::Error,
        {
            parse_duration(value).map_err(E::custom)
        }

        fn visit_u64<E>(self, value: u64) -> std::result::Result<Duration, E>
        where
            E: de::Error,
        {
            Ok(Duration::from_secs(value))
        }

        fn visit_i64<E>(self, value: i64) -> std::result::Result<Duration, E>
        where
            E: de::Error,
        {
            u64::try_from(value)
                .map(Duration::from_secs)
                .map_err(|_| E::custom("duration must not be negative"))
        }
    }

    deserializer.deserialize_any(DurationVisitor)
}

fn serialize_duration<S>(duration: &Duration, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    if duration.subsec_millis() == 0 {
        serializer.serialize_str(&format!("{}s", duration.as_secs()))
    } else {
        serializer.serialize_str(&format!("{}ms", duration.as_millis()))
    }
}

/// Parse durations such as `500ms`, `30s`, `5m`, `12h` or bare seconds
pub fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        let ms: u64 = ms.parse().map_err(|_| "Invalid milliseconds")?;
        Ok(Duration::from_millis(ms))
    } else if let Some(secs) = s.strip_suffix('s') {
        let secs: u64 = secs.parse().map_err(|_| "Invalid seconds")?;
        Ok(Duration::from_secs(secs))
    } else if let Some(mins) = s.strip_suffix('m') {
        let mins: u64 = mins.parse().map_err(|_| "Invalid minutes")?;
        let secs = mins.checked_mul(60).ok_or("Duration too large")?;
        Ok(Duration::from_secs(secs))
    } else if let Some(hours) = s.strip_suffix('h') {
        let hours: u64 = hours.parse().map_err(|_| "Invalid hours")?;
        let secs = hours.checked_mul(3600).ok_or("Duration too large")?;
        Ok(Duration::from_secs(secs))
    } else {
        let secs: u64 = s.parse().map_err(|_| "Invalid duration format")?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.storage.storage_type, StorageType::Memory);
        assert_eq!(config.rate_limit.max_requests, 30);
        assert_eq!(config.admin.session_ttl, Duration::from_secs(43_200));
    }

    #[test]
    fn test_parse_duration_units() {
        assert_eq!(parse_duration("250ms"), Ok(Duration::from_millis(250)));
        assert_eq!(parse_duration("30s"), Ok(Duration::from_secs(30)));
        assert_eq!(parse_duration("5m"), Ok(Duration::from_secs(300)));
        assert_eq!(parse_duration("2h"), Ok(Duration::from_secs(7200)));
        assert_eq!(parse_duration("15"), Ok(Duration::from_secs(15)));
        assert!(parse_duration("soon").is_err());
    }

    #[test]
    fn test_parse_duration_rejects_overflow() {
        let huge = format!("{}h", u64::MAX / 1000);
        assert_eq!(parse_duration(&huge), Err("Duration too large".to_string()));
        assert!(parse_duration(&format!("{}m", u64::MAX)).is_err());
        assert!(parse_duration(&format!("{}s", u64::MAX)).is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml(
            r#"
            [storage]
            storage_type = "Sqlite"
            data_dir = "/var/lib/studio"

            [rate_limit]
            window = "10s"
            max_requests = 5

            [admin]
            password = "hunter2"
            session_ttl = 3600
            "#,
        )
        .unwrap();

        assert_eq!(config.storage.storage_type, StorageType::Sqlite);
        assert_eq!(
            config.storage.database_path(),
            PathBuf::from("/var/lib/studio/blocks.db")
        );
        assert_eq!(config.rate_limit.window, Duration::from_secs(10));
        assert_eq!(config.rate_limit.max_requests, 5);
        assert_eq!(config.admin.session_ttl, Duration::from_secs(3600));
        assert_eq!(config.admin.cookie_name, "admin_session");
        assert_eq!(config.server.http_addr.port(), 8080);
    }

    #[test]
    fn test_overrides_apply() {
        let env: HashMap<&str, &str> = [
            ("SB_HTTP_ADDR", "127.0.0.1:9000"),
            ("SB_STORAGE_TYPE", "sqlite"),
            ("SB_ADMIN_PASSWORD", "secret"),
            ("SB_LOG_LEVEL", "debug"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config
            .apply_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.server.http_addr.port(), 9000);
        assert_eq!(config.storage.storage_type, StorageType::Sqlite);
        assert_eq!(config.admin.password, "secret");
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_invalid_override_is_config_error() {
        let mut config = Config::default();
        let result = config.apply_overrides(|key| {
            (key == "SB_STORAGE_TYPE").then(|| "postgres".to_string())
        });
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.rate_limit.max_requests = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.logging.level = "verbose".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.logging.format = "xml".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.admin.session_ttl = MAX_SESSION_TTL + Duration::from_secs(1);
        assert!(config.validate().is_err());
        config.admin.session_ttl = MAX_SESSION_TTL;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serializes_back_to_toml() {
        let text = toml::to_string(&Config::default()).unwrap();
        let parsed = Config::from_toml(&text).unwrap();
        assert_eq!(parsed.rate_limit.window, Duration::from_secs(60));
        assert_eq!(parsed.admin.session_ttl, Duration::from_secs(43_200));
    }
}
