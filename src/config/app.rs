//! Application configuration structures.

use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::client::CollectorConfig;
use super::validation::{ConfigError, expand_env_vars};

// =============================================================================
// Constants
// =============================================================================

/// Default database URL.
pub const DEFAULT_DATABASE_URL: &str = "sqlite:tracker.db?mode=rwc";

/// Default writer channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 10_000;

/// Default writer batch size.
pub const DEFAULT_WRITE_BATCH_SIZE: usize = 500;

/// Default writer batch flush interval.
pub const DEFAULT_WRITE_FLUSH_INTERVAL: Duration = Duration::from_secs(1);

/// Default connection attempts before giving up on the database.
pub const DEFAULT_CONNECT_RETRIES: u32 = 10;

// =============================================================================
// Server Configuration
// =============================================================================

/// Ingest server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server bind address (default: "0.0.0.0").
    pub bind: String,

    /// Server port (default: 8001).
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 8001,
        }
    }
}

// =============================================================================
// Database Configuration
// =============================================================================

/// Database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Connection URL, e.g. `sqlite:data/tracker.db?mode=rwc`.
    pub url: String,

    /// Writer channel capacity (default: 10000).
    pub channel_capacity: usize,

    /// Buffered tracks that trigger a write (default: 500).
    pub batch_size: usize,

    /// Maximum age of buffered tracks before a write (default: 1s).
    #[serde(with = "humantime_serde")]
    pub batch_flush_interval: Duration,

    /// Connection attempts, one second apart (default: 10).
    pub connect_retries: u32,

    /// Delete tracks older than this many days; unset keeps everything.
    pub retention_days: Option<u32>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_DATABASE_URL.to_string(),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            batch_size: DEFAULT_WRITE_BATCH_SIZE,
            batch_flush_interval: DEFAULT_WRITE_FLUSH_INTERVAL,
            connect_retries: DEFAULT_CONNECT_RETRIES,
            retention_days: None,
        }
    }
}

// =============================================================================
// Application Configuration
// =============================================================================

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Ingest server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Collector settings used by `tracker emit`.
    #[serde(default)]
    pub client: Option<CollectorConfig>,
}

impl AppConfig {
    /// Load configuration from a YAML file.
    ///
    /// `${VAR}` and `${VAR:-default}` are expanded before parsing.
    ///
    /// # Errors
    /// Returns `ConfigError` if the file cannot be read, parsed, or validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Parse and validate configuration from YAML text.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(&expand_env_vars(content))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    /// Returns `ConfigError::ValidationError` if any field is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.bind.parse::<IpAddr>().map_err(|_| {
            ConfigError::ValidationError(format!(
                "invalid server bind address: '{}'",
                self.server.bind
            ))
        })?;

        if self.server.port == 0 {
            return Err(ConfigError::ValidationError(
                "server port must be non-zero".to_string(),
            ));
        }

        if self.database.url.is_empty() {
            return Err(ConfigError::ValidationError(
                "database url cannot be empty".to_string(),
            ));
        }

        if self.database.channel_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "database channel_capacity must be positive".to_string(),
            ));
        }

        if self.database.batch_size == 0 {
            return Err(ConfigError::ValidationError(
                "database batch_size must be positive".to_string(),
            ));
        }

        if self.database.connect_retries == 0 {
            return Err(ConfigError::ValidationError(
                "database connect_retries must be positive".to_string(),
            ));
        }

        if let Some(ref client) = self.client {
            client.validate()?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.bind, "0.0.0.0");
        assert_eq!(config.port, 8001);
    }

    #[test]
    fn test_database_config_default() {
        let config = DatabaseConfig::default();
        assert_eq!(config.url, DEFAULT_DATABASE_URL);
        assert_eq!(config.channel_capacity, DEFAULT_CHANNEL_CAPACITY);
        assert_eq!(config.batch_size, DEFAULT_WRITE_BATCH_SIZE);
        assert_eq!(config.connect_retries, DEFAULT_CONNECT_RETRIES);
        assert!(config.retention_days.is_none());
    }

    #[test]
    fn test_from_yaml_full() {
        let yaml = r#"
server:
  bind: 127.0.0.1
  port: 9000
database:
  url: "sqlite::memory:"
  batch_flush_interval: 250ms
  retention_days: 30
client:
  endpoint: http://127.0.0.1:9000/track
"#;
        let config = AppConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.database.url, "sqlite::memory:");
        assert_eq!(
            config.database.batch_flush_interval,
            Duration::from_millis(250)
        );
        assert_eq!(config.database.retention_days, Some(30));
        assert_eq!(config.database.batch_size, DEFAULT_WRITE_BATCH_SIZE);
        let client = config.client.unwrap();
        assert_eq!(client.endpoint, "http://127.0.0.1:9000/track");
        assert_eq!(client.batch_size, 3);
    }

    #[test]
    fn test_load_bundled_config() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/configs/config.yaml");
        let config = AppConfig::load(path).unwrap();
        assert_eq!(config.database.batch_size, DEFAULT_WRITE_BATCH_SIZE);
        assert_eq!(config.client.unwrap().navigation_event, "click-link");
    }

    #[test]
    fn test_load_missing_file() {
        assert!(matches!(
            AppConfig::load("/nonexistent/tracker.yaml"),
            Err(ConfigError::IoError(_))
        ));
    }

    #[test]
    fn test_from_yaml_empty_sections() {
        let config = AppConfig::from_yaml("{}").unwrap();
        assert_eq!(config.server.port, 8001);
        assert!(config.client.is_none());
    }

    #[test]
    fn test_from_yaml_expands_env() {
        let yaml = "database:\n  url: \"sqlite:${TRACKER_TEST_UNSET_DB_4410:-env.db}\"\n";
        let config = AppConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.database.url, "sqlite:env.db");
    }

    #[test]
    fn test_config_validation_invalid_port() {
        let mut config = AppConfig::default();
        config.server.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_invalid_bind_address() {
        let mut config = AppConfig::default();
        config.server.bind = "not-an-ip".to_string();

        let result = config.validate();
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("invalid server bind address")
        );
    }

    #[test]
    fn test_config_validation_invalid_client() {
        let mut config = AppConfig::default();
        config.client = Some(CollectorConfig::new("not a url"));
        assert!(config.validate().is_err());
    }
}
