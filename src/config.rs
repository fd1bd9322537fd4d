//! Configuration module.
//!
//! Provides YAML-based configuration loading and validation for:
//! - Server settings (port, bind address)
//! - Database settings (url, writer channel and batching, retention)
//! - Event collector settings (endpoint, send policy)

mod app;
mod client;
mod validation;

pub use app::{AppConfig, DatabaseConfig, ServerConfig};
pub use client::CollectorConfig;
pub use validation::{ConfigError, expand_env_vars, parse_duration};

pub use app::{
    DEFAULT_CHANNEL_CAPACITY, DEFAULT_CONNECT_RETRIES, DEFAULT_DATABASE_URL,
    DEFAULT_WRITE_BATCH_SIZE, DEFAULT_WRITE_FLUSH_INTERVAL,
};
