//! Application configuration

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use serde_with::serde_as;

use crate::errors::AppError;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub sender: SenderConfig,
    #[serde(default)]
    pub receiver: ReceiverConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 3000)),
        }
    }
}

/// Where location records are kept
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Postgres,
    Memory,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DatabaseConfig {
    pub backend: StoreBackend,
    pub url: Option<String>,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Postgres,
            url: None,
            max_connections: 5,
        }
    }
}

#[serde_as]
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ClientConfig {
    pub base_url: String,
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            request_timeout: Duration::from_secs(10),
        }
    }
}

#[serde_as]
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SenderConfig {
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub update_interval: Duration,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            update_interval: Duration::from_secs(5),
        }
    }
}

#[serde_as]
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ReceiverConfig {
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub poll_interval: Duration,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(3),
        }
    }
}

impl AppConfig {
    /// Load `config/default` (if present) overlaid with environment variables
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load from an explicit file instead of `config/default`
    pub fn load_from(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name("config/default").required(false),
        };

        let config = Config::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix("LOCRELAY")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Validate every section
    pub fn validate(&self) -> Result<(), AppError> {
        self.database.validate()?;
        self.client.validate()?;
        validate_interval("sender.update_interval", self.sender.update_interval)?;
        validate_interval("receiver.poll_interval", self.receiver.poll_interval)?;
        Ok(())
    }
}

impl DatabaseConfig {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.max_connections == 0 {
            return Err(AppError::ConfigurationError {
                message: "database.max_connections must be greater than zero".to_string(),
            });
        }
        if self.backend == StoreBackend::Postgres
            && self.url.as_deref().map_or(true, |url| url.trim().is_empty())
        {
            return Err(AppError::ConfigurationError {
                message: "database.url cannot be empty for the postgres backend".to_string(),
            });
        }
        Ok(())
    }
}

impl ClientConfig {
    pub fn validate(&self) -> Result<(), AppError> {
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(AppError::ConfigurationError {
                message: format!("client.base_url must be an http(s) URL: {}", self.base_url),
            });
        }
        validate_interval("client.request_timeout", self.request_timeout)
    }
}

fn validate_interval(name: &str, value: Duration) -> Result<(), AppError> {
    if value.is_zero() {
        return Err(AppError::ConfigurationError {
            message: format!("{name} must be greater than zero"),
        });
    }
    Ok(())
}
