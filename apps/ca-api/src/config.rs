//! Server configuration loaded from environment variables.
//!
//! Loading is fail-fast: a present but invalid variable stops startup with
//! a clear message. The engine itself is configured by the YAML file named
//! in `CA_CONFIG`.

use std::env;

use thiserror::Error;
use xavyo_ca::CaConfig;

/// Highest Snowflake node identifier.
const MAX_NODE_ID: u16 = 1023;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {message}")]
    InvalidValue { var: String, message: String },

    #[error("Failed to parse number: {0}")]
    InvalidNumber(#[from] std::num::ParseIntError),
}

/// Server settings.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    /// Path of the engine YAML configuration.
    pub ca_config_path: String,
    /// PostgreSQL URL; the in-memory store is used when absent.
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub log_filter: String,
    /// Snowflake node of this replica.
    pub node_id: u16,
}

impl AppConfig {
    /// Load configuration from the environment.
    ///
    /// # Optional Variables
    ///
    /// - `CA_HOST` - Bind address (default: "0.0.0.0")
    /// - `CA_PORT` - Listen port (default: 8080)
    /// - `CA_CONFIG` - Engine configuration file (default: "./config/ca.yaml")
    /// - `DATABASE_URL` - PostgreSQL connection string
    /// - `DATABASE_MAX_CONNECTIONS` - Pool size (default: 10)
    /// - `LOG_FILTER` - Log filter when `RUST_LOG` is unset (default: "info,xavyo_ca=debug")
    /// - `CA_NODE_ID` - Snowflake node, 0 to 1023 (default: 0)
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (development only)
        let _ = dotenvy::dotenv();

        let host = env::var("CA_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());

        let port: u16 = env::var("CA_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()?;
        if port == 0 {
            return Err(ConfigError::InvalidValue {
                var: "CA_PORT".to_string(),
                message: "Port must be between 1 and 65535".to_string(),
            });
        }

        let database_url = env::var("DATABASE_URL").ok().filter(|u| !u.is_empty());

        let database_max_connections: u32 = env::var("DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()?;

        let log_filter =
            env::var("LOG_FILTER").unwrap_or_else(|_| "info,xavyo_ca=debug".to_string());

        let node_id: u16 = env::var("CA_NODE_ID")
            .unwrap_or_else(|_| "0".to_string())
            .parse()?;
        if node_id > MAX_NODE_ID {
            return Err(ConfigError::InvalidValue {
                var: "CA_NODE_ID".to_string(),
                message: format!("Node id must be between 0 and {MAX_NODE_ID}"),
            });
        }

        Ok(Self {
            host,
            port,
            ca_config_path: CaConfig::config_path(),
            database_url,
            database_max_connections,
            log_filter,
            node_id,
        })
    }

    /// Socket address to bind.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_addr() {
        let config = AppConfig {
            host: "127.0.0.1".to_string(),
            port: 9443,
            ca_config_path: "ca.yaml".to_string(),
            database_url: None,
            database_max_connections: 10,
            log_filter: "info".to_string(),
            node_id: 0,
        };
        assert_eq!(config.bind_addr(), "127.0.0.1:9443");
    }
}
