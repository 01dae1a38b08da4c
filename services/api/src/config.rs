//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database_url: String,
    pub db_max_connections: u32,
    pub log_level: Level,
    pub openai_api_key: Option<String>,
    pub openai_api_base: Option<String>,
    /// Model used for basic chat queries and training tips.
    pub fast_model: String,
    /// Model used for training and complex chat queries.
    pub capable_model: String,
    pub plan_model: String,
    pub cors_origin: String,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key/value source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var_or = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        // --- Server and Database Settings ---
        let bind_address_str = var_or("BIND_ADDRESS", "0.0.0.0:3000");
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let database_url =
            lookup("DATABASE_URL").ok_or_else(|| ConfigError::MissingVar("DATABASE_URL".to_string()))?;

        let max_conn_str = var_or("DB_MAX_CONNECTIONS", "5");
        let db_max_connections = max_conn_str.parse::<u32>().map_err(|_| {
            ConfigError::InvalidValue(
                "DB_MAX_CONNECTIONS".to_string(),
                format!("'{}' is not a positive integer", max_conn_str),
            )
        })?;

        let log_level_str = var_or("RUST_LOG", "INFO");
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Language Model Settings ---
        let openai_api_key = lookup("OPENAI_API_KEY");
        let openai_api_base = lookup("OPENAI_API_BASE");
        let fast_model = var_or("FAST_MODEL", "gpt-3.5-turbo");
        let capable_model = var_or("CAPABLE_MODEL", "gpt-4-1106-preview");
        let plan_model = var_or("PLAN_MODEL", "gpt-3.5-turbo");

        let cors_origin = var_or("CORS_ORIGIN", "http://localhost:8081");

        Ok(Self {
            bind_address,
            database_url,
            db_max_connections,
            log_level,
            openai_api_key,
            openai_api_base,
            fast_model,
            capable_model,
            plan_model,
            cors_origin,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_only_database_is_set() {
        let config =
            Config::from_lookup(lookup_from(&[("DATABASE_URL", "postgres://localhost/dogs")]))
                .unwrap();
        assert_eq!(config.bind_address.port(), 3000);
        assert_eq!(config.log_level, Level::INFO);
        assert_eq!(config.fast_model, "gpt-3.5-turbo");
        assert_eq!(config.capable_model, "gpt-4-1106-preview");
        assert_eq!(config.db_max_connections, 5);
        assert!(config.openai_api_key.is_none());
    }

    #[test]
    fn missing_database_url_is_an_error() {
        let err = Config::from_lookup(lookup_from(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingVar(var) if var == "DATABASE_URL"));
    }

    #[test]
    fn bad_values_name_the_variable() {
        let err = Config::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://localhost/dogs"),
            ("RUST_LOG", "chatty"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(var, _) if var == "RUST_LOG"));
    }
}
