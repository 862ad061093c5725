//! Configuration management for the docgate ingest gateway.

use std::{env, net::SocketAddr, str::FromStr, time::Duration};

use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgPoolOptions;

use crate::{
    middleware::auth::ApiKeyAuth,
    sources::{default_sources, SourceConfig, SourceRegistry},
    state::Limits,
};

const CONFIG_FILE: &str = "config.toml";

/// Settings read verbatim from the environment. Figment's environment
/// provider would otherwise turn a numeric-looking secret into an integer.
const VERBATIM_ENV_KEYS: [&str; 2] = ["API_SECRET", "DATABASE_URL"];

/// Complete service configuration with defaults, file, and environment
/// overrides.
///
/// Configuration is loaded in priority order:
/// 1. Environment variables (highest priority)
/// 2. Configuration file (`config.toml`)
/// 3. Built-in defaults (lowest priority)
///
/// Source descriptors can only be customized in `config.toml`.
///
/// # Example
///
/// ```no_run
/// use docgate_api::Config;
///
/// let config = Config::load().expect("Failed to load configuration");
///
/// println!("Server will bind to {}:{}", config.host, config.port);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Database
    /// PostgreSQL connection URL. When unset the service still starts but
    /// every storage operation fails with a configuration error.
    ///
    /// Environment variable: `DATABASE_URL`
    #[serde(default, alias = "DATABASE_URL", skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,
    /// Maximum number of database connections in the pool.
    ///
    /// Environment variable: `DATABASE_MAX_CONNECTIONS`
    #[serde(default = "default_max_connections", alias = "DATABASE_MAX_CONNECTIONS")]
    pub database_max_connections: u32,
    /// Minimum number of connections to maintain in the pool.
    ///
    /// Environment variable: `DATABASE_MIN_CONNECTIONS`
    #[serde(default = "default_min_connections", alias = "DATABASE_MIN_CONNECTIONS")]
    pub database_min_connections: u32,
    /// Database connection acquire timeout in seconds.
    ///
    /// Environment variable: `DATABASE_CONNECTION_TIMEOUT`
    #[serde(default = "default_acquire_timeout", alias = "DATABASE_CONNECTION_TIMEOUT")]
    pub database_connection_timeout: u64,
    /// Database connection idle timeout in seconds.
    ///
    /// Environment variable: `DATABASE_IDLE_TIMEOUT`
    #[serde(default = "default_idle_timeout", alias = "DATABASE_IDLE_TIMEOUT")]
    pub database_idle_timeout: u64,
    /// Maximum lifetime of database connections in seconds.
    ///
    /// Environment variable: `DATABASE_MAX_LIFETIME`
    #[serde(default = "default_max_lifetime", alias = "DATABASE_MAX_LIFETIME")]
    pub database_max_lifetime: u64,

    // Auth
    /// Shared secret callers present in `x-api-key`. When unset every
    /// authenticated request is rejected.
    ///
    /// Environment variable: `API_SECRET`
    #[serde(default, alias = "API_SECRET", skip_serializing_if = "Option::is_none")]
    pub api_secret: Option<String>,
    /// Whether 401 bodies include `error: "Unauthorized"`.
    ///
    /// Environment variable: `AUTH_ERROR_MESSAGE`
    #[serde(default = "default_auth_error_message", alias = "AUTH_ERROR_MESSAGE")]
    pub auth_error_message: bool,

    // Server
    /// Server bind address.
    ///
    /// Environment variable: `HOST`
    #[serde(default = "default_host", alias = "HOST")]
    pub host: String,
    /// Server bind port.
    ///
    /// Environment variable: `PORT`
    #[serde(default = "default_port", alias = "PORT")]
    pub port: u16,
    /// HTTP request timeout in seconds.
    ///
    /// Environment variable: `REQUEST_TIMEOUT`
    #[serde(default = "default_request_timeout", alias = "REQUEST_TIMEOUT")]
    pub request_timeout: u64,
    /// Per-call storage deadline in seconds.
    ///
    /// Environment variable: `STORAGE_TIMEOUT`
    #[serde(default = "default_storage_timeout", alias = "STORAGE_TIMEOUT")]
    pub storage_timeout: u64,
    /// Maximum request body size in bytes.
    ///
    /// Environment variable: `MAX_BODY_BYTES`
    #[serde(default = "default_max_body_bytes", alias = "MAX_BODY_BYTES")]
    pub max_body_bytes: usize,

    // Logging
    /// Log level configuration.
    ///
    /// Environment variable: `RUST_LOG`
    #[serde(default = "default_log_level", alias = "RUST_LOG")]
    pub rust_log: String,

    // Sources
    /// Integration source descriptors.
    #[serde(default = "default_sources")]
    pub sources: Vec<SourceConfig>,
}

impl Config {
    /// Load configuration from defaults, config file, and environment
    /// variable overrides.
    ///
    /// # Errors
    ///
    /// Fails when a value cannot be parsed or [`Config::validate`] rejects
    /// the result.
    pub fn load() -> Result<Self> {
        let mut figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(CONFIG_FILE))
            .merge(Env::prefixed(""));

        for key in VERBATIM_ENV_KEYS {
            if let Ok(value) = env::var(key) {
                figment = figment.merge(Serialized::default(&key.to_lowercase(), value));
            }
        }

        let config: Self = figment.extract().context("Failed to load configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Parse server socket address from host and port configuration.
    ///
    /// # Errors
    ///
    /// Fails if `host:port` is not a valid socket address.
    pub fn parse_server_addr(&self) -> Result<SocketAddr> {
        let addr_str = format!("{}:{}", self.host, self.port);
        SocketAddr::from_str(&addr_str).context("Invalid server address")
    }

    /// Get database URL with password masked for logging.
    pub fn database_url_masked(&self) -> Option<String> {
        let url = self.database_url.as_ref()?;
        if let Some(at_pos) = url.rfind('@') {
            if let Some(colon_pos) = url[..at_pos].rfind(':') {
                let scheme_end = url.find("://").map_or(0, |pos| pos + 3);
                if colon_pos >= scheme_end {
                    let mut masked = url.clone();
                    masked.replace_range(colon_pos + 1..at_pos, "***");
                    return Some(masked);
                }
            }
        }
        Some(url.clone())
    }

    /// Pool settings for the document store connection.
    pub fn pool_options(&self) -> PgPoolOptions {
        PgPoolOptions::new()
            .max_connections(self.database_max_connections)
            .min_connections(self.database_min_connections)
            .acquire_timeout(Duration::from_secs(self.database_connection_timeout))
            .idle_timeout(Duration::from_secs(self.database_idle_timeout))
            .max_lifetime(Duration::from_secs(self.database_max_lifetime))
    }

    /// Request limits and deadlines.
    pub fn limits(&self) -> Limits {
        Limits {
            request_timeout: Duration::from_secs(self.request_timeout),
            storage_timeout: Duration::from_secs(self.storage_timeout),
            max_body_bytes: self.max_body_bytes,
        }
    }

    /// Builds the validated source registry.
    ///
    /// # Errors
    ///
    /// Fails if any descriptor is invalid.
    pub fn source_registry(&self) -> Result<SourceRegistry> {
        SourceRegistry::from_configs(&self.sources).context("Invalid source configuration")
    }

    /// Builds the shared-secret authorizer.
    pub fn api_key_auth(&self) -> ApiKeyAuth {
        ApiKeyAuth::new(self.api_secret.as_deref(), self.auth_error_message)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns the first violated constraint.
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            anyhow::bail!("port must be greater than 0");
        }

        if self.database_max_connections == 0 {
            anyhow::bail!("database max_connections must be greater than 0");
        }

        if self.database_min_connections > self.database_max_connections {
            anyhow::bail!("database min_connections cannot exceed max_connections");
        }

        if self.request_timeout == 0 {
            anyhow::bail!("request_timeout must be greater than 0");
        }

        if self.storage_timeout == 0 {
            anyhow::bail!("storage_timeout must be greater than 0");
        }

        if self.max_body_bytes == 0 {
            anyhow::bail!("max_body_bytes must be greater than 0");
        }

        self.source_registry()?;

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            database_max_connections: default_max_connections(),
            database_min_connections: default_min_connections(),
            database_connection_timeout: default_acquire_timeout(),
            database_idle_timeout: default_idle_timeout(),
            database_max_lifetime: default_max_lifetime(),
            api_secret: None,
            auth_error_message: default_auth_error_message(),
            host: default_host(),
            port: default_port(),
            request_timeout: default_request_timeout(),
            storage_timeout: default_storage_timeout(),
            max_body_bytes: default_max_body_bytes(),
            rust_log: default_log_level(),
            sources: default_sources(),
        }
    }
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    0
}

fn default_acquire_timeout() -> u64 {
    10
}

fn default_idle_timeout() -> u64 {
    600
}

fn default_max_lifetime() -> u64 {
    1800
}

fn default_auth_error_message() -> bool {
    true
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_request_timeout() -> u64 {
    30
}

fn default_storage_timeout() -> u64 {
    10
}

fn default_max_body_bytes() -> usize {
    1024 * 1024
}

fn default_log_level() -> String {
    "info,docgate=debug,tower_http=debug".to_string()
}
