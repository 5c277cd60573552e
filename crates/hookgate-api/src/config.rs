//! Configuration management for the hookgate service.

use std::{fmt, net::SocketAddr, str::FromStr, time::Duration};

use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::{routes::RouteTable, PipelineSettings};

const CONFIG_FILE: &str = "hookgate.toml";

/// Service configuration with defaults, file, and environment overrides.
///
/// Configuration is loaded in priority order:
/// 1. Environment variables (highest priority)
/// 2. Configuration file (`hookgate.toml`)
/// 3. Built-in defaults (lowest priority)
///
/// `api_key` and `webhook_secret` have no usable default and must be
/// provided by one of the first two sources.
///
/// # Example
///
/// ```no_run
/// use hookgate_api::Config;
///
/// let config = Config::load().expect("Failed to load configuration");
///
/// println!("Server will bind to {}:{}", config.host, config.port);
/// ```
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
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

    // Admission
    /// API key expected in `X-API-Key`.
    ///
    /// Environment variable: `API_KEY`
    #[serde(default, alias = "API_KEY")]
    pub api_key: String,
    /// Secret keying the HMAC body signatures.
    ///
    /// Environment variable: `WEBHOOK_SECRET`
    #[serde(default, alias = "WEBHOOK_SECRET")]
    pub webhook_secret: String,
    /// How long idempotent responses are replayed, in seconds.
    ///
    /// Environment variable: `IDEMPOTENCY_TTL_SECONDS`
    #[serde(default = "default_idempotency_ttl", alias = "IDEMPOTENCY_TTL_SECONDS")]
    pub idempotency_ttl_seconds: u64,

    // Database
    /// PostgreSQL connection URL. Records are kept in memory when unset.
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

    // Logging
    /// Log filter directive, used when `RUST_LOG` is unset at startup.
    ///
    /// Environment variable: `RUST_LOG`
    #[serde(default = "default_log_level", alias = "RUST_LOG")]
    pub rust_log: String,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("request_timeout", &self.request_timeout)
            .field("api_key", &"***")
            .field("webhook_secret", &"***")
            .field("idempotency_ttl_seconds", &self.idempotency_ttl_seconds)
            .field("database_url", &self.database_url_masked())
            .field("database_max_connections", &self.database_max_connections)
            .field("database_min_connections", &self.database_min_connections)
            .field("database_connection_timeout", &self.database_connection_timeout)
            .field("rust_log", &self.rust_log)
            .finish()
    }
}

impl Config {
    /// Load configuration from defaults, config file, and environment variable
    /// overrides, then validate it.
    pub fn load() -> Result<Self> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(CONFIG_FILE))
            .merge(Env::prefixed(""));

        let config: Self = figment.extract().context("Failed to load configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Settings handed to the admission pipeline.
    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            api_key: self.api_key.clone(),
            webhook_secret: self.webhook_secret.clone(),
            idempotency_ttl: i64::try_from(self.idempotency_ttl_seconds)
                .ok()
                .and_then(chrono::Duration::try_seconds)
                .unwrap_or(chrono::Duration::MAX),
            routes: RouteTable::standard(),
        }
    }

    /// Per-request timeout applied by the server.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    /// Database pool acquire timeout.
    pub fn database_connection_timeout(&self) -> Duration {
        Duration::from_secs(self.database_connection_timeout)
    }

    /// Parse server socket address from host and port configuration.
    pub fn parse_server_addr(&self) -> Result<SocketAddr> {
        let addr_str = format!("{}:{}", self.host, self.port);
        SocketAddr::from_str(&addr_str).context("Invalid server address")
    }

    /// Get database URL with password masked for logging.
    pub fn database_url_masked(&self) -> String {
        let Some(url) = &self.database_url else { return "<in-memory>".to_string() };

        if let Some(at_pos) = url.find('@') {
            if let Some(colon_pos) = url[..at_pos].rfind(':') {
                let mut masked = url.clone();
                masked.replace_range(colon_pos + 1..at_pos, "***");
                return masked;
            }
        }
        url.clone()
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            anyhow::bail!("port must be greater than 0");
        }

        if self.api_key.is_empty() {
            anyhow::bail!("api_key must be set");
        }

        if self.webhook_secret.is_empty() {
            anyhow::bail!("webhook_secret must be set");
        }

        if self.idempotency_ttl_seconds == 0 {
            anyhow::bail!("idempotency_ttl_seconds must be greater than 0");
        }

        if self.database_max_connections == 0 {
            anyhow::bail!("database max_connections must be greater than 0");
        }

        if self.database_min_connections > self.database_max_connections {
            anyhow::bail!("database min_connections cannot exceed max_connections");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout: default_request_timeout(),
            api_key: String::new(),
            webhook_secret: String::new(),
            idempotency_ttl_seconds: default_idempotency_ttl(),
            database_url: None,
            database_max_connections: default_max_connections(),
            database_min_connections: default_min_connections(),
            database_connection_timeout: default_acquire_timeout(),
            rust_log: default_log_level(),
        }
    }
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

fn default_idempotency_ttl() -> u64 {
    24 * 60 * 60
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    2
}

fn default_acquire_timeout() -> u64 {
    10
}

fn default_log_level() -> String {
    "info,hookgate=debug,tower_http=debug".to_string()
}
