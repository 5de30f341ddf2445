//! Configuration management.
//!
//! Sources are layered, later ones winning: built-in defaults, an optional
//! file, then `JOURNAL__SECTION__KEY` environment variables. Command-line
//! overrides are applied by the server binary on top of the result.

use std::net::SocketAddr;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{JournalError, Result};

/// Main application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Storage backend configuration
    pub database: DatabaseConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address the gRPC service binds to
    #[serde(default = "default_grpc_addr")]
    pub grpc_addr: SocketAddr,

    /// Address the admin HTTP surface (health, metrics) binds to
    #[serde(default = "default_admin_addr")]
    pub admin_addr: SocketAddr,

    /// Deadline applied to requests that carry no `grpc-timeout`
    #[serde(default = "default_request_timeout", with = "humantime_serde")]
    pub request_timeout: Duration,

    /// Maximum encoded/decoded gRPC message size in bytes
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            grpc_addr: default_grpc_addr(),
            admin_addr: default_admin_addr(),
            request_timeout: default_request_timeout(),
            max_message_size: default_max_message_size(),
        }
    }
}

/// Which storage backend serves the journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Driver {
    /// PostgreSQL via sqlx
    #[serde(alias = "postgresql")]
    #[value(alias = "postgresql")]
    Postgres,
    /// MongoDB (replica set, transactions required)
    Mongodb,
    /// In-process store, for development and tests
    Memory,
}

impl Driver {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::Mongodb => "mongodb",
            Self::Memory => "memory",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Backend selection
    pub driver: Driver,

    /// Connection string; unused by the memory driver
    #[serde(default)]
    pub url: Option<String>,

    /// MongoDB database name
    #[serde(default = "default_database_name")]
    pub name: String,

    /// Maximum number of pooled connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of pooled connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// How long to wait for a connection before failing
    #[serde(default = "default_connect_timeout", with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// Install tables, indexes and functions at startup
    #[serde(default = "default_ensure_schema")]
    pub ensure_schema: bool,
}

impl DatabaseConfig {
    /// Configuration for the in-process backend.
    pub fn memory() -> Self {
        Self {
            driver: Driver::Memory,
            url: None,
            name: default_database_name(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connect_timeout: default_connect_timeout(),
            ensure_schema: default_ensure_schema(),
        }
    }

    /// The connection URL, required by every driver except memory.
    pub fn require_url(&self) -> Result<&str> {
        self.url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| {
                JournalError::configuration(format!(
                    "database.url is required for the {} driver",
                    self.driver.as_str()
                ))
            })
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON format for production/structured logging
    #[default]
    Json,
    /// Human-readable format for development
    Pretty,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    /// OpenTelemetry OTLP endpoint
    pub otlp_endpoint: Option<String>,

    /// Log level used when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log output format
    #[serde(default)]
    pub log_format: LogFormat,

    /// Install the Prometheus recorder and serve /metrics
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            otlp_endpoint: None,
            log_level: default_log_level(),
            log_format: LogFormat::default(),
            metrics_enabled: default_metrics_enabled(),
        }
    }
}

// Default value functions
fn default_grpc_addr() -> SocketAddr { SocketAddr::from(([0, 0, 0, 0], 9000)) }
fn default_admin_addr() -> SocketAddr { SocketAddr::from(([0, 0, 0, 0], 9001)) }
fn default_request_timeout() -> Duration { Duration::from_secs(30) }
fn default_max_message_size() -> usize { 4 * 1024 * 1024 }
fn default_database_name() -> String { "eventstore".to_string() }
fn default_max_connections() -> u32 { 20 }
fn default_min_connections() -> u32 { 1 }
fn default_connect_timeout() -> Duration { Duration::from_secs(5) }
fn default_ensure_schema() -> bool { true }
fn default_log_level() -> String { "info".to_string() }
fn default_metrics_enabled() -> bool { true }

const ENV_PREFIX: &str = "JOURNAL";

impl Config {
    /// Load from an optional file, with the environment layered on top.
    pub fn load_from(path: Option<&str>) -> Result<Self> {
        Self::load_with(path, &[])
    }

    /// Like [`Config::load_from`], with `(key, value)` overrides applied last.
    ///
    /// Keys use dotted paths, e.g. `database.driver`.
    pub fn load_with(path: Option<&str>, overrides: &[(&str, String)]) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__"),
        );
        for (key, value) in overrides {
            builder = builder.set_override(*key, value.as_str())?;
        }
        let config = builder.build()?;

        let cfg: Config = config.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject configurations the server cannot start with.
    pub fn validate(&self) -> Result<()> {
        if self.database.driver != Driver::Memory {
            self.database.require_url()?;
        }
        if self.database.max_connections == 0 {
            return Err(JournalError::configuration(
                "database.max_connections must be greater than zero",
            ));
        }
        if self.database.min_connections > self.database.max_connections {
            return Err(JournalError::configuration(format!(
                "database.min_connections ({}) exceeds database.max_connections ({})",
                self.database.min_connections, self.database.max_connections
            )));
        }
        Ok(())
    }
}
