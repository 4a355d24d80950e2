//! Configuration types for a reindex run.

use crate::error::{ReindexError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Application name reported to the server in `pg_stat_activity`.
pub const APPLICATION_NAME: &str = "reindex_concurrently";

/// Configuration file contents, every section optional.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Connection settings.
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Rebuild behaviour.
    #[serde(default)]
    pub run: RunConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| ReindexError::ConfigError(format!("failed to read config: {}", e)))?;
        toml::from_str(&content)
            .map_err(|e| ReindexError::ConfigError(format!("failed to parse config: {}", e)))
    }

    /// Load configuration from a TOML file if one was given.
    pub fn load_optional(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }
}

/// Where to connect.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Target database (required before connecting).
    pub database: Option<String>,
    /// Server host name or socket directory.
    pub host: Option<String>,
    /// Server port.
    pub port: Option<u16>,
    /// Role to connect as.
    pub user: Option<String>,
    /// Password for the role.
    pub password: Option<String>,
}

impl ConnectionConfig {
    /// Builds the driver configuration.
    ///
    /// Fails when no database name is set.
    pub fn to_pg_config(&self) -> Result<postgres::Config> {
        let database = self
            .database
            .as_deref()
            .filter(|d| !d.is_empty())
            .ok_or_else(|| ReindexError::ConfigError("a target database is required".into()))?;

        let mut config = postgres::Config::new();
        config.dbname(database).application_name(APPLICATION_NAME);
        if let Some(host) = &self.host {
            config.host(host);
        }
        if let Some(port) = self.port {
            config.port(port);
        }
        if let Some(user) = &self.user {
            config.user(user);
        }
        if let Some(password) = &self.password {
            config.password(password);
        }
        Ok(config)
    }
}

/// How generic database errors are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ErrorPolicy {
    /// Report the error, treat the statement as a no-op and carry on.
    #[default]
    Lenient,
    /// Abort the run on the first failed statement.
    Strict,
}

/// Rebuild behaviour for one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Minutes before no further index is started (default: 120).
    pub run_minutes: u64,

    /// Translate the run budget into a statement timeout (default: false).
    pub enforce_time: bool,

    /// Build attempts per index (default: 2).
    pub retries: u32,

    /// Print mutating statements instead of executing them (default: false).
    pub dry_run: bool,

    /// Seconds to pause after every attempt (default: 5).
    pub pause_secs: u64,

    /// Treatment of generic database errors (default: lenient).
    pub error_policy: ErrorPolicy,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            run_minutes: 120,
            enforce_time: false,
            retries: 2,
            dry_run: false,
            pause_secs: 5,
            error_policy: ErrorPolicy::Lenient,
        }
    }
}

impl RunConfig {
    /// Returns the run budget as a Duration.
    pub fn run_time(&self) -> Duration {
        Duration::from_secs(self.run_minutes.saturating_mul(60))
    }

    /// Returns the inter-attempt pause as a Duration.
    pub fn pause(&self) -> Duration {
        Duration::from_secs(self.pause_secs)
    }
}
