//! Runtime settings
//!
//! Manages settings stored in ~/.podstore/config.toml, overridden by
//! `DATABASE_URL` or `PG_*` environment variables, and resolved once at
//! startup into [`RuntimeOptions`].

use crate::config::ConnectionConfig;
use crate::config::connections::{DEBUG_ENV, PRODUCTION_ENV};
use crate::db::pool::PoolOptions;
use crate::error::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Production target
    #[serde(default)]
    pub database: Option<ConnectionConfig>,

    /// Alternate, non-production target
    #[serde(default)]
    pub debug_database: Option<ConnectionConfig>,

    #[serde(default)]
    pub pool: PoolSettings,

    #[serde(default)]
    pub debug: DebugSettings,
}

/// Pool sizing and timeouts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolSettings {
    #[serde(default = "default_min_size")]
    pub min_size: usize,

    #[serde(default = "default_max_size")]
    pub max_size: usize,

    /// Zero means fail immediately when every slot is taken
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,

    #[serde(default = "default_transaction_timeout_secs")]
    pub transaction_timeout_secs: u64,
}

/// The two independent switches the debug mode is made of
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DebugSettings {
    /// Connect to `debug_database` instead of `database`
    #[serde(default)]
    pub use_debug_target: bool,

    /// Permit `ensure_schema(drop_first = true)`
    #[serde(default)]
    pub allow_schema_drop: bool,
}

/// Settings after validation; everything a store needs to start
#[derive(Debug, Clone)]
pub struct RuntimeOptions {
    pub connection: ConnectionConfig,
    pub pool: PoolOptions,
    pub transaction_timeout: Duration,
    pub allow_schema_drop: bool,
}

fn default_min_size() -> usize {
    5
}

fn default_max_size() -> usize {
    10
}

fn default_acquire_timeout_secs() -> u64 {
    30
}

fn default_transaction_timeout_secs() -> u64 {
    120
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            min_size: default_min_size(),
            max_size: default_max_size(),
            acquire_timeout_secs: default_acquire_timeout_secs(),
            transaction_timeout_secs: default_transaction_timeout_secs(),
        }
    }
}

impl Settings {
    /// Overlay values from environment-style variables.
    ///
    /// `PG_DEBUG=1` turns on both debug switches, matching the single
    /// flag older deployments set.
    pub fn apply_env<F>(&mut self, lookup: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(config) = ConnectionConfig::from_lookup(&PRODUCTION_ENV, &lookup)? {
            self.database = Some(config);
        }
        if let Some(config) = ConnectionConfig::from_lookup(&DEBUG_ENV, &lookup)? {
            self.debug_database = Some(config);
        }
        if let Some(flag) = lookup("PG_DEBUG") {
            let on = parse_flag(&flag)
                .ok_or_else(|| ConfigError::Invalid(format!("PG_DEBUG={}", flag)))?;
            self.debug.use_debug_target = on;
            self.debug.allow_schema_drop = on;
        }
        Ok(())
    }

    /// Validate and pick the target
    pub fn resolve(&self) -> ConfigResult<RuntimeOptions> {
        let pool = &self.pool;
        if pool.max_size == 0 {
            return Err(ConfigError::Invalid("pool.max_size must be > 0".into()));
        }
        if pool.min_size > pool.max_size {
            return Err(ConfigError::Invalid(format!(
                "pool.min_size ({}) exceeds pool.max_size ({})",
                pool.min_size, pool.max_size
            )));
        }

        let connection = if self.debug.use_debug_target {
            self.debug_database.clone().ok_or_else(|| {
                ConfigError::Invalid("debug target selected but [debug_database] is missing".into())
            })?
        } else {
            self.database
                .clone()
                .ok_or_else(|| ConfigError::Invalid("[database] is missing".into()))?
        };

        Ok(RuntimeOptions {
            connection,
            pool: PoolOptions {
                min_size: pool.min_size,
                max_size: pool.max_size,
                acquire_timeout: Duration::from_secs(pool.acquire_timeout_secs),
            },
            transaction_timeout: Duration::from_secs(pool.transaction_timeout_secs),
            allow_schema_drop: self.debug.allow_schema_drop,
        })
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

/// Load settings from an explicit file, or from ~/.podstore/config.toml
/// when no path is given (a missing default file yields defaults).
pub fn load_settings(path: Option<&Path>) -> ConfigResult<Settings> {
    let path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(ConfigError::NotFound(p.display().to_string()));
            }
            p.to_path_buf()
        }
        None => {
            let p = ConnectionConfig::config_dir()?.join("config.toml");
            if !p.exists() {
                return Ok(Settings::default());
            }
            p
        }
    };
    let content = std::fs::read_to_string(&path)
        .map_err(|e| ConfigError::NotFound(format!("{}: {}", path.display(), e)))?;
    let settings: Settings = toml::from_str(&content)?;
    Ok(settings)
}
