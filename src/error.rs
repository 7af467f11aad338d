//! Error types for podstore
//!
//! This module defines the error hierarchy used throughout the crate.
//! We use `thiserror` for library-style errors with clear error chains.

use std::io;

/// Main error type for podstore
#[derive(Debug, thiserror::Error)]
pub enum PodstoreError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Feed retrieval errors
    #[error("Feed error: {0}")]
    Fetch(#[from] FetchError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Database operation errors
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// Failed to establish connection
    #[error("Connection failed: {0}")]
    ConnectFailed(String),

    /// Every pool slot is in use and the pool is configured to fail fast
    #[error("Connection pool exhausted ({0} connections in use)")]
    PoolExhausted(usize),

    /// The pool was shut down
    #[error("Connection pool is closed")]
    PoolClosed,

    /// A connection failed its liveness check even after being replaced
    #[error("Stale connection: {0}")]
    StaleConnection(String),

    /// Operation timed out
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Query execution failed
    #[error("Query execution failed: {0}")]
    QueryFailed(String),

    /// DDL failed
    #[error("Schema update failed: {0}")]
    SchemaFailed(String),

    /// Dropping tables was requested without permission
    #[error("Dropping the schema is not permitted by the current configuration")]
    DropNotPermitted,
}

impl DbError {
    /// Whether this error belongs to the connectivity family
    /// (the pool already retried once before surfacing it).
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            DbError::ConnectFailed(_)
                | DbError::PoolExhausted(_)
                | DbError::PoolClosed
                | DbError::StaleConnection(_)
                | DbError::Timeout(_)
        )
    }
}

/// Validation errors local to a single feed entry
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EntryError {
    /// Neither `guid` nor `id` is present
    #[error("entry has no GUID")]
    MissingGuid,

    /// The GUID is not a UUID
    #[error("entry GUID '{0}' is not a valid UUID")]
    InvalidGuid(String),

    /// The required title is absent
    #[error("entry {0} has no title")]
    MissingTitle(String),
}

/// Configuration loading/parsing errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Home directory not found
    #[error("Could not determine home directory")]
    NoHomeDir,

    /// Config file not found
    #[error("Configuration file not found: {0}")]
    NotFound(String),

    /// Failed to parse TOML
    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Feed retrieval errors
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// HTTP request failed or returned a non-success status
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The body is not a feed
    #[error("Failed to parse feed: {0}")]
    Parse(String),

    /// Saving or reading the feed file failed
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Specialized Result type for podstore operations
pub type Result<T> = std::result::Result<T, PodstoreError>;

/// Specialized Result type for database operations
pub type DbResult<T> = std::result::Result<T, DbError>;

/// Specialized Result type for config operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Specialized Result type for feed retrieval
pub type FetchResult<T> = std::result::Result<T, FetchError>;
