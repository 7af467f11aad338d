//! podstore - Idempotent PostgreSQL persistence for podcast RSS feeds
//!
//! podstore takes a parsed podcast feed and stores each episode exactly once,
//! keyed by its GUID, together with its authors and keywords. Re-ingesting
//! the same feed is a no-op; new episodes are added in a single transaction.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`config`]: Connection targets, pool settings and environment overrides
//! - [`db`]: Connection pool, schema, ingest engine and maintenance operations
//! - [`feed`]: Feed documents, entry-to-item mapping, the HTTP fetcher and episode downloads
//! - [`commands`]: Command-line parsing and execution
//! - [`error`]: Error types and result aliases
//!
//! # Example
//!
//! ```no_run
//! use podstore::config::load_settings;
//! use podstore::db::{FeedStore, PostgresStore};
//! use podstore::feed::FeedFetcher;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut settings = load_settings(None)?;
//! settings.apply_env(|name| std::env::var(name).ok())?;
//! let store = PostgresStore::connect(&settings.resolve()?).await?;
//!
//! store.ensure_schema(false).await?;
//! let document = FeedFetcher::new()?.fetch("https://example.com/feed.xml").await?;
//! let report = store.ingest(&document).await?;
//! println!("{} new episodes", report.inserted);
//!
//! store.close();
//! # Ok(())
//! # }
//! ```

pub mod commands;
pub mod config;
pub mod db;
pub mod error;
pub mod feed;

pub use error::{ConfigError, DbError, EntryError, FetchError, PodstoreError, Result};
