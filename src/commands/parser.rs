//! Command parsing
//!
//! Parses command-line arguments into structured [`Command`] values.

use crate::config::{ConnectionConfig, Settings};
use crate::error::ConfigResult;
use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Persist podcast RSS feeds into PostgreSQL."
)]
pub struct Cli {
    /// Path to the TOML configuration file (default ~/.podstore/config.toml).
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Connect to the debug database instead of production.
    #[arg(long = "debug-target", action = ArgAction::SetTrue)]
    pub debug_target: bool,

    /// Permit `schema --drop`.
    #[arg(long = "allow-drop", action = ArgAction::SetTrue)]
    pub allow_drop: bool,

    /// postgres:// URL for the selected target, replacing its configured fields.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Flags only switch options on; they never clear a configured value.
    /// `--database-url` replaces whichever target is selected.
    pub fn apply_to(&self, settings: &mut Settings) -> ConfigResult<()> {
        if self.debug_target {
            settings.debug.use_debug_target = true;
        }
        if self.allow_drop {
            settings.debug.allow_schema_drop = true;
        }
        if let Some(url) = &self.database_url {
            let config = ConnectionConfig::from_url(url)?;
            if settings.debug.use_debug_target {
                settings.debug_database = Some(config);
            } else {
                settings.database = Some(config);
            }
        }
        Ok(())
    }
}

/// Commands the binary runs
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Check database connectivity
    Ping,

    /// Create the podcast tables if they are missing
    Schema {
        /// Drop every podcast table first (requires --allow-drop).
        #[arg(long, action = ArgAction::SetTrue)]
        drop: bool,
    },

    /// Store new items from a feed
    Ingest {
        #[command(flatten)]
        source: FeedSource,

        /// Keep the downloaded feed at this path.
        #[arg(long, value_name = "PATH", requires = "url")]
        save: Option<PathBuf>,
    },

    /// Delete one item by GUID
    Delete {
        /// Item GUID, in any UUID spelling.
        guid: String,
    },

    /// Save each episode's MP3 as <guid>.mp3; no database needed
    Download {
        #[command(flatten)]
        source: FeedSource,

        /// Directory the episodes are written to.
        #[arg(long, value_name = "PATH")]
        dir: PathBuf,
    },
}


/// Where a feed comes from; exactly one is given
#[derive(Args, Debug, Clone, PartialEq, Eq)]
#[group(required = true, multiple = false)]
pub struct FeedSource {
    /// Download an RSS/Atom feed.
    #[arg(long, value_name = "URL")]
    pub url: Option<String>,

    /// Read an RSS/Atom feed from disk.
    #[arg(long, value_name = "PATH")]
    pub file: Option<PathBuf>,

    /// Read an already-parsed feed document (JSON).
    #[arg(long, value_name = "PATH")]
    pub document: Option<PathBuf>,
}
