//! Command execution handlers
//!
//! Runs a parsed [`Command`] against any [`FeedStore`] and renders the
//! result as a line of text for the terminal. `download` is the one command
//! that needs no store.

use crate::commands::{Command, FeedSource};
use crate::db::{FeedStore, MaintenanceOutcome};
use crate::error::{FetchError, Result};
use crate::feed::FeedDocument;
use crate::feed::fetch::{FeedFetcher, read_feed_file};
use std::path::Path;
use tracing::info;

/// What a command printed and whether it succeeded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub message: String,
}

impl CommandOutput {
    fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }
}

/// Execute a command
///
/// Database and feed faults are returned as errors. Maintenance commands
/// report failure through [`CommandOutput::success`] instead.
pub async fn execute<S: FeedStore>(store: &S, command: &Command) -> Result<CommandOutput> {
    match command {
        Command::Ping => Ok(render_outcome("ping", store.ping().await)),

        Command::Schema { drop } => {
            store.ensure_schema(*drop).await?;
            Ok(CommandOutput::ok(if *drop {
                "schema recreated"
            } else {
                "schema ready"
            }))
        }

        Command::Ingest { source, save } => {
            let document = load_document(source, save.as_deref()).await?;
            store.ensure_schema(false).await?;
            let report = store.ingest(&document).await?;
            Ok(CommandOutput::ok(format!(
                "{} inserted, {} already stored, {} rejected ({} authors, {} keywords linked)",
                report.inserted,
                report.skipped,
                report.rejected,
                report.authors_linked,
                report.keywords_linked
            )))
        }

        Command::Delete { guid } => Ok(render_outcome("delete", store.delete_item(guid).await)),

        Command::Download { source, dir } => download(source, dir).await,
    }
}

/// Save the MP3 of every entry in the feed under `dir`
pub async fn download(source: &FeedSource, dir: &Path) -> Result<CommandOutput> {
    let document = load_document(source, None).await?;
    let report = FeedFetcher::new()?.download_audio(&document, dir).await?;
    Ok(CommandOutput {
        success: report.failed == 0,
        message: format!(
            "{} downloaded, {} already present, {} without GUID, {} failed",
            report.downloaded, report.existing, report.skipped, report.failed
        ),
    })
}

fn render_outcome(operation: &str, outcome: MaintenanceOutcome) -> CommandOutput {
    let message = match (&outcome.reason, outcome.success) {
        (Some(reason), true) => format!("{}: {}", operation, reason),
        (None, true) => format!("{}: {} row(s) affected", operation, outcome.rows_affected),
        (Some(reason), false) => format!("{} failed: {}", operation, reason),
        (None, false) => format!("{} failed", operation),
    };
    CommandOutput {
        success: outcome.success,
        message,
    }
}

async fn load_document(source: &FeedSource, save: Option<&Path>) -> Result<FeedDocument> {
    if let Some(url) = &source.url {
        let fetcher = FeedFetcher::new()?;
        let document = match save {
            Some(path) => fetcher.fetch_to_disk(url, path).await?,
            None => fetcher.fetch(url).await?,
        };
        return Ok(document);
    }
    if let Some(path) = &source.file {
        return Ok(read_feed_file(path).await?);
    }
    if let Some(path) = &source.document {
        let json = tokio::fs::read_to_string(path).await?;
        let document =
            FeedDocument::from_json(&json).map_err(|e| FetchError::Parse(e.to_string()))?;
        info!(entries = document.entries.len(), path = %path.display(), "loaded feed document");
        return Ok(document);
    }
    Err(FetchError::Parse("no feed source given".to_string()).into())
}
