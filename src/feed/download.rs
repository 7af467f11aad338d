//! Episode audio download
//!
//! Saves every `audio/mpeg` enclosure of a feed as `<guid>.mp3` in a target
//! directory. Files already on disk are left alone, so a repeated run only
//! fetches new episodes.

use crate::error::FetchResult;
use crate::feed::document::{FeedDocument, FeedEntry, scalar_text};
use crate::feed::fetch::FeedFetcher;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

const AUDIO_MPEG: &str = "audio/mpeg";

/// What a download run did, counted per audio link
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DownloadReport {
    pub downloaded: usize,
    /// Target file was already present
    pub existing: usize,
    /// Entry had no GUID to name the file after
    pub skipped: usize,
    pub failed: usize,
}

impl FeedFetcher {
    /// Download the audio of every entry into `dir`, creating it if needed.
    ///
    /// A failed episode is logged and counted; it does not stop the run.
    pub async fn download_audio(
        &self,
        document: &FeedDocument,
        dir: &Path,
    ) -> FetchResult<DownloadReport> {
        tokio::fs::create_dir_all(dir).await?;
        let mut report = DownloadReport::default();

        for entry in &document.entries {
            let links = audio_links(entry);
            if links.is_empty() {
                continue;
            }
            let Some(guid) = entry.get_text("guid").or_else(|| entry.get_text("id")) else {
                error!(title = ?entry.get_text("title"), "entry has no GUID, skipping its audio");
                report.skipped += links.len();
                continue;
            };

            let target = dir.join(audio_file_name(&guid));
            for url in links {
                if tokio::fs::try_exists(&target).await? {
                    info!(path = %target.display(), "already downloaded");
                    report.existing += 1;
                    continue;
                }
                match self.save_audio(&url, &target).await {
                    Ok(bytes) => {
                        info!(path = %target.display(), bytes, "downloaded episode");
                        report.downloaded += 1;
                    }
                    Err(e) => {
                        warn!(%url, error = %e, "episode download failed");
                        report.failed += 1;
                    }
                }
            }
        }

        info!(
            downloaded = report.downloaded,
            existing = report.existing,
            skipped = report.skipped,
            failed = report.failed,
            "audio download finished"
        );
        Ok(report)
    }

    /// Fetch one file. The body lands in a `.part` file first so an
    /// interrupted download never looks complete.
    async fn save_audio(&self, url: &str, target: &Path) -> FetchResult<usize> {
        debug!(url, "downloading episode");
        let response = self.client.get(url).send().await?.error_for_status()?;
        let body = response.bytes().await?;

        let partial = partial_path(target);
        tokio::fs::write(&partial, &body).await?;
        if let Err(e) = tokio::fs::rename(&partial, target).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(e.into());
        }
        Ok(body.len())
    }
}

/// `audio/mpeg` URLs from an entry's `enclosures` and `links`
fn audio_links(entry: &FeedEntry) -> Vec<String> {
    let mut urls = Vec::new();
    for link in entry
        .list("enclosures")
        .into_iter()
        .chain(entry.list("links"))
    {
        let Value::Object(map) = link else {
            continue;
        };
        let is_audio = map
            .get("type")
            .and_then(scalar_text)
            .is_some_and(|t| t.eq_ignore_ascii_case(AUDIO_MPEG));
        if !is_audio {
            continue;
        }
        if let Some(url) = map.get("url").or_else(|| map.get("href")).and_then(scalar_text)
            && !urls.contains(&url)
        {
            urls.push(url);
        }
    }
    urls
}

/// `<guid>.mp3`, with anything that could leave the directory replaced
fn audio_file_name(guid: &str) -> String {
    let stem: String = guid
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{}.mp3", stem.trim_start_matches('.'))
}

fn partial_path(target: &Path) -> PathBuf {
    let mut name = target.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}
