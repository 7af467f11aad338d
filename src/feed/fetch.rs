//! Feed retrieval
//!
//! Downloads a feed with reqwest, parses it with feed-rs and flattens every
//! entry into the field names [`NewPodcastItem::from_entry`] reads. The
//! `<itunes:*>` item elements feed-rs does not model are read with quick-xml.
//!
//! [`NewPodcastItem::from_entry`]: crate::feed::NewPodcastItem::from_entry

use crate::error::{FetchError, FetchResult};
use crate::feed::document::{FeedDocument, FeedEntry, FeedMeta};
use feed_rs::model::{Entry, Feed};
use quick_xml::Reader;
use quick_xml::events::Event;
use serde_json::{Value, json};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// HTTP feed fetcher
#[derive(Debug, Clone)]
pub struct FeedFetcher {
    pub(super) client: reqwest::Client,
}

impl FeedFetcher {
    pub fn new() -> FetchResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("podstore/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self { client })
    }

    /// Download and parse a feed
    pub async fn fetch(&self, url: &str) -> FetchResult<FeedDocument> {
        let body = self.download(url).await?;
        parse_feed(&body)
    }

    /// Download a feed, keep the raw bytes at `save_path`, and parse it.
    ///
    /// Nothing is written when the body does not parse.
    pub async fn fetch_to_disk(&self, url: &str, save_path: &Path) -> FetchResult<FeedDocument> {
        let body = self.download(url).await?;
        let document = parse_feed(&body)?;
        if let Some(parent) = save_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(save_path, &body).await?;
        info!(path = %save_path.display(), "feed saved");
        Ok(document)
    }

    async fn download(&self, url: &str) -> FetchResult<Vec<u8>> {
        debug!(url, "downloading feed");
        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    }
}

/// Parse a feed file from disk
pub async fn read_feed_file(path: &Path) -> FetchResult<FeedDocument> {
    let body = tokio::fs::read(path).await?;
    parse_feed(&body)
}

/// Parse RSS/Atom bytes into a [`FeedDocument`]
pub fn parse_feed(body: &[u8]) -> FetchResult<FeedDocument> {
    let feed = feed_rs::parser::parse(body).map_err(|e| FetchError::Parse(e.to_string()))?;
    let document = document_from_feed(feed, itunes_elements(body));
    info!(entries = document.entries.len(), "parsed feed");
    Ok(document)
}

/// `(field, text)` pairs read from one item's `<itunes:*>` children
type ItunesFields = Vec<(&'static str, String)>;

fn document_from_feed(feed: Feed, itunes: Vec<ItunesFields>) -> FeedDocument {
    let meta = FeedMeta {
        title: feed.title.map(|t| t.content),
        link: feed.links.first().map(|l| l.href.clone()),
        description: feed.description.map(|t| t.content),
        copyright: feed.rights.map(|t| t.content),
        language: feed.language,
    };
    let mut itunes = itunes.into_iter();
    let entries = feed
        .entries
        .into_iter()
        .map(|entry| entry_fields(entry, itunes.next().unwrap_or_default()))
        .collect();
    FeedDocument::new(meta, entries)
}

fn entry_fields(entry: Entry, itunes: ItunesFields) -> FeedEntry {
    let mut fields = FeedEntry::new();
    fields.insert("id", entry.id);

    if let Some(title) = entry.title {
        fields.insert("title", title.content);
    }
    if let Some(summary) = entry.summary {
        fields.insert("description", summary.content);
    }
    if let Some(published) = entry.published {
        fields.insert("published", published.to_rfc2822());
    }
    if let Some(link) = entry.links.first() {
        fields.insert("link", link.href.clone());
    }
    if let Some(body) = entry.content.and_then(|c| c.body) {
        fields.insert("content", json!([{ "value": body }]));
    }

    let names: Vec<&str> = entry.authors.iter().map(|p| p.name.as_str()).collect();
    if !names.is_empty() {
        fields.insert("author", names.join(", "));
    }

    if !entry.categories.is_empty() {
        let tags: Vec<Value> = entry
            .categories
            .iter()
            .map(|c| json!({ "term": c.term }))
            .collect();
        fields.insert("tags", tags);
    }

    // feed-rs folds <enclosure> and the itunes extension into media objects
    let enclosures: Vec<Value> = entry
        .media
        .iter()
        .flat_map(|m| m.content.iter())
        .filter(|c| c.url.is_some())
        .map(|c| {
            json!({
                "url": c.url.as_ref().map(|u| u.to_string()),
                "type": c.content_type.as_ref().map(|t| t.to_string()),
                "length": c.size,
            })
        })
        .collect();
    if !enclosures.is_empty() {
        fields.insert("enclosures", enclosures);
    }

    if let Some(media) = entry.media.first() {
        if let Some(title) = &media.title {
            fields.insert("itunes_title", title.content.clone());
        }
        if let Some(description) = &media.description {
            fields.insert("summary", description.content.clone());
        }
        let duration = media
            .duration
            .or_else(|| media.content.iter().find_map(|c| c.duration));
        if let Some(duration) = duration {
            fields.insert("itunes_duration", duration.as_secs().to_string());
        }
    }

    for (name, text) in itunes {
        if fields.get_field(name).is_none() && !text.is_empty() {
            fields.insert(name, text);
        }
    }

    fields
}

/// Entry field an `<itunes:*>` item element maps to
fn itunes_field(element: &[u8]) -> Option<&'static str> {
    Some(match element {
        b"itunes:title" => "itunes_title",
        b"itunes:duration" => "itunes_duration",
        b"itunes:summary" => "summary",
        b"itunes:subtitle" => "subtitle",
        b"itunes:explicit" => "itunes_explicit",
        b"itunes:episodeType" => "itunes_episodetype",
        b"itunes:episode" => "itunes_episode",
        _ => return None,
    })
}

/// Collect the `<itunes:*>` children of every `<item>`/`<entry>`, in document
/// order, so they line up with feed-rs's entries.
fn itunes_elements(body: &[u8]) -> Vec<ItunesFields> {
    let mut reader = Reader::from_reader(body);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut items = Vec::new();
    let mut current: Option<ItunesFields> = None;
    let mut field: Option<&'static str> = None;
    let mut text = String::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.name().as_ref() {
                b"item" | b"entry" => current = Some(Vec::new()),
                name if current.is_some() => {
                    field = itunes_field(name);
                    text.clear();
                }
                _ => {}
            },
            Ok(Event::Empty(e)) if matches!(e.name().as_ref(), b"item" | b"entry") => {
                items.push(Vec::new());
            }
            Ok(Event::Text(t)) if field.is_some() => match t.unescape() {
                Ok(value) => text.push_str(&value),
                Err(e) => debug!(error = %e, "skipping undecodable itunes text"),
            },
            Ok(Event::CData(c)) if field.is_some() => {
                text.push_str(&String::from_utf8_lossy(&c.into_inner()));
            }
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"item" | b"entry" => {
                    items.extend(current.take());
                    field = None;
                }
                name if field.is_some() && itunes_field(name) == field => {
                    if let (Some(name), Some(fields)) = (field.take(), current.as_mut()) {
                        fields.push((name, std::mem::take(&mut text)));
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => {
                // feed-rs already accepted the document, so keep what was read
                debug!(error = %e, "stopped reading itunes elements");
                break;
            }
            _ => {}
        }
        buf.clear();
    }
    items
}
