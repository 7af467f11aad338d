//! Entry → row mapping
//!
//! Turns one [`FeedEntry`] into the values of a `podcast_item` row plus the
//! author names and keyword terms to link. Only the GUID and the title are
//! required; every other field degrades to `None` when absent or malformed.

use crate::error::EntryError;
use crate::feed::document::{FeedEntry, scalar_text};
use chrono::{DateTime, FixedOffset};
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

/// Date format used by RSS `<pubDate>`
pub const PUB_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S %z";

/// Separator between names in an entry's `author` field
pub const AUTHOR_SEPARATOR: &str = ", ";

/// Values for a new `podcast_item` row
#[derive(Debug, Clone, PartialEq)]
pub struct NewPodcastItem {
    pub guid: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub pub_date: Option<DateTime<FixedOffset>>,
    pub link: Option<String>,
    pub content_encoded: Option<String>,
    pub enclosure: Enclosure,
    pub itunes: ItunesAttributes,
    /// Distinct author names in feed order
    pub authors: Vec<String>,
    /// Distinct keyword terms in feed order
    pub keywords: Vec<String>,
}

/// First enclosure of an entry
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Enclosure {
    pub length: Option<i64>,
    pub mime_type: Option<String>,
    pub url: Option<String>,
}

/// iTunes namespace attributes
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItunesAttributes {
    pub title: Option<String>,
    /// Episode length in whole seconds, stored as an interval
    pub duration_secs: Option<i64>,
    pub summary: Option<String>,
    pub subtitle: Option<String>,
    pub explicit: Option<bool>,
    pub episode_type: Option<String>,
    pub episode: Option<i32>,
}

impl NewPodcastItem {
    /// Validate and map a feed entry
    pub fn from_entry(entry: &FeedEntry) -> Result<Self, EntryError> {
        let raw_guid = entry
            .get_text("guid")
            .or_else(|| entry.get_text("id"))
            .ok_or(EntryError::MissingGuid)?;
        let guid = normalize_guid(&raw_guid)?;
        let title = entry
            .get_text("title")
            .ok_or_else(|| EntryError::MissingTitle(guid.to_string()))?;

        let pub_date = entry.get_text("published").and_then(|raw| {
            let parsed = parse_pub_date(&raw);
            if parsed.is_none() {
                warn!(%guid, value = %raw, "malformed publish date, storing NULL");
            }
            parsed
        });

        let content_encoded = entry.first_of("content").and_then(|c| match c {
            Value::Object(map) => map.get("value").and_then(scalar_text),
            other => scalar_text(other),
        });

        let enclosure = entry
            .first_of("enclosures")
            .map(|e| Enclosure {
                length: e.get("length").and_then(scalar_text).and_then(|raw| {
                    let parsed = raw.trim().parse::<i64>().ok();
                    if parsed.is_none() {
                        warn!(%guid, value = %raw, "malformed enclosure length");
                    }
                    parsed
                }),
                mime_type: e.get("type").and_then(scalar_text),
                url: e
                    .get("url")
                    .or_else(|| e.get("href"))
                    .and_then(scalar_text),
            })
            .unwrap_or_default();

        let itunes = ItunesAttributes {
            title: entry.get_text("itunes_title"),
            duration_secs: entry.get_text("itunes_duration").and_then(|raw| {
                let parsed = parse_duration_secs(&raw);
                if parsed.is_none() {
                    warn!(%guid, value = %raw, "malformed itunes duration");
                }
                parsed
            }),
            summary: entry.get_text("summary"),
            subtitle: entry.get_text("subtitle"),
            explicit: entry.get_text("itunes_explicit").map(|raw| parse_explicit(&raw)),
            // feedparser flattens <itunes:episodeType> to this key
            episode_type: entry.get_text("itunes_episodetype"),
            episode: entry.get_text("itunes_episode").and_then(|raw| {
                let parsed = raw.trim().parse::<i32>().ok();
                if parsed.is_none() {
                    warn!(%guid, value = %raw, "malformed itunes episode number");
                }
                parsed
            }),
        };

        Ok(Self {
            guid,
            title,
            description: entry.get_text("description"),
            pub_date,
            link: entry.get_text("link"),
            content_encoded,
            enclosure,
            itunes,
            authors: entry
                .get_text("author")
                .map(|raw| split_authors(&raw))
                .unwrap_or_default(),
            keywords: keyword_terms(entry),
        })
    }
}

/// Parse a GUID into its canonical UUID.
///
/// Accepts the hyphenated, simple, braced and `urn:uuid:` spellings;
/// `Uuid`'s `Display` is the canonical lowercase 36-character form.
pub fn normalize_guid(raw: &str) -> Result<Uuid, EntryError> {
    Uuid::parse_str(raw.trim()).map_err(|_| EntryError::InvalidGuid(raw.to_string()))
}

/// Parse a `<pubDate>` value; RFC 3339 is accepted for fetchers that re-encode dates.
pub fn parse_pub_date(raw: &str) -> Option<DateTime<FixedOffset>> {
    let raw = raw.trim();
    DateTime::parse_from_rfc2822(raw)
        .or_else(|_| DateTime::parse_from_str(raw, PUB_DATE_FORMAT))
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .ok()
}

/// Longest duration stored; anything above it is treated as malformed
pub const MAX_DURATION_SECS: i64 = i32::MAX as i64;

/// Parse `HH:MM:SS`, `MM:SS` or plain seconds, up to [`MAX_DURATION_SECS`]
pub fn parse_duration_secs(raw: &str) -> Option<i64> {
    let parts: Vec<&str> = raw.trim().split(':').collect();
    if parts.is_empty() || parts.len() > 3 {
        return None;
    }
    let mut total: i64 = 0;
    for (i, part) in parts.iter().enumerate() {
        let value: i64 = part.trim().parse().ok().filter(|v| *v >= 0)?;
        // Leading component may be unbounded; the rest are clock fields
        if i > 0 && value >= 60 {
            return None;
        }
        total = total.checked_mul(60)?.checked_add(value)?;
    }
    (total <= MAX_DURATION_SECS).then_some(total)
}

/// `<itunes:explicit>` takes `true`/`yes`/`explicit` for explicit content
pub fn parse_explicit(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "true" | "yes" | "explicit"
    )
}

/// Split an `author` field into distinct names
pub fn split_authors(raw: &str) -> Vec<String> {
    distinct(raw.split(AUTHOR_SEPARATOR).map(str::to_string))
}

/// Keyword terms from the `tags` list (`{"term": ...}` objects or bare strings)
pub fn keyword_terms(entry: &FeedEntry) -> Vec<String> {
    distinct(entry.list("tags").into_iter().filter_map(|tag| match tag {
        Value::Object(map) => map.get("term").and_then(scalar_text),
        other => scalar_text(other),
    }))
}

fn distinct(values: impl Iterator<Item = String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for value in values {
        let value = value.trim();
        if !value.is_empty() && !out.iter().any(|v| v == value) {
            out.push(value.to_string());
        }
    }
    out
}
