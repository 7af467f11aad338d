//! Feed input
//!
//! The parsed document model, entry-to-row mapping, an HTTP fetcher that
//! produces documents from RSS/Atom, and the episode audio downloader.

pub mod document;
pub mod download;
pub mod fetch;
pub mod item;

pub use document::{FeedDocument, FeedEntry, FeedMeta};
pub use download::DownloadReport;
pub use fetch::FeedFetcher;
pub use item::{Enclosure, ItunesAttributes, NewPodcastItem};
