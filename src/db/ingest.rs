//! Feed ingestion
//!
//! Reconciles a [`FeedDocument`] against the stored items in one transaction.
//! Items are insert-once by GUID; authors and keywords are get-or-create by
//! their unique value and linked to each new item.
//!
//! Get-or-create uses `INSERT .. ON CONFLICT DO NOTHING RETURNING id` and reads
//! the id back when nothing was returned. Under READ COMMITTED a concurrent
//! insert of the same name makes the second insert wait for the first
//! transaction, after which the read-back sees the committed row.

use crate::db::postgres::describe;
use crate::error::{DbError, DbResult};
use crate::feed::{FeedDocument, NewPodcastItem};
use tokio_postgres::{Client, Statement, Transaction};
use tracing::{debug, info, warn};

const SELECT_ITEM: &str = "SELECT id FROM podcast_item WHERE guid = $1";

const INSERT_ITEM: &str = "INSERT INTO podcast_item (
        guid, title, description, pub_date, link, content_encoded,
        enclosure_length, enclosure_type, enclosure_url, itunes_title,
        itunes_duration, itunes_summary, itunes_subtitle, itunes_explicit,
        itunes_episode_type, itunes_episode
    ) VALUES (
        $1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
        $11::bigint * INTERVAL '1 second', $12, $13, $14, $15, $16
    )
    ON CONFLICT (guid) DO NOTHING
    RETURNING id";

const INSERT_AUTHOR: &str =
    "INSERT INTO podcast_author (name) VALUES ($1) ON CONFLICT (name) DO NOTHING RETURNING id";
const SELECT_AUTHOR: &str = "SELECT id FROM podcast_author WHERE name = $1";
const LINK_AUTHOR: &str = "INSERT INTO podcast_author_map (podcast_item_id, author_id) \
     VALUES ($1, $2) ON CONFLICT DO NOTHING";

const INSERT_KEYWORD: &str =
    "INSERT INTO podcast_keyword (keyword) VALUES ($1) ON CONFLICT (keyword) DO NOTHING RETURNING id";
const SELECT_KEYWORD: &str = "SELECT id FROM podcast_keyword WHERE keyword = $1";
const LINK_KEYWORD: &str = "INSERT INTO podcast_keyword_map (podcast_item_id, keyword_id) \
     VALUES ($1, $2) ON CONFLICT DO NOTHING";

/// Outcome of one `ingest` call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// New items written
    pub inserted: usize,
    /// Entries whose GUID was already stored
    pub skipped: usize,
    /// Entries that failed validation
    pub rejected: usize,
    pub authors_linked: usize,
    pub keywords_linked: usize,
}

impl IngestReport {
    pub fn total(&self) -> usize {
        self.inserted + self.skipped + self.rejected
    }
}

/// Statements prepared once per transaction
struct Statements {
    select_item: Statement,
    insert_item: Statement,
    author: Lookup,
    keyword: Lookup,
}

/// Get-or-create plus link statements for one lookup table
struct Lookup {
    insert: Statement,
    select: Statement,
    link: Statement,
}

impl Statements {
    async fn prepare(tx: &Transaction<'_>) -> Result<Self, tokio_postgres::Error> {
        Ok(Self {
            select_item: tx.prepare(SELECT_ITEM).await?,
            insert_item: tx.prepare(INSERT_ITEM).await?,
            author: Lookup {
                insert: tx.prepare(INSERT_AUTHOR).await?,
                select: tx.prepare(SELECT_AUTHOR).await?,
                link: tx.prepare(LINK_AUTHOR).await?,
            },
            keyword: Lookup {
                insert: tx.prepare(INSERT_KEYWORD).await?,
                select: tx.prepare(SELECT_KEYWORD).await?,
                link: tx.prepare(LINK_KEYWORD).await?,
            },
        })
    }
}

/// Ingest every entry of `document` in one transaction.
///
/// Invalid entries are logged and counted, never fatal. Any database error
/// returns early; the transaction is then dropped uncommitted, which rolls
/// the whole batch back.
pub async fn ingest_document(client: &mut Client, document: &FeedDocument) -> DbResult<IngestReport> {
    let map_err = |e: tokio_postgres::Error| DbError::QueryFailed(describe(&e));

    let tx = client.transaction().await.map_err(map_err)?;
    let statements = Statements::prepare(&tx).await.map_err(map_err)?;
    let mut report = IngestReport::default();

    for (position, entry) in document.entries.iter().enumerate() {
        let item = match NewPodcastItem::from_entry(entry) {
            Ok(item) => item,
            Err(e) => {
                warn!(position, error = %e, "rejected entry");
                report.rejected += 1;
                continue;
            }
        };

        let Some(item_id) = insert_item(&tx, &statements, &item).await.map_err(map_err)? else {
            info!(guid = %item.guid, "item already saved, skipped");
            report.skipped += 1;
            continue;
        };

        for name in &item.authors {
            if link(&tx, &statements.author, item_id, name).await.map_err(map_err)? {
                report.authors_linked += 1;
            }
        }
        for term in &item.keywords {
            if link(&tx, &statements.keyword, item_id, term).await.map_err(map_err)? {
                report.keywords_linked += 1;
            }
        }

        debug!(guid = %item.guid, item_id, "item inserted");
        report.inserted += 1;
    }

    tx.commit().await.map_err(map_err)?;
    info!(
        inserted = report.inserted,
        skipped = report.skipped,
        rejected = report.rejected,
        "ingest committed"
    );
    Ok(report)
}

/// Insert the item row unless its GUID exists; `None` means it was already stored.
async fn insert_item(
    tx: &Transaction<'_>,
    statements: &Statements,
    item: &NewPodcastItem,
) -> Result<Option<i32>, tokio_postgres::Error> {
    if tx.query_opt(&statements.select_item, &[&item.guid]).await?.is_some() {
        return Ok(None);
    }

    // A concurrent batch may insert the same GUID between the check and
    // here; the conflict clause then returns no row.
    let row = tx
        .query_opt(
            &statements.insert_item,
            &[
                &item.guid,
                &item.title,
                &item.description,
                &item.pub_date,
                &item.link,
                &item.content_encoded,
                &item.enclosure.length,
                &item.enclosure.mime_type,
                &item.enclosure.url,
                &item.itunes.title,
                &item.itunes.duration_secs,
                &item.itunes.summary,
                &item.itunes.subtitle,
                &item.itunes.explicit,
                &item.itunes.episode_type,
                &item.itunes.episode,
            ],
        )
        .await?;
    Ok(row.map(|r| r.get(0)))
}

/// Get-or-create `value` in a lookup table and link it to `item_id`.
/// Returns whether a new link row was written.
async fn link(
    tx: &Transaction<'_>,
    lookup: &Lookup,
    item_id: i32,
    value: &str,
) -> Result<bool, tokio_postgres::Error> {
    let id: i32 = match tx.query_opt(&lookup.insert, &[&value]).await? {
        Some(row) => row.get(0),
        None => tx.query_one(&lookup.select, &[&value]).await?.get(0),
    };
    let linked = tx.execute(&lookup.link, &[&item_id, &id]).await?;
    Ok(linked == 1)
}
