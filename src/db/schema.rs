//! Schema management
//!
//! The five relations the store writes: items, authors, keywords and the two
//! link tables. DDL is idempotent and runs inside a single transaction.

use crate::db::postgres::describe;
use crate::error::{DbError, DbResult};
use tokio_postgres::Client;
use tracing::{info, warn};

/// Every table the store owns, parents first
pub const TABLES: [&str; 5] = [
    "podcast_item",
    "podcast_author",
    "podcast_keyword",
    "podcast_author_map",
    "podcast_keyword_map",
];

/// Advisory lock key serializing concurrent schema setup ("podstore" in ASCII)
const SCHEMA_LOCK_KEY: i64 = 0x706f_6473_746f_7265;

const DROP_TABLES: &str = "DROP TABLE IF EXISTS \
     podcast_item, podcast_author, podcast_keyword, podcast_author_map, podcast_keyword_map \
     CASCADE";

const CREATE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS podcast_item (
    id SERIAL PRIMARY KEY,
    guid UUID UNIQUE NOT NULL,
    title TEXT NOT NULL,
    description TEXT,
    pub_date TIMESTAMPTZ,
    link TEXT,
    content_encoded TEXT,
    enclosure_length BIGINT,
    enclosure_type TEXT,
    enclosure_url TEXT,
    itunes_title TEXT,
    itunes_duration INTERVAL,
    itunes_summary TEXT,
    itunes_subtitle TEXT,
    itunes_explicit BOOLEAN,
    itunes_episode_type TEXT,
    itunes_episode INT
);
CREATE TABLE IF NOT EXISTS podcast_author (
    id SERIAL PRIMARY KEY,
    name TEXT UNIQUE NOT NULL
);
CREATE TABLE IF NOT EXISTS podcast_keyword (
    id SERIAL PRIMARY KEY,
    keyword TEXT UNIQUE NOT NULL
);
CREATE TABLE IF NOT EXISTS podcast_author_map (
    podcast_item_id INT REFERENCES podcast_item(id) ON DELETE CASCADE,
    author_id INT REFERENCES podcast_author(id) ON DELETE CASCADE,
    PRIMARY KEY (podcast_item_id, author_id)
);
CREATE TABLE IF NOT EXISTS podcast_keyword_map (
    podcast_item_id INT REFERENCES podcast_item(id) ON DELETE CASCADE,
    keyword_id INT REFERENCES podcast_keyword(id) ON DELETE CASCADE,
    PRIMARY KEY (podcast_item_id, keyword_id)
);
CREATE INDEX IF NOT EXISTS podcast_author_map_author_idx ON podcast_author_map (author_id);
CREATE INDEX IF NOT EXISTS podcast_keyword_map_keyword_idx ON podcast_keyword_map (keyword_id);
"#;

/// Create all tables if absent, dropping them first when `drop_first` is set.
///
/// Callers gate `drop_first`; this function does whatever it is told.
pub async fn ensure_schema(client: &mut Client, drop_first: bool) -> DbResult<()> {
    let map_err = |e: tokio_postgres::Error| DbError::SchemaFailed(describe(&e));

    let tx = client.transaction().await.map_err(map_err)?;
    tx.execute("SELECT pg_advisory_xact_lock($1)", &[&SCHEMA_LOCK_KEY])
        .await
        .map_err(map_err)?;

    if drop_first {
        warn!(tables = ?TABLES, "dropping podcast tables");
        tx.batch_execute(DROP_TABLES).await.map_err(map_err)?;
    }
    tx.batch_execute(CREATE_TABLES).await.map_err(map_err)?;
    tx.commit().await.map_err(map_err)?;

    info!(dropped = drop_first, "schema ready");
    Ok(())
}

/// Tables from [`TABLES`] that do not exist
pub async fn missing_tables(client: &Client) -> DbResult<Vec<&'static str>> {
    let mut missing = Vec::new();
    for table in TABLES {
        let row = client
            .query_one("SELECT to_regclass($1::text) IS NOT NULL", &[&table])
            .await
            .map_err(|e| DbError::QueryFailed(describe(&e)))?;
        let exists: bool = row.get(0);
        if !exists {
            missing.push(table);
        }
    }
    Ok(missing)
}
