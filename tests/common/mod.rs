//! Common test utilities and helpers
//!
//! Shared test infrastructure for the integration tests.

#![allow(dead_code)]

use podstore::config::{ConnectionConfig, SslMode};
use podstore::db::{FeedStore, Pool, PoolOptions, PostgresStore};
use podstore::feed::{FeedDocument, FeedEntry, FeedMeta};
use serde_json::json;
use std::time::Duration;
use uuid::Uuid;

/// Get test database connection config
pub fn test_config() -> ConnectionConfig {
    ConnectionConfig {
        name: "integration-test".to_string(),
        host: std::env::var("TEST_DB_HOST").unwrap_or_else(|_| "localhost".to_string()),
        port: std::env::var("TEST_DB_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(5433),
        database: std::env::var("TEST_DB_NAME").unwrap_or_else(|_| "test_db".to_string()),
        username: std::env::var("TEST_DB_USER").unwrap_or_else(|_| "test_user".to_string()),
        password: Some(
            std::env::var("TEST_DB_PASSWORD").unwrap_or_else(|_| "test_password".to_string()),
        ),
        ssl_mode: SslMode::Disable,
    }
}

pub fn pool_options(max_size: usize, acquire_timeout: Duration) -> PoolOptions {
    PoolOptions {
        min_size: 1,
        max_size,
        acquire_timeout,
    }
}

/// Open a pool, or `None` when the test database is not running
pub async fn connect_pool(options: PoolOptions) -> Option<Pool> {
    let config = test_config();
    match Pool::connect(config.clone(), options).await {
        Ok(pool) => Some(pool),
        Err(e) => {
            eprintln!(
                "Skipping test: Database not available at {}:{} - {}",
                config.host, config.port, e
            );
            None
        }
    }
}

/// Open a store with the schema in place, or `None` when the database is down
pub async fn connect_store() -> Option<PostgresStore> {
    let pool = connect_pool(pool_options(4, Duration::from_secs(10))).await?;
    let store = PostgresStore::new(pool, Duration::from_secs(30), false);
    store
        .ensure_schema(false)
        .await
        .expect("schema setup should succeed");
    Some(store)
}

/// A fresh GUID in the canonical lowercase form
pub fn fresh_guid() -> String {
    Uuid::new_v4().to_string()
}

/// A name no other test uses
pub fn unique(prefix: &str) -> String {
    format!("{}-{}", prefix, Uuid::new_v4().simple())
}

/// Entry with the two required fields
pub fn entry(guid: &str, title: &str) -> FeedEntry {
    FeedEntry::new()
        .with_field("guid", guid)
        .with_field("title", title)
}

/// Entry with authors and keywords
pub fn tagged_entry(guid: &str, title: &str, authors: &str, keywords: &[&str]) -> FeedEntry {
    let tags: Vec<_> = keywords.iter().map(|k| json!({ "term": k })).collect();
    entry(guid, title)
        .with_field("author", authors)
        .with_field("tags", tags)
}

pub fn document(entries: Vec<FeedEntry>) -> FeedDocument {
    FeedDocument::new(
        FeedMeta {
            title: Some("Integration Show".to_string()),
            ..Default::default()
        },
        entries,
    )
}

/// Run a single-row `SELECT count(*)` and return the count
pub async fn count(
    store: &PostgresStore,
    sql: &str,
    params: &[&(dyn tokio_postgres::types::ToSql + Sync)],
) -> i64 {
    let conn = store.pool().acquire().await.expect("acquire");
    conn.query_one(sql, params).await.expect("count query").get(0)
}

pub async fn item_count(store: &PostgresStore, guid: &str) -> i64 {
    let guid = Uuid::parse_str(guid).expect("valid guid");
    count(
        store,
        "SELECT count(*) FROM podcast_item WHERE guid = $1",
        &[&guid],
    )
    .await
}

pub async fn author_count(store: &PostgresStore, name: &str) -> i64 {
    count(
        store,
        "SELECT count(*) FROM podcast_author WHERE name = $1",
        &[&name],
    )
    .await
}

pub async fn author_links(store: &PostgresStore, guid: &str) -> i64 {
    let guid = Uuid::parse_str(guid).expect("valid guid");
    count(
        store,
        "SELECT count(*) FROM podcast_author_map m \
         JOIN podcast_item i ON i.id = m.podcast_item_id WHERE i.guid = $1",
        &[&guid],
    )
    .await
}

pub async fn keyword_links(store: &PostgresStore, guid: &str) -> i64 {
    let guid = Uuid::parse_str(guid).expect("valid guid");
    count(
        store,
        "SELECT count(*) FROM podcast_keyword_map m \
         JOIN podcast_item i ON i.id = m.podcast_item_id WHERE i.guid = $1",
        &[&guid],
    )
    .await
}
