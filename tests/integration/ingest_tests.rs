//! Integration tests for feed ingestion
//!
//! These tests require the test PostgreSQL database to be running.
//! Start it with: docker-compose -f docker-compose.test.yml up -d

use crate::common::{
    author_count, author_links, connect_pool, connect_store, count, document, entry, fresh_guid,
    item_count, keyword_links, pool_options, tagged_entry, test_config, unique,
};
use podstore::db::postgres::connect_client;
use podstore::db::{FeedStore, IngestReport, PostgresStore, ingest, schema};
use podstore::error::DbError;
use podstore::feed::FeedEntry;
use serde_json::json;
use std::time::Duration;
use uuid::Uuid;

#[tokio::test]
async fn test_ingest_twice_is_a_no_op() {
    let Some(store) = connect_store().await else {
        return;
    };
    let (a, b) = (fresh_guid(), fresh_guid());
    let keyword = unique("kw");
    let doc = document(vec![
        tagged_entry(&a, "Ep1", &unique("host"), &[&keyword]),
        entry(&b, "Ep2"),
    ]);

    let first = store.ingest(&doc).await.unwrap();
    assert_eq!(first.inserted, 2);
    assert_eq!(first.skipped, 0);

    let second = store.ingest(&doc).await.unwrap();
    assert_eq!(
        second,
        IngestReport {
            skipped: 2,
            ..Default::default()
        }
    );
    assert_eq!(item_count(&store, &a).await, 1);
    assert_eq!(item_count(&store, &b).await, 1);
    assert_eq!(author_links(&store, &a).await, 1);
    assert_eq!(keyword_links(&store, &a).await, 1);
}

#[tokio::test]
async fn test_duplicate_guid_scenario() {
    let Some(store) = connect_store().await else {
        return;
    };
    let guid = fresh_guid();
    let (alice, bob) = (unique("Alice"), unique("Bob"));
    let tech = unique("tech");
    let doc = document(vec![
        tagged_entry(&guid, "Ep1", &format!("{}, {}", alice, bob), &[&tech]),
        entry(&guid, "Ep1-dup"),
    ]);

    let report = store.ingest(&doc).await.unwrap();
    assert_eq!(report.inserted, 1);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.authors_linked, 2);
    assert_eq!(report.keywords_linked, 1);

    assert_eq!(item_count(&store, &guid).await, 1);
    assert_eq!(author_links(&store, &guid).await, 2);
    assert_eq!(keyword_links(&store, &guid).await, 1);

    let conn = store.pool().acquire().await.unwrap();
    let title: String = conn
        .query_one(
            "SELECT title FROM podcast_item WHERE guid = $1",
            &[&Uuid::parse_str(&guid).unwrap()],
        )
        .await
        .unwrap()
        .get(0);
    assert_eq!(title, "Ep1");
}

#[tokio::test]
async fn test_invalid_entries_do_not_block_the_batch() {
    let Some(store) = connect_store().await else {
        return;
    };
    let (a, b) = (fresh_guid(), fresh_guid());
    let doc = document(vec![
        FeedEntry::new().with_field("title", "no guid"),
        entry(&a, "Ep1"),
        entry("https://example.com/?p=12", "bad guid"),
        FeedEntry::new().with_field("guid", fresh_guid()),
        entry(&b, "Ep2"),
    ]);

    let report = store.ingest(&doc).await.unwrap();
    assert_eq!(report.inserted, 2);
    assert_eq!(report.rejected, 3);
    assert_eq!(report.total(), 5);
    assert_eq!(item_count(&store, &a).await, 1);
    assert_eq!(item_count(&store, &b).await, 1);
}

#[tokio::test]
async fn test_guid_spelling_is_normalized() {
    let Some(store) = connect_store().await else {
        return;
    };
    let guid = fresh_guid();
    let braced = format!("{{{}}}", guid.to_uppercase());

    store.ingest(&document(vec![entry(&braced, "Ep")])).await.unwrap();
    let again = store.ingest(&document(vec![entry(&guid, "Ep")])).await.unwrap();

    assert_eq!(again.skipped, 1);
    assert_eq!(item_count(&store, &guid).await, 1);
}

#[tokio::test]
async fn test_authors_and_keywords_are_shared() {
    let Some(store) = connect_store().await else {
        return;
    };
    let host = unique("host");
    let keyword = unique("kw");
    let (a, b) = (fresh_guid(), fresh_guid());
    let doc = document(vec![
        tagged_entry(&a, "Ep1", &host, &[&keyword, &keyword]),
        tagged_entry(&b, "Ep2", &format!("{}, {}", host, host), &[&keyword]),
    ]);

    store.ingest(&doc).await.unwrap();

    assert_eq!(author_count(&store, &host).await, 1);
    assert_eq!(
        count(
            &store,
            "SELECT count(*) FROM podcast_keyword WHERE keyword = $1",
            &[&keyword],
        )
        .await,
        1
    );
    assert_eq!(author_links(&store, &a).await, 1);
    assert_eq!(author_links(&store, &b).await, 1);
    assert_eq!(keyword_links(&store, &a).await, 1);
}

#[tokio::test]
async fn test_concurrent_ingest_creates_author_once() {
    let Some(store) = connect_store().await else {
        return;
    };
    let host = unique("host");
    let (a, b) = (fresh_guid(), fresh_guid());
    let first = document(vec![tagged_entry(&a, "Ep1", &host, &[])]);
    let second = document(vec![tagged_entry(&b, "Ep2", &host, &[])]);

    let (r1, r2) = tokio::join!(store.ingest(&first), store.ingest(&second));
    assert_eq!(r1.unwrap().inserted, 1);
    assert_eq!(r2.unwrap().inserted, 1);

    assert_eq!(author_count(&store, &host).await, 1);
    assert_eq!(
        count(
            &store,
            "SELECT count(*) FROM podcast_author_map m \
             JOIN podcast_author a ON a.id = m.author_id WHERE a.name = $1",
            &[&host],
        )
        .await,
        2
    );
}

#[tokio::test]
async fn test_optional_fields_are_stored() {
    let Some(store) = connect_store().await else {
        return;
    };
    let guid = fresh_guid();
    let doc = document(vec![
        entry(&guid, "Ep1")
            .with_field("published", "Tue, 10 Sep 2024 08:00:00 +0000")
            .with_field(
                "enclosures",
                json!([{"length": "1234", "type": "audio/mpeg", "url": "https://cdn/ep1.mp3"}]),
            )
            .with_field("itunes_duration", "01:02:03")
            .with_field("itunes_explicit", "yes")
            .with_field("itunes_episode", "7"),
    ]);
    store.ingest(&doc).await.unwrap();

    let conn = store.pool().acquire().await.unwrap();
    let row = conn
        .query_one(
            "SELECT EXTRACT(EPOCH FROM itunes_duration)::bigint, itunes_explicit, \
             itunes_episode, enclosure_length, enclosure_url, \
             pub_date = TIMESTAMPTZ '2024-09-10 08:00:00+00', description IS NULL \
             FROM podcast_item WHERE guid = $1",
            &[&Uuid::parse_str(&guid).unwrap()],
        )
        .await
        .unwrap();
    assert_eq!(row.get::<_, i64>(0), 3723);
    assert_eq!(row.get::<_, Option<bool>>(1), Some(true));
    assert_eq!(row.get::<_, Option<i32>>(2), Some(7));
    assert_eq!(row.get::<_, Option<i64>>(3), Some(1234));
    assert_eq!(row.get::<_, Option<String>>(4).as_deref(), Some("https://cdn/ep1.mp3"));
    assert!(row.get::<_, bool>(5));
    assert!(row.get::<_, bool>(6));
}

#[tokio::test]
async fn test_database_fault_rolls_back_the_batch() {
    let Some(store) = connect_store().await else {
        return;
    };
    let (a, b) = (fresh_guid(), fresh_guid());
    // PostgreSQL rejects NUL bytes in text values
    let doc = document(vec![
        entry(&a, "Ep1"),
        tagged_entry(&b, "Ep2", "bad\u{0}name", &[]),
    ]);

    let err = store.ingest(&doc).await.unwrap_err();
    let DbError::QueryFailed(message) = &err else {
        panic!("expected QueryFailed, got {:?}", err);
    };
    // The server's message, not the driver's bare "db error"
    assert!(
        message.contains("invalid byte sequence"),
        "unexpected message: {}",
        message
    );
    assert_eq!(item_count(&store, &a).await, 0);
    assert_eq!(item_count(&store, &b).await, 0);
    assert_eq!(store.pool().status().in_use, 0);
}

#[tokio::test]
async fn test_oversized_duration_does_not_block_the_batch() {
    let Some(store) = connect_store().await else {
        return;
    };
    let (a, b) = (fresh_guid(), fresh_guid());
    let doc = document(vec![
        entry(&a, "Ep1"),
        entry(&b, "Ep2").with_field("itunes_duration", "9999999999999"),
    ]);

    let report = store.ingest(&doc).await.unwrap();
    assert_eq!(report.inserted, 2);
    assert_eq!(item_count(&store, &a).await, 1);

    let guid = Uuid::parse_str(&b).unwrap();
    let stored = count(
        &store,
        "SELECT count(*) FROM podcast_item WHERE guid = $1 AND itunes_duration IS NULL",
        &[&guid],
    )
    .await;
    assert_eq!(stored, 1);
}

#[tokio::test]
async fn test_transaction_timeout_discards_connection() {
    if connect_store().await.is_none() {
        return;
    }
    let Some(pool) = connect_pool(pool_options(1, Duration::from_secs(5))).await else {
        return;
    };
    let store = PostgresStore::new(pool, Duration::from_nanos(1), false);

    let err = store
        .ingest(&document(vec![entry(&fresh_guid(), "Ep")]))
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::Timeout(_)));

    let status = store.pool().status();
    assert_eq!(status.idle, 0);
    assert_eq!(status.in_use, 0);
}

#[tokio::test]
async fn test_schema_setup_is_idempotent() {
    let Some(store) = connect_store().await else {
        return;
    };
    store.ensure_schema(false).await.unwrap();
    store.ensure_schema(false).await.unwrap();

    let conn = store.pool().acquire().await.unwrap();
    let missing = podstore::db::schema::missing_tables(&conn).await.unwrap();
    assert!(missing.is_empty(), "missing tables: {:?}", missing);
}

#[tokio::test]
async fn test_drop_refused_without_permission() {
    let Some(store) = connect_store().await else {
        return;
    };
    assert!(matches!(
        store.ensure_schema(true).await,
        Err(DbError::DropNotPermitted)
    ));
}

#[tokio::test]
async fn test_schema_recreate_empties_tables() {
    if connect_store().await.is_none() {
        return;
    }
    // A private schema keeps the drop away from tables other tests use
    let namespace = format!("podstore_{}", Uuid::new_v4().simple());
    let mut client = connect_client(&test_config()).await.unwrap();
    client
        .batch_execute(&format!(
            "CREATE SCHEMA {0}; SET search_path TO {0}",
            namespace
        ))
        .await
        .unwrap();

    schema::ensure_schema(&mut client, false).await.unwrap();
    let doc = document(vec![tagged_entry(
        &fresh_guid(),
        "Ep1",
        "Alice",
        &["rust"],
    )]);
    let report = ingest::ingest_document(&mut client, &doc).await.unwrap();
    assert_eq!(report.inserted, 1);

    schema::ensure_schema(&mut client, true).await.unwrap();

    assert!(schema::missing_tables(&client).await.unwrap().is_empty());
    for table in schema::TABLES {
        let rows: i64 = client
            .query_one(&format!("SELECT count(*) FROM {}", table), &[])
            .await
            .unwrap()
            .get(0);
        assert_eq!(rows, 0, "{} not emptied", table);
    }

    client
        .batch_execute(&format!("DROP SCHEMA {} CASCADE", namespace))
        .await
        .unwrap();
}
