//! Integration tests for the connection pool
//!
//! These tests require the test PostgreSQL database to be running.
//! Start it with: docker-compose -f docker-compose.test.yml up -d

use crate::common::{connect_pool, pool_options, test_config};
use podstore::db::postgres::connect_client;
use podstore::error::DbError;
use std::time::Duration;

async fn backend_pid(client: &tokio_postgres::Client) -> i32 {
    client
        .query_one("SELECT pg_backend_pid()", &[])
        .await
        .expect("pid query")
        .get(0)
}

#[tokio::test]
async fn test_warm_connections_opened() {
    let Some(pool) = connect_pool(pool_options(3, Duration::from_secs(5))).await else {
        return;
    };
    let status = pool.status();
    assert_eq!(status.idle, 1);
    assert_eq!(status.in_use, 0);
    assert_eq!(status.max_size, 3);
}

#[tokio::test]
async fn test_released_connection_is_reused() {
    let Some(pool) = connect_pool(pool_options(2, Duration::from_secs(5))).await else {
        return;
    };

    let first = {
        let conn = pool.acquire().await.unwrap();
        assert_eq!(pool.status().in_use, 1);
        backend_pid(&conn).await
    };
    assert_eq!(pool.status().in_use, 0);

    let conn = pool.acquire().await.unwrap();
    assert_eq!(backend_pid(&conn).await, first);
}

#[tokio::test]
async fn test_discarded_connection_is_not_reused() {
    let Some(pool) = connect_pool(pool_options(1, Duration::from_secs(5))).await else {
        return;
    };

    let first = {
        let mut conn = pool.acquire().await.unwrap();
        conn.discard();
        backend_pid(&conn).await
    };
    assert_eq!(pool.status().idle, 0);

    let conn = pool.acquire().await.unwrap();
    assert_ne!(backend_pid(&conn).await, first);
}

#[tokio::test]
async fn test_exhausted_pool_fails_fast() {
    let Some(pool) = connect_pool(pool_options(1, Duration::ZERO)).await else {
        return;
    };

    let held = pool.acquire().await.unwrap();
    assert!(matches!(
        pool.acquire().await,
        Err(DbError::PoolExhausted(1))
    ));

    drop(held);
    assert!(pool.acquire().await.is_ok());
}

#[tokio::test]
async fn test_acquire_times_out() {
    let Some(pool) = connect_pool(pool_options(1, Duration::from_millis(200))).await else {
        return;
    };

    let _held = pool.acquire().await.unwrap();
    assert!(matches!(pool.acquire().await, Err(DbError::Timeout(_))));
}

#[tokio::test]
async fn test_waiter_gets_released_connection() {
    let Some(pool) = connect_pool(pool_options(1, Duration::from_secs(5))).await else {
        return;
    };

    let held = pool.acquire().await.unwrap();
    let waiter = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.acquire().await.map(|_| ()) })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    drop(held);

    let result = waiter.await.unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_terminated_connection_is_replaced() {
    let Some(pool) = connect_pool(pool_options(1, Duration::from_secs(5))).await else {
        return;
    };

    let stale_pid = {
        let conn = pool.acquire().await.unwrap();
        backend_pid(&conn).await
    };

    let admin = connect_client(&test_config()).await.unwrap();
    admin
        .execute("SELECT pg_terminate_backend($1)", &[&stale_pid])
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let conn = pool.acquire().await.expect("stale connection should be replaced");
    assert_ne!(backend_pid(&conn).await, stale_pid);
}

#[tokio::test]
async fn test_connection_killed_while_idle_is_replaced_immediately() {
    let Some(pool) = connect_pool(pool_options(1, Duration::from_secs(5))).await else {
        return;
    };

    let stale_pid = {
        let conn = pool.acquire().await.unwrap();
        backend_pid(&conn).await
    };
    assert_eq!(pool.status().idle, 1);

    // Waits for the backend to exit but gives the pooled client no time to
    // notice, so the recycle check is what finds it dead
    let admin = connect_client(&test_config()).await.unwrap();
    let terminated: bool = admin
        .query_one("SELECT pg_terminate_backend($1, 5000)", &[&stale_pid])
        .await
        .unwrap()
        .get(0);
    assert!(terminated);

    let conn = pool.acquire().await.expect("dead idle connection should be replaced");
    assert_ne!(backend_pid(&conn).await, stale_pid);
    assert!(!conn.server_version().is_empty());
    assert_eq!(pool.status().in_use, 1);
}

#[tokio::test]
async fn test_close_is_idempotent() {
    let Some(pool) = connect_pool(pool_options(2, Duration::from_secs(5))).await else {
        return;
    };

    let borrowed = pool.acquire().await.unwrap();
    pool.close();
    pool.close();

    assert!(pool.is_closed());
    assert_eq!(pool.status().idle, 0);
    assert!(matches!(pool.acquire().await, Err(DbError::PoolClosed)));

    // Returned after close: closed rather than pooled
    drop(borrowed);
    assert_eq!(pool.status().idle, 0);
}
