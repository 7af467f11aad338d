//! PostgreSQL feed store
//!
//! Ties the pool, schema manager, ingest engine and maintenance operations
//! together behind [`FeedStore`]. Every operation borrows exactly one pooled
//! connection for its duration; transactional operations are bounded by the
//! configured transaction timeout.

use crate::config::RuntimeOptions;
use crate::db::ingest::{self, IngestReport};
use crate::db::maintenance::{self, MaintenanceOutcome};
use crate::db::pool::{Pool, PooledConnection};
use crate::db::provider::FeedStore;
use crate::db::schema;
use crate::error::{DbError, DbResult};
use crate::feed::FeedDocument;
use std::time::Duration;
use tokio::time::error::Elapsed;
use tracing::{error, instrument};

/// Feed store backed by a connection pool
#[derive(Clone)]
pub struct PostgresStore {
    pool: Pool,
    transaction_timeout: Duration,
    allow_schema_drop: bool,
}

impl PostgresStore {
    pub fn new(pool: Pool, transaction_timeout: Duration, allow_schema_drop: bool) -> Self {
        Self {
            pool,
            transaction_timeout,
            allow_schema_drop,
        }
    }

    /// Open the pool described by resolved settings
    pub async fn connect(options: &RuntimeOptions) -> DbResult<Self> {
        let pool = Pool::connect(options.connection.clone(), options.pool.clone()).await?;
        Ok(Self::new(
            pool,
            options.transaction_timeout,
            options.allow_schema_drop,
        ))
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    /// Shut the pool down; safe to call repeatedly
    pub fn close(&self) {
        self.pool.close();
    }

    /// Turn a timed transaction result into the operation result. A timed-out
    /// connection may still have a statement running, so it is not reused.
    fn settle<T>(
        &self,
        mut conn: PooledConnection,
        outcome: Result<DbResult<T>, Elapsed>,
        operation: &str,
    ) -> DbResult<T> {
        match outcome {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                error!(operation, error = %e, "transaction rolled back");
                if e.is_connectivity() {
                    conn.discard();
                }
                Err(e)
            }
            Err(_) => {
                conn.discard();
                error!(operation, timeout = ?self.transaction_timeout, "transaction timed out");
                Err(DbError::Timeout(format!(
                    "{} exceeded {:?}",
                    operation, self.transaction_timeout
                )))
            }
        }
    }
}

impl FeedStore for PostgresStore {
    #[instrument(skip(self))]
    async fn ensure_schema(&self, drop_first: bool) -> DbResult<()> {
        if drop_first && !self.allow_schema_drop {
            return Err(DbError::DropNotPermitted);
        }
        let mut conn = self.pool.acquire().await?;
        let outcome = tokio::time::timeout(
            self.transaction_timeout,
            schema::ensure_schema(&mut conn, drop_first),
        )
        .await;
        self.settle(conn, outcome, "schema update")
    }

    #[instrument(skip_all, fields(entries = document.entries.len()))]
    async fn ingest(&self, document: &FeedDocument) -> DbResult<IngestReport> {
        let mut conn = self.pool.acquire().await?;
        let outcome = tokio::time::timeout(
            self.transaction_timeout,
            ingest::ingest_document(&mut conn, document),
        )
        .await;
        self.settle(conn, outcome, "ingest")
    }

    #[instrument(skip(self))]
    async fn delete_item(&self, guid: &str) -> MaintenanceOutcome {
        maintenance::delete_item(&self.pool, guid).await
    }

    #[instrument(skip(self))]
    async fn ping(&self) -> MaintenanceOutcome {
        maintenance::ping(&self.pool).await
    }
}
