//! Feed store trait
//!
//! The operations callers run against persisted feeds. [`PostgresStore`] is
//! the real implementation; command handlers are written against the trait
//! so they can be tested without a server.
//!
//! [`PostgresStore`]: crate::db::store::PostgresStore

use crate::db::ingest::IngestReport;
use crate::db::maintenance::MaintenanceOutcome;
use crate::error::DbResult;
use crate::feed::FeedDocument;
use std::future::Future;

pub trait FeedStore: Send + Sync {
    /// Create the tables if absent, optionally dropping them first
    ///
    /// # Errors
    /// Returns `DbError::DropNotPermitted` if `drop_first` is set but the
    /// store was not configured to allow it, `DbError::SchemaFailed` if the
    /// DDL fails (nothing is applied in that case)
    fn ensure_schema(&self, drop_first: bool) -> impl Future<Output = DbResult<()>> + Send;

    /// Store every new entry of `document` in one transaction
    ///
    /// # Errors
    /// Connectivity, timeout and constraint faults abort the whole batch.
    /// Invalid entries are not errors; they are counted in the report.
    fn ingest(
        &self,
        document: &FeedDocument,
    ) -> impl Future<Output = DbResult<IngestReport>> + Send;

    /// Delete one item by GUID
    fn delete_item(&self, guid: &str) -> impl Future<Output = MaintenanceOutcome> + Send;

    /// Check connectivity
    fn ping(&self) -> impl Future<Output = MaintenanceOutcome> + Send;
}
