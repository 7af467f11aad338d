//! Maintenance operations
//!
//! `ping` and single-item deletion. Both report an outcome instead of
//! returning errors: faults are logged and described in `reason`.

use crate::db::pool::Pool;
use crate::db::postgres::describe;
use crate::error::{DbError, DbResult};
use crate::feed::item::normalize_guid;
use tokio_postgres::Client;
use tracing::{error, info};
use uuid::Uuid;

const DELETE_ITEM: &str = "DELETE FROM podcast_item WHERE guid = $1";

/// Result of a maintenance operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaintenanceOutcome {
    pub success: bool,
    pub rows_affected: u64,
    /// Human-readable detail: server version for `ping`, the failure otherwise
    pub reason: Option<String>,
}

impl MaintenanceOutcome {
    pub fn succeeded(rows_affected: u64, reason: Option<String>) -> Self {
        Self {
            success: true,
            rows_affected,
            reason,
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            rows_affected: 0,
            reason: Some(reason.into()),
        }
    }
}

/// Check connectivity through the pool
pub async fn ping(pool: &Pool) -> MaintenanceOutcome {
    // A checkout is only handed out after the liveness check succeeded
    match pool.acquire().await {
        Ok(conn) => {
            let version = conn.server_version().to_string();
            info!(%version, "ping: connected");
            MaintenanceOutcome::succeeded(0, Some(version))
        }
        Err(e) => {
            error!(error = %e, "ping failed");
            MaintenanceOutcome::failed(e.to_string())
        }
    }
}

/// Delete one item by GUID; links go with it through `ON DELETE CASCADE`.
///
/// The GUID is normalized the same way ingestion normalizes it, so any
/// spelling of a stored UUID matches. "Not found" succeeds with zero rows.
pub async fn delete_item(pool: &Pool, raw_guid: &str) -> MaintenanceOutcome {
    let guid = match normalize_guid(raw_guid) {
        Ok(guid) => guid,
        Err(e) => {
            error!(guid = raw_guid, error = %e, "delete rejected");
            return MaintenanceOutcome::failed(e.to_string());
        }
    };

    let result = match pool.acquire().await {
        Ok(mut conn) => delete_in_tx(&mut conn, guid).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(0) => {
            info!(%guid, "no item found");
            MaintenanceOutcome::succeeded(0, Some(format!("no item with GUID {}", guid)))
        }
        Ok(rows) => {
            info!(%guid, "item deleted");
            MaintenanceOutcome::succeeded(rows, None)
        }
        Err(e) => {
            error!(%guid, error = %e, "delete failed");
            MaintenanceOutcome::failed(e.to_string())
        }
    }
}

async fn delete_in_tx(client: &mut Client, guid: Uuid) -> DbResult<u64> {
    let map_err = |e: tokio_postgres::Error| DbError::QueryFailed(describe(&e));
    // Dropped uncommitted on error, which rolls back
    let tx = client.transaction().await.map_err(map_err)?;
    let rows = tx.execute(DELETE_ITEM, &[&guid]).await.map_err(map_err)?;
    tx.commit().await.map_err(map_err)?;
    Ok(rows)
}
