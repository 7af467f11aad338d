//! Database layer
//!
//! A bounded connection pool, the schema manager, the ingest engine and
//! maintenance operations, exposed together through the [`FeedStore`] trait
//! so callers can be tested against a fake.

pub mod ingest;
pub mod maintenance;
pub mod pool;
pub mod postgres;
pub mod provider;
pub mod schema;
pub mod store;

// Re-export main types
pub use ingest::IngestReport;
pub use maintenance::MaintenanceOutcome;
pub use pool::{Pool, PoolOptions, PoolStatus, PooledConnection};
pub use provider::FeedStore;
pub use store::PostgresStore;
