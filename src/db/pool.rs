//! Connection pool
//!
//! A bounded set of tokio-postgres clients shared by every store operation,
//! built on `deadpool::managed`.
//!
//! - At most `max_size` connections are handed out at once; further
//!   `acquire` calls wait up to `acquire_timeout` (zero means fail fast with
//!   [`DbError::PoolExhausted`]).
//! - Every handed-out connection has just passed the liveness check. An idle
//!   client that fails it is closed during recycling and never handed out; a
//!   fresh client is checked as it is opened, and opening is retried once
//!   before the acquire fails.
//! - [`PooledConnection`] is the only way to hold a client. Dropping it gives
//!   the client back (or closes it if it broke or the pool shut down) and frees
//!   the slot on every exit path.

use crate::config::ConnectionConfig;
use crate::db::postgres::{check_alive, connect_client, describe};
use crate::error::{DbError, DbResult};
use deadpool::Runtime;
use deadpool::managed::{
    self, Metrics, Object, PoolError, RecycleError, RecycleResult, TimeoutType,
};
use std::ops::{Deref, DerefMut};
use std::time::Duration;
use tokio_postgres::Client;
use tracing::{debug, info, warn};

/// Pool sizing and acquisition policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolOptions {
    /// Connections opened up front
    pub min_size: usize,
    /// Upper bound on connections handed out concurrently
    pub max_size: usize,
    /// How long `acquire` waits for a free slot; zero fails immediately
    pub acquire_timeout: Duration,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            min_size: 5,
            max_size: 10,
            acquire_timeout: Duration::from_secs(30),
        }
    }
}

/// Point-in-time pool counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    pub idle: usize,
    pub in_use: usize,
    pub max_size: usize,
    pub closed: bool,
}

/// A client together with the version its last check reported
pub struct VerifiedClient {
    client: Client,
    server_version: String,
}

/// Opens and re-checks clients for deadpool
pub struct ClientManager {
    config: ConnectionConfig,
}

impl managed::Manager for ClientManager {
    type Type = VerifiedClient;
    type Error = DbError;

    async fn create(&self) -> Result<VerifiedClient, DbError> {
        let client = connect_client(&self.config).await?;
        let server_version = check_alive(&client)
            .await
            .map_err(|e| DbError::StaleConnection(describe(&e)))?;
        debug!(%server_version, "connection verified");
        Ok(VerifiedClient {
            client,
            server_version,
        })
    }

    async fn recycle(&self, conn: &mut VerifiedClient, _: &Metrics) -> RecycleResult<DbError> {
        if conn.client.is_closed() {
            debug!("dropping closed idle connection");
            return Err(RecycleError::Backend(DbError::StaleConnection(
                "connection closed".into(),
            )));
        }
        match check_alive(&conn.client).await {
            Ok(version) => {
                conn.server_version = version;
                Ok(())
            }
            Err(e) => {
                let reason = describe(&e);
                warn!(error = %reason, "connection check failed, replacing it");
                Err(RecycleError::Backend(DbError::StaleConnection(reason)))
            }
        }
    }
}

/// Shared handle to the pool; clones refer to the same connections.
#[derive(Clone)]
pub struct Pool {
    inner: managed::Pool<ClientManager>,
    options: PoolOptions,
}

impl Pool {
    /// Create the pool and open `min_size` warm connections.
    ///
    /// Fails only if warm connections were requested and none could be opened.
    pub async fn connect(config: ConnectionConfig, options: PoolOptions) -> DbResult<Self> {
        if options.max_size == 0 {
            return Err(DbError::ConnectFailed("pool max_size must be > 0".into()));
        }
        let name = config.name.clone();
        let inner = managed::Pool::builder(ClientManager { config })
            .max_size(options.max_size)
            .wait_timeout(Some(options.acquire_timeout))
            .runtime(Runtime::Tokio1)
            .build()
            .map_err(|e| DbError::ConnectFailed(e.to_string()))?;
        let pool = Self { inner, options };

        let warm = pool.options.min_size.min(pool.options.max_size);
        let attempts = futures::future::join_all((0..warm).map(|_| pool.checkout())).await;
        let mut opened = 0;
        let mut first_error = None;
        for attempt in attempts {
            match attempt {
                // Dropping the object puts it on the idle list
                Ok(_) => opened += 1,
                Err(e) => {
                    warn!(error = %e, "failed to open warm connection");
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }
        if opened == 0
            && let Some(e) = first_error
        {
            return Err(e);
        }

        info!(
            target_db = %name,
            warm = opened,
            max = pool.options.max_size,
            "connection pool ready"
        );
        Ok(pool)
    }

    /// Borrow a verified connection.
    pub async fn acquire(&self) -> DbResult<PooledConnection> {
        if self.is_closed() {
            return Err(DbError::PoolClosed);
        }
        let object = match self.checkout().await {
            Err(e @ (DbError::ConnectFailed(_) | DbError::StaleConnection(_))) => {
                warn!(error = %e, "could not open a verified connection, retrying once");
                self.checkout().await?
            }
            other => other?,
        };
        Ok(PooledConnection {
            object: Some(object),
            reusable: true,
        })
    }

    /// Shut the pool down. Idle connections are closed now, borrowed ones when
    /// they come back; waiting and future `acquire` calls fail with `PoolClosed`.
    pub fn close(&self) {
        if self.inner.is_closed() {
            return;
        }
        let idle = self.inner.status().available;
        self.inner.close();
        info!(closed = idle, "connection pool closed");
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    pub fn status(&self) -> PoolStatus {
        let status = self.inner.status();
        PoolStatus {
            idle: status.available,
            in_use: status.size.saturating_sub(status.available),
            max_size: self.options.max_size,
            closed: self.is_closed(),
        }
    }

    async fn checkout(&self) -> DbResult<Object<ClientManager>> {
        self.inner
            .get()
            .await
            .map_err(|e| pool_error(e, &self.options))
    }
}

fn pool_error(error: PoolError<DbError>, options: &PoolOptions) -> DbError {
    match error {
        PoolError::Backend(e) => e,
        PoolError::Closed => DbError::PoolClosed,
        PoolError::Timeout(TimeoutType::Wait) if options.acquire_timeout.is_zero() => {
            DbError::PoolExhausted(options.max_size)
        }
        PoolError::Timeout(TimeoutType::Wait) => DbError::Timeout(format!(
            "no connection available within {:?}",
            options.acquire_timeout
        )),
        other => DbError::ConnectFailed(other.to_string()),
    }
}

/// A connection borrowed from the pool.
///
/// Derefs to [`tokio_postgres::Client`]; `DerefMut` gives access to
/// `Client::transaction`.
pub struct PooledConnection {
    object: Option<Object<ClientManager>>,
    reusable: bool,
}

impl PooledConnection {
    /// Close this connection on release instead of returning it to the pool.
    pub fn discard(&mut self) {
        self.reusable = false;
    }

    /// Server version reported when this checkout was verified
    pub fn server_version(&self) -> &str {
        &self.verified().server_version
    }

    fn verified(&self) -> &VerifiedClient {
        self.object
            .as_ref()
            .expect("client is present until the guard is dropped")
    }
}

impl Deref for PooledConnection {
    type Target = Client;

    fn deref(&self) -> &Client {
        &self.verified().client
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Client {
        &mut self
            .object
            .as_mut()
            .expect("client is present until the guard is dropped")
            .client
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        let Some(object) = self.object.take() else {
            return;
        };
        if !self.reusable || object.client.is_closed() {
            debug!("closing returned connection");
            // Detached from the pool, so the client is closed here and its slot freed
            drop(Object::take(object));
        }
    }
}
