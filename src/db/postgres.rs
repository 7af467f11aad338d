//! PostgreSQL connections
//!
//! Opening a single tokio-postgres client (with or without TLS) and the
//! liveness check shared by the pool and `ping`.

use crate::config::{ConnectionConfig, SslMode};
use crate::error::{DbError, DbResult};
use std::future::Future;
use tokio_postgres::Client;
use tracing::{debug, warn};

/// Lightweight query used to prove a connection is alive
pub const LIVENESS_QUERY: &str = "SELECT version()";

/// Open one client and drive its connection on a background task.
pub async fn connect_client(config: &ConnectionConfig) -> DbResult<Client> {
    let conn_string = config.connection_string_with_password();

    let client = match config.ssl_mode {
        SslMode::Disable => {
            let (client, connection) =
                tokio_postgres::connect(&conn_string, tokio_postgres::NoTls)
                    .await
                    .map_err(|e| DbError::ConnectFailed(describe(&e)))?;
            drive_connection(connection, config.name.clone());
            client
        }
        SslMode::Prefer | SslMode::Require => {
            let tls = tokio_postgres_rustls::MakeRustlsConnect::new(make_tls_config());
            let (client, connection) = tokio_postgres::connect(&conn_string, tls)
                .await
                .map_err(|e| DbError::ConnectFailed(describe(&e)))?;
            drive_connection(connection, config.name.clone());
            client
        }
    };

    debug!(target_db = %config.name, "opened connection");
    Ok(client)
}

/// Check that the client still answers, returning the server version string.
pub async fn check_alive(client: &Client) -> Result<String, tokio_postgres::Error> {
    let row = client.query_one(LIVENESS_QUERY, &[]).await?;
    Ok(row.get(0))
}

/// Text for a driver error. `Display` on a server-side error only says
/// "db error", so the server's own message is used when there is one.
pub fn describe(error: &tokio_postgres::Error) -> String {
    error
        .as_db_error()
        .map(|db| db.message().to_string())
        .unwrap_or_else(|| error.to_string())
}

fn drive_connection<F>(connection: F, name: String)
where
    F: Future<Output = Result<(), tokio_postgres::Error>> + Send + 'static,
{
    tokio::spawn(async move {
        // The client notices via `is_closed()`; this only records why.
        if let Err(e) = connection.await {
            warn!(target_db = %name, error = %e, "connection lost");
        }
    });
}

/// Build a rustls ClientConfig that trusts OS certificates (with Mozilla roots as fallback)
fn make_tls_config() -> rustls::ClientConfig {
    let mut root_store = rustls::RootCertStore::empty();

    let native_certs = rustls_native_certs::load_native_certs();
    let mut loaded = 0;
    for cert in native_certs.certs {
        if root_store.add(cert).is_ok() {
            loaded += 1;
        }
    }
    if loaded == 0 {
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    }

    rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth()
}
