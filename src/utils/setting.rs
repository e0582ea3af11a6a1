// Connection helpers for the preflight check
use anyhow::{Context, Result};
use sqlx::{Connection, PgConnection};
use std::time::Duration;
use tokio::time::timeout;
use url::Url;

use crate::config::ConnectionConfig;

pub const PREFLIGHT_TIMEOUT: Duration = Duration::from_secs(10);

/// Builds a `postgres://` URL for `database`. The password is percent-encoded.
///
/// A host starting with `/` is a Unix socket directory, as `pg_dump -h`
/// accepts; it goes into the `host` query parameter.
pub fn connection_url(connection: &ConnectionConfig, database: &str) -> Result<Url> {
    let mut url = Url::parse("postgres://localhost").context("Invalid base PostgreSQL URL")?;
    if connection.host.starts_with('/') {
        url.query_pairs_mut().append_pair("host", &connection.host);
    } else {
        url.set_host(Some(connection.host.as_str()))
            .with_context(|| format!("Invalid database host: {}", connection.host))?;
    }
    url.set_port(Some(connection.port))
        .map_err(|_| anyhow::anyhow!("Cannot set port {} on database URL", connection.port))?;
    url.set_username(&connection.user)
        .map_err(|_| anyhow::anyhow!("Cannot set user {} on database URL", connection.user))?;
    url.set_password(Some(connection.password.as_str()))
        .map_err(|_| anyhow::anyhow!("Cannot set password on database URL"))?;
    url.set_path(database);
    Ok(url)
}

/// `host:port/database`, safe to log.
pub fn redacted_target(connection: &ConnectionConfig, database: &str) -> String {
    format!("{}:{}/{}", connection.host, connection.port, database)
}

/// Tries one connection to `database`. Never fails: any problem, including a
/// host the URL cannot express, is logged and reported as `false`.
pub async fn check_db_connection(connection: &ConnectionConfig, database: &str) -> bool {
    check_db_connection_within(connection, database, PREFLIGHT_TIMEOUT).await
}

pub async fn check_db_connection_within(
    connection: &ConnectionConfig,
    database: &str,
    limit: Duration,
) -> bool {
    let target = redacted_target(connection, database);
    let url = match connection_url(connection, database) {
        Ok(url) => url,
        Err(e) => {
            tracing::warn!(%target, error = %e, "❌ Cannot build connection URL, skipping preflight");
            return false;
        }
    };

    match timeout(limit, PgConnection::connect(url.as_str())).await {
        Ok(Ok(conn)) => {
            if let Err(e) = conn.close().await {
                tracing::debug!(%target, error = %e, "error closing preflight connection");
            }
            tracing::info!(%target, "✅ Successfully connected");
            true
        }
        Ok(Err(e)) => {
            tracing::warn!(%target, error = %e, "❌ Failed to connect");
            false
        }
        Err(_) => {
            tracing::warn!(%target, timeout_secs = limit.as_secs_f64(), "❌ Connection attempt timed out");
            false
        }
    }
}
