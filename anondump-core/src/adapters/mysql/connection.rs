//! MySQL connection string handling and pool creation.
//!
//! # Security Features
//! - Validates connection string format before use
//! - Enforces connection limits to prevent resource exhaustion
//! - Connection strings are redacted in every error message

use crate::adapters::{ConnectionConfig, redact_database_url};
use crate::{Result, error::DumpError};
use sqlx::{Executor, MySqlPool};
use std::time::Duration;
use url::Url;

/// Default MySQL port.
pub const DEFAULT_PORT: u16 = 3306;

/// Parses a MySQL connection string into a configuration.
///
/// Recognized query parameters: `connect_timeout` (seconds, 1-300),
/// `pool_max_conns` (1-100) and `charset`.
///
/// # Errors
/// Returns a configuration error if the URL is invalid or a value is out of
/// range.
pub fn parse_mysql_connection_config(connection_string: &str) -> Result<ConnectionConfig> {
    validate_mysql_connection_string(connection_string)?;

    let url = Url::parse(connection_string).map_err(|e| {
        DumpError::configuration(format!("Invalid MySQL connection string format: {}", e))
    })?;

    let mut config = ConnectionConfig::new(url.host_str().unwrap_or("localhost").to_string())
        .with_port(url.port().unwrap_or(DEFAULT_PORT));

    let database = url.path().trim_start_matches('/');
    if !database.is_empty() {
        if database.len() > 64 {
            return Err(DumpError::configuration(
                "Database name too long: maximum 64 characters",
            ));
        }
        config = config.with_database(database.to_string());
    }

    let username = url.username();
    if !username.is_empty() {
        if username.len() > 32 {
            return Err(DumpError::configuration(
                "Username too long: maximum 32 characters for MySQL",
            ));
        }
        config = config.with_username(username.to_string());
    }

    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "connect_timeout" => {
                if let Ok(timeout_secs) = value.parse::<u64>()
                    && timeout_secs > 0
                    && timeout_secs <= 300
                {
                    config.connect_timeout = Duration::from_secs(timeout_secs);
                }
            }
            "pool_max_conns" => {
                if let Ok(max_conns) = value.parse::<u32>()
                    && max_conns > 0
                    && max_conns <= 100
                {
                    config.max_connections = max_conns;
                }
            }
            "charset" => config.charset = value.into_owned(),
            _ => {}
        }
    }

    config.validate()?;

    Ok(config)
}

/// Validates MySQL connection string format.
///
/// # Errors
/// Returns error if the string is not a `mysql://` URL with a host.
pub fn validate_mysql_connection_string(connection_string: &str) -> Result<()> {
    let url = Url::parse(connection_string).map_err(|e| {
        DumpError::configuration(format!("Invalid MySQL connection string format: {}", e))
    })?;

    if url.scheme() != "mysql" {
        return Err(DumpError::configuration(
            "Connection string must use mysql:// scheme",
        ));
    }

    if url.host_str().is_none() {
        return Err(DumpError::configuration(
            "Connection string must specify a host",
        ));
    }

    Ok(())
}

/// Creates a lazily connecting pool sized to `config.max_connections`.
///
/// Every new connection runs `SET NAMES <charset>` and, when configured,
/// switches the session to read-only transactions.
pub(crate) fn create_mysql_connection_pool(
    connection_string: &str,
    config: &ConnectionConfig,
) -> Result<MySqlPool> {
    validate_mysql_connection_string(connection_string)?;

    let set_names = format!("SET NAMES {}", config.charset);
    let read_only = config.read_only;

    sqlx::mysql::MySqlPoolOptions::new()
        .max_connections(config.max_connections.min(100))
        .acquire_timeout(config.connect_timeout)
        .test_before_acquire(true)
        .after_connect(move |conn, _meta| {
            let set_names = set_names.clone();
            Box::pin(async move {
                conn.execute(sqlx::raw_sql(&set_names)).await?;

                if read_only {
                    conn.execute(sqlx::raw_sql("SET SESSION TRANSACTION READ ONLY"))
                        .await?;
                }

                Ok(())
            })
        })
        .connect_lazy(connection_string)
        .map_err(|e| {
            DumpError::query(
                format!(
                    "Failed to create MySQL connection pool to {}",
                    redact_database_url(connection_string)
                ),
                e,
            )
        })
}
