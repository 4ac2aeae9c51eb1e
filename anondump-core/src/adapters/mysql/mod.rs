//! MySQL source backed by a sqlx connection pool.
//!
//! # Module Structure
//! - `connection`: URL validation, configuration parsing and pool creation
//!
//! # Wire Protocol
//! Every statement goes through `sqlx::raw_sql`, i.e. the text protocol.
//! `SHOW`, `FLUSH` and `UNLOCK` statements are not preparable, and text
//! results give each value as the exact bytes the server rendered.

pub mod connection;


use super::{ConnectionConfig, RawRow, SourceConnection, SourceDatabase};
use crate::{Result, error::DumpError};
use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt, stream::BoxStream};
use sqlx::mysql::MySqlRow;
use sqlx::pool::PoolConnection;
use sqlx::{Executor, MySql, MySqlPool, Row};

pub use connection::{parse_mysql_connection_config, validate_mysql_connection_string};

/// Statements that open a consistent-snapshot transaction.
const BEGIN_STATEMENTS: [&str; 2] = [
    "SET SESSION TRANSACTION ISOLATION LEVEL REPEATABLE READ",
    "START TRANSACTION WITH CONSISTENT SNAPSHOT, READ ONLY",
];

/// MySQL source with connection pooling.
pub struct MySqlSource {
    /// Connection pool shared by all dump workers
    pub pool: MySqlPool,
    /// Connection configuration (pool bound, timeouts, charset)
    pub config: ConnectionConfig,
}

impl std::fmt::Debug for MySqlSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MySqlSource")
            .field("config", &self.config)
            .field("pool_size", &self.pool.size())
            .field("pool_idle", &self.pool.num_idle())
            .finish_non_exhaustive()
    }
}

impl MySqlSource {
    /// Creates a source from a URL alone, reading settings from the URL.
    ///
    /// # Errors
    /// Returns a configuration error for an invalid URL.
    pub fn new(connection_string: &str) -> Result<Self> {
        let config = parse_mysql_connection_config(connection_string)?;
        Self::with_config(connection_string, config)
    }

    /// Creates a source with an explicit configuration.
    ///
    /// The pool connects lazily: connection problems surface on the first
    /// `acquire`.
    ///
    /// # Errors
    /// Returns a configuration error for an invalid URL or configuration.
    pub fn with_config(connection_string: &str, config: ConnectionConfig) -> Result<Self> {
        config.validate()?;
        let pool = connection::create_mysql_connection_pool(connection_string, &config)?;
        Ok(Self { pool, config })
    }

    /// Closes the connection pool gracefully.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl SourceDatabase for MySqlSource {
    async fn acquire(&self) -> Result<Box<dyn SourceConnection>> {
        let conn = self
            .pool
            .acquire()
            .await
            .map_err(DumpError::connection_failed)?;
        Ok(Box::new(MySqlSourceConnection { conn }))
    }
}

/// A pooled MySQL connection dedicated to one worker.
pub struct MySqlSourceConnection {
    conn: PoolConnection<MySql>,
}

impl std::fmt::Debug for MySqlSourceConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MySqlSourceConnection").finish_non_exhaustive()
    }
}

/// Decodes every column as raw bytes, NULL as `None`.
fn decode_row(row: &MySqlRow) -> Result<RawRow> {
    (0..row.len())
        .map(|index| {
            row.try_get_unchecked::<Option<Vec<u8>>, _>(index)
                .map_err(|e| DumpError::query(format!("Failed to decode column {}", index), e))
        })
        .collect::<Result<Vec<_>>>()
        .map(RawRow)
}

#[async_trait]
impl SourceConnection for MySqlSourceConnection {
    async fn execute(&mut self, statement: &str) -> Result<()> {
        (&mut *self.conn)
            .execute(sqlx::raw_sql(statement))
            .await
            .map_err(|e| DumpError::query(format!("Failed to execute '{}'", statement), e))?;
        Ok(())
    }

    async fn fetch_optional(&mut self, query: &str) -> Result<Option<RawRow>> {
        let row = (&mut *self.conn)
            .fetch_optional(sqlx::raw_sql(query))
            .await
            .map_err(|e| DumpError::query(format!("Failed to run '{}'", query), e))?;
        row.as_ref().map(decode_row).transpose()
    }

    async fn fetch_all(&mut self, query: &str) -> Result<Vec<RawRow>> {
        let rows = (&mut *self.conn)
            .fetch_all(sqlx::raw_sql(query))
            .await
            .map_err(|e| DumpError::query(format!("Failed to run '{}'", query), e))?;
        rows.iter().map(decode_row).collect()
    }

    fn fetch<'a>(&'a mut self, query: &'a str) -> BoxStream<'a, Result<RawRow>> {
        sqlx::raw_sql(query)
            .fetch(&mut *self.conn)
            .map_err(move |e| DumpError::query(format!("Failed to stream '{}'", query), e))
            .and_then(|row| futures::future::ready(decode_row(&row)))
            .boxed()
    }

    async fn begin(&mut self) -> Result<()> {
        for statement in BEGIN_STATEMENTS {
            self.execute(statement).await?;
        }
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        self.execute("COMMIT").await
    }

    async fn rollback(&mut self) -> Result<()> {
        self.execute("ROLLBACK").await
    }

    async fn close(mut self: Box<Self>) -> Result<()> {
        // A read lock must never travel back into the pool.
        if let Err(e) = self.execute("UNLOCK TABLES").await {
            tracing::debug!("Discarding connection that could not be unlocked: {}", e);
            let detached = self.conn.detach();
            let _ = sqlx::Connection::close(detached).await;
        }
        Ok(())
    }
}
