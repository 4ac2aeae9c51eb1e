//! Per-worker connection and transaction manager.
//!
//! A `DumpConnection` owns one dedicated source connection. In
//! single-transaction mode the first statement lazily opens exactly one
//! consistent-snapshot transaction and every later statement runs inside it.

use crate::adapters::{RawRow, SourceConnection, SourceDatabase};
use crate::{Result, error::DumpError};
use futures::stream::BoxStream;

/// A dedicated connection, optionally owning one transaction.
pub struct DumpConnection {
    inner: Option<Box<dyn SourceConnection>>,
    single_transaction: bool,
    open_tx: bool,
}

impl std::fmt::Debug for DumpConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DumpConnection")
            .field("open", &self.inner.is_some())
            .field("single_transaction", &self.single_transaction)
            .field("open_tx", &self.open_tx)
            .finish()
    }
}

impl DumpConnection {
    /// Wraps an acquired connection.
    pub fn new(conn: Box<dyn SourceConnection>, single_transaction: bool) -> Self {
        Self {
            inner: Some(conn),
            single_transaction,
            open_tx: false,
        }
    }

    /// Acquires a dedicated connection from the source.
    ///
    /// # Errors
    /// Returns a connection error if the source cannot hand out a connection.
    pub async fn acquire(source: &dyn SourceDatabase, single_transaction: bool) -> Result<Self> {
        let conn = source.acquire().await?;
        Ok(Self::new(conn, single_transaction))
    }

    fn conn(&mut self) -> Result<&mut Box<dyn SourceConnection>> {
        self.inner
            .as_mut()
            .ok_or_else(|| DumpError::query_failed("connection already closed"))
    }

    async fn prepare(&mut self) -> Result<()> {
        if self.single_transaction && !self.open_tx {
            self.conn()?.begin().await?;
            self.open_tx = true;
            tracing::trace!("Opened consistent snapshot transaction");
        }
        Ok(())
    }

    /// Executes a statement that returns no rows.
    pub async fn exec(&mut self, statement: &str) -> Result<()> {
        self.prepare().await?;
        self.conn()?.execute(statement).await
    }

    /// Runs a query that must return a row.
    ///
    /// # Errors
    /// Returns `DumpError::QueryExecution` if the query yields no row.
    pub async fn query_row(&mut self, query: &str) -> Result<RawRow> {
        self.prepare().await?;
        self.conn()?
            .fetch_optional(query)
            .await?
            .ok_or_else(|| DumpError::query_failed(format!("'{}' returned no row", query)))
    }

    /// Runs a query and collects every row.
    pub async fn query_all(&mut self, query: &str) -> Result<Vec<RawRow>> {
        self.prepare().await?;
        self.conn()?.fetch_all(query).await
    }

    /// Runs a query and streams its rows.
    pub async fn stream<'a>(&'a mut self, query: &'a str) -> Result<BoxStream<'a, Result<RawRow>>> {
        self.prepare().await?;
        Ok(self.conn()?.fetch(query))
    }

    /// Returns true while this connection owns an uncommitted transaction.
    pub fn owns_transaction(&self) -> bool {
        self.open_tx
    }

    /// Commits the owned transaction; a no-op without one.
    pub async fn commit(&mut self) -> Result<()> {
        if !self.open_tx {
            return Ok(());
        }
        self.conn()?.commit().await?;
        self.open_tx = false;
        Ok(())
    }

    /// Releases the connection, rolling back an uncommitted transaction.
    ///
    /// Calling `close` again is a no-op.
    pub async fn close(&mut self) -> Result<()> {
        let Some(mut conn) = self.inner.take() else {
            return Ok(());
        };

        let rollback = if self.open_tx {
            self.open_tx = false;
            conn.rollback().await
        } else {
            Ok(())
        };

        let closed = conn.close().await;
        rollback.and(closed)
    }
}

impl Drop for DumpConnection {
    fn drop(&mut self) {
        if self.inner.is_some() {
            tracing::warn!("Dump connection dropped without being closed");
        }
    }
}
