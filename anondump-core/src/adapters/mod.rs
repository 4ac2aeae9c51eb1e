//! Database boundary traits for the dump engine.
//!
//! The engine never talks to a driver directly: it acquires dedicated
//! connections from a [`SourceDatabase`] and runs text statements on them.
//! Every value arrives as raw bytes, exactly as the server sent it, so the
//! engine decides alone how a value is rendered in the dump.
//!
//! # Module Structure
//! - `config`: Connection configuration (no credentials)
//! - `mysql`: sqlx-backed MySQL implementation (feature `mysql`)
//!
//! # Object Safety
//! Both traits are object-safe; the engine holds an
//! `Arc<dyn SourceDatabase>` and one `Box<dyn SourceConnection>` per worker.

use crate::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;

pub mod config;

#[cfg(feature = "mysql")]
pub mod mysql;

pub use crate::error::redact_database_url;
pub use config::ConnectionConfig;

/// One result row with every column as raw bytes (`None` for SQL NULL).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRow(pub Vec<Option<Vec<u8>>>);

impl RawRow {
    /// Builds a row from text cells; convenient for tests and mocks.
    pub fn from_text<I, S>(cells: I) -> Self
    where
        I: IntoIterator<Item = Option<S>>,
        S: AsRef<str>,
    {
        Self(
            cells
                .into_iter()
                .map(|cell| cell.map(|s| s.as_ref().as_bytes().to_vec()))
                .collect(),
        )
    }

    /// Raw bytes of column `index`; `None` for NULL or a missing column.
    pub fn value(&self, index: usize) -> Option<&[u8]> {
        self.0.get(index).and_then(|v| v.as_deref())
    }

    /// Column `index` decoded as UTF-8 (lossy).
    pub fn text(&self, index: usize) -> Option<String> {
        self.value(index)
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true for a row without columns.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over the raw column values.
    pub fn iter(&self) -> impl Iterator<Item = Option<&[u8]>> {
        self.0.iter().map(|v| v.as_deref())
    }
}

/// A source of dedicated connections.
///
/// # Concurrency
/// Implementations must be shareable between tasks. `acquire` may wait until
/// a connection is available; the engine bounds concurrent acquisitions
/// itself.
#[async_trait]
pub trait SourceDatabase: Send + Sync {
    /// Acquires a dedicated connection.
    ///
    /// # Errors
    /// Returns a connection error if no connection can be established.
    async fn acquire(&self) -> Result<Box<dyn SourceConnection>>;
}

/// A dedicated connection owned by one dump worker.
///
/// All statements are sent as plain text; the transaction methods issue the
/// matching statements on this connection only.
#[async_trait]
pub trait SourceConnection: Send {
    /// Executes a statement that returns no rows.
    async fn execute(&mut self, statement: &str) -> Result<()>;

    /// Runs a query and returns its first row, if any.
    async fn fetch_optional(&mut self, query: &str) -> Result<Option<RawRow>>;

    /// Runs a query and collects all rows.
    async fn fetch_all(&mut self, query: &str) -> Result<Vec<RawRow>>;

    /// Runs a query and streams its rows.
    fn fetch<'a>(&'a mut self, query: &'a str) -> BoxStream<'a, Result<RawRow>>;

    /// Starts a consistent-snapshot transaction.
    async fn begin(&mut self) -> Result<()>;

    /// Commits the open transaction.
    async fn commit(&mut self) -> Result<()>;

    /// Rolls back the open transaction.
    async fn rollback(&mut self) -> Result<()>;

    /// Returns the connection to its source.
    async fn close(self: Box<Self>) -> Result<()>;
}
