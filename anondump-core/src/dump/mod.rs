//! Dump orchestrator.
//!
//! The [`Dumper`] enumerates base tables, fans one job per non-ignored table
//! out onto tokio tasks, collects their staging files through a completion
//! channel and drains them into the output in catalog order.
//!
//! # Output layout
//! ```text
//! SET NAMES <charset>;
//! SET FOREIGN_KEY_CHECKS = 0;
//! <structure + data of each table, catalog order>
//! SET FOREIGN_KEY_CHECKS = 1;
//! <triggers, if enabled>
//! ```
//!
//! # Concurrency
//! At most `DumpOptions::pool_size()` source connections are open at once; a
//! semaphore permit is taken before every connection is acquired.

pub mod connection;
pub mod pipeline;
pub mod staging;
pub mod structure;
pub mod triggers;
pub mod values;

pub use crate::models::DumpSummary;

use self::connection::DumpConnection;
use self::pipeline::{JobContext, StagedTable, TableJob};
use self::staging::StagingArea;
use crate::adapters::SourceDatabase;
use crate::faker::FakerService;
use crate::models::{CatalogEntry, TableClass};
use crate::options::{DumpOption, DumpOptions};
use crate::rules::{Rewrite, RuleSet, Rules, TableFilters};
use crate::{Result, error::DumpError};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{Semaphore, mpsc};

/// Configured dump of one source database.
///
/// # Example
///
/// ```rust,no_run
/// use anondump_core::adapters::mysql::MySqlSource;
/// use anondump_core::{DumpOption, Dumper, Rules};
/// use std::sync::Arc;
///
/// # async fn run() -> anondump_core::Result<()> {
/// let source = Arc::new(MySqlSource::new("mysql://root@localhost/shop")?);
/// let mut dumper = Dumper::from_options(source, &[DumpOption::flag("single-transaction")])?;
/// dumper.apply_rules(&Rules::from_path("rules.yml")?)?;
///
/// let mut out = tokio::io::stdout();
/// let summary = dumper.dump(&mut out).await?;
/// eprintln!("{} rows", summary.rows_dumped);
/// # Ok(())
/// # }
/// ```
pub struct Dumper {
    source: Arc<dyn SourceDatabase>,
    options: Arc<DumpOptions>,
    rules: Arc<RuleSet>,
    faker: FakerService,
}

impl std::fmt::Debug for Dumper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dumper")
            .field("options", &self.options)
            .field("rules", &self.rules)
            .finish_non_exhaustive()
    }
}

impl Dumper {
    /// Creates a dumper without rules.
    pub fn new(source: Arc<dyn SourceDatabase>, options: DumpOptions) -> Self {
        Self {
            source,
            options: Arc::new(options),
            rules: Arc::new(RuleSet::default()),
            faker: FakerService::new(),
        }
    }

    /// Creates a dumper from key/value options.
    ///
    /// # Errors
    /// Returns a configuration error for an unknown key or a malformed value.
    pub fn from_options(source: Arc<dyn SourceDatabase>, options: &[DumpOption]) -> Result<Self> {
        Ok(Self::new(source, DumpOptions::from_options(options)?))
    }

    /// Effective options.
    pub fn options(&self) -> &DumpOptions {
        &self.options
    }

    /// Effective rules.
    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Replaces the table → column → expression map.
    pub fn set_select_map(&mut self, select: HashMap<String, Rewrite>) {
        Arc::make_mut(&mut self.rules).set_select_map(select);
    }

    /// Replaces the table → row condition map.
    pub fn set_where_map(&mut self, where_map: HashMap<String, String>) {
        Arc::make_mut(&mut self.rules).set_where_map(where_map);
    }

    /// Replaces the nodata and ignore glob lists.
    ///
    /// # Errors
    /// Returns a configuration error if a pattern is invalid.
    pub fn set_table_filters(&mut self, nodata: &[String], ignore: &[String]) -> Result<()> {
        let filters = TableFilters::new(nodata, ignore)?;
        Arc::make_mut(&mut self.rules).set_filters(filters);
        Ok(())
    }

    /// Installs every part of a rule file.
    ///
    /// # Errors
    /// Returns a configuration error if a nodata or ignore pattern is invalid.
    pub fn apply_rules(&mut self, rules: &Rules) -> Result<()> {
        self.rules = Arc::new(RuleSet::from_rules(rules)?);
        Ok(())
    }

    /// Writes the complete dump to `out`.
    ///
    /// Output is valid only when `Ok` is returned; on error, bytes already
    /// written (the preamble at most) are not retracted.
    ///
    /// # Errors
    /// Returns the first error of the catalog query, any table job, the
    /// trigger section or the output stream.
    pub async fn dump<W>(&self, out: &mut W) -> Result<DumpSummary>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let pool_size = self.options.pool_size();
        tracing::info!("Starting dump with up to {} connections", pool_size);

        write_text(
            out,
            &format!(
                "SET NAMES {};\nSET FOREIGN_KEY_CHECKS = 0;\n",
                self.options.charset
            ),
        )
        .await?;

        let permits = Arc::new(Semaphore::new(pool_size));
        let catalog = self.list_tables(&permits).await?;
        let tables = self.rules.classify(catalog.into_iter().map(|entry| entry.name));
        tracing::info!("Found {} base tables", tables.len());

        let mut summary = DumpSummary::default();
        let mut staging = StagingArea::new(tables.len())?;
        tracing::debug!("Staging table output in {}", staging.path().display());
        let ctx = Arc::new(JobContext {
            source: Arc::clone(&self.source),
            options: Arc::clone(&self.options),
            rules: Arc::clone(&self.rules),
            faker: self.faker,
            permits: Arc::clone(&permits),
        });

        let (tx, mut rx) = mpsc::channel::<Result<StagedTable>>(tables.len().max(1));
        let mut pending = 0usize;

        for (index, table) in tables.into_iter().enumerate() {
            if table.class == TableClass::Ignore {
                tracing::debug!("Ignoring table `{}`", table.name);
                summary.tables_ignored += 1;
                continue;
            }

            let job = TableJob {
                index,
                sink_path: staging.sink_path(index),
                table,
            };
            let ctx = Arc::clone(&ctx);
            let tx = tx.clone();
            tokio::spawn(async move {
                let name = job.table.name.clone();
                let result = pipeline::run(ctx, job).await;
                if tx.send(result).await.is_err() {
                    tracing::debug!("Dump aborted, discarding table `{}`", name);
                }
            });
            pending += 1;
        }
        drop(tx);

        for received in 0..pending {
            let staged = rx.recv().await.ok_or_else(|| DumpError::Worker {
                context: format!("{} of {} table jobs reported", received, pending),
            })??;

            summary.tables_dumped += 1;
            summary.rows_dumped += staged.rows;
            if staged.class == TableClass::NoData {
                summary.tables_without_data += 1;
            }
            staging.fill(staged.index, staged.path)?;
        }

        staging.drain_into(out).await?;
        write_text(out, "SET FOREIGN_KEY_CHECKS = 1;\n").await?;

        if self.options.dump_triggers {
            summary.triggers_dumped =
                triggers::dump_triggers(self.source.as_ref(), &self.options, &permits, out).await?;
        }

        out.flush()
            .await
            .map_err(|e| DumpError::io("Failed to flush dump output", e))?;

        tracing::info!(
            "Dump complete: {} tables ({} without data, {} ignored), {} rows, {} triggers",
            summary.tables_dumped,
            summary.tables_without_data,
            summary.tables_ignored,
            summary.rows_dumped,
            summary.triggers_dumped
        );
        Ok(summary)
    }

    /// Base tables in catalog order.
    async fn list_tables(&self, permits: &Semaphore) -> Result<Vec<CatalogEntry>> {
        let _permit = permits.acquire().await.map_err(|_| DumpError::Worker {
            context: "connection permits closed".to_string(),
        })?;

        let mut conn = DumpConnection::acquire(self.source.as_ref(), false).await?;
        let rows = conn.query_all("SHOW FULL TABLES").await;
        if let Err(e) = conn.close().await {
            tracing::warn!("Failed to close catalog connection: {}", e);
        }

        Ok(rows?
            .iter()
            .filter_map(|row| {
                Some(CatalogEntry {
                    name: row.text(0)?,
                    table_type: row.text(1)?,
                })
            })
            .filter(CatalogEntry::is_base_table)
            .collect())
    }
}

async fn write_text<W>(out: &mut W, text: &str) -> Result<()>
where
    W: AsyncWrite + Unpin + Send,
{
    out.write_all(text.as_bytes())
        .await
        .map_err(|e| DumpError::io("Failed to write dump output", e))
}
