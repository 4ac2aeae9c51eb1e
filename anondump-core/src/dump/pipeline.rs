//! Per-table dump pipeline.
//!
//! One job dumps one table into its own staging file:
//!
//! ```text
//! permit → connection → [FLUSH TABLES .. WITH READ LOCK] → SHOW CREATE TABLE
//!   → structure block → data header (COUNT(*) unless nodata)
//!   → [LOCK TABLES .. WRITE] → streamed INSERT batches → [UNLOCK TABLES]
//!   → [UNLOCK TABLES on the source] → [COMMIT] → close
//! ```
//!
//! The connection is closed on every exit path. A failed job discards its
//! staging file and reports the error to the orchestrator.

use super::connection::DumpConnection;
use super::staging::TableSink;
use super::structure::{TableStructure, data_header, structure_block};
use super::values::ValueFormatter;
use crate::adapters::SourceDatabase;
use crate::faker::FakerService;
use crate::models::{Table, TableClass};
use crate::options::DumpOptions;
use crate::rules::RuleSet;
use crate::sql::{insert_batch, insert_statement, quote_identifier, quote_literal, row_tuple};
use crate::{Result, error::DumpError};
use futures::TryStreamExt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// State shared by every job of one dump.
pub struct JobContext {
    pub source: Arc<dyn SourceDatabase>,
    pub options: Arc<DumpOptions>,
    pub rules: Arc<RuleSet>,
    pub faker: FakerService,
    /// Bounds concurrently open source connections
    pub permits: Arc<Semaphore>,
}

/// One table to dump.
#[derive(Debug, Clone)]
pub struct TableJob {
    /// Position in the enumerated catalog; defines output order
    pub index: usize,
    pub table: Table,
    pub sink_path: PathBuf,
}

/// A finished table waiting to be drained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedTable {
    pub index: usize,
    pub path: PathBuf,
    pub class: TableClass,
    pub rows: u64,
}

/// Runs one job to completion.
///
/// # Errors
/// Returns the first connection, query or staging error. The staging file
/// is removed before the error is returned.
pub async fn run(ctx: Arc<JobContext>, job: TableJob) -> Result<StagedTable> {
    let _permit = ctx
        .permits
        .acquire()
        .await
        .map_err(|_| DumpError::Worker {
            context: "connection permits closed".to_string(),
        })?;

    let mut conn =
        DumpConnection::acquire(ctx.source.as_ref(), ctx.options.single_transaction).await?;

    let mut sink = match TableSink::create(&job.sink_path).await {
        Ok(sink) => sink,
        Err(e) => {
            close_quietly(&mut conn, &job.table.name).await;
            return Err(e);
        }
    };

    tracing::debug!("Dumping table `{}` ({})", job.table.name, job.table.class);
    let result = dump_table(&ctx, &job.table, &mut conn, &mut sink).await;
    close_quietly(&mut conn, &job.table.name).await;

    match result {
        Ok(rows) => {
            let path = sink.finish().await?;
            tracing::debug!("Staged table `{}` with {} rows", job.table.name, rows);
            Ok(StagedTable {
                index: job.index,
                path,
                class: job.table.class,
                rows,
            })
        }
        Err(e) => {
            sink.discard().await;
            Err(e)
        }
    }
}

async fn close_quietly(conn: &mut DumpConnection, table: &str) {
    if let Err(e) = conn.close().await {
        tracing::warn!("Failed to close connection for table `{}`: {}", table, e);
    }
}

async fn dump_table(
    ctx: &JobContext,
    table: &Table,
    conn: &mut DumpConnection,
    sink: &mut TableSink,
) -> Result<u64> {
    let quoted = quote_identifier(&table.name);
    let locked = ctx.options.locks_source_tables();

    if locked {
        conn.exec(&format!("FLUSH TABLES {} WITH READ LOCK", quoted))
            .await?;
    }

    let rows = write_table(ctx, table, conn, sink).await?;

    if locked {
        conn.exec("UNLOCK TABLES").await?;
    }

    if conn.owns_transaction()
        && let Err(e) = conn.commit().await
    {
        tracing::error!("Failed to commit snapshot for table `{}`: {}", table.name, e);
    }

    Ok(rows)
}

async fn write_table(
    ctx: &JobContext,
    table: &Table,
    conn: &mut DumpConnection,
    sink: &mut TableSink,
) -> Result<u64> {
    let name = table.name.as_str();
    let quoted = quote_identifier(name);

    let create = conn
        .query_row(&format!("SHOW CREATE TABLE {}", quoted))
        .await?;
    let ddl = create.text(1).ok_or_else(|| {
        DumpError::query_failed(format!("SHOW CREATE TABLE {} returned no DDL", quoted))
    })?;

    let structure = TableStructure::parse(
        &ddl,
        ctx.options.ignore_generated,
        ctx.options.hex_encode,
    );
    sink.write(&structure_block(name, &structure.ddl)).await?;

    if !table.dumps_data() {
        sink.write(&data_header(name, 0)).await?;
        return Ok(0);
    }

    let condition = ctx.rules.where_for(name);
    let count = row_count(conn, &quoted, condition).await?;
    sink.write(&data_header(name, count)).await?;
    if count == 0 {
        return Ok(0);
    }

    let columns = data_columns(conn, &quoted, &structure).await?;
    if columns.is_empty() {
        tracing::debug!("Table `{}` has no insertable columns", name);
        return Ok(0);
    }

    if ctx.options.add_locks {
        sink.write(&format!("LOCK TABLES {} WRITE;\n", quoted)).await?;
    }

    let rows = stream_rows(ctx, name, &columns, &structure, condition, conn, sink).await?;

    if ctx.options.add_locks {
        sink.write("UNLOCK TABLES;\n").await?;
    }

    Ok(rows)
}

async fn row_count(
    conn: &mut DumpConnection,
    quoted: &str,
    condition: Option<&str>,
) -> Result<u64> {
    let query = with_where(format!("SELECT COUNT(*) FROM {}", quoted), condition);
    let row = conn.query_row(&query).await?;
    row.text(0)
        .and_then(|count| count.trim().parse::<u64>().ok())
        .ok_or_else(|| DumpError::query_failed(format!("'{}' returned no usable count", query)))
}

/// Column names from `SHOW COLUMNS`, generated columns excluded.
async fn data_columns(
    conn: &mut DumpConnection,
    quoted: &str,
    structure: &TableStructure,
) -> Result<Vec<String>> {
    let rows = conn
        .query_all(&format!("SHOW COLUMNS FROM {}", quoted))
        .await?;

    Ok(rows
        .iter()
        .filter_map(|row| row.text(0))
        .filter(|column| !structure.is_generated(column))
        .collect())
}

async fn stream_rows(
    ctx: &JobContext,
    table: &str,
    columns: &[String],
    structure: &TableStructure,
    condition: Option<&str>,
    conn: &mut DumpConnection,
    sink: &mut TableSink,
) -> Result<u64> {
    warn_invalid_rewrites(ctx, table, columns);

    let query = select_query(&ctx.rules, table, columns, condition);
    let header = insert_statement(table, columns);
    let binary: Vec<bool> = columns.iter().map(|c| structure.is_binary(c)).collect();
    let formatter = ValueFormatter::new(ctx.faker, ctx.options.hex_encode);
    let batch_size = ctx.options.rows_per_insert().max(1);

    let mut batch = Vec::with_capacity(batch_size);
    let mut total = 0u64;

    let mut rows = conn.stream(&query).await?;
    while let Some(row) = rows.try_next().await? {
        if row.len() != columns.len() {
            return Err(DumpError::query_failed(format!(
                "row of `{}` has {} values, expected {}",
                table,
                row.len(),
                columns.len()
            )));
        }

        let values: Vec<Vec<u8>> = row
            .iter()
            .zip(&binary)
            .map(|(value, &is_binary)| formatter.render(value, is_binary))
            .collect();
        batch.push(row_tuple(&values));
        total += 1;

        if batch.len() == batch_size {
            sink.write(&insert_batch(&header, &batch)).await?;
            batch.clear();
        }
    }
    drop(rows);

    if !batch.is_empty() {
        sink.write(&insert_batch(&header, &batch)).await?;
    }

    Ok(total)
}

/// Logs once per table and column for a faker rewrite that cannot evaluate;
/// its rows then carry the expression text verbatim.
fn warn_invalid_rewrites(ctx: &JobContext, table: &str, columns: &[String]) {
    for column in columns {
        if let Some(expr) = ctx.rules.rewrite_for(table, column)
            && FakerService::is_expression(expr)
            && let Err(e) = ctx.faker.validate(expr)
        {
            tracing::warn!(
                "Rewrite for `{}`.`{}` is not a valid faker expression, values are kept as written: {}",
                table,
                column,
                e
            );
        }
    }
}

/// SELECT item for one column.
///
/// Faker rewrites become string literals so every row carries the expression
/// text; other rewrites are evaluated by the server.
pub fn select_item(column: &str, rewrite: Option<&str>) -> String {
    let quoted = quote_identifier(column);
    match rewrite {
        Some(expr) if FakerService::is_expression(expr) => {
            format!("{} AS {}", quote_literal(expr), quoted)
        }
        Some(expr) => format!("{} AS {}", expr, quoted),
        None => quoted,
    }
}

/// SELECT statement for a table's data.
pub fn select_query(
    rules: &RuleSet,
    table: &str,
    columns: &[String],
    condition: Option<&str>,
) -> String {
    let items = columns
        .iter()
        .map(|column| select_item(column, rules.rewrite_for(table, column)))
        .collect::<Vec<_>>()
        .join(", ");
    with_where(
        format!("SELECT {} FROM {}", items, quote_identifier(table)),
        condition,
    )
}

fn with_where(query: String, condition: Option<&str>) -> String {
    match condition {
        Some(condition) => format!("{} WHERE {}", query, condition),
        None => query,
    }
}
