//! In-memory `SourceDatabase` for dump tests.
//!
//! Answers the handful of statements the dump engine issues (`SHOW FULL
//! TABLES`, `SHOW CREATE TABLE`, `SELECT COUNT(*)`, `SHOW COLUMNS`, the data
//! SELECT, triggers and session statements) from fixture tables, and records
//! every statement together with the connection that ran it.
//!
//! Data SELECT items are resolved like the server would for the shapes the
//! engine produces: `` `col` `` yields the stored value, `'literal' AS `col``
//! yields the literal and any other `<expr> AS `col`` yields the expression
//! text itself, identical for every row.

#![allow(dead_code)]

use anondump_core::{DumpError, RawRow, Result, SourceConnection, SourceDatabase};
use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

type Row = Vec<Option<Vec<u8>>>;

/// Fixture table.
#[derive(Debug, Clone)]
pub struct MemoryTable {
    pub name: String,
    pub table_type: String,
    pub ddl: String,
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    pub latency: Duration,
    pub fail_count: bool,
}

impl MemoryTable {
    /// Table with nullable varchar columns named after `columns`.
    pub fn new(name: &str, columns: &[&str]) -> Self {
        let definitions = columns
            .iter()
            .map(|c| format!("  `{}` varchar(64) DEFAULT NULL", c))
            .collect::<Vec<_>>()
            .join(",\n");
        Self::with_ddl(
            name,
            columns,
            &format!(
                "CREATE TABLE `{}` (\n{}\n) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4",
                name, definitions
            ),
        )
    }

    pub fn with_ddl(name: &str, columns: &[&str], ddl: &str) -> Self {
        Self {
            name: name.to_string(),
            table_type: "BASE TABLE".to_string(),
            ddl: ddl.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: Vec::new(),
            latency: Duration::ZERO,
            fail_count: false,
        }
    }

    pub fn view(name: &str) -> Self {
        let mut table = Self::new(name, &["id"]);
        table.table_type = "VIEW".to_string();
        table
    }

    pub fn row(mut self, values: &[Option<&str>]) -> Self {
        self.rows
            .push(values.iter().map(|v| v.map(|s| s.as_bytes().to_vec())).collect());
        self
    }

    pub fn raw_row(mut self, values: Row) -> Self {
        self.rows.push(values);
        self
    }

    /// Adds `n` rows where every column holds `<column>-<row>`.
    pub fn numbered_rows(mut self, n: usize) -> Self {
        for i in 0..n {
            let row = self
                .columns
                .iter()
                .map(|c| Some(format!("{}-{}", c, i).into_bytes()))
                .collect();
            self.rows.push(row);
        }
        self
    }

    pub fn latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail_count = true;
        self
    }
}

/// Counters shared by every connection of one database.
#[derive(Debug, Default)]
pub struct Stats {
    pub open: AtomicUsize,
    pub max_open: AtomicUsize,
    pub acquired: AtomicUsize,
    pub transactions: AtomicUsize,
    pub commits: AtomicUsize,
    pub rollbacks: AtomicUsize,
    pub log: Mutex<Vec<(usize, String)>>,
}

impl Stats {
    pub fn statements(&self) -> Vec<String> {
        self.log
            .lock()
            .map(|log| log.iter().map(|(_, s)| s.clone()).collect())
            .unwrap_or_default()
    }

    pub fn statements_on(&self, connection: usize) -> Vec<String> {
        self.log
            .lock()
            .map(|log| {
                log.iter()
                    .filter(|(id, _)| *id == connection)
                    .map(|(_, s)| s.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Connection that ran the first statement starting with `prefix`.
    pub fn connection_of(&self, prefix: &str) -> Option<usize> {
        self.log.lock().ok().and_then(|log| {
            log.iter()
                .find(|(_, s)| s.starts_with(prefix))
                .map(|(id, _)| *id)
        })
    }

    pub fn count_prefix(&self, prefix: &str) -> usize {
        self.statements()
            .iter()
            .filter(|s| s.starts_with(prefix))
            .count()
    }
}

struct Inner {
    tables: Vec<MemoryTable>,
    triggers: Vec<(String, String)>,
    stats: Arc<Stats>,
}

/// In-memory source database.
#[derive(Clone)]
pub struct MemoryDatabase {
    inner: Arc<Inner>,
}

impl MemoryDatabase {
    pub fn new(tables: Vec<MemoryTable>) -> Self {
        Self::with_triggers(tables, Vec::new())
    }

    pub fn with_triggers(tables: Vec<MemoryTable>, triggers: Vec<(&str, &str)>) -> Self {
        Self {
            inner: Arc::new(Inner {
                tables,
                triggers: triggers
                    .into_iter()
                    .map(|(n, s)| (n.to_string(), s.to_string()))
                    .collect(),
                stats: Arc::new(Stats::default()),
            }),
        }
    }

    pub fn stats(&self) -> Arc<Stats> {
        Arc::clone(&self.inner.stats)
    }
}

#[async_trait]
impl SourceDatabase for MemoryDatabase {
    async fn acquire(&self) -> Result<Box<dyn SourceConnection>> {
        let stats = &self.inner.stats;
        let id = stats.acquired.fetch_add(1, Ordering::SeqCst);
        let open = stats.open.fetch_add(1, Ordering::SeqCst) + 1;
        stats.max_open.fetch_max(open, Ordering::SeqCst);
        tokio::task::yield_now().await;

        Ok(Box::new(MemoryConnection {
            inner: Arc::clone(&self.inner),
            id,
        }))
    }
}

struct MemoryConnection {
    inner: Arc<Inner>,
    id: usize,
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        self.inner.stats.open.fetch_sub(1, Ordering::SeqCst);
    }
}

fn backticked(text: &str) -> Option<&str> {
    let start = text.find('`')? + 1;
    let len = text[start..].find('`')?;
    Some(&text[start..start + len])
}

fn unquote(literal: &str) -> String {
    let inner = &literal[1..literal.len() - 1];
    let mut out = String::new();
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Splits a SELECT list on top-level commas.
fn split_items(list: &str) -> Vec<String> {
    let mut items = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut quoted = false;
    let mut escaped = false;

    for c in list.chars() {
        if quoted {
            current.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '\'' {
                quoted = false;
            }
            continue;
        }
        match c {
            '\'' => {
                quoted = true;
                current.push(c);
            }
            '(' => {
                depth += 1;
                current.push(c);
            }
            ')' => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            ',' if depth == 0 => items.push(std::mem::take(&mut current).trim().to_string()),
            _ => current.push(c),
        }
    }
    if !current.trim().is_empty() {
        items.push(current.trim().to_string());
    }
    items
}

fn text(cells: &[&str]) -> RawRow {
    RawRow::from_text(cells.iter().map(|c| Some(*c)))
}

impl MemoryConnection {
    fn record(&self, statement: &str) {
        if let Ok(mut log) = self.inner.stats.log.lock() {
            log.push((self.id, statement.to_string()));
        }
    }

    fn table(&self, name: &str) -> Result<&MemoryTable> {
        self.inner
            .tables
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| DumpError::query_failed(format!("Table '{}' doesn't exist", name)))
    }

    fn table_in(&self, statement: &str, marker: &str) -> Result<&MemoryTable> {
        let rest = statement
            .find(marker)
            .map(|pos| &statement[pos + marker.len()..])
            .unwrap_or_default();
        let name = backticked(rest)
            .ok_or_else(|| DumpError::query_failed(format!("no table in '{}'", statement)))?;
        self.table(name)
    }

    fn data_rows(&self, statement: &str) -> Result<Vec<RawRow>> {
        let from = statement
            .rfind(" FROM `")
            .ok_or_else(|| DumpError::query_failed(format!("cannot parse '{}'", statement)))?;
        let table = self.table_in(&statement[from..], " FROM ")?;
        let items = split_items(&statement["SELECT ".len()..from]);

        let mut rows = Vec::with_capacity(table.rows.len());
        for row in &table.rows {
            let mut values = Vec::with_capacity(items.len());
            for item in &items {
                let value = match item.rfind(" AS `") {
                    Some(pos) => {
                        let expr = &item[..pos];
                        if expr.starts_with('\'') && expr.ends_with('\'') {
                            Some(unquote(expr).into_bytes())
                        } else {
                            Some(expr.as_bytes().to_vec())
                        }
                    }
                    None => {
                        let column = backticked(item).unwrap_or(item);
                        let index = table
                            .columns
                            .iter()
                            .position(|c| c == column)
                            .ok_or_else(|| {
                                DumpError::query_failed(format!("Unknown column '{}'", column))
                            })?;
                        row.get(index).cloned().flatten()
                    }
                };
                values.push(value);
            }
            rows.push(RawRow(values));
        }
        Ok(rows)
    }

    async fn respond(&self, statement: &str) -> Result<Vec<RawRow>> {
        self.record(statement);

        if statement == "SHOW FULL TABLES" {
            return Ok(self
                .inner
                .tables
                .iter()
                .map(|t| text(&[t.name.as_str(), t.table_type.as_str()]))
                .collect());
        }
        if statement.starts_with("SHOW CREATE TABLE") {
            let table = self.table_in(statement, "TABLE")?;
            if !table.latency.is_zero() {
                tokio::time::sleep(table.latency).await;
            }
            return Ok(vec![text(&[table.name.as_str(), table.ddl.as_str()])]);
        }
        if statement.starts_with("SELECT COUNT(*)") {
            let table = self.table_in(statement, " FROM ")?;
            if table.fail_count {
                return Err(DumpError::query_failed(format!(
                    "Table '{}' is marked as crashed",
                    table.name
                )));
            }
            return Ok(vec![text(&[table.rows.len().to_string().as_str()])]);
        }
        if statement.starts_with("SHOW COLUMNS FROM") {
            let table = self.table_in(statement, "FROM")?;
            return Ok(table
                .columns
                .iter()
                .map(|c| text(&[c.as_str(), "varchar(64)", "YES", "", "NULL", ""]))
                .collect());
        }
        if statement == "SHOW TRIGGERS" {
            return Ok(self
                .inner
                .triggers
                .iter()
                .map(|(name, _)| text(&[name.as_str(), "INSERT", "users"]))
                .collect());
        }
        if statement.starts_with("SHOW CREATE TRIGGER") {
            let name = backticked(statement).unwrap_or_default();
            let (name, ddl) = self
                .inner
                .triggers
                .iter()
                .find(|(n, _)| n == name)
                .ok_or_else(|| DumpError::query_failed(format!("Trigger '{}' does not exist", name)))?;
            return Ok(vec![text(&[name.as_str(), "STRICT_TRANS_TABLES", ddl.as_str()])]);
        }
        if statement.starts_with("SELECT ") {
            return self.data_rows(statement);
        }
        if statement.starts_with("FLUSH TABLES")
            || statement.starts_with("UNLOCK TABLES")
            || statement.starts_with("SET ")
        {
            return Ok(Vec::new());
        }

        Err(DumpError::query_failed(format!(
            "unsupported statement '{}'",
            statement
        )))
    }
}

#[async_trait]
impl SourceConnection for MemoryConnection {
    async fn execute(&mut self, statement: &str) -> Result<()> {
        self.respond(statement).await.map(|_| ())
    }

    async fn fetch_optional(&mut self, query: &str) -> Result<Option<RawRow>> {
        Ok(self.respond(query).await?.into_iter().next())
    }

    async fn fetch_all(&mut self, query: &str) -> Result<Vec<RawRow>> {
        self.respond(query).await
    }

    fn fetch<'a>(&'a mut self, query: &'a str) -> BoxStream<'a, Result<RawRow>> {
        futures::stream::once(async move { self.respond(query).await })
            .map(|result| match result {
                Ok(rows) => futures::stream::iter(rows.into_iter().map(Ok)).boxed(),
                Err(e) => futures::stream::once(async move { Err(e) }).boxed(),
            })
            .flatten()
            .boxed()
    }

    async fn begin(&mut self) -> Result<()> {
        self.record("START TRANSACTION WITH CONSISTENT SNAPSHOT");
        self.inner.stats.transactions.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        self.record("COMMIT");
        self.inner.stats.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.record("ROLLBACK");
        self.inner.stats.rollbacks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

/// Runs a dump into memory and returns the output text.
pub async fn dump_to_string(dumper: &anondump_core::Dumper) -> Result<(String, anondump_core::DumpSummary)> {
    let mut out = Vec::new();
    let summary = dumper.dump(&mut out).await?;
    Ok((String::from_utf8_lossy(&out).into_owned(), summary))
}

/// Waits until every connection handed out has been dropped.
pub async fn wait_until_closed(stats: &Stats) -> bool {
    for _ in 0..200 {
        if stats.open.load(Ordering::SeqCst) == 0 {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
