//! Trigger section appended after the table data.

use super::connection::DumpConnection;
use crate::adapters::SourceDatabase;
use crate::options::DumpOptions;
use crate::sql::quote_identifier;
use crate::{Result, error::DumpError};
use regex::Regex;
use std::sync::OnceLock;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Semaphore;

fn definer_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"DEFINER=[^ ]* ").expect("valid definer pattern"))
}

/// Output block for one trigger.
///
/// ```rust
/// use anondump_core::dump::triggers::trigger_block;
///
/// let ddl = "CREATE DEFINER=`root`@`%` TRIGGER `t` BEFORE INSERT ON `x` FOR EACH ROW SET @a = 1";
/// let block = trigger_block("t", ddl, true, None);
/// assert!(block.ends_with("CREATE TRIGGER `t` BEFORE INSERT ON `x` FOR EACH ROW SET @a = 1;\n"));
/// ```
pub fn trigger_block(name: &str, ddl: &str, skip_definer: bool, delimiter: Option<&str>) -> String {
    let ddl = if skip_definer {
        definer_pattern().replace_all(ddl, "").into_owned()
    } else {
        ddl.to_string()
    };

    let header = format!("\n--\n-- Trigger {}\n--\n\n", quote_identifier(name));
    match delimiter {
        Some(d) => format!("{header}DELIMITER {d}\n{ddl}\n{d}\nDELIMITER ;\n"),
        None => format!("{header}{ddl};\n"),
    }
}

/// Writes every trigger of the source database to `out`.
///
/// Uses one additional connection, taken under the same permit bound as the
/// table jobs.
///
/// # Errors
/// Returns a query error if the triggers cannot be listed or shown, or an
/// I/O error if the output cannot be written.
pub async fn dump_triggers<W>(
    source: &dyn SourceDatabase,
    options: &DumpOptions,
    permits: &Semaphore,
    out: &mut W,
) -> Result<usize>
where
    W: AsyncWrite + Unpin + Send,
{
    let _permit = permits.acquire().await.map_err(|_| DumpError::Worker {
        context: "connection permits closed".to_string(),
    })?;
    let mut conn = DumpConnection::acquire(source, options.single_transaction).await?;

    let blocks = collect_blocks(&mut conn, options).await;
    if let Err(e) = conn.close().await {
        tracing::warn!("Failed to close trigger connection: {}", e);
    }
    let blocks = blocks?;

    for block in &blocks {
        out.write_all(block.as_bytes())
            .await
            .map_err(|e| DumpError::io("Failed to write trigger section", e))?;
    }

    tracing::debug!("Dumped {} triggers", blocks.len());
    Ok(blocks.len())
}

async fn collect_blocks(conn: &mut DumpConnection, options: &DumpOptions) -> Result<Vec<String>> {
    let names: Vec<String> = conn
        .query_all("SHOW TRIGGERS")
        .await?
        .iter()
        .filter_map(|row| row.text(0))
        .collect();

    let mut blocks = Vec::with_capacity(names.len());
    for name in names {
        let query = format!("SHOW CREATE TRIGGER {}", quote_identifier(&name));
        let row = conn.query_row(&query).await?;
        let ddl = row
            .text(2)
            .ok_or_else(|| DumpError::query_failed(format!("'{}' returned no statement", query)))?;
        blocks.push(trigger_block(
            &name,
            &ddl,
            options.skip_definer,
            options.trigger_delimiter.as_deref(),
        ));
    }

    Ok(blocks)
}
