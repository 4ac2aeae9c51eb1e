//! anondump: mysqldump-compatible dumps with anonymized columns.
//!
//! # Data Handling Guarantees
//! - The source database is only read
//! - Credentials never appear in logs or error messages
//! - Logs go to stderr so a dump on stdout stays replayable

use anondump::{Cli, run};
use anondump_core::init_logging;
use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.quiet)?;

    let summary = run(&cli).await.inspect_err(|e| {
        tracing::error!("{:#}", e);
    })?;

    tracing::info!(
        "✓ Dumped {} tables, {} rows",
        summary.tables_dumped,
        summary.rows_dumped
    );
    Ok(())
}
