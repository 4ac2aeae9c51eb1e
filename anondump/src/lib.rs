//! Library module for the anondump binary.
//!
//! Holds the command line definition and the glue between flags and the
//! dump engine so both can be tested without a terminal or a server.

use anondump_core::adapters::mysql::MySqlSource;
use anondump_core::error::redact_database_url;
use anondump_core::security::mysql_connection_url;
use anondump_core::{
    ConnectionConfig, Credentials, DumpOption, DumpOptions, DumpSummary, Dumper, Rules,
};
use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncWrite, BufWriter};
use zeroize::Zeroizing;

/// Output target meaning standard output.
pub const STDOUT: &str = "stdout";

/// CLI argument structure
#[derive(Parser, Debug)]
#[command(name = "anondump")]
#[command(about = "Anonymizing MySQL dump tool")]
#[command(version)]
#[command(long_about = "
anondump - mysqldump-compatible dumps with anonymized columns

Writes the structure and data of every base table as SQL that replays with
the stock mysql client. Columns listed in the rule file are rewritten on the
way out, either with SQL expressions evaluated by the server or with
faker expressions evaluated for every row.

RULE FILE (YAML):
  rewrite:
    users:
      email: \"faker.Internet().Email()\"
      name: \"CONCAT('user-', id)\"
  where:
    orders: \"created_at > NOW() - INTERVAL 30 DAY\"
  nodata: [\"audit_*\"]
  ignore: [\"tmp_*\"]

EXAMPLES:
  anondump -u root -p -c rules.yml shop > shop.sql
  anondump --single-transaction --parallel -o shop.sql shop
")]
pub struct Cli {
    /// Database to dump
    #[arg(help = "Name of the database to dump")]
    pub database: String,

    /// Server host
    #[arg(short = 'H', long, env = "MYSQL_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Server port
    #[arg(short = 'P', long, default_value_t = 3306)]
    pub port: u16,

    /// User name
    #[arg(short, long, default_value = "root")]
    pub user: String,

    /// Password; a bare `-p` prompts for it
    #[arg(
        short,
        long,
        num_args = 0..=1,
        require_equals = true,
        help = "Password (--password=<PASSWORD>); a bare -p prompts for it"
    )]
    pub password: Option<Option<String>>,

    /// Rule file
    #[arg(short, long, value_name = "FILE", help = "YAML rule file")]
    pub config: Option<PathBuf>,

    /// Output file
    #[arg(
        short,
        long,
        default_value = STDOUT,
        help = "Output file, or 'stdout'"
    )]
    pub output: String,

    /// Connection character set
    #[arg(long, default_value = "utf8")]
    pub set_charset: String,

    /// Increase verbosity
    #[arg(
        short = 'v',
        long = "debug",
        action = clap::ArgAction::Count,
        help = "Increase verbosity (-v, -vv)"
    )]
    pub verbose: u8,

    /// Suppress output
    #[arg(short, long, help = "Suppress all logging except errors")]
    pub quiet: bool,

    /// Do not read-lock source tables while dumping them
    #[arg(long)]
    pub skip_lock_tables: bool,

    /// Dump every table inside a consistent snapshot (implies --skip-lock-tables)
    #[arg(long)]
    pub single_transaction: bool,

    /// Write one row per INSERT statement
    #[arg(long)]
    pub quick: bool,

    /// Do not wrap INSERT statements in LOCK TABLES / UNLOCK TABLES
    #[arg(long)]
    pub skip_add_locks: bool,

    /// Write binary columns as UNHEX('..')
    #[arg(long)]
    pub hex_encode: bool,

    /// Remove generated column definitions from the DDL
    #[arg(long)]
    pub ignore_generated: bool,

    /// Rows per INSERT statement
    #[arg(long, default_value_t = 100, value_parser = clap::value_parser!(u64).range(1..))]
    pub insert_into_limit: u64,

    /// Append triggers after the data
    #[arg(long)]
    pub dump_trigger: bool,

    /// Strip DEFINER clauses from triggers
    #[arg(long)]
    pub skip_definer: bool,

    /// Wrap each trigger in DELIMITER statements
    #[arg(long, value_name = "DELIMITER")]
    pub trigger_delimiter: Option<String>,

    /// Dump up to 10 tables concurrently
    #[arg(long)]
    pub parallel: bool,
}

impl Cli {
    /// Translates flags into engine options.
    pub fn dump_options(&self) -> Vec<DumpOption> {
        let mut options = vec![
            DumpOption::new("set-charset", self.set_charset.as_str()),
            DumpOption::new("insert-into-limit", self.insert_into_limit.to_string()),
        ];

        let flags = [
            ("skip-lock-tables", self.skip_lock_tables),
            ("single-transaction", self.single_transaction),
            ("quick", self.quick),
            ("skip-add-locks", self.skip_add_locks),
            ("hex-encode", self.hex_encode),
            ("ignore-generated", self.ignore_generated),
            ("dump-trigger", self.dump_trigger),
            ("skip-definer", self.skip_definer),
            ("parallel", self.parallel),
        ];
        options.extend(
            flags
                .into_iter()
                .filter(|(_, enabled)| *enabled)
                .map(|(key, _)| DumpOption::flag(key)),
        );

        if let Some(delimiter) = &self.trigger_delimiter {
            options.push(DumpOption::new("trigger-delimiter", delimiter.as_str()));
        }

        options
    }

    /// Resolves credentials, prompting when `-p` was given without a value.
    ///
    /// # Errors
    /// Returns an error if the password prompt cannot be read.
    pub fn credentials(&self) -> anyhow::Result<Credentials> {
        let password = match &self.password {
            Some(Some(password)) => Some(password.clone()),
            Some(None) => Some(
                rpassword::prompt_password("Enter password: ")
                    .context("Failed to read password")?,
            ),
            None => None,
        };
        Ok(Credentials::new(self.user.clone(), password))
    }

    /// Builds the connection URL for the given credentials.
    ///
    /// # Errors
    /// Returns an error if host or database cannot form a valid URL.
    pub fn connection_url(&self, credentials: &Credentials) -> anyhow::Result<Zeroizing<String>> {
        mysql_connection_url(&self.host, self.port, &self.database, credentials)
            .context("Invalid connection parameters")
    }
}

/// Opens the dump output: standard output or a newly created file.
///
/// # Errors
/// Returns an error if the file cannot be created.
pub async fn open_output(target: &str) -> anyhow::Result<Box<dyn AsyncWrite + Unpin + Send>> {
    if target == STDOUT {
        return Ok(Box::new(BufWriter::new(tokio::io::stdout())));
    }

    let file = tokio::fs::File::create(target)
        .await
        .with_context(|| format!("Failed to create output file {}", target))?;
    Ok(Box::new(BufWriter::new(file)))
}

/// Runs a complete dump as described by the command line.
///
/// # Errors
/// Returns an error for invalid options, an unreadable rule file, an
/// unusable output target, or any failure of the dump itself.
pub async fn run(cli: &Cli) -> anyhow::Result<DumpSummary> {
    let options =
        DumpOptions::from_options(&cli.dump_options()).context("Invalid dump options")?;

    let rules = match &cli.config {
        Some(path) => Rules::from_path(path)
            .with_context(|| format!("Failed to load rule file {}", path.display()))?,
        None => Rules::default(),
    };

    let credentials = cli.credentials()?;
    let url = cli.connection_url(&credentials)?;
    tracing::info!("Target: {}", redact_database_url(&url));
    tracing::info!("Output: {}", cli.output);

    let max_connections =
        u32::try_from(options.pool_size()).context("Connection bound out of range")?;
    let config = ConnectionConfig::new(cli.host.clone())
        .with_port(cli.port)
        .with_database(cli.database.clone())
        .with_username(credentials.username().to_string())
        .with_max_connections(max_connections)
        .with_charset(options.charset.clone());

    let source = Arc::new(
        MySqlSource::with_config(&url, config).context("Failed to set up MySQL source")?,
    );
    let mut dumper = Dumper::new(source.clone(), options);
    dumper.apply_rules(&rules).context("Invalid rule file")?;

    let mut out = open_output(&cli.output).await?;
    let result = dumper.dump(&mut out).await;
    source.close().await;

    result.context("Dump failed")
}
