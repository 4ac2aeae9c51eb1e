//! Engine options.
//!
//! Options arrive as key/value pairs (`DumpOption`) so that every front end,
//! the CLI included, speaks the same vocabulary as `mysqldump`. They are
//! validated once by [`DumpOptions::from_options`] and read-only afterwards.

use crate::{Result, error::DumpError};
use serde::{Deserialize, Serialize};

/// Default number of rows per extended INSERT statement.
pub const EXTENDED_INSERT_ROWS: usize = 100;

/// Connection bound when `parallel` is enabled.
pub const MAX_CONNECTIONS: usize = 10;

/// Default connection character set.
pub const DEFAULT_CHARSET: &str = "utf8";

/// A single engine option as supplied by a front end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpOption {
    pub key: String,
    pub value: Option<String>,
}

impl DumpOption {
    /// Creates an option carrying a value, e.g. `insert-into-limit=500`.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: Some(value.into()),
        }
    }

    /// Creates a boolean option that is switched on, e.g. `quick`.
    pub fn flag(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: None,
        }
    }

    fn enabled(&self) -> Result<bool> {
        match self.value.as_deref().map(str::trim) {
            None => Ok(true),
            Some(v) if v.eq_ignore_ascii_case("true") || v == "1" => Ok(true),
            Some(v) if v.eq_ignore_ascii_case("false") || v == "0" => Ok(false),
            Some(v) => Err(DumpError::configuration(format!(
                "option '{}' expects a boolean, got '{}'",
                self.key, v
            ))),
        }
    }

    fn required_value(&self) -> Result<&str> {
        self.value.as_deref().ok_or_else(|| {
            DumpError::configuration(format!("option '{}' requires a value", self.key))
        })
    }
}

/// Validated engine configuration.
///
/// # Example
/// ```rust
/// use anondump_core::{DumpOption, DumpOptions};
///
/// let options = DumpOptions::from_options(&[
///     DumpOption::flag("single-transaction"),
///     DumpOption::new("insert-into-limit", "2"),
/// ])
/// .unwrap();
///
/// assert!(!options.locks_source_tables());
/// assert_eq!(options.rows_per_insert(), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DumpOptions {
    /// Character set announced in the preamble and used for the session
    pub charset: String,
    /// One row per INSERT statement
    pub quick: bool,
    /// Read every table inside one consistent-snapshot transaction per connection
    pub single_transaction: bool,
    /// Take `FLUSH TABLES ... WITH READ LOCK` on the source for each table
    pub lock_tables: bool,
    /// Wrap data in `LOCK TABLES ... WRITE` / `UNLOCK TABLES` in the output
    pub add_locks: bool,
    /// Render binary columns as `UNHEX('..')`
    pub hex_encode: bool,
    /// Remove generated column definitions from the emitted DDL
    pub ignore_generated: bool,
    /// Rows per extended INSERT statement
    pub insert_limit: usize,
    /// Append triggers after the table section
    pub dump_triggers: bool,
    /// Strip `DEFINER=` clauses from trigger DDL
    pub skip_definer: bool,
    /// Delimiter wrapped around trigger bodies
    pub trigger_delimiter: Option<String>,
    /// Dump up to `MAX_CONNECTIONS` tables concurrently
    pub parallel: bool,
}

impl Default for DumpOptions {
    fn default() -> Self {
        Self {
            charset: DEFAULT_CHARSET.to_string(),
            quick: false,
            single_transaction: false,
            lock_tables: true,
            add_locks: true,
            hex_encode: false,
            ignore_generated: false,
            insert_limit: EXTENDED_INSERT_ROWS,
            dump_triggers: false,
            skip_definer: false,
            trigger_delimiter: None,
            parallel: false,
        }
    }
}

impl DumpOptions {
    /// Builds options from key/value pairs.
    ///
    /// `single-transaction` switches source table locking off whatever order
    /// the options come in.
    ///
    /// # Errors
    /// Returns a configuration error for unknown keys, missing values,
    /// malformed booleans, or an `insert-into-limit` that is not a positive
    /// integer.
    pub fn from_options(options: &[DumpOption]) -> Result<Self> {
        let mut parsed = Self::default();

        for option in options {
            match option.key.as_str() {
                "set-charset" => {
                    let charset = option.required_value()?.trim();
                    if charset.is_empty()
                        || !charset
                            .chars()
                            .all(|c| c.is_ascii_alphanumeric() || c == '_')
                    {
                        return Err(DumpError::configuration(format!(
                            "invalid character set '{}'",
                            charset
                        )));
                    }
                    parsed.charset = charset.to_string();
                }
                "quick" => parsed.quick = option.enabled()?,
                "single-transaction" => parsed.single_transaction = option.enabled()?,
                "skip-lock-tables" => parsed.lock_tables = !option.enabled()?,
                "skip-add-locks" => parsed.add_locks = !option.enabled()?,
                "hex-encode" => parsed.hex_encode = option.enabled()?,
                "ignore-generated" => parsed.ignore_generated = option.enabled()?,
                "insert-into-limit" => {
                    let raw = option.required_value()?;
                    parsed.insert_limit = match raw.trim().parse::<usize>() {
                        Ok(limit) if limit > 0 => limit,
                        _ => {
                            return Err(DumpError::configuration(format!(
                                "insert-into-limit must be a positive integer, got '{}'",
                                raw
                            )));
                        }
                    };
                }
                "dump-trigger" => parsed.dump_triggers = option.enabled()?,
                "skip-definer" => parsed.skip_definer = option.enabled()?,
                "trigger-delimiter" => {
                    let delimiter = option.required_value()?.trim();
                    parsed.trigger_delimiter =
                        (!delimiter.is_empty()).then(|| delimiter.to_string());
                }
                "parallel" => parsed.parallel = option.enabled()?,
                unknown => {
                    return Err(DumpError::configuration(format!(
                        "unknown option '{}'",
                        unknown
                    )));
                }
            }
        }

        if parsed.single_transaction {
            parsed.lock_tables = false;
        }

        Ok(parsed)
    }

    /// Rows written per INSERT statement.
    pub fn rows_per_insert(&self) -> usize {
        if self.quick { 1 } else { self.insert_limit }
    }

    /// Upper bound on concurrently open source connections.
    pub fn pool_size(&self) -> usize {
        if self.parallel { MAX_CONNECTIONS } else { 1 }
    }

    /// Returns true if each job read-locks its table on the source.
    pub fn locks_source_tables(&self) -> bool {
        self.lock_tables && !self.single_transaction
    }
}
