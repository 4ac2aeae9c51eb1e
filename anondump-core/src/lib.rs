//! Core engine for anondump, an anonymizing MySQL dump tool.
//!
//! This crate produces a `mysqldump`-compatible SQL stream (structure and
//! data) while rewriting configured columns, either with plain SQL
//! expressions evaluated by the source server or with `faker.*` expressions
//! evaluated locally for every row.
//!
//! # Guarantees
//! - Source databases are only read (SHOW/SELECT plus read locks)
//! - Output order equals catalog order regardless of worker completion order
//! - Concurrent connections never exceed the configured pool bound
//! - Credentials are redacted from every log line and error message
//!
//! # Architecture
//! - `adapters`: database boundary traits and the sqlx MySQL implementation
//! - `dump`: orchestrator, per-table pipeline, transaction manager, staging
//! - `faker`: anonymization expression parser, registry and evaluator
//! - `rules`, `glob`, `options`: rule model and engine configuration
//! - `sql`: escaping and statement assembly helpers

pub mod adapters;
pub mod dump;
pub mod error;
pub mod faker;
pub mod glob;
pub mod logging;
pub mod models;
pub mod options;
pub mod rules;
pub mod security;
pub mod sql;

// Re-export commonly used types
pub use adapters::{ConnectionConfig, RawRow, SourceConnection, SourceDatabase};
pub use dump::{DumpSummary, Dumper};
pub use error::{DumpError, Result};
pub use faker::{FakerError, FakerService, FakerValue};
pub use logging::init_logging;
pub use models::{Table, TableClass};
pub use options::{DumpOption, DumpOptions};
pub use rules::{RuleSet, Rules};
pub use security::Credentials;
