//! Core data models shared by the rule model and the dump engine.

use serde::{Deserialize, Serialize};

/// Table type reported by `SHOW FULL TABLES` for dumpable tables.
pub const BASE_TABLE: &str = "BASE TABLE";

/// How a table takes part in the dump.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableClass {
    /// Structure and data are dumped
    #[default]
    Normal,
    /// Only the structure is dumped
    NoData,
    /// The table contributes nothing to the output
    Ignore,
}

impl std::fmt::Display for TableClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TableClass::Normal => write!(f, "normal"),
            TableClass::NoData => write!(f, "nodata"),
            TableClass::Ignore => write!(f, "ignore"),
        }
    }
}

/// A base table of the source catalog together with its classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    pub class: TableClass,
}

impl Table {
    /// Creates a table with the `Normal` classification.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            class: TableClass::Normal,
        }
    }

    /// Returns true if rows of this table are exported.
    pub fn dumps_data(&self) -> bool {
        self.class == TableClass::Normal
    }
}

/// One row of `SHOW FULL TABLES`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub name: String,
    pub table_type: String,
}

impl CatalogEntry {
    /// Returns true for `BASE TABLE` rows (views and sequences are skipped).
    pub fn is_base_table(&self) -> bool {
        self.table_type.eq_ignore_ascii_case(BASE_TABLE)
    }
}

/// Figures reported by a finished dump.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DumpSummary {
    /// Tables whose structure was written
    pub tables_dumped: usize,
    /// Tables written without data
    pub tables_without_data: usize,
    /// Tables skipped entirely
    pub tables_ignored: usize,
    /// Rows written across all INSERT statements
    pub rows_dumped: u64,
    /// Triggers written after the trailer
    pub triggers_dumped: usize,
}
