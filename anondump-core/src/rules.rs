//! Rule model: column rewrites, row filters and table filters.
//!
//! Rules are loaded from YAML:
//!
//! ```yaml
//! rewrite:
//!   users:
//!     email: "faker.Internet().Email()"
//!     password: "'redacted'"
//! nodata:
//!   - audit_*
//! ignore:
//!   - tmp_*
//! where:
//!   orders: "created_at > NOW() - INTERVAL 30 DAY"
//! ```

use crate::{
    Result,
    error::DumpError,
    glob::Glob,
    models::{Table, TableClass},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Rewrite expressions for one table, keyed by column.
pub type Rewrite = HashMap<String, String>;

/// Rules as written in the rule file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Rules {
    /// table -> column -> SQL or faker expression
    pub rewrite: HashMap<String, Rewrite>,
    /// Globs of tables dumped without data
    pub nodata: Vec<String>,
    /// Globs of tables left out of the dump
    pub ignore: Vec<String>,
    /// table -> row filter condition
    #[serde(rename = "where")]
    pub where_: HashMap<String, String>,
}

impl Rules {
    /// Parses rules from YAML bytes.
    ///
    /// An empty document yields empty rules.
    ///
    /// # Errors
    /// Returns `DumpError::Rules` for malformed YAML or unknown top-level keys.
    pub fn load(bytes: &[u8]) -> Result<Self> {
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }

        serde_yaml::from_slice(bytes).map_err(|source| DumpError::Rules {
            context: "failed to parse rule file".to_string(),
            source,
        })
    }

    /// Reads and parses a rule file.
    ///
    /// # Errors
    /// Returns an I/O error if the file cannot be read, or a rules error if
    /// it cannot be parsed.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| {
            DumpError::io(format!("failed to read rule file {}", path.display()), e)
        })?;
        Self::load(&bytes)
    }

    /// Lower-cased select map used for column lookups.
    pub fn rewrite_map(&self) -> HashMap<String, Rewrite> {
        self.rewrite
            .iter()
            .map(|(table, columns)| {
                let columns = columns
                    .iter()
                    .map(|(column, expr)| (column.to_lowercase(), expr.clone()))
                    .collect();
                (table.to_lowercase(), columns)
            })
            .collect()
    }

    /// Lower-cased where map used for table lookups.
    pub fn where_map(&self) -> HashMap<String, String> {
        self.where_
            .iter()
            .map(|(table, condition)| (table.to_lowercase(), condition.clone()))
            .collect()
    }
}

/// Compiled nodata/ignore globs.
#[derive(Debug, Clone, Default)]
pub struct TableFilters {
    nodata: Vec<Glob>,
    ignore: Vec<Glob>,
}

impl TableFilters {
    /// Compiles both glob lists.
    ///
    /// # Errors
    /// Returns a configuration error naming the first invalid pattern.
    pub fn new(nodata: &[String], ignore: &[String]) -> Result<Self> {
        let compile = |patterns: &[String]| -> Result<Vec<Glob>> {
            patterns.iter().map(|p| Glob::new(p)).collect()
        };

        Ok(Self {
            nodata: compile(nodata)?,
            ignore: compile(ignore)?,
        })
    }

    /// Classifies one table name. `Ignore` wins over `NoData`.
    pub fn classify(&self, name: &str) -> TableClass {
        if self.ignore.iter().any(|g| g.matches(name)) {
            TableClass::Ignore
        } else if self.nodata.iter().any(|g| g.matches(name)) {
            TableClass::NoData
        } else {
            TableClass::Normal
        }
    }
}

/// Rules prepared for the dump engine.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    select: HashMap<String, Rewrite>,
    where_: HashMap<String, String>,
    filters: TableFilters,
}

impl RuleSet {
    /// Prepares rules for lookups and compiles the table filters.
    ///
    /// # Errors
    /// Returns a configuration error if a nodata or ignore glob is invalid.
    pub fn from_rules(rules: &Rules) -> Result<Self> {
        Ok(Self {
            select: rules.rewrite_map(),
            where_: rules.where_map(),
            filters: TableFilters::new(&rules.nodata, &rules.ignore)?,
        })
    }

    /// Replaces the select map. Keys are lower-cased.
    pub fn set_select_map(&mut self, select: HashMap<String, Rewrite>) {
        self.select = Rules {
            rewrite: select,
            ..Rules::default()
        }
        .rewrite_map();
    }

    /// Replaces the where map. Keys are lower-cased.
    pub fn set_where_map(&mut self, where_map: HashMap<String, String>) {
        self.where_ = where_map
            .into_iter()
            .map(|(table, condition)| (table.to_lowercase(), condition))
            .collect();
    }

    /// Replaces the table filters.
    pub fn set_filters(&mut self, filters: TableFilters) {
        self.filters = filters;
    }

    /// Rewrite expression for a column, if any.
    pub fn rewrite_for(&self, table: &str, column: &str) -> Option<&str> {
        self.select
            .get(&table.to_lowercase())
            .and_then(|columns| columns.get(&column.to_lowercase()))
            .map(String::as_str)
    }

    /// Row filter for a table, if any.
    pub fn where_for(&self, table: &str) -> Option<&str> {
        self.where_
            .get(&table.to_lowercase())
            .map(String::as_str)
            .filter(|condition| !condition.trim().is_empty())
    }

    /// Classifies the enumerated catalog, preserving its order.
    ///
    /// Patterns that match nothing are silently inert.
    pub fn classify<I, S>(&self, names: I) -> Vec<Table>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        names
            .into_iter()
            .map(|name| {
                let name = name.into();
                let class = self.filters.classify(&name);
                Table { name, class }
            })
            .collect()
    }
}
