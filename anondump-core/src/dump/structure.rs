//! Table structure extraction from `SHOW CREATE TABLE` output.
//!
//! The DDL is scanned line by line; there is no SQL parser. A column name is
//! the text inside the first pair of backticks on its line.

use crate::sql::quote_identifier;
use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

fn column_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"`([^(`]*)`").expect("valid column name pattern"))
}

fn column_name(line: &str) -> Option<String> {
    column_name_pattern()
        .captures(line)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Structure of one table as far as the dump needs it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableStructure {
    /// DDL to emit, without generated columns when they are stripped
    pub ddl: String,
    /// Generated columns, never selected nor inserted
    pub generated: Vec<String>,
    /// Columns whose values are rendered as `UNHEX('..')`
    pub binary: HashSet<String>,
}

impl TableStructure {
    /// Scans `ddl` for generated and binary columns.
    ///
    /// With `strip_generated` the generated column lines are removed from
    /// the DDL and a comma left dangling before the closing parenthesis is
    /// dropped. Binary columns are only collected with `detect_binary`.
    pub fn parse(ddl: &str, strip_generated: bool, detect_binary: bool) -> Self {
        let mut generated = Vec::new();
        let mut binary = HashSet::new();
        let mut kept: Vec<String> = Vec::new();

        for line in ddl.lines() {
            let lower = line.to_lowercase();
            if lower.contains("generated always") {
                if let Some(name) = column_name(line) {
                    generated.push(name);
                }
                if strip_generated {
                    continue;
                }
            }
            if detect_binary
                && lower.contains("binary")
                && let Some(name) = column_name(line)
            {
                binary.insert(name);
            }
            kept.push(line.to_string());
        }

        let ddl = if strip_generated && !generated.is_empty() {
            repair_trailing_commas(&mut kept);
            kept.join("\n")
        } else {
            ddl.to_string()
        };

        Self {
            ddl,
            generated,
            binary,
        }
    }

    /// Returns true if `column` is generated (names compare case-insensitively).
    pub fn is_generated(&self, column: &str) -> bool {
        self.generated
            .iter()
            .any(|g| g.eq_ignore_ascii_case(column))
    }

    /// Returns true if `column` holds binary data.
    pub fn is_binary(&self, column: &str) -> bool {
        self.binary.contains(column)
    }
}

/// Drops the comma ending a definition line when the next kept line closes
/// the column list.
fn repair_trailing_commas(lines: &mut [String]) {
    for i in 1..lines.len() {
        if lines[i].trim_start().starts_with(')') {
            let previous = &mut lines[i - 1];
            if previous.trim_end().ends_with(',') {
                let trimmed = previous.trim_end().trim_end_matches(',').to_string();
                *previous = trimmed;
            }
        }
    }
}

/// Structure block: header, `DROP TABLE IF EXISTS` and the DDL.
pub fn structure_block(table: &str, ddl: &str) -> String {
    let quoted = quote_identifier(table);
    format!(
        "\n--\n-- Structure for table {quoted}\n--\n\nDROP TABLE IF EXISTS {quoted};\n{ddl};\n"
    )
}

/// Data header announcing the number of rows.
pub fn data_header(table: &str, rows: u64) -> String {
    format!(
        "\n--\n-- Data for table {} -- {} rows\n--\n\n",
        quote_identifier(table),
        rows
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const DDL: &str = "CREATE TABLE `people` (\n  `id` int NOT NULL,\n  `first` varchar(20) DEFAULT NULL,\n  `avatar` varbinary(64) DEFAULT NULL,\n  `full` varchar(41) GENERATED ALWAYS AS (concat(`first`,' ')) VIRTUAL,\n  PRIMARY KEY (`id`)\n) ENGINE=InnoDB";

    const TRAILING_DDL: &str = "CREATE TABLE `t` (\n  `a` int DEFAULT NULL,\n  `b` int GENERATED ALWAYS AS ((`a` + 1)) STORED\n) ENGINE=InnoDB";

    #[test]
    fn test_generated_columns_detected_without_stripping() {
        let structure = TableStructure::parse(DDL, false, false);
        assert_eq!(structure.generated, vec!["full"]);
        assert_eq!(structure.ddl, DDL);
        assert!(structure.binary.is_empty());
        assert!(structure.is_generated("FULL"));
    }

    #[test]
    fn test_generated_columns_stripped() {
        let structure = TableStructure::parse(DDL, true, false);
        assert!(!structure.ddl.to_lowercase().contains("generated always"));
        assert!(structure.ddl.contains("PRIMARY KEY (`id`)"));
        assert!(structure.ddl.ends_with(") ENGINE=InnoDB"));
    }

    #[test]
    fn test_dangling_comma_repaired() {
        let structure = TableStructure::parse(TRAILING_DDL, true, false);
        assert_eq!(
            structure.ddl,
            "CREATE TABLE `t` (\n  `a` int DEFAULT NULL\n) ENGINE=InnoDB"
        );
        assert_eq!(structure.generated, vec!["b"]);
    }

    #[test]
    fn test_binary_detection() {
        let structure = TableStructure::parse(DDL, false, true);
        assert!(structure.is_binary("avatar"));
        assert!(!structure.is_binary("first"));
    }

    #[test]
    fn test_blocks() {
        assert_eq!(
            structure_block("t", "CREATE TABLE `t` (`a` int)"),
            "\n--\n-- Structure for table `t`\n--\n\nDROP TABLE IF EXISTS `t`;\nCREATE TABLE `t` (`a` int);\n"
        );
        assert_eq!(
            data_header("t", 3),
            "\n--\n-- Data for table `t` -- 3 rows\n--\n\n"
        );
    }
}
