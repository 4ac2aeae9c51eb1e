//! End-to-end dump tests against the in-memory source database.
//!
//! This test suite covers:
//! - Output framing and catalog order
//! - nodata/ignore classification
//! - Extended INSERT batching
//! - Generated and binary column handling
//! - Server-side and faker rewrites, row filters
//! - Connection bound, locking and single-transaction mode
//! - Failure propagation and the trigger section

#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]

mod common;

use anondump_core::{DumpError, DumpOption, Dumper, Rules};
use common::{MemoryDatabase, MemoryTable, dump_to_string, wait_until_closed};
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

fn dumper(db: &MemoryDatabase, options: &[DumpOption]) -> Dumper {
    Dumper::from_options(Arc::new(db.clone()), options).unwrap()
}

fn rules(yaml: &str) -> Rules {
    Rules::load(yaml.as_bytes()).unwrap()
}

/// Lines holding row tuples of `table`'s INSERT statements.
fn tuples<'a>(output: &'a str, table: &str) -> Vec<&'a str> {
    let header = format!("INSERT INTO `{}`", table);
    let mut rows = Vec::new();
    let mut inside = false;
    for line in output.lines() {
        if line.starts_with(&header) {
            inside = true;
            continue;
        }
        if inside && line.starts_with('(') {
            rows.push(line.trim_end_matches([',', ';']));
            if line.ends_with(';') {
                inside = false;
            }
        } else {
            inside = false;
        }
    }
    rows
}

#[tokio::test]
async fn test_output_framing_and_catalog_order() {
    let db = MemoryDatabase::new(vec![
        MemoryTable::new("b_second", &["id"]).numbered_rows(1),
        MemoryTable::view("v_report"),
        MemoryTable::new("a_third", &["id"]).numbered_rows(2),
    ]);

    let (output, summary) = dump_to_string(&dumper(&db, &[])).await.unwrap();

    assert!(output.starts_with("SET NAMES utf8;\nSET FOREIGN_KEY_CHECKS = 0;\n"));
    assert!(output.ends_with("SET FOREIGN_KEY_CHECKS = 1;\n"));
    assert!(!output.contains("v_report"));

    let second = output.find("-- Structure for table `b_second`").unwrap();
    let third = output.find("-- Structure for table `a_third`").unwrap();
    assert!(second < third);

    assert!(output.contains(
        "\n--\n-- Data for table `a_third` -- 2 rows\n--\n\nLOCK TABLES `a_third` WRITE;\nINSERT INTO `a_third` (`id`) VALUES\n('id-0'),\n('id-1');\nUNLOCK TABLES;\n"
    ));
    assert_eq!(summary.tables_dumped, 2);
    assert_eq!(summary.rows_dumped, 3);
}

#[tokio::test]
async fn test_nodata_tables_keep_structure_only() {
    let db = MemoryDatabase::new(vec![
        MemoryTable::new("users", &["id", "name"]).numbered_rows(3),
        MemoryTable::new("audit_log", &["id", "event"]).numbered_rows(4),
    ]);
    let stats = db.stats();
    let mut dumper = dumper(&db, &[]);
    dumper
        .apply_rules(&rules("nodata:\n  - audit_log\n"))
        .unwrap();

    let (output, summary) = dump_to_string(&dumper).await.unwrap();

    assert!(output.contains("DROP TABLE IF EXISTS `audit_log`;"));
    assert!(output.contains("-- Data for table `audit_log` -- 0 rows"));
    assert!(!output.contains("INSERT INTO `audit_log`"));
    assert_eq!(tuples(&output, "users").len(), 3);

    assert_eq!(stats.count_prefix("SELECT COUNT(*) FROM `audit_log`"), 0);
    assert_eq!(summary.tables_without_data, 1);
    assert_eq!(summary.rows_dumped, 3);
}

#[tokio::test]
async fn test_ignore_wins_over_nodata() {
    let db = MemoryDatabase::new(vec![
        MemoryTable::new("logs", &["id"]).numbered_rows(2),
        MemoryTable::new("log_archive", &["id"]).numbered_rows(2),
        MemoryTable::new("users", &["id"]).numbered_rows(1),
    ]);
    let stats = db.stats();
    let mut dumper = dumper(&db, &[]);
    dumper
        .set_table_filters(&["log*".to_string()], &["logs".to_string()])
        .unwrap();

    let (output, summary) = dump_to_string(&dumper).await.unwrap();

    assert!(!output.contains("`logs`"));
    assert!(output.contains("-- Data for table `log_archive` -- 0 rows"));
    assert_eq!(summary.tables_ignored, 1);
    assert_eq!(summary.tables_dumped, 2);
    assert!(stats.statements().iter().all(|s| !s.contains("`logs`")));
}

#[tokio::test]
async fn test_filter_patterns_are_case_insensitive() {
    let db = MemoryDatabase::new(vec![MemoryTable::new("Sessions", &["id"]).numbered_rows(2)]);
    let mut dumper = dumper(&db, &[]);
    dumper.set_table_filters(&["sess*".to_string()], &[]).unwrap();

    let (output, _) = dump_to_string(&dumper).await.unwrap();
    assert!(output.contains("-- Data for table `Sessions` -- 0 rows"));
}

#[tokio::test]
async fn test_insert_limit_batches_rows() {
    let db = MemoryDatabase::new(vec![MemoryTable::new("t", &["id"]).numbered_rows(5)]);

    let (output, _) = dump_to_string(&dumper(
        &db,
        &[DumpOption::new("insert-into-limit", "2")],
    ))
    .await
    .unwrap();

    assert_eq!(output.matches("INSERT INTO `t`").count(), 3);
    assert!(output.contains("VALUES\n('id-0'),\n('id-1');\n"));
    assert!(output.contains("VALUES\n('id-2'),\n('id-3');\n"));
    assert!(output.contains("VALUES\n('id-4');\n"));
}

#[tokio::test]
async fn test_quick_writes_one_row_per_statement() {
    let db = MemoryDatabase::new(vec![MemoryTable::new("t", &["id"]).numbered_rows(3)]);

    let (output, _) = dump_to_string(&dumper(&db, &[DumpOption::flag("quick")]))
        .await
        .unwrap();

    assert_eq!(output.matches("INSERT INTO `t`").count(), 3);
}

const GENERATED_DDL: &str = "CREATE TABLE `people` (\n  `id` int NOT NULL,\n  `first` varchar(20) DEFAULT NULL,\n  `full` varchar(41) GENERATED ALWAYS AS (concat(`first`,'!')) VIRTUAL,\n  PRIMARY KEY (`id`)\n) ENGINE=InnoDB";

fn people() -> MemoryTable {
    MemoryTable::with_ddl("people", &["id", "first", "full"], GENERATED_DDL)
        .row(&[Some("1"), Some("Ann"), Some("Ann!")])
        .row(&[Some("2"), None, None])
}

#[tokio::test]
async fn test_generated_columns_never_inserted() {
    let db = MemoryDatabase::new(vec![people()]);
    let stats = db.stats();

    let (output, _) = dump_to_string(&dumper(&db, &[])).await.unwrap();

    assert!(output.contains("GENERATED ALWAYS"));
    assert!(output.contains("INSERT INTO `people` (`id`, `first`) VALUES"));
    assert_eq!(tuples(&output, "people"), vec!["('1', 'Ann')", "('2', NULL)"]);
    assert_eq!(stats.count_prefix("SELECT `id`, `first` FROM `people`"), 1);
}

#[tokio::test]
async fn test_ignore_generated_strips_definition() {
    let db = MemoryDatabase::new(vec![people()]);

    let (output, _) = dump_to_string(&dumper(&db, &[DumpOption::flag("ignore-generated")]))
        .await
        .unwrap();

    assert!(!output.to_lowercase().contains("generated always"));
    assert!(output.contains("PRIMARY KEY (`id`)\n) ENGINE=InnoDB;\n"));
    for tuple in tuples(&output, "people") {
        assert_eq!(tuple.matches(", ").count() + 1, 2, "tuple {}", tuple);
    }
}

#[tokio::test]
async fn test_hex_encode_only_binary_columns() {
    let ddl = "CREATE TABLE `files` (\n  `name` varchar(20) DEFAULT NULL,\n  `data` blob,\n  `digest` binary(2) DEFAULT NULL\n) ENGINE=InnoDB";
    let db = MemoryDatabase::new(vec![
        MemoryTable::with_ddl("files", &["name", "data", "digest"], ddl).raw_row(vec![
            Some(b"a.txt".to_vec()),
            Some(b"blob text".to_vec()),
            Some(vec![0xbe, 0xef]),
        ]),
    ]);

    let (output, _) = dump_to_string(&dumper(&db, &[DumpOption::flag("hex-encode")]))
        .await
        .unwrap();

    assert_eq!(
        tuples(&output, "files"),
        vec!["('a.txt', 'blob text', UNHEX('beef'))"]
    );
}

#[tokio::test]
async fn test_non_utf8_cells_written_byte_for_byte() {
    let ddl = "CREATE TABLE `legacy` (\n  `name` varchar(20) DEFAULT NULL,\n  `data` blob\n) ENGINE=InnoDB DEFAULT CHARSET=latin1";
    let db = MemoryDatabase::new(vec![
        MemoryTable::with_ddl("legacy", &["name", "data"], ddl).raw_row(vec![
            Some(vec![b'J', b'o', 0xeb, b'\'', b'l']),
            Some(vec![0x41, 0xff, 0xfe, 0x42]),
        ]),
    ]);

    let mut out = Vec::new();
    dumper(&db, &[]).dump(&mut out).await.unwrap();

    let expected: &[u8] = b"('Jo\xeb\\'l', 'A\xff\xfeB');\n";
    assert!(out.windows(expected.len()).any(|w| w == expected));
    assert!(!out.windows(3).any(|w| w == "\u{fffd}".as_bytes()));
}

#[tokio::test]
async fn test_rewrites_faker_distinct_plain_identical() {
    let db = MemoryDatabase::new(vec![
        MemoryTable::new("users", &["id", "token", "role"]).numbered_rows(20),
    ]);
    let stats = db.stats();
    let mut dumper = dumper(&db, &[]);
    dumper
        .apply_rules(&rules(
            "rewrite:\n  users:\n    token: \"faker.UUID().V4()\"\n    role: \"'member'\"\n",
        ))
        .unwrap();

    let (output, _) = dump_to_string(&dumper).await.unwrap();
    let rows = tuples(&output, "users");
    assert_eq!(rows.len(), 20);

    let tokens: HashSet<&str> = rows.iter().map(|r| r.split(", ").nth(1).unwrap()).collect();
    assert_eq!(tokens.len(), 20);
    assert!(!output.contains("faker.UUID"));

    let roles: HashSet<&str> = rows.iter().map(|r| r.split(", ").nth(2).unwrap()).collect();
    assert_eq!(roles.len(), 1);

    let select = stats
        .statements()
        .into_iter()
        .find(|s| s.starts_with("SELECT `id`"))
        .unwrap();
    assert_eq!(
        select,
        "SELECT `id`, 'faker.UUID().V4()' AS `token`, 'member' AS `role` FROM `users`"
    );
}

#[tokio::test]
async fn test_invalid_faker_rewrite_keeps_text() {
    let db = MemoryDatabase::new(vec![MemoryTable::new("users", &["id", "email"]).numbered_rows(2)]);
    let mut dumper = dumper(&db, &[]);
    dumper
        .apply_rules(&rules(
            "rewrite:\n  users:\n    email: \"faker.Internet().Nothing()\"\n",
        ))
        .unwrap();

    let (output, summary) = dump_to_string(&dumper).await.unwrap();

    assert_eq!(summary.rows_dumped, 2);
    assert_eq!(output.matches("'faker.Internet().Nothing()'").count(), 2);
}

#[tokio::test]
async fn test_where_condition_applies_to_count_and_select() {
    let db = MemoryDatabase::new(vec![MemoryTable::new("orders", &["id"]).numbered_rows(2)]);
    let stats = db.stats();
    let mut dumper = dumper(&db, &[]);
    dumper.apply_rules(&rules("where:\n  Orders: \"id > 10\"\n")).unwrap();

    dump_to_string(&dumper).await.unwrap();

    assert_eq!(
        stats.count_prefix("SELECT COUNT(*) FROM `orders` WHERE id > 10"),
        1
    );
    assert_eq!(stats.count_prefix("SELECT `id` FROM `orders` WHERE id > 10"), 1);
}

#[tokio::test]
async fn test_empty_table_has_no_insert() {
    let db = MemoryDatabase::new(vec![MemoryTable::new("empty", &["id"])]);
    let stats = db.stats();

    let (output, _) = dump_to_string(&dumper(&db, &[])).await.unwrap();

    assert!(output.contains("-- Data for table `empty` -- 0 rows"));
    assert!(!output.contains("LOCK TABLES `empty` WRITE"));
    assert_eq!(stats.count_prefix("SHOW COLUMNS"), 0);
}

#[tokio::test]
async fn test_skip_add_locks() {
    let db = MemoryDatabase::new(vec![MemoryTable::new("t", &["id"]).numbered_rows(1)]);

    let (output, _) = dump_to_string(&dumper(&db, &[DumpOption::flag("skip-add-locks")]))
        .await
        .unwrap();

    assert!(!output.contains("LOCK TABLES"));
    assert!(output.contains("INSERT INTO `t`"));
}

#[tokio::test]
async fn test_source_tables_read_locked_by_default() {
    let db = MemoryDatabase::new(vec![MemoryTable::new("t", &["id"]).numbered_rows(1)]);
    let stats = db.stats();

    dump_to_string(&dumper(&db, &[])).await.unwrap();

    let conn = stats.connection_of("FLUSH TABLES `t`").unwrap();
    let statements = stats.statements_on(conn);
    assert_eq!(statements.first().unwrap(), "FLUSH TABLES `t` WITH READ LOCK");
    assert_eq!(statements.last().unwrap(), "UNLOCK TABLES");

    let db = MemoryDatabase::new(vec![MemoryTable::new("t", &["id"]).numbered_rows(1)]);
    let stats = db.stats();
    dump_to_string(&dumper(&db, &[DumpOption::flag("skip-lock-tables")]))
        .await
        .unwrap();
    assert_eq!(stats.count_prefix("FLUSH TABLES"), 0);
}

#[tokio::test]
async fn test_single_transaction_snapshot_per_connection() {
    let tables = (0..4)
        .map(|i| MemoryTable::new(&format!("t{}", i), &["id"]).numbered_rows(2))
        .collect();
    let db = MemoryDatabase::new(tables);
    let stats = db.stats();

    dump_to_string(&dumper(
        &db,
        &[DumpOption::flag("single-transaction"), DumpOption::flag("parallel")],
    ))
    .await
    .unwrap();

    assert_eq!(stats.count_prefix("FLUSH TABLES"), 0);
    assert_eq!(stats.transactions.load(Ordering::SeqCst), 4);
    assert_eq!(stats.commits.load(Ordering::SeqCst), 4);
    assert_eq!(stats.rollbacks.load(Ordering::SeqCst), 0);

    let conn = stats.connection_of("SHOW CREATE TABLE `t2`").unwrap();
    let statements = stats.statements_on(conn);
    assert_eq!(
        statements.first().unwrap(),
        "START TRANSACTION WITH CONSISTENT SNAPSHOT"
    );
    assert_eq!(statements.last().unwrap(), "COMMIT");
}

#[tokio::test]
async fn test_connection_bound() {
    let make = || {
        MemoryDatabase::new(
            (0..15)
                .map(|i| {
                    MemoryTable::new(&format!("t{:02}", i), &["id"])
                        .numbered_rows(1)
                        .latency(Duration::from_millis(20))
                })
                .collect(),
        )
    };

    let db = make();
    let stats = db.stats();
    dump_to_string(&dumper(&db, &[DumpOption::flag("parallel")]))
        .await
        .unwrap();
    let max = stats.max_open.load(Ordering::SeqCst);
    assert!(max <= 10, "{} connections open at once", max);
    assert!(max > 1, "parallel dump never overlapped");
    assert_eq!(stats.open.load(Ordering::SeqCst), 0);

    let db = make();
    let stats = db.stats();
    dump_to_string(&dumper(&db, &[])).await.unwrap();
    assert_eq!(stats.max_open.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_table_failure_fails_dump() {
    let db = MemoryDatabase::new(vec![
        MemoryTable::new("good", &["id"]).numbered_rows(2),
        MemoryTable::new("broken", &["id"]).numbered_rows(2).failing(),
        MemoryTable::new("slow", &["id"])
            .numbered_rows(2)
            .latency(Duration::from_millis(50)),
    ]);
    let stats = db.stats();

    let mut out = Vec::new();
    let result = dumper(&db, &[DumpOption::flag("parallel")])
        .dump(&mut out)
        .await;

    let err = result.unwrap_err();
    assert!(
        matches!(&err, DumpError::QueryExecution { context } if context.contains("broken")),
        "unexpected error: {:?}",
        err
    );
    let output = String::from_utf8(out).unwrap();
    assert!(!output.contains("FOREIGN_KEY_CHECKS = 1"));
    assert!(wait_until_closed(&stats).await);
}

#[tokio::test]
async fn test_trigger_section() {
    let ddl = "CREATE DEFINER=`app`@`%` TRIGGER `users_bi` BEFORE INSERT ON `users` FOR EACH ROW SET NEW.id = NEW.id + 1";
    let db = MemoryDatabase::with_triggers(
        vec![MemoryTable::new("users", &["id"]).numbered_rows(1)],
        vec![("users_bi", ddl)],
    );

    let (output, summary) = dump_to_string(&dumper(
        &db,
        &[
            DumpOption::flag("dump-trigger"),
            DumpOption::flag("skip-definer"),
            DumpOption::new("trigger-delimiter", "//"),
        ],
    ))
    .await
    .unwrap();

    assert_eq!(summary.triggers_dumped, 1);
    assert!(output.ends_with(
        "SET FOREIGN_KEY_CHECKS = 1;\n\n--\n-- Trigger `users_bi`\n--\n\nDELIMITER //\nCREATE TRIGGER `users_bi` BEFORE INSERT ON `users` FOR EACH ROW SET NEW.id = NEW.id + 1\n//\nDELIMITER ;\n"
    ));
}

#[tokio::test]
async fn test_triggers_skipped_by_default() {
    let db = MemoryDatabase::with_triggers(
        vec![MemoryTable::new("users", &["id"])],
        vec![("users_bi", "CREATE TRIGGER `users_bi` BEFORE INSERT ON `users` FOR EACH ROW SET @x = 1")],
    );
    let stats = db.stats();

    let (output, _) = dump_to_string(&dumper(&db, &[])).await.unwrap();

    assert!(!output.contains("Trigger"));
    assert_eq!(stats.count_prefix("SHOW TRIGGERS"), 0);
}

#[tokio::test]
async fn test_charset_option() {
    let db = MemoryDatabase::new(vec![]);
    let (output, summary) = dump_to_string(&dumper(&db, &[DumpOption::new("set-charset", "utf8mb4")]))
        .await
        .unwrap();

    assert_eq!(
        output,
        "SET NAMES utf8mb4;\nSET FOREIGN_KEY_CHECKS = 0;\nSET FOREIGN_KEY_CHECKS = 1;\n"
    );
    assert_eq!(summary.tables_dumped, 0);
}
