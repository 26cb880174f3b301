use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::Value;

fn unique_temp_dir(prefix: &str) -> PathBuf {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|err| panic!("clock should be >= UNIX_EPOCH: {err}"))
        .as_nanos();
    let dir = std::env::temp_dir().join(format!("{prefix}-{now}"));
    fs::create_dir_all(&dir)
        .unwrap_or_else(|err| panic!("failed to create temp dir {}: {err}", dir.display()));
    dir
}

fn run_sa<I, S>(args: I) -> Output
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    Command::new(env!("CARGO_BIN_EXE_sa"))
        .args(args)
        .output()
        .unwrap_or_else(|err| panic!("failed to execute sa binary: {err}"))
}

fn run_json<I, S>(args: I) -> Value
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let output = run_sa(args);
    if !output.status.success() {
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        panic!(
            "sa command failed (status={}):\nstdout:\n{}\nstderr:\n{}",
            output.status, stdout, stderr
        );
    }

    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    serde_json::from_str(&stdout)
        .unwrap_or_else(|err| panic!("stdout is not valid JSON: {err}\nstdout:\n{stdout}"))
}

fn as_i64(value: &Value, key: &str) -> i64 {
    value
        .get(key)
        .and_then(Value::as_i64)
        .unwrap_or_else(|| panic!("missing integer field `{key}` in payload: {value}"))
}

fn as_str<'a>(value: &'a Value, key: &str) -> &'a str {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_else(|| panic!("missing string field `{key}` in payload: {value}"))
}

fn path_str(path: &Path) -> &str {
    path.to_str().unwrap_or_else(|| panic!("path should be valid UTF-8: {}", path.display()))
}

// Test IDs: TCLI-001
#[test]
fn db_commands_cover_schema_version_and_migrate() {
    let sandbox = unique_temp_dir("string-analyzer-cli-db");
    let db = sandbox.join("analyzer.sqlite3");

    let schema_before = run_json(["--db", path_str(&db), "db", "schema-version"]);
    assert_eq!(as_i64(&schema_before, "current_version"), 0);
    assert_eq!(as_str(&schema_before, "contract_version"), "cli.v1");

    let dry_run = run_json(["--db", path_str(&db), "db", "migrate", "--dry-run"]);
    assert_eq!(as_i64(&dry_run, "current_version"), 0);
    assert_eq!(
        dry_run
            .get("would_apply_versions")
            .and_then(Value::as_array)
            .map(std::vec::Vec::len)
            .unwrap_or_default(),
        1
    );

    let schema_after_dry_run = run_json(["--db", path_str(&db), "db", "schema-version"]);
    assert_eq!(as_i64(&schema_after_dry_run, "current_version"), 0);

    let migrate = run_json(["--db", path_str(&db), "db", "migrate"]);
    assert_eq!(as_i64(&migrate, "after_version"), 1);

    let _ = fs::remove_dir_all(&sandbox);
}

// Test IDs: TCLI-002
#[test]
fn add_show_list_and_delete_flow_is_consistent() {
    let sandbox = unique_temp_dir("string-analyzer-cli-e2e");
    let db = sandbox.join("analyzer.sqlite3");

    let added = run_json(["--db", path_str(&db), "string", "add", "--value", "racecar"]);
    let properties = added
        .get("properties")
        .unwrap_or_else(|| panic!("add should include properties: {added}"));
    assert_eq!(as_i64(properties, "length"), 7);
    assert_eq!(properties.get("is_palindrome").and_then(Value::as_bool), Some(true));
    assert_eq!(as_i64(properties, "unique_characters"), 4);

    let _ = run_json(["--db", path_str(&db), "string", "add", "--value", "two words"]);

    let shown = run_json(["--db", path_str(&db), "string", "show", "--value", "racecar"]);
    let shown_properties = shown
        .get("properties")
        .unwrap_or_else(|| panic!("show should include properties: {shown}"));
    assert_eq!(as_str(shown_properties, "value"), "racecar");

    let listed = run_json([
        "--db",
        path_str(&db),
        "string",
        "list",
        "--is-palindrome",
        "true",
        "--min-length",
        "3",
    ]);
    assert_eq!(as_i64(&listed, "count"), 1);
    assert_eq!(
        listed
            .get("filters_applied")
            .and_then(|filters| filters.get("min_length"))
            .and_then(Value::as_i64),
        Some(3)
    );

    let deleted = run_json(["--db", path_str(&db), "string", "delete", "--value", "racecar"]);
    assert_eq!(deleted.get("deleted").and_then(Value::as_bool), Some(true));

    let missing = run_sa(["--db", path_str(&db), "string", "show", "--value", "racecar"]);
    assert!(!missing.status.success());

    let _ = fs::remove_dir_all(&sandbox);
}

// Test IDs: TCLI-003
#[test]
fn duplicate_and_empty_values_fail_with_nonzero_exit() {
    let sandbox = unique_temp_dir("string-analyzer-cli-rejects");
    let db = sandbox.join("analyzer.sqlite3");

    let _ = run_json(["--db", path_str(&db), "string", "add", "--value", "noon"]);

    let duplicate = run_sa(["--db", path_str(&db), "string", "add", "--value", "noon"]);
    assert!(!duplicate.status.success());
    let stderr = String::from_utf8_lossy(&duplicate.stderr);
    assert!(stderr.contains("already exists"), "unexpected stderr: {stderr}");

    let empty = run_sa(["--db", path_str(&db), "string", "add", "--value", ""]);
    assert!(!empty.status.success());

    let _ = fs::remove_dir_all(&sandbox);
}

// Test IDs: TCLI-004
#[test]
fn natural_language_query_selects_the_same_records_as_structured_filters() {
    let sandbox = unique_temp_dir("string-analyzer-cli-nl");
    let db = sandbox.join("analyzer.sqlite3");

    for value in ["racecar", "noon", "not a palindrome"] {
        let _ = run_json(["--db", path_str(&db), "string", "add", "--value", value]);
    }

    let natural = run_json([
        "--db",
        path_str(&db),
        "query",
        "nl",
        "--text",
        "all single word palindromic strings",
    ]);
    assert_eq!(as_i64(&natural, "count"), 2);
    let interpreted = natural
        .get("interpreted_query")
        .unwrap_or_else(|| panic!("result should include interpreted_query: {natural}"));
    assert_eq!(as_str(interpreted, "original"), "all single word palindromic strings");
    assert_eq!(
        interpreted
            .get("parsed_filters")
            .and_then(|filters| filters.get("word_count"))
            .and_then(Value::as_i64),
        Some(1)
    );

    let structured = run_json([
        "--db",
        path_str(&db),
        "string",
        "list",
        "--is-palindrome",
        "true",
        "--word-count",
        "1",
    ]);
    assert_eq!(natural.get("data"), structured.get("data"));

    let _ = fs::remove_dir_all(&sandbox);
}

// Test IDs: TCLI-005
#[test]
fn unrecognized_query_fails_with_nonzero_exit() {
    let sandbox = unique_temp_dir("string-analyzer-cli-nl-reject");
    let db = sandbox.join("analyzer.sqlite3");

    let output = run_sa(["--db", path_str(&db), "query", "nl", "--text", "hello there"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("unable to parse"), "unexpected stderr: {stderr}");

    let _ = fs::remove_dir_all(&sandbox);
}
