//! End-to-end tests of the `rag-labs` binary.
//!
//! Only commands that run offline are exercised.

// Integration tests live outside cfg(test) by design
#![allow(clippy::tests_outside_test_module)]

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn rag_labs() -> Command {
    #[allow(deprecated)]
    let mut cmd = Command::cargo_bin("rag-labs").unwrap_or_else(|_| unreachable!());
    for var in [
        "RAG_DB_PATH",
        "RAG_CORPUS",
        "RAG_PROMPTS_FILE",
        "OPENAI_API_KEY",
        "AZURE_OPENAI_API_KEY",
        "RAG_API_KEY",
        "RAG_PROVIDER",
        "AZURE_SEARCH_ENDPOINT",
        "AZURE_SEARCH_KEY",
    ] {
        cmd.env_remove(var);
    }
    cmd
}

fn provisioned() -> (TempDir, String) {
    let dir = tempfile::tempdir().unwrap_or_else(|_| unreachable!());
    let db = dir.path().join("agent.db").display().to_string();
    rag_labs()
        .args(["--db-path", &db, "init-db"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Created sample database"));
    (dir, db)
}

#[test]
fn test_help_lists_commands() {
    rag_labs()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("ask"))
        .stdout(predicate::str::contains("init-db"))
        .stdout(predicate::str::contains("compare"));
}

#[test]
fn test_schema_lists_tables() {
    let (_dir, db) = provisioned();
    rag_labs()
        .args(["--db-path", &db, "schema"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Table: employees"))
        .stdout(predicate::str::contains("  - department (TEXT)"))
        .stdout(predicate::str::contains("Table: sales"));
}

#[test]
fn test_sql_select() {
    let (_dir, db) = provisioned();
    rag_labs()
        .args([
            "--db-path",
            &db,
            "sql",
            "SELECT name FROM employees WHERE department = 'Engineering' ORDER BY name",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("(3 row(s))"));
}

#[test]
fn test_sql_json() {
    let (_dir, db) = provisioned();
    let output = rag_labs()
        .args([
            "--db-path",
            &db,
            "--format",
            "json",
            "sql",
            "SELECT COUNT(*) AS n FROM products",
        ])
        .output()
        .unwrap_or_else(|_| unreachable!());
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap_or_default();
    assert_eq!(value["row_count"], serde_json::json!(1));
    assert_eq!(value["rows"][0]["n"], serde_json::json!(5));
}

#[test]
fn test_sql_rejects_non_select() {
    let (_dir, db) = provisioned();
    rag_labs()
        .args(["--db-path", &db, "sql", "DROP TABLE employees"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("SELECT"));

    rag_labs()
        .args(["--db-path", &db, "sql", "SELECT COUNT(*) FROM employees"])
        .assert()
        .success()
        .stdout(predicate::str::contains("6"));
}

#[test]
fn test_sql_without_database() {
    let dir = tempfile::tempdir().unwrap_or_else(|_| unreachable!());
    let db = dir.path().join("missing.db").display().to_string();
    rag_labs()
        .args(["--db-path", &db, "sql", "SELECT 1"])
        .assert()
        .failure();
}

#[test]
fn test_corpus_keyword_search() {
    let dir = tempfile::tempdir().unwrap_or_else(|_| unreachable!());
    let corpus = dir.path().join("corpus.json");
    let records = serde_json::json!([
        {"chunk_id": "ml", "title": "Machine Learning", "chunk": "Machine learning learns patterns from data."},
        {"chunk_id": "vec", "title": "Vector Search", "chunk": "Vector search ranks by embedding similarity."}
    ]);
    std::fs::write(&corpus, records.to_string()).unwrap_or_else(|_| unreachable!());
    let corpus = corpus.display().to_string();

    rag_labs()
        .args(["--corpus", &corpus, "search", "embedding similarity"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Vector Search [vec]"))
        .stdout(predicate::str::contains("[ml]").not());

    // No embedder configured: hybrid degrades to keyword and says so.
    rag_labs()
        .args(["--corpus", &corpus, "search", "machine learning", "--mode", "hybrid"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Note: hybrid search failed"))
        .stdout(predicate::str::contains("[ml]"));
}

#[test]
fn test_init_prompts_writes_file() {
    let dir = tempfile::tempdir().unwrap_or_else(|_| unreachable!());
    let path = dir.path().join("prompts.json");
    let arg = path.display().to_string();

    rag_labs()
        .args(["init-prompts", "--path", &arg])
        .assert()
        .success()
        .stdout(predicate::str::contains("Wrote default prompts"));

    let text = std::fs::read_to_string(&path).unwrap_or_default();
    let value: serde_json::Value = serde_json::from_str(&text).unwrap_or_default();
    assert!(value["system"]["rag"].is_string());
    assert!(value["agent"]["tool_selection"].is_string());
}

#[test]
fn test_ask_requires_api_key() {
    let (_dir, db) = provisioned();
    rag_labs()
        .args(["--db-path", &db, "ask", "How many employees are there?"])
        .assert()
        .failure();
}

#[test]
fn test_index_info_requires_search_endpoint() {
    rag_labs()
        .arg("index-info")
        .assert()
        .failure()
        .stderr(predicate::str::contains("AZURE_SEARCH_ENDPOINT"));
}
