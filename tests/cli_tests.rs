use std::path::Path;

use assert_cmd::Command;
use serde_json::{Value, json};
use tempfile::tempdir;

fn dagstore(db: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_dagstore"));
    cmd.args(["--db", db.to_str().unwrap()]);
    cmd
}

fn stdout_json(output: &std::process::Output) -> Value {
    serde_json::from_slice(&output.stdout).unwrap()
}

fn create(db: &Path, nodes: &str, edges: &str) -> i64 {
    let output = dagstore(db)
        .args(["create", "--nodes", nodes, "--edges", edges])
        .output()
        .unwrap();
    assert!(output.status.success(), "{output:?}");
    stdout_json(&output)["id"].as_i64().unwrap()
}

#[test]
fn test_cli_exits_with_success_on_help() {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_dagstore"));
    cmd.arg("--help");
    cmd.assert().success();
}

#[test]
fn test_cli_status_command() {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_dagstore"));
    cmd.arg("status");
    let output = cmd.output().unwrap();
    assert!(output.status.success());
    assert_eq!(
        stdout_json(&output),
        json!({ "backend": "sqlite", "graphs": 0 })
    );
}

#[test]
fn test_cli_create_read_and_adjacency() {
    let dir = tempdir().unwrap();
    let db = dir.path().join("cli.db");
    let id = create(&db, "a,b,c,d", "a:b,b:c,b:d,a:d");

    let output = dagstore(&db)
        .args(["read", &id.to_string()])
        .output()
        .unwrap();
    assert!(output.status.success());
    let snapshot = stdout_json(&output);
    assert_eq!(snapshot["id"], json!(id));
    assert_eq!(snapshot["nodes"], json!(["a", "b", "c", "d"]));
    assert_eq!(snapshot["edges"][0], json!({ "source": "a", "target": "b" }));

    let output = dagstore(&db)
        .args(["adjacency", &id.to_string(), "--reverse"])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert_eq!(
        stdout_json(&output),
        json!({ "a": [], "b": ["a"], "c": ["b"], "d": ["b", "a"] })
    );
}

#[test]
fn test_cli_delete_node_cascades() {
    let dir = tempdir().unwrap();
    let db = dir.path().join("cli.db");
    let id = create(&db, "a,b,c,d", "a:b,b:c,b:d,a:d");

    dagstore(&db)
        .args(["delete-node", &id.to_string(), "b"])
        .assert()
        .success();

    let output = dagstore(&db)
        .args(["adjacency", &id.to_string()])
        .output()
        .unwrap();
    assert_eq!(
        stdout_json(&output),
        json!({ "a": ["d"], "c": [], "d": [] })
    );
}

#[test]
fn test_cli_cycle_is_input_error() {
    let dir = tempdir().unwrap();
    let db = dir.path().join("cli.db");
    let output = dagstore(&db)
        .args(["create", "--nodes", "a,b,c", "--edges", "a:b,b:c,c:a"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    let body = stdout_json(&output);
    assert_eq!(body["error"], "Graph is not DAG");
    assert_eq!(body["kind"], "input");
    assert_eq!(body["loc"], json!(["body", "edges"]));
}

#[test]
fn test_cli_invalid_name_reports_location() {
    let dir = tempdir().unwrap();
    let db = dir.path().join("cli.db");
    let output = dagstore(&db)
        .args(["create", "--nodes", "a,b2"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert_eq!(
        stdout_json(&output)["loc"],
        json!(["body", "nodes", "1", "name"])
    );
}

#[test]
fn test_cli_missing_graph_is_not_found() {
    let dir = tempdir().unwrap();
    let db = dir.path().join("cli.db");
    let output = dagstore(&db).args(["read", "42"]).output().unwrap();
    assert_eq!(output.status.code(), Some(1));
    let body = stdout_json(&output);
    assert_eq!(body["error"], "Graph entity not found");
    assert_eq!(body["kind"], "not_found");
}

#[test]
fn test_cli_usage_errors_exit_two() {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_dagstore"));
    cmd.arg("--bogus");
    cmd.assert().code(2);

    let mut cmd = Command::new(env!("CARGO_BIN_EXE_dagstore"));
    cmd.args(["read", "not-a-number"]);
    let output = cmd.output().unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert_eq!(stdout_json(&output)["kind"], "usage");
}

#[test]
fn test_cli_check_reports_clean_store() {
    let dir = tempdir().unwrap();
    let db = dir.path().join("cli.db");
    create(&db, "a,b", "a:b");
    let output = dagstore(&db).arg("check").output().unwrap();
    assert!(output.status.success());
    let report = stdout_json(&output);
    assert_eq!(report["total_graphs"], 1);
    assert_eq!(report["total_edges"], 1);
    assert_eq!(report["cyclic_graphs"], 0);
}

#[test]
fn test_cli_memory_backend() {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_dagstore"));
    cmd.args(["--backend", "memory", "create", "--nodes", "a"]);
    let output = cmd.output().unwrap();
    assert!(output.status.success());
    assert_eq!(stdout_json(&output), json!({ "id": 1 }));
}
