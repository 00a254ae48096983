use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const TREE: &str = r#"{
  "name": "R",
  "handle": "workspace:R",
  "children": [
    { "name": "F1", "children": [{ "name": "L1" }, { "name": "L2" }] },
    { "name": "F2", "children": [] }
  ]
}"#;

fn write_tree(dir: &Path, contents: &str) -> PathBuf {
    let path = dir.join("tree.json");
    fs::write(&path, contents).unwrap();
    path
}

fn explorer(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("explorer").unwrap();
    cmd.current_dir(dir.path());
    cmd
}

#[test]
fn test_tree_flattens_to_depth() {
    let dir = TempDir::new().unwrap();
    let tree = write_tree(dir.path(), TREE);

    explorer(&dir)
        .arg("tree")
        .arg(&tree)
        .args(["--depth", "2"])
        .assert()
        .success()
        .stdout("R\n  F1/\n    L1\n    L2\n  F2/\n");

    explorer(&dir)
        .arg("tree")
        .arg(&tree)
        .assert()
        .success()
        .stdout("R\n  F1/\n  F2/\n");
}

#[test]
fn test_tree_depth_from_config() {
    let dir = TempDir::new().unwrap();
    let tree = write_tree(dir.path(), TREE);
    fs::write(dir.path().join(".explorer.json"), r#"{ "list_depth": 2 }"#).unwrap();

    explorer(&dir)
        .arg("tree")
        .arg(&tree)
        .assert()
        .success()
        .stdout(predicate::str::contains("    L2\n"));
}

#[test]
fn test_invalid_config_is_rejected() {
    let dir = TempDir::new().unwrap();
    let tree = write_tree(dir.path(), TREE);
    let config = dir.path().join("bad.json");
    fs::write(&config, r#"{ "list_depth": 0 }"#).unwrap();

    explorer(&dir)
        .arg("--config")
        .arg(&config)
        .arg("tree")
        .arg(&tree)
        .assert()
        .failure()
        .stderr(predicate::str::contains("list_depth"));
}

#[test]
fn test_select_then_restore() {
    let dir = TempDir::new().unwrap();
    let tree = write_tree(dir.path(), TREE);
    let session = dir.path().join("session.json");

    explorer(&dir)
        .arg("select")
        .arg(&tree)
        .arg("F1/L2")
        .args(["--explored", "F1"])
        .arg("--save")
        .arg(&session)
        .assert()
        .success()
        .stdout(predicate::str::contains("selectedNodes: [] -> [\"L2\"]"))
        .stdout(predicate::str::contains("exploredContext: R -> F1"))
        .stdout(predicate::str::contains("selected F1/L2"));

    let saved = fs::read_to_string(&session).unwrap();
    assert!(saved.contains("workspace:R"));

    explorer(&dir)
        .arg("restore")
        .arg(&tree)
        .arg(&session)
        .assert()
        .success()
        .stdout("explored F1\nselected F1/L2\n");
}

#[test]
fn test_select_prints_session_without_save() {
    let dir = TempDir::new().unwrap();
    let tree = write_tree(dir.path(), TREE);

    explorer(&dir)
        .arg("select")
        .arg(&tree)
        .arg("F2")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"root_handle\": \"workspace:R\""));
}

#[test]
fn test_select_unknown_path_fails() {
    let dir = TempDir::new().unwrap();
    let tree = write_tree(dir.path(), TREE);

    explorer(&dir)
        .arg("select")
        .arg(&tree)
        .arg("F1/missing")
        .assert()
        .failure()
        .stderr(predicate::str::contains("No node at 'F1/missing'"));
}

#[test]
fn test_restore_drops_stale_paths() {
    let dir = TempDir::new().unwrap();
    let tree = write_tree(dir.path(), TREE);
    let session = dir.path().join("session.json");
    fs::write(
        &session,
        r#"{
  "root_handle": "workspace:R",
  "root_name": "R",
  "explored": ["Gone"],
  "selected": [["F1", "L1"], ["F1", "Renamed"]]
}"#,
    )
    .unwrap();

    explorer(&dir)
        .arg("restore")
        .arg(&tree)
        .arg(&session)
        .assert()
        .success()
        .stdout("explored /\nselected F1/L1\ndropped 1 stale selection path(s)\n");
}

#[test]
fn test_restore_with_unknown_root_fails_safely() {
    let dir = TempDir::new().unwrap();
    let tree = write_tree(dir.path(), TREE);
    let session = dir.path().join("session.json");
    fs::write(
        &session,
        r#"{ "root_handle": "workspace:other", "root_name": "Other", "selected": [] }"#,
    )
    .unwrap();

    explorer(&dir)
        .arg("restore")
        .arg(&tree)
        .arg(&session)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Cannot restore session"));
}
