//! Smoke tests for the meshctl binary surface.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// meshctl with an isolated home so no real state is touched.
fn meshctl(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("meshctl").expect("binary builds");
    cmd.env("HOME", home.path());
    for var in [
        "MCP_MESH_REGISTRY_PORT",
        "MCP_MESH_REGISTRY_HOST",
        "MCP_MESH_DB_PATH",
        "MCP_MESH_LOG_LEVEL",
        "MCP_MESH_LOG_DIR",
    ] {
        cmd.env_remove(var);
    }
    cmd
}

#[test]
fn help_lists_commands() {
    let home = TempDir::new().unwrap();
    meshctl(&home)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("start"))
        .stdout(predicate::str::contains("stop"))
        .stdout(predicate::str::contains("status"))
        .stdout(predicate::str::contains("logs"));
}

#[test]
fn config_path_prints_a_path() {
    let home = TempDir::new().unwrap();
    meshctl(&home)
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("cli_config.json"));
}

#[test]
fn config_show_emits_json() {
    let home = TempDir::new().unwrap();
    meshctl(&home)
        .args(["config", "show", "--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"registry_port\": 8000"));
}

#[test]
fn config_set_then_show_round_trips() {
    let home = TempDir::new().unwrap();
    meshctl(&home)
        .args(["config", "set", "registry_port", "9123"])
        .assert()
        .success();
    meshctl(&home)
        .args(["config", "show", "--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("9123"));
}

#[test]
fn config_set_rejects_unknown_key() {
    let home = TempDir::new().unwrap();
    meshctl(&home)
        .args(["config", "set", "no_such_key", "1"])
        .assert()
        .failure()
        .code(1);
}

#[test]
fn stop_unknown_agent_fails_with_code_1() {
    let home = TempDir::new().unwrap();
    meshctl(&home)
        .args(["stop", "--agent", "ghost"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("ghost"));
}

#[test]
fn status_reports_empty_fleet() {
    let home = TempDir::new().unwrap();
    meshctl(&home)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("not running"));
}

#[test]
fn status_json_has_success_envelope() {
    let home = TempDir::new().unwrap();
    meshctl(&home)
        .args(["status", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"status\": \"success\""));
}

#[test]
fn logs_for_unknown_process_fails() {
    let home = TempDir::new().unwrap();
    meshctl(&home)
        .args(["logs", "--agent", "nothing-here"])
        .assert()
        .failure()
        .code(1);
}
