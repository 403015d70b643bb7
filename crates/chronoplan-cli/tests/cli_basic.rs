//! Basic CLI E2E tests.
//!
//! Tests invoke the built binary and verify its outputs.

use std::path::Path;
use std::process::Command;

const DECLARATION: &str = r#"
[[roadmaps]]
name = "home"

[[roadmaps.projects]]
name = "garden"
start = "2024-03-04"
interval = 7

[[roadmaps.projects.tasks]]
id = "dig"
duration = 90

[[roadmaps.projects.tasks]]
id = "plant"
dependencies = ["dig"]
"#;

/// Run a CLI command and return (stdout, stderr, exit code).
fn run_cli(args: &[&str]) -> (String, String, i32) {
    let output = Command::new(env!("CARGO_BIN_EXE_chronoplan"))
        .args(args)
        .env("CHRONOPLAN_LOG", "off")
        .output()
        .expect("Failed to execute CLI command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let code = output.status.code().unwrap_or(-1);

    (stdout, stderr, code)
}

fn write_declaration(dir: &Path) -> String {
    let path = dir.join("home.toml");
    std::fs::write(&path, DECLARATION).unwrap();
    path.to_string_lossy().to_string()
}

#[test]
fn test_plan_prints_date_keyed_records() {
    let dir = tempfile::tempdir().unwrap();
    let declaration = write_declaration(dir.path());
    let config = dir.path().join("config.toml");
    let (stdout, stderr, code) = run_cli(&[
        "plan",
        &declaration,
        "--start",
        "2024-03-01",
        "--config",
        config.to_str().unwrap(),
    ]);
    assert_eq!(code, 0, "plan failed: {stderr}");

    let plan: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(plan["2024-03-04"][0]["task_id"], "home.garden.dig");
    assert_eq!(plan["2024-03-11"][0]["dependencies"], "home.garden.dig");
}

#[test]
fn test_schedule_for_one_date() {
    let dir = tempfile::tempdir().unwrap();
    let declaration = write_declaration(dir.path());
    let config = dir.path().join("config.toml");
    let (stdout, stderr, code) = run_cli(&[
        "schedule",
        &declaration,
        "--start",
        "2024-03-01",
        "--date",
        "2024-03-04",
        "--config",
        config.to_str().unwrap(),
    ]);
    assert_eq!(code, 0, "schedule failed: {stderr}");

    let schedule: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(schedule["date"], "2024-03-04");
    let names: Vec<&str> = schedule["entries"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|e| e["name"].as_str())
        .collect();
    assert!(names.contains(&"dig"));
    assert_eq!(names.first(), Some(&"Sleep"));
}

#[test]
fn test_schedule_writes_file() {
    let dir = tempfile::tempdir().unwrap();
    let declaration = write_declaration(dir.path());
    let config = dir.path().join("config.toml");
    let output = dir.path().join("schedules.json");
    let (_, stderr, code) = run_cli(&[
        "schedule",
        &declaration,
        "--start",
        "2024-03-01",
        "--output",
        output.to_str().unwrap(),
        "--config",
        config.to_str().unwrap(),
    ]);
    assert_eq!(code, 0, "schedule failed: {stderr}");
    let saved: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&output).unwrap()).unwrap();
    assert_eq!(saved.as_array().unwrap().len(), 8);
}

#[test]
fn test_config_set_get_reset() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("config.toml");
    let config = config.to_str().unwrap();

    let (stdout, _, code) = run_cli(&["config", "set", "planning.cluster_size", "3", "--config", config]);
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "ok");

    let (stdout, _, code) = run_cli(&["config", "get", "planning.cluster_size", "--config", config]);
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "3");

    let (_, _, code) = run_cli(&["config", "reset", "--config", config]);
    assert_eq!(code, 0);
    let (stdout, _, _) = run_cli(&["config", "get", "day.start", "--config", config]);
    assert_eq!(stdout.trim(), "07:00");
}

#[test]
fn test_errors_exit_nonzero() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("config.toml");
    let (_, stderr, code) = run_cli(&["config", "get", "no.such.key", "--config", config.to_str().unwrap()]);
    assert_eq!(code, 1);
    assert!(stderr.contains("error: unknown key"));

    let missing = dir.path().join("missing.toml");
    let (_, stderr, code) = run_cli(&["plan", missing.to_str().unwrap(), "--config", config.to_str().unwrap()]);
    assert_eq!(code, 1);
    assert!(stderr.starts_with("error:"));
}
