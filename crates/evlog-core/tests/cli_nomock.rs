//! End-to-end tests for the `evlog` binary.
//!
//! Every test points `--config` at a file inside a temp dir and strips the
//! `EVLOG_*` variables so the host environment cannot leak in.

use std::fs;
use std::path::Path;

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use predicates::prelude::*;

const ENV_VARS: &[&str] = &[
    "EVLOG_CONFIG",
    "EVLOG_NAME",
    "EVLOG_LEVEL",
    "EVLOG_FILE",
    "EVLOG_SPLIT_TAG",
    "EVLOG_SENSITIVE",
    "EVLOG_REGEX_SENSITIVE",
    "EVLOG_SENSITIVE_RULE",
    "EVLOG_TRUNCATIONS",
    "EVLOG_FAST",
    "EVLOG_LOG",
    "EVLOG_LOG_FORMAT",
    "RUST_LOG",
];

fn evlog() -> Command {
    let mut cmd = cargo_bin_cmd!("evlog");
    for var in ENV_VARS {
        cmd.env_remove(var);
    }
    cmd
}

fn write_config(dir: &Path, body: &str) -> String {
    let path = dir.join("config.toml");
    fs::write(&path, body).unwrap();
    path.display().to_string()
}

fn read_lines(path: &Path) -> Vec<serde_json::Value> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

// ============================================================================
// Help and argument errors
// ============================================================================

#[test]
fn help_lists_subcommands() {
    evlog()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("view"))
        .stdout(predicate::str::contains("emit"))
        .stdout(predicate::str::contains("config"));
}

#[test]
fn malformed_field_is_rejected() {
    evlog()
        .args(["emit", "--field", "no-equals-sign"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("expected key=value"));
}

// ============================================================================
// config
// ============================================================================

#[test]
fn config_prints_source_and_toml() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), "name = \"billing\"\ntick_ms = 250\n");

    evlog()
        .args(["config", "--config", &config])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("# source: explicit"))
        .stdout(predicate::str::contains("name = \"billing\""))
        .stdout(predicate::str::contains("tick_ms = 250"));
}

#[test]
fn config_env_override_applies() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), "name = \"billing\"\n");

    evlog()
        .args(["config", "--config", &config])
        .env("EVLOG_NAME", "payments")
        .assert()
        .success()
        .stdout(predicate::str::contains("name = \"payments\""));
}

#[test]
fn diagnostics_table_sets_stderr_format() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(
        dir.path(),
        "tick_ms = 20\n\n[diagnostics]\nlevel = \"debug\"\nformat = \"jsonl\"\n",
    );
    let log = dir.path().join("app.log");

    let output = evlog()
        .args(["emit", "--config", &config, "--to", &log.display().to_string(), "-m", "hi"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let stderr = String::from_utf8(output.stderr).unwrap();
    let diagnostics: Vec<serde_json::Value> = stderr
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert!(
        diagnostics
            .iter()
            .any(|d| d.to_string().contains("config resolved")),
        "{stderr}"
    );

    evlog()
        .args(["emit", "--config", &config, "--log-level", "off"])
        .args(["--to", &log.display().to_string(), "-m", "quiet"])
        .assert()
        .success()
        .stderr(predicate::str::is_empty());
}

#[test]
fn invalid_config_exits_with_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), "tick_ms = \"soon\"\n");

    evlog()
        .args(["config", "--config", &config])
        .assert()
        .code(11);
}

// ============================================================================
// emit + view
// ============================================================================

#[test]
fn emit_to_file_then_view() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), "name = \"billing\"\ntick_ms = 20\n");
    let log = dir.path().join("app.log");

    evlog()
        .args([
            "emit",
            "--config",
            &config,
            "--to",
            &log.display().to_string(),
            "--trace-id",
            "req-42",
            "-m",
            "order accepted",
            "--field",
            "orderId=1001",
            "--field",
            "password=hunter2222",
        ])
        .assert()
        .success();

    let lines = read_lines(&log);
    assert_eq!(lines.len(), 1);
    let event = &lines[0];
    assert_eq!(event["logType"], "info");
    assert_eq!(event["logLevel"], "info");
    assert_eq!(event["traceId"], "req-42");
    assert_eq!(event["info"], "order accepted");
    assert_eq!(event["orderId"], 1001);
    assert_ne!(event["password"], "hunter2222");

    evlog()
        .args(["view", "--utc", &log.display().to_string()])
        .assert()
        .success()
        .stdout(predicate::str::contains(" req-42 order accepted"))
        .stdout(predicate::str::contains("  orderId:1001"))
        .stdout(predicate::str::contains("hunter2222").not());
}

#[test]
fn emit_custom_kind_has_no_level() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), "tick_ms = 20\n");
    let log = dir.path().join("audit.log");

    evlog()
        .args([
            "emit",
            "--config",
            &config,
            "--to",
            &format!("file://{}", log.display()),
            "--kind",
            "audit",
            "--field",
            "Actor={\"UserName\":\"ops\"}",
        ])
        .assert()
        .success();

    let lines = read_lines(&log);
    assert_eq!(lines[0]["logType"], "audit");
    assert!(lines[0].get("logLevel").is_none());
    assert_eq!(lines[0]["actor"]["userName"], "ops");
}

#[test]
fn view_reads_stdin_and_passes_through_garbage() {
    let input = concat!(
        r#"{"logType":"warning","logTime":1709640001,"traceId":"t1","warning":"disk low"}"#,
        "\n",
        "\n",
        "panic: something else\n",
    );
    evlog()
        .args(["view", "--utc"])
        .write_stdin(input)
        .assert()
        .success()
        .stdout(predicate::str::diff(
            "03-05 12:00:01.000 t1 disk low\npanic: something else\n",
        ));
}

#[test]
fn view_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    evlog()
        .args(["view", &dir.path().join("absent.log").display().to_string()])
        .assert()
        .code(21)
        .stderr(predicate::str::contains("cannot open"));
}
