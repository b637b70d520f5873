// crates/toolgate-cli/tests/cli_commands.rs
// ============================================================================
// Module: CLI Command Tests
// Description: End-to-end tests for the `toolgate` binary.
// Purpose: Exercise key administration, serving, and config validation.
// Dependencies: toolgate-cli binary
// ============================================================================
//! ## Overview
//! Runs the compiled binary against a temporary `SQLite` store so state
//! carries across invocations the way it does in deployment.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::process::Command;
use std::process::Output;
use std::process::Stdio;

use tempfile::TempDir;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn toolgate_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_toolgate"))
}

fn write_config(dir: &TempDir) -> PathBuf {
    let db = dir.path().join("state").join("toolgate.db");
    let config = format!(
        "[store]\ntype = \"sqlite\"\npath = \"{}\"\n\n[audit]\nsink = \"none\"\n",
        db.display()
    );
    let path = dir.path().join("toolgate.toml");
    fs::write(&path, config).unwrap();
    path
}

fn run(config: &Path, args: &[&str]) -> Output {
    Command::new(toolgate_bin())
        .env_remove("TOOLGATE_CONFIG")
        .arg("--config")
        .arg(config)
        .args(args)
        .output()
        .expect("run toolgate")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

fn generate(config: &Path) -> String {
    let output = run(config, &["key", "generate"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let text = stdout(&output);
    assert!(text.starts_with("Generated key "), "{text}");
    text.split_whitespace().nth(2).unwrap().to_string()
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[test]
fn key_lifecycle_round_trip_through_the_binary() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(&dir);
    let key_id = generate(&config);

    let registered = run(&config, &["key", "register", &key_id, "alice"]);
    assert!(registered.status.success(), "stderr: {}", stderr(&registered));
    assert!(stdout(&registered).contains("bound to alice"));

    let stolen = run(&config, &["key", "register", &key_id, "mallory"]);
    assert!(!stolen.status.success());
    assert!(stderr(&stolen).contains("already bound"), "{}", stderr(&stolen));

    let left = run(&config, &["key", "time-left", "alice"]);
    assert!(left.status.success(), "stderr: {}", stderr(&left));
    let left_text = stdout(&left);
    assert!(left_text.starts_with("alice: 2"), "{left_text}");
    assert!(left_text.trim_end().ends_with("remaining"), "{left_text}");

    let shown = run(&config, &["key", "show", &key_id]);
    assert!(stdout(&shown).contains("owner=alice"));
    assert!(stdout(&shown).contains("status=active"));

    let revoked = run(&config, &["key", "revoke", &key_id]);
    assert!(revoked.status.success(), "stderr: {}", stderr(&revoked));

    let after = run(&config, &["key", "time-left", "alice"]);
    assert!(!after.status.success());
    assert!(stderr(&after).contains("revoked"), "{}", stderr(&after));

    let listed = run(&config, &["key", "list"]);
    assert!(stdout(&listed).contains("status=revoked"));
}

#[test]
fn generate_accepts_explicit_and_unbounded_validity() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(&dir);

    let unbounded = run(&config, &["key", "generate", "--unbounded"]);
    assert!(stdout(&unbounded).contains("valid until never"), "{}", stdout(&unbounded));

    let zero = run(&config, &["key", "generate", "--validity-secs", "0"]);
    assert!(!zero.status.success());

    let both = run(&config, &["key", "generate", "--unbounded", "--validity-secs", "60"]);
    assert!(!both.status.success());
}

#[test]
fn serve_answers_stdin_lines_and_persists_usage() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(&dir);
    let key_id = generate(&config);
    let bound = run(&config, &["key", "register", &key_id, "alice"]);
    assert!(bound.status.success(), "stderr: {}", stderr(&bound));

    let mut child = Command::new(toolgate_bin())
        .env_remove("TOOLGATE_CONFIG")
        .arg("--config")
        .arg(&config)
        .arg("serve")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn serve");
    child.stdin.take().unwrap().write_all(b"alice dump\nbob start\nbob dump\n").unwrap();
    let output = child.wait_with_output().unwrap();
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let responses: Vec<serde_json::Value> =
        stdout(&output).lines().map(|line| serde_json::from_str(line).unwrap()).collect();
    assert_eq!(responses.len(), 3);
    let by_line = |line: u64| {
        responses.iter().find(|response| response["line"].as_u64() == Some(line)).unwrap()
    };
    assert_eq!(by_line(1)["error"]["code"], "tool_unavailable");
    assert_eq!(by_line(2)["status"], "ok");
    assert_eq!(by_line(3)["error"]["kind"], "unauthorized");

    let usage = run(&config, &["usage", "show"]);
    assert_eq!(stdout(&usage).trim(), "Total commands handled: 3");
}

#[test]
fn config_validate_reports_invalid_files() {
    let dir = tempfile::tempdir().unwrap();
    let good = write_config(&dir);
    let ok = run(&good, &["config", "validate"]);
    assert!(ok.status.success(), "stderr: {}", stderr(&ok));
    assert_eq!(stdout(&ok).trim(), "Config valid.");

    let bad = dir.path().join("bad.toml");
    fs::write(&bad, "[tools.start]\nprogram = \"/bin/true\"\n").unwrap();
    let rejected = run(&bad, &["config", "validate"]);
    assert!(!rejected.status.success());
    assert!(stderr(&rejected).contains("built-in command"), "{}", stderr(&rejected));
}
