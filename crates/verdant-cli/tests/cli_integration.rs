//! CLI Integration Tests
//!
//! These tests run the built binary. None of them needs a backend: they
//! cover help output, configuration handling and the checks that run
//! before any request is made.
//!
//! ```
//! cargo test --package verdant-cli --test cli_integration
//! ```

use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;

/// Run verdant with an isolated config file and return output
fn run_verdant(config: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_verdant"))
        .arg("--config")
        .arg(config)
        .args(["--url", "http://127.0.0.1:9", "--no-color"])
        .args(args)
        .env_remove("VERDANT_URL")
        .env_remove("VERDANT_CONFIG")
        .env_remove("VERDANT_EMAIL")
        .env_remove("VERDANT_PASSWORD")
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to run verdant binary")
}

fn temp_config() -> (TempDir, std::path::PathBuf) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    (dir, path)
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

// =============================================================================
// Help and Version
// =============================================================================

#[test]
fn test_help_command() {
    let (_dir, config) = temp_config();
    let output = run_verdant(&config, &["--help"]);

    assert!(output.status.success(), "Help should succeed");
    let stdout = stdout(&output);
    for command in ["login", "warehouses", "cells", "users", "metrics", "watch", "mode", "actuator"] {
        assert!(stdout.contains(command), "Help should list {} command", command);
    }
}

#[test]
fn test_version_command() {
    let (_dir, config) = temp_config();
    let output = run_verdant(&config, &["--version"]);

    assert!(output.status.success());
    assert!(stdout(&output).contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_subcommand_help() {
    let (_dir, config) = temp_config();

    let output = run_verdant(&config, &["metrics", "--help"]);
    assert!(output.status.success());
    let help = stdout(&output);
    assert!(help.contains("--scope"));
    assert!(help.contains("--year"));

    let output = run_verdant(&config, &["actuator", "--help"]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("--on"));

    let output = run_verdant(&config, &["watch", "--help"]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("--count"));
}

#[test]
fn test_invalid_arguments_are_rejected() {
    let (_dir, config) = temp_config();

    let output = run_verdant(&config, &["metrics", "c1", "--scope", "week"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("unknown scope"));

    let output = run_verdant(&config, &["actuator", "sprinkler", "on"]);
    assert!(!output.status.success());
}

#[test]
fn test_completions() {
    let (_dir, config) = temp_config();
    let output = run_verdant(&config, &["completions", "bash"]);

    assert!(output.status.success());
    assert!(stdout(&output).contains("verdant"));
}

// =============================================================================
// Configuration
// =============================================================================

#[test]
fn test_config_path_uses_flag() {
    let (_dir, config) = temp_config();
    let output = run_verdant(&config, &["config", "path"]);

    assert!(output.status.success());
    assert_eq!(stdout(&output).trim(), config.display().to_string());
}

#[test]
fn test_config_set_get_unset() {
    let (_dir, config) = temp_config();

    let output = run_verdant(&config, &["config", "set", "cell", "c42"]);
    assert!(output.status.success(), "set failed: {}", stderr(&output));
    assert!(config.exists());

    let output = run_verdant(&config, &["config", "get", "cell"]);
    assert_eq!(stdout(&output).trim(), "c42");

    let output = run_verdant(&config, &["config", "unset", "cell"]);
    assert!(output.status.success());

    let output = run_verdant(&config, &["config", "get", "cell"]);
    assert_eq!(stdout(&output).trim(), "(not set)");
}

#[test]
fn test_config_set_rejects_invalid_value() {
    let (_dir, config) = temp_config();
    let output = run_verdant(&config, &["config", "set", "timeout", "soon"]);

    assert!(!output.status.success());
    assert!(stderr(&output).contains("Invalid timeout"));
    assert!(!config.exists());
}

#[test]
fn test_config_init_refuses_to_overwrite() {
    let (_dir, config) = temp_config();

    let output = run_verdant(&config, &["config", "init"]);
    assert!(output.status.success());

    let output = run_verdant(&config, &["config", "init"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("already exists"));
}

// =============================================================================
// Pre-request checks
// =============================================================================

#[test]
fn test_metrics_without_cell() {
    let (_dir, config) = temp_config();
    let output = run_verdant(&config, &["metrics"]);

    assert!(!output.status.success());
    assert!(stderr(&output).contains("No cell specified"));
}

#[test]
fn test_resources_require_session() {
    let (_dir, config) = temp_config();

    for args in [
        &["warehouses", "list"][..],
        &["cells", "list"][..],
        &["mode", "c1"][..],
    ] {
        let output = run_verdant(&config, args);
        assert!(!output.status.success(), "{:?} should fail", args);
        assert!(
            stderr(&output).contains("Not signed in"),
            "{:?} stderr: {}",
            args,
            stderr(&output)
        );
    }
}

#[test]
fn test_whoami_signed_out() {
    let (_dir, config) = temp_config();
    let output = run_verdant(&config, &["whoami", "--format", "json"]);

    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(json["authenticated"], false);
    assert!(json["claims"].is_null());
}
