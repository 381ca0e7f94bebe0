//! End-to-end tests for CLI exit codes.
//!
//! - Exit code 0: every entry staged or skipped
//! - Exit code 1: a configuration error, or an artifact/entry failure
//! - Exit code 2: invalid command-line usage (handled by clap)

use assert_cmd::cargo::cargo_bin_cmd;
use assert_fs::prelude::*;
use predicates::prelude::*;

#[test]
fn test_exit_code_help() {
    cargo_bin_cmd!("artikit-stage").arg("--help").assert().code(0);
}

#[test]
fn test_exit_code_missing_config() {
    let temp = assert_fs::TempDir::new().unwrap();

    cargo_bin_cmd!("artikit-stage")
        .current_dir(temp.path())
        .arg("run")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Failed to read config file"));
}

#[test]
fn test_exit_code_unknown_key() {
    let temp = assert_fs::TempDir::new().unwrap();
    temp.child("artifacts.toml")
        .write_str("[defaults]\nouput_path = \"bin\"\n")
        .unwrap();

    cargo_bin_cmd!("artikit-stage")
        .current_dir(temp.path())
        .arg("run")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Failed to parse TOML config"));
}

#[test]
fn test_exit_code_unknown_token() {
    let temp = assert_fs::TempDir::new().unwrap();
    temp.child("artifacts.toml")
        .write_str("[[artifact]]\nsource = \"{nope}\"\ndestination = \"stage\"\n")
        .unwrap();

    cargo_bin_cmd!("artikit-stage")
        .current_dir(temp.path())
        .arg("run")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Unknown token"));
}

#[test]
fn test_exit_code_invalid_filter() {
    let temp = assert_fs::TempDir::new().unwrap();
    temp.child("bin/app.dll").write_str("app").unwrap();

    cargo_bin_cmd!("artikit-stage")
        .current_dir(temp.path())
        .args([
            "copy",
            "--source",
            "bin",
            "--destination",
            "stage",
            "--include",
            "a|b",
        ])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Invalid filter pattern"));
}

#[test]
fn test_exit_code_bad_usage() {
    cargo_bin_cmd!("artikit-stage")
        .args(["copy", "--source", "bin"])
        .assert()
        .code(2);
}
