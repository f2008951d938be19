//! CLI end-to-end tests
//!
//! Tests for the splatforge command-line interface.

use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::tempdir;

/// Get a command for the splatforge binary
#[allow(deprecated)]
fn splatforge_cmd() -> Command {
    Command::cargo_bin("splatforge").unwrap()
}

/// Write a config whose storage root lives under `dir`.
fn write_config(dir: &Path) -> PathBuf {
    let path = dir.join("splatforge.toml");
    let root = dir.join("storage");
    fs::write(
        &path,
        format!(
            r#"
[storage]
root = "{}"

[processing]
default_preset = "fast"
max_concurrent_jobs = 1
"#,
            root.display()
        ),
    )
    .unwrap();
    path
}

#[test]
fn test_cli_no_args_shows_help() {
    let mut cmd = splatforge_cmd();
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn test_cli_help_flag() {
    let mut cmd = splatforge_cmd();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("splatforge"))
        .stdout(predicate::str::contains("process"));
}

#[test]
fn test_cli_version_command() {
    let mut cmd = splatforge_cmd();
    cmd.arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_cli_presets_table() {
    let mut cmd = splatforge_cmd();
    cmd.arg("presets")
        .assert()
        .success()
        .stdout(predicate::str::contains("fast"))
        .stdout(predicate::str::contains("balanced"))
        .stdout(predicate::str::contains("quality"))
        .stdout(predicate::str::contains("iterations"));
}

#[test]
fn test_cli_validate_config() {
    let dir = tempdir().unwrap();
    let config = write_config(dir.path());

    let mut cmd = splatforge_cmd();
    cmd.arg("validate-config")
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration is valid"))
        .stdout(predicate::str::contains("Default preset:   fast"))
        .stdout(predicate::str::contains("Concurrent jobs:  1"));
}

#[test]
fn test_cli_validate_config_rejects_bad_toml() {
    let dir = tempdir().unwrap();
    let config = dir.path().join("broken.toml");
    fs::write(&config, "[processing\nmax_concurrent_jobs = ").unwrap();

    let mut cmd = splatforge_cmd();
    cmd.arg("validate-config").arg(&config).assert().failure();
}

#[test]
fn test_cli_list_empty_store() {
    let dir = tempdir().unwrap();
    let config = write_config(dir.path());

    let mut cmd = splatforge_cmd();
    cmd.arg("--config")
        .arg(&config)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("No jobs."));
}

#[test]
fn test_cli_list_json_empty_store() {
    let dir = tempdir().unwrap();
    let config = write_config(dir.path());

    let mut cmd = splatforge_cmd();
    cmd.args(["list", "--json", "--config"])
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("[]"));
}

#[test]
fn test_cli_status_unknown_job() {
    let dir = tempdir().unwrap();
    let config = write_config(dir.path());

    let mut cmd = splatforge_cmd();
    cmd.arg("--config")
        .arg(&config)
        .args(["status", "deadbeef"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No job matches 'deadbeef'"));
}

#[test]
fn test_cli_process_missing_video() {
    let dir = tempdir().unwrap();
    let config = write_config(dir.path());

    let mut cmd = splatforge_cmd();
    cmd.arg("--config")
        .arg(&config)
        .arg("process")
        .arg(dir.path().join("nowhere.mp4"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("No videos were submitted"));
}

#[test]
fn test_cli_process_rejects_unknown_preset() {
    let mut cmd = splatforge_cmd();
    cmd.args(["process", "video.mp4", "--preset", "ultra"])
        .assert()
        .failure();
}
