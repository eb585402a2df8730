//! CLI end-to-end tests
//!
//! Tests for fragforge command-line interface.

use assert_cmd::prelude::*;
use fragforge_media::{Atom, AtomType, Fragment, FragmentSample};
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::tempdir;

/// Get a command for the fragforge binary
#[allow(deprecated)]
fn fragforge_cmd() -> Command {
    Command::cargo_bin("fragforge").unwrap()
}

/// Write an ftyp followed by two single-track fragments
fn write_fixture(dir: &Path) -> PathBuf {
    let mut stream = Vec::new();
    Atom::opaque(AtomType::FTYP, b"iso6\0\0\0\0iso6cmfc".to_vec().into())
        .write_to(&mut stream)
        .unwrap();

    for sequence_number in 1..=2 {
        let mut fragment = Fragment::build(sequence_number, 1);
        let samples = (0..3)
            .map(|i| {
                let flags = if i == 0 { 0x0200_0000 } else { 0x0101_0000 };
                FragmentSample::new(3000, flags, vec![sequence_number as u8; 16])
            })
            .collect();
        fragment.set_samples(samples).unwrap();
        fragment.write_to(&mut stream, false).unwrap();
    }

    let path = dir.join("input.mp4");
    fs::write(&path, stream).unwrap();
    path
}

#[test]
fn test_cli_no_args_shows_help() {
    let mut cmd = fragforge_cmd();
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn test_cli_help_flag() {
    let mut cmd = fragforge_cmd();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("fragforge"))
        .stdout(predicate::str::contains("Usage"));
}

#[test]
fn test_cli_version_command() {
    let mut cmd = fragforge_cmd();
    cmd.arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains("fragforge 0.1.0"));
}

#[test]
fn test_cli_inspect_nonexistent_file() {
    let mut cmd = fragforge_cmd();
    cmd.args(["inspect", "/nonexistent/path/stream.mp4"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("exist"));
}

#[test]
fn test_cli_inspect_prints_tree() {
    let temp = tempdir().unwrap();
    let input = write_fixture(temp.path());

    let mut cmd = fragforge_cmd();
    cmd.args(["inspect", input.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("ftyp @0"))
        .stdout(predicate::str::contains("trun"))
        .stdout(predicate::str::contains("Fragment #2"))
        .stdout(predicate::str::contains("[sync]"));
}

#[test]
fn test_cli_inspect_json() {
    let temp = tempdir().unwrap();
    let input = write_fixture(temp.path());

    let output = fragforge_cmd()
        .args(["inspect", "--json", input.to_str().unwrap()])
        .output()
        .unwrap();
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["atoms"].as_array().unwrap().len(), 5);
    assert_eq!(json["atoms"][1]["atom_type"], "moof");
    assert_eq!(json["fragments"][1]["sequence_number"], 2);
    assert_eq!(json["fragments"][0]["samples"].as_array().unwrap().len(), 3);
    assert_eq!(json["fragments"][0]["samples"][0]["flags"], 0x0200_0000);
}

#[test]
fn test_cli_rewrite_roundtrip() {
    let temp = tempdir().unwrap();
    let input = write_fixture(temp.path());
    let output = temp.path().join("output.mp4");

    let mut cmd = fragforge_cmd();
    cmd.args([
        "rewrite",
        input.to_str().unwrap(),
        output.to_str().unwrap(),
    ])
    .assert()
    .success()
    .stdout(predicate::str::contains("Rewrote 2 fragments"));

    assert_eq!(fs::read(&input).unwrap(), fs::read(&output).unwrap());
}

#[test]
fn test_cli_rewrite_sample_defaults() {
    let temp = tempdir().unwrap();
    let input = write_fixture(temp.path());
    let output = temp.path().join("output.mp4");

    let mut cmd = fragforge_cmd();
    cmd.args([
        "rewrite",
        "--sample-defaults",
        input.to_str().unwrap(),
        output.to_str().unwrap(),
    ])
    .assert()
    .success();

    let before = fs::read(&input).unwrap().len();
    let after = fs::read(&output).unwrap().len();
    assert!(after < before);

    // Same samples after the rewrite
    let json = |path: &Path| -> serde_json::Value {
        let output = fragforge_cmd()
            .args(["inspect", "--json", path.to_str().unwrap()])
            .output()
            .unwrap();
        serde_json::from_slice(&output.stdout).unwrap()
    };
    assert_eq!(json(&input)["fragments"][0]["samples"], json(&output)["fragments"][0]["samples"]);
}

#[test]
fn test_cli_rewrite_refuses_existing_output() {
    let temp = tempdir().unwrap();
    let input = write_fixture(temp.path());
    let output = temp.path().join("output.mp4");
    fs::write(&output, b"keep").unwrap();

    let mut cmd = fragforge_cmd();
    cmd.args([
        "rewrite",
        input.to_str().unwrap(),
        output.to_str().unwrap(),
    ])
    .assert()
    .failure()
    .stderr(predicate::str::contains("already exists"));

    assert_eq!(fs::read(&output).unwrap(), b"keep");
}

#[test]
fn test_cli_rewrite_overwrite_from_config() {
    let temp = tempdir().unwrap();
    let input = write_fixture(temp.path());
    let output = temp.path().join("output.mp4");
    fs::write(&output, b"stale").unwrap();

    let config_file = temp.path().join("config.toml");
    fs::write(
        &config_file,
        r#"
[output]
overwrite = true
"#,
    )
    .unwrap();

    let mut cmd = fragforge_cmd();
    cmd.args([
        "rewrite",
        "--config",
        config_file.to_str().unwrap(),
        input.to_str().unwrap(),
        output.to_str().unwrap(),
    ])
    .assert()
    .success();

    assert_eq!(fs::read(&input).unwrap(), fs::read(&output).unwrap());
}

#[test]
fn test_cli_rewrite_zero_iterations() {
    let temp = tempdir().unwrap();
    let input = write_fixture(temp.path());
    let output = temp.path().join("output.mp4");

    let mut cmd = fragforge_cmd();
    cmd.args([
        "rewrite",
        "--max-offset-iterations",
        "0",
        input.to_str().unwrap(),
        output.to_str().unwrap(),
    ])
    .assert()
    .failure()
    .stderr(predicate::str::contains("at least 1"));
}

#[test]
fn test_cli_rewrite_malformed_input() {
    let temp = tempdir().unwrap();
    let input = temp.path().join("broken.mp4");
    // Declares 64 bytes, holds 12
    fs::write(&input, [0, 0, 0, 64, b'm', b'o', b'o', b'f', 0, 0, 0, 0]).unwrap();
    let output = temp.path().join("output.mp4");

    let mut cmd = fragforge_cmd();
    cmd.args([
        "rewrite",
        input.to_str().unwrap(),
        output.to_str().unwrap(),
    ])
    .assert()
    .failure()
    .stderr(predicate::str::contains("Failed to parse"));

    assert!(!output.exists());
}

#[test]
fn test_cli_validate_valid_config() {
    let temp = tempdir().unwrap();
    let config_file = temp.path().join("config.toml");

    fs::write(
        &config_file,
        r#"
[codec]
max_offset_iterations = 8
set_sample_defaults = true
"#,
    )
    .unwrap();

    let mut cmd = fragforge_cmd();
    cmd.args(["validate", config_file.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("valid"))
        .stdout(predicate::str::contains("Max offset iterations: 8"));
}

#[test]
fn test_cli_validate_invalid_config() {
    let temp = tempdir().unwrap();
    let config_file = temp.path().join("config.toml");

    fs::write(
        &config_file,
        r#"
[codec]
max_offset_iterations = 0
"#,
    )
    .unwrap();

    let mut cmd = fragforge_cmd();
    cmd.args(["validate", config_file.to_str().unwrap()])
        .assert()
        .failure();
}

#[test]
fn test_cli_validate_nonexistent_config() {
    let mut cmd = fragforge_cmd();
    cmd.args(["validate", "/nonexistent/config.toml"])
        .assert()
        .failure();
}
