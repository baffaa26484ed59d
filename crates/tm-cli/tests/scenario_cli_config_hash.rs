//! Scenario: `tm config-hash` prints a stable hash and the canonical JSON.

use std::io::Write;

use predicates::prelude::*;

fn yaml_file(body: &str) -> tempfile::NamedTempFile {
    let mut f = tempfile::NamedTempFile::new().unwrap();
    f.write_all(body.as_bytes()).unwrap();
    f
}

#[test]
fn config_hash_prints_hash_and_merged_json() {
    let base = yaml_file("manager:\n  tick_interval_ms: 1000\n");
    let overlay = yaml_file("manager:\n  tick_interval_ms: 50\n");

    let mut cmd = assert_cmd::Command::cargo_bin("tm").unwrap();
    cmd.arg("config-hash")
        .arg(base.path())
        .arg(overlay.path())
        .assert()
        .success()
        .stdout(predicate::str::is_match("config_hash=[0-9a-f]{64}").unwrap())
        .stdout(predicate::str::contains(r#"{"manager":{"tick_interval_ms":50}}"#));
}

#[test]
fn config_hash_requires_a_path() {
    let mut cmd = assert_cmd::Command::cargo_bin("tm").unwrap();
    cmd.arg("config-hash").assert().failure();
}
