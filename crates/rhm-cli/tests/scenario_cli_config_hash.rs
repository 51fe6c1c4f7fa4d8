use std::io::Write;

use assert_cmd::Command;
use predicates::prelude::*;

fn layer(yaml: &str) -> tempfile::NamedTempFile {
    let mut f = tempfile::NamedTempFile::new().unwrap();
    f.write_all(yaml.as_bytes()).unwrap();
    f
}

fn hash_of(paths: &[&std::path::Path]) -> String {
    let out = Command::cargo_bin("rhm")
        .unwrap()
        .arg("config-hash")
        .args(paths)
        .output()
        .unwrap();
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let stdout = String::from_utf8(out.stdout).unwrap();
    stdout
        .lines()
        .find_map(|l| l.strip_prefix("config_hash="))
        .unwrap()
        .to_string()
}

#[test]
fn config_hash_prints_hash_and_merged_json() {
    let base = layer("lease:\n  deposit_months: 1\nbus:\n  capacity: 64\n");
    let overlay = layer("lease:\n  deposit_months: 2\n");

    Command::cargo_bin("rhm")
        .unwrap()
        .arg("config-hash")
        .arg(base.path())
        .arg(overlay.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("config_hash="))
        .stdout(predicate::str::contains("\"deposit_months\":2"));
}

#[test]
fn config_hash_ignores_key_order_but_not_values() {
    let a = layer("bus:\n  capacity: 64\n  heartbeat_secs: 2\n");
    let b = layer("bus:\n  heartbeat_secs: 2\n  capacity: 64\n");
    let c = layer("bus:\n  heartbeat_secs: 3\n  capacity: 64\n");

    assert_eq!(hash_of(&[a.path()]), hash_of(&[b.path()]));
    assert_ne!(hash_of(&[a.path()]), hash_of(&[c.path()]));
}

#[test]
fn config_hash_refuses_literal_secrets() {
    let bad = layer("database:\n  url_env: \"postgres://user:pw@host/db\"\n");

    Command::cargo_bin("rhm")
        .unwrap()
        .arg("config-hash")
        .arg(bad.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("CONFIG_SECRET_DETECTED"))
        .stderr(predicate::str::contains("pw@host").not());
}

#[test]
fn config_hash_rejects_invalid_settings() {
    let bad = layer("lease:\n  max_lease_months: 0\n");

    Command::cargo_bin("rhm")
        .unwrap()
        .arg("config-hash")
        .arg(bad.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("max_lease_months"));
}
