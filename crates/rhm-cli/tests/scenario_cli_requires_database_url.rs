use assert_cmd::Command;
use predicates::prelude::*;

/// Database commands fail closed, naming the variable and never a value.
#[test]
fn db_status_without_url_names_the_env_var() {
    Command::cargo_bin("rhm")
        .unwrap()
        .args(["db", "status"])
        .env_remove("RHM_DATABASE_URL")
        .env_remove("RHM_CONFIG")
        .current_dir(std::env::temp_dir())
        .assert()
        .failure()
        .stderr(predicate::str::contains("SECRETS_MISSING"))
        .stderr(predicate::str::contains("RHM_DATABASE_URL"));
}

#[test]
fn reconcile_without_url_fails_before_touching_anything() {
    Command::cargo_bin("rhm")
        .unwrap()
        .args(["reconcile", "--dry-run"])
        .env_remove("RHM_DATABASE_URL")
        .env_remove("RHM_CONFIG")
        .current_dir(std::env::temp_dir())
        .assert()
        .failure()
        .stdout(predicate::str::contains("fixed=").not());
}
