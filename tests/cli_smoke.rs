//! Behavioural smoke tests for the CLI entrypoint.

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

#[test]
fn cli_help_lists_lifecycle_commands() {
    let mut cmd = cargo_bin_cmd!("exomachine");
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("create"))
        .stdout(predicate::str::contains("ssh-username"))
        .stdout(predicate::str::contains("--store-path"));
}

#[test]
fn cli_without_arguments_prints_usage() {
    let mut cmd = cargo_bin_cmd!("exomachine");
    cmd.env_remove("EXOMACHINE_NAME")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn cli_reports_configuration_errors_before_contacting_the_platform() {
    let store = tempfile::TempDir::new().expect("temp dir");
    let mut cmd = cargo_bin_cmd!("exomachine");
    cmd.env_remove("EXOSCALE_API_KEY")
        .env_remove("EXOSCALE_API_SECRET_KEY")
        .env_remove("EXOMACHINE_CONFIG_PATH")
        .env("HOME", store.path())
        .env("XDG_CONFIG_HOME", store.path())
        .current_dir(store.path())
        .arg("--name")
        .arg("node-1")
        .arg("--store-path")
        .arg(store.path())
        .arg("ssh-username")
        .assert()
        .failure()
        .stderr(predicate::str::contains("configuration"));
}
