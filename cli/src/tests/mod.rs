mod ast;
mod dump;
mod scan;

use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn cli_no_subcommand() {
    Command::cargo_bin("lx")
        .unwrap()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage:"));
}

#[test]
fn cli_missing_config_file() {
    Command::cargo_bin("lx")
        .unwrap()
        .arg("--config")
        .arg("src/tests/testdata/missing.toml")
        .arg("dump")
        .arg("src/tests/testdata/tokens.toml")
        .assert()
        .failure()
        .stderr(predicate::str::contains("file not found"));
}
