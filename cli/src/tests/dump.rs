use assert_cmd::Command;
use assert_fs::prelude::*;
use assert_fs::TempDir;
use predicates::prelude::*;

#[test]
fn cli_dump() {
    Command::cargo_bin("lx")
        .unwrap()
        .arg("dump")
        .arg("src/tests/testdata/tokens.toml")
        .assert()
        .success()
        .stdout(predicate::str::contains("byte order: little-endian"))
        .stdout(predicate::str::contains("0 kw_var /var/"))
        .stdout(predicate::str::contains(
            "2 digit /[0-9]/ (subroutine only)",
        ))
        .stdout(predicate::str::contains("[0x30-0x39]"))
        .stdout(predicate::str::contains("PFORK"))
        .stdout(predicate::str::contains("TEST_RANGES"))
        .stdout(predicate::str::contains("ACCEPT 4"));
}

#[test]
fn cli_dump_big_endian() {
    Command::cargo_bin("lx")
        .unwrap()
        .arg("dump")
        .arg("--big-endian")
        .arg("src/tests/testdata/tokens.toml")
        .assert()
        .success()
        .stdout(predicate::str::contains("byte order: big-endian"));
}

#[test]
fn cli_dump_config() {
    let temp_dir = TempDir::new().unwrap();
    let config_file = temp_dir.child("config.toml");

    config_file.write_str("[dump]\nlittle_endian = false\n").unwrap();

    Command::cargo_bin("lx")
        .unwrap()
        .arg("--config")
        .arg(config_file.path())
        .arg("dump")
        .arg("src/tests/testdata/tokens.toml")
        .assert()
        .success()
        .stdout(predicate::str::contains("byte order: big-endian"));
}

#[test]
fn cli_dump_invalid_config() {
    let temp_dir = TempDir::new().unwrap();
    let config_file = temp_dir.child("config.toml");

    config_file.write_str("[dump]\nfoo = 1\n").unwrap();

    Command::cargo_bin("lx")
        .unwrap()
        .arg("--config")
        .arg(config_file.path())
        .arg("dump")
        .arg("src/tests/testdata/tokens.toml")
        .assert()
        .failure()
        .stderr(predicate::str::contains("foo"));
}

#[test]
fn cli_dump_invalid_token() {
    let temp_dir = TempDir::new().unwrap();
    let tokens_file = temp_dir.child("tokens.toml");

    tokens_file
        .write_str("[[token]]\nname = \"bad\"\nregex = \"(a\"\n")
        .unwrap();

    Command::cargo_bin("lx")
        .unwrap()
        .arg("dump")
        .arg(tokens_file.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid regexp for token `bad`"))
        .stderr(predicate::str::contains("missing closing parenthesis"));
}
