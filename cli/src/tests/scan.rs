use assert_cmd::Command;
use assert_fs::prelude::*;
use assert_fs::TempDir;
use predicates::prelude::*;

#[test]
fn cli_scan() {
    Command::cargo_bin("lx")
        .unwrap()
        .arg("scan")
        .arg("src/tests/testdata/tokens.toml")
        .arg("src/tests/testdata/input.txt")
        .assert()
        .success()
        .stdout("kw_var\nid\nop\nint\nop\nid\nop\n");
}

#[test]
fn cli_scan_print_text_and_range() {
    Command::cargo_bin("lx")
        .unwrap()
        .arg("scan")
        .arg("--print-text")
        .arg("--print-range")
        .arg("src/tests/testdata/tokens.toml")
        .arg("src/tests/testdata/input.txt")
        .assert()
        .success()
        .stdout(predicate::str::contains("kw_var \"var\" [0, 3)"))
        .stdout(predicate::str::contains("id \"variable\" [4, 12)"))
        .stdout(predicate::str::contains("int \"42\" [15, 17)"))
        .stdout(predicate::str::contains("id \"x1\" [20, 22)"));
}

#[test]
fn cli_scan_config() {
    let temp_dir = TempDir::new().unwrap();
    let config_file = temp_dir.child("config.toml");

    config_file.write_str("[scan]\nprint_text = true\n").unwrap();

    Command::cargo_bin("lx")
        .unwrap()
        .arg("--config")
        .arg(config_file.path())
        .arg("scan")
        .arg("src/tests/testdata/tokens.toml")
        .arg("src/tests/testdata/input.txt")
        .assert()
        .success()
        .stdout(predicate::str::contains("op \"+\""))
        .stdout(predicate::str::contains("[18, 19)").not());
}

#[test]
fn cli_scan_missing_input() {
    Command::cargo_bin("lx")
        .unwrap()
        .arg("scan")
        .arg("src/tests/testdata/tokens.toml")
        .arg("src/tests/testdata/missing.txt")
        .assert()
        .failure()
        .stderr(predicate::str::contains("file not found"));
}
