use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn cli_ast() {
    Command::cargo_bin("lx")
        .unwrap()
        .arg("ast")
        .arg("ab|c")
        .assert()
        .success()
        .stdout(predicate::str::contains("accept(0)"))
        .stdout(predicate::str::contains("alternation"))
        .stdout(predicate::str::contains("concatenation"))
        .stdout(predicate::str::contains("'c'"));
}

#[test]
fn cli_ast_with_tokens() {
    Command::cargo_bin("lx")
        .unwrap()
        .arg("ast")
        .arg("--tokens")
        .arg("src/tests/testdata/tokens.toml")
        .arg("{digit}+")
        .assert()
        .success()
        .stdout(predicate::str::contains("accept(5)"))
        .stdout(predicate::str::contains("repetition{1,}"))
        .stdout(predicate::str::contains("call(2)"));
}

#[test]
fn cli_ast_error() {
    Command::cargo_bin("lx")
        .unwrap()
        .arg("ast")
        .arg("(ab")
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing closing parenthesis"))
        .stderr(predicate::str::contains("(ab"));
}

#[test]
fn cli_ast_undefined_token() {
    Command::cargo_bin("lx")
        .unwrap()
        .arg("ast")
        .arg("{digit}")
        .assert()
        .failure()
        .stderr(predicate::str::contains("'digit' is not defined"));
}
