use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn help_describes_the_server() {
    Command::cargo_bin("porthole")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("coding agent"))
        .stdout(predicate::str::contains("--journal-root"))
        .stdout(predicate::str::contains("--bind"));
}

#[test]
fn version_prints() {
    Command::cargo_bin("porthole")
        .unwrap()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("porthole"));
}
