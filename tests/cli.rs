use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn test_help_lists_subcommands() {
    Command::cargo_bin("songfetch")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("acquire"))
        .stdout(predicate::str::contains("locate"))
        .stdout(predicate::str::contains("doctor"));
}

#[test]
fn test_acquire_requires_its_arguments() {
    Command::cargo_bin("songfetch")
        .unwrap()
        .arg("acquire")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--artist"));
}

#[test]
fn test_duration_must_be_numeric() {
    Command::cargo_bin("songfetch")
        .unwrap()
        .args([
            "locate",
            "--artist",
            "Queen",
            "--title",
            "Bohemian Rhapsody",
            "--duration-ms",
            "not-a-number",
        ])
        .assert()
        .failure();
}
