//! CLI surface tests: argument validation and help output, no subject
//! repositories or external tools involved.

use assert_cmd::Command;
use predicates::prelude::*;

fn cmd() -> Command {
    Command::cargo_bin("mbfl-pipeline").expect("binary builds")
}

#[test]
fn missing_required_args_fails() {
    cmd()
        .assert()
        .failure()
        .stderr(predicate::str::contains("--subject"));
}

#[test]
fn engine_and_worker_are_mutually_exclusive() {
    cmd()
        .args([
            "-s",
            "zlib_ng",
            "-l",
            "exp1",
            "--engine",
            "usable-selection",
            "--worker",
            "usable-tester",
            "--machine",
            "localhost",
            "--core",
            "0",
            "--version",
            "deflate.MUT1.c",
            "--target-file",
            "src/deflate.c",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("mutually exclusive"));
}

#[test]
fn engine_or_worker_is_required() {
    cmd()
        .args(["-s", "zlib_ng", "-l", "exp1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("one of --engine or --worker"));
}

#[test]
fn remote_without_machines_file_fails() {
    cmd()
        .args([
            "-s",
            "zlib_ng",
            "-l",
            "exp1",
            "--engine",
            "usable-selection",
            "--remote",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--machines-file"));
}

#[test]
fn worker_mode_requires_slot_identity() {
    cmd()
        .args(["-s", "zlib_ng", "-l", "exp1", "--worker", "usable-tester"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--machine and --core"));
}

#[test]
fn help_lists_the_engine_stages() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("--engine")
                .and(predicate::str::contains("usable-selection"))
                .and(predicate::str::contains("prerequisite-extraction"))
                .and(predicate::str::contains("mbfl-extraction"))
                .and(predicate::str::contains("--sample")),
        );
}
