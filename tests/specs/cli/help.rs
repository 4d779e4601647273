//! Help and version output

use crate::prelude::*;
use predicates::prelude::*;

#[test]
fn help_lists_commands() {
    let temp = Project::empty();
    temp.pw()
        .args(&["--help"])
        .passes()
        .stdout_has("Pipewright")
        .stdout_has("run")
        .stdout_has("validate")
        .stdout_has("render")
        .stdout_has("health");
}

#[test]
fn version_names_the_binary() {
    Command::cargo_bin("pw")
        .unwrap()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("pw "));
}

#[test]
fn run_help_documents_parameters() {
    let temp = Project::empty();
    temp.pw()
        .args(&["run", "--help"])
        .passes()
        .stdout_has("--param")
        .stdout_has("--trigger");
}

#[test]
fn completions_are_generated() {
    let temp = Project::empty();
    temp.pw()
        .args(&["completions", "bash"])
        .passes()
        .stdout_has("pw");
}
