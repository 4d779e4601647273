//! `pw status` and `pw logs` specs

use crate::prelude::*;

const CI: &str = r#"
[pipeline]
name = "ci"

[[step]]
id = "build"
kind = "shell"
stage = 1
params = { command = "echo compiled" }

[[step]]
id = "test"
kind = "shell"
stage = 2
params = { command = "echo all passed" }
"#;

fn run_ci(temp: &Project) -> String {
    temp.file("ci.toml", CI);
    let run = temp.pw().args(&["run", "ci.toml"]).passes();
    started_id(&run.stdout())
}

#[test]
fn empty_state_lists_nothing() {
    let temp = Project::configured();
    temp.pw().args(&["status"]).passes().stdout_eq("No executions\n");
}

#[test]
fn finished_runs_are_listed() {
    let temp = Project::configured();
    let id = run_ci(&temp);

    temp.pw()
        .args(&["status"])
        .passes()
        .stdout_has(&id[..8])
        .stdout_has("ci")
        .stdout_has("success");
    assert!(temp.state_path().join("executions.wal").exists());
}

#[test]
fn status_shows_each_step() {
    let temp = Project::configured();
    let id = run_ci(&temp);

    temp.pw()
        .args(&["status", &id[..8]])
        .passes()
        .stdout_has(&format!("Execution: {}", id))
        .stdout_has("Status: success")
        .stdout_has("build")
        .stdout_has("test");
}

#[test]
fn status_json_is_the_full_snapshot() {
    let temp = Project::configured();
    let id = run_ci(&temp);

    let run = temp
        .pw()
        .args(&["status", &id, "--output", "json"])
        .passes();
    let snapshot: serde_json::Value = serde_json::from_str(&run.stdout()).unwrap();

    assert_eq!(snapshot["execution"]["id"], id.as_str());
    assert_eq!(snapshot["attempts"].as_array().unwrap().len(), 2);
}

#[test]
fn logs_are_kept_per_step() {
    let temp = Project::configured();
    let id = run_ci(&temp);

    temp.pw()
        .args(&["logs", &id])
        .passes()
        .stdout_eq("compiled\nall passed\n");
    temp.pw()
        .args(&["logs", &id, "--step", "test"])
        .passes()
        .stdout_eq("all passed\n");
}

#[test]
fn unknown_execution_is_reported() {
    let temp = Project::configured();
    temp.pw()
        .args(&["status", "does-not-exist"])
        .fails()
        .stderr_has("Execution 'does-not-exist' not found");
}
