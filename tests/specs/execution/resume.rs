//! `pw resume` specs

use crate::prelude::*;

/// Stage 2 fails until a `fixed` file exists
const CI: &str = r#"
[pipeline]
name = "ci"

[[step]]
id = "build"
kind = "shell"
stage = 1
params = { command = "echo build >> out.log" }

[[step]]
id = "test"
kind = "shell"
stage = 2
params = { command = "test -f fixed && echo test >> out.log" }
"#;

fn failed_run(temp: &Project) -> String {
    temp.file("ci.toml", CI);
    let run = temp.pw().args(&["run", "ci.toml"]).fails();
    started_id(&run.stdout())
}

#[test]
fn resume_skips_stages_that_passed() {
    let temp = Project::configured();
    let id = failed_run(&temp);
    temp.file("fixed", "");

    temp.pw()
        .args(&["resume", &id, "--pipeline", "ci.toml"])
        .passes()
        .stdout_has(&format!("Resuming {} as", id))
        .stdout_has("from stage 2")
        .stdout_has("success");

    assert_eq!(temp.read("out.log"), "build\ntest\n");
    temp.pw()
        .args(&["status", &id])
        .passes()
        .stdout_has("Status: failed");
}

#[test]
fn successful_execution_cannot_be_resumed() {
    let temp = Project::configured();
    let id = failed_run(&temp);
    temp.file("fixed", "");
    temp.pw()
        .args(&["resume", &id, "--pipeline", "ci.toml"])
        .passes();

    let listed = temp.pw().args(&["status", "--output", "json"]).passes();
    let executions: serde_json::Value = serde_json::from_str(&listed.stdout()).unwrap();
    let resumed = executions
        .as_array()
        .unwrap()
        .iter()
        .find(|e| e["resumed_from"] == id.as_str())
        .unwrap()["id"]
        .as_str()
        .unwrap()
        .to_string();

    temp.pw()
        .args(&["resume", &resumed, "--pipeline", "ci.toml"])
        .fails()
        .stderr_has("cannot be resumed");
}

#[test]
fn resume_checks_the_pipeline_name() {
    let temp = Project::configured();
    let id = failed_run(&temp);
    temp.file("other.toml", &CI.replace("name = \"ci\"", "name = \"other\""));

    temp.pw()
        .args(&["resume", &id, "--pipeline", "other.toml"])
        .fails()
        .stderr_has("definition other does not match execution pipeline ci");
}

#[test]
fn resume_needs_recorded_state() {
    let temp = Project::empty();
    temp.file("ci.toml", CI);
    temp.pw()
        .args(&["resume", "abc", "--pipeline", "ci.toml"])
        .fails()
        .stderr_has("`pw resume` needs a state directory");
}
