//! `pw render` specs

use crate::prelude::*;

const CI: &str = r#"
[pipeline]
name = "ci"

[[step]]
id = "build"
kind = "shell"
stage = 1
params = { command = "make" }

[[step]]
id = "test"
kind = "shell"
stage = 2
params = { command = "make test" }
"#;

#[test]
fn local_render_is_the_definition_snapshot() {
    let temp = Project::empty();
    temp.file("ci.toml", CI);
    temp.pw()
        .args(&["render", "ci.toml"])
        .passes()
        .stdout_has("\"name\": \"ci\"")
        .stdout_has("make test");
}

#[test]
fn jenkins_render_uses_configured_backend() {
    let temp = Project::empty();
    temp.file("ci.toml", CI);
    temp.file(
        "pw.toml",
        "[backends.jenkins]\nurl = \"http://127.0.0.1:9\"\njob = \"ci\"\ntoken = \"t\"\n",
    );
    temp.pw()
        .args(&["render", "ci.toml", "--backend", "jenkins"])
        .passes()
        .stdout_has("pipeline {")
        .stdout_has("stage('stage 1')")
        .stdout_has("stage('stage 2')");
}

#[test]
fn render_can_write_to_a_file() {
    let temp = Project::empty();
    temp.file("ci.toml", CI);
    temp.pw()
        .args(&["render", "ci.toml", "--out", "ci.json"])
        .passes()
        .stdout_has("Wrote ci.json (ci.json)");
    assert!(temp.read("ci.json").contains("\"steps\""));
}

#[test]
fn unconfigured_backend_suggests_a_config_section() {
    let temp = Project::empty();
    temp.file("ci.toml", CI);
    temp.pw()
        .args(&["render", "ci.toml", "--backend", "gitlab"])
        .fails()
        .stderr_has("No gitlab backend configured")
        .stderr_has("[backends.gitlab]");
}
