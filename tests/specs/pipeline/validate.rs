//! `pw validate` specs

use crate::prelude::*;

const RELEASE: &str = r#"
[pipeline]
name = "release"

[[group]]
id = "checks"
sync_policy = "wait_all"

[[step]]
id = "checkout"
kind = "shell"
stage = 1
params = { command = "true" }

[[step]]
id = "lint"
kind = "shell"
stage = 2
group = "checks"
params = { command = "true" }

[[step]]
id = "unit"
kind = "test"
stage = 2
group = "checks"
params = { command = "true" }

[[step]]
id = "announce"
kind = "notify"
stage = 3
depends_on = ["unit"]
params = { message = "released" }
"#;

#[test]
fn valid_pipeline_prints_its_plan() {
    let temp = Project::empty();
    temp.file("release.toml", RELEASE);
    temp.pw().args(&["validate", "release.toml"]).passes().stdout_eq(
        "Pipeline release: 3 stages, 4 steps\n  stage 1 (local)\n    checkout\n  stage 2 (local)\n    [checks wait_all] lint, unit\n  stage 3 (local)\n    announce\n",
    );
}

#[test]
fn dependency_on_a_later_stage_is_rejected() {
    let temp = Project::empty();
    temp.file(
        "bad.toml",
        r#"
[pipeline]
name = "bad"

[[step]]
id = "build"
kind = "shell"
stage = 1
depends_on = ["test"]
params = { command = "true" }

[[step]]
id = "test"
kind = "shell"
stage = 2
params = { command = "true" }
"#,
    );
    temp.pw()
        .args(&["validate", "bad.toml"])
        .fails()
        .stderr_has("step build depends on test, which is not in an earlier stage");
}

#[test]
fn group_spanning_stages_is_rejected() {
    let temp = Project::empty();
    temp.file(
        "bad.toml",
        r#"
[pipeline]
name = "bad"

[[group]]
id = "g"
sync_policy = "wait_any"

[[step]]
id = "a"
kind = "shell"
stage = 1
group = "g"
params = { command = "true" }

[[step]]
id = "b"
kind = "shell"
stage = 2
group = "g"
params = { command = "true" }
"#,
    );
    temp.pw()
        .args(&["validate", "bad.toml"])
        .fails()
        .stderr_has("parallel group g spans stages 1 and 2");
}

#[test]
fn missing_required_parameter_is_rejected() {
    let temp = Project::empty();
    temp.file(
        "bad.toml",
        "[pipeline]\nname = \"bad\"\n\n[[step]]\nid = \"build\"\nkind = \"shell\"\nstage = 1\n",
    );
    temp.pw()
        .args(&["validate", "bad.toml"])
        .fails()
        .stderr_has("step build (shell) is missing required parameter `command`");
}
