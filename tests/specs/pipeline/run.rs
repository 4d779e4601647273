//! `pw run` specs

use crate::prelude::*;

fn step(id: &str, stage: u32, command: &str) -> String {
    format!(
        "\n[[step]]\nid = \"{}\"\nkind = \"shell\"\nstage = {}\nparams = {{ command = \"{}\" }}\n",
        id, stage, command
    )
}

#[test]
fn stages_run_in_order() {
    let temp = Project::configured();
    let mut pipeline = "[pipeline]\nname = \"ci\"\n".to_string();
    pipeline.push_str(&step("build", 1, "echo build >> out.log"));
    pipeline.push_str(&step("test", 2, "echo test >> out.log"));
    pipeline.push_str(&step("package", 3, "echo package >> out.log"));
    temp.file("ci.toml", &pipeline);

    temp.pw()
        .args(&["run", "ci.toml"])
        .passes()
        .stdout_has("Started ci (")
        .stdout_has("stage 1")
        .stdout_has("stage 3")
        .stdout_has("success");

    assert_eq!(temp.read("out.log"), "build\ntest\npackage\n");
}

#[test]
fn runs_without_any_config() {
    let temp = Project::empty();
    temp.file(
        "ci.toml",
        &format!("[pipeline]\nname = \"ci\"\n{}", step("only", 1, "true")),
    );
    temp.pw().args(&["run", "ci.toml"]).passes();
}

#[test]
fn group_failure_stops_later_stages() {
    let temp = Project::configured();
    let mut pipeline = r#"
[pipeline]
name = "ci"

[[group]]
id = "checks"
sync_policy = "wait_all"
"#
    .to_string();
    pipeline.push_str(&step("checkout", 1, "true"));
    pipeline.push_str(&step("a", 2, "true").replace("stage = 2", "stage = 2\ngroup = \"checks\""));
    pipeline.push_str(&step("b", 2, "exit 3").replace("stage = 2", "stage = 2\ngroup = \"checks\""));
    pipeline.push_str(&step("deploy", 3, "touch deployed"));
    temp.file("ci.toml", &pipeline);

    temp.pw()
        .args(&["run", "ci.toml"])
        .fails()
        .stdout_has("failed")
        .stdout_has("stage 2: group checks failed (steps: b)")
        .stdout_has("pw resume");

    assert!(!temp.path().join("deployed").exists());
}

#[test]
fn wait_any_group_continues_after_first_success() {
    let temp = Project::configured();
    let mut pipeline = r#"
[pipeline]
name = "ci"

[[group]]
id = "mirrors"
sync_policy = "wait_any"
"#
    .to_string();
    pipeline.push_str(&step("slow", 1, "sleep 30").replace("stage = 1", "stage = 1\ngroup = \"mirrors\""));
    pipeline.push_str(&step("fast", 1, "true").replace("stage = 1", "stage = 1\ngroup = \"mirrors\""));
    pipeline.push_str(&step("after", 2, "touch after"));
    temp.file("ci.toml", &pipeline);

    let started = std::time::Instant::now();
    temp.pw().args(&["run", "ci.toml"]).passes();

    assert!(temp.path().join("after").exists());
    assert!(started.elapsed() < std::time::Duration::from_secs(20));
}

#[test]
fn failed_attempts_are_retried() {
    let temp = Project::configured();
    temp.file(
        "ci.toml",
        r#"
[pipeline]
name = "ci"

[[step]]
id = "flaky"
kind = "shell"
stage = 1
params = { command = "test -f marker || { touch marker; exit 1; }" }
retry = { max_retries = 2, delay = "10ms" }
"#,
    );

    temp.pw()
        .args(&["run", "ci.toml"])
        .passes()
        .stdout_has("(attempt 2)")
        .stdout_lacks("(attempt 3)");
}

#[test]
fn parameters_are_rendered_into_commands() {
    let temp = Project::configured();
    temp.file(
        "ci.toml",
        r#"
[pipeline]
name = "ci"
parameters = { who = "nobody" }

[[step]]
id = "greet"
kind = "shell"
stage = 1
params = { command = "echo hello {{ params.who }}" }
"#,
    );

    temp.pw()
        .args(&["run", "ci.toml", "--param", "who=world", "--logs"])
        .passes()
        .stdout_has("greet | hello world");
}

#[test]
fn false_condition_skips_the_step() {
    let temp = Project::configured();
    temp.file(
        "ci.toml",
        r#"
[pipeline]
name = "ci"
parameters = { deploy = "no" }

[[step]]
id = "deploy"
kind = "shell"
stage = 1
if = "params.deploy == 'yes'"
params = { command = "touch deployed" }
"#,
    );

    temp.pw().args(&["run", "ci.toml"]).passes().stdout_has("skipped");
    assert!(!temp.path().join("deployed").exists());
}

#[test]
fn best_effort_failure_does_not_fail_the_run() {
    let temp = Project::configured();
    temp.file(
        "ci.toml",
        r#"
[pipeline]
name = "ci"

[[step]]
id = "audit"
kind = "shell"
stage = 1
allow_failure = true
params = { command = "exit 1" }

[[step]]
id = "build"
kind = "shell"
stage = 2
params = { command = "true" }
"#,
    );

    temp.pw().args(&["run", "ci.toml"]).passes().stdout_has("failed");
}

#[test]
fn step_timeout_fails_the_run() {
    let temp = Project::configured();
    temp.file(
        "ci.toml",
        r#"
[pipeline]
name = "ci"

[[step]]
id = "hang"
kind = "shell"
stage = 1
timeout = "300ms"
params = { command = "sleep 30" }
"#,
    );

    let started = std::time::Instant::now();
    temp.pw()
        .args(&["run", "ci.toml"])
        .fails()
        .stdout_has("timeout");
    assert!(started.elapsed() < std::time::Duration::from_secs(20));
}

#[test]
fn trigger_kinds_are_enforced() {
    let temp = Project::configured();
    temp.file(
        "ci.toml",
        &format!(
            "[pipeline]\nname = \"ci\"\ntriggers = [\"push\"]\n{}",
            step("build", 1, "true")
        ),
    );

    temp.pw()
        .args(&["run", "ci.toml"])
        .fails()
        .stderr_has("pipeline ci does not accept Manual triggers");
    temp.pw()
        .args(&["run", "ci.toml", "--trigger", "push"])
        .passes();
}

#[test]
fn json_output_is_one_document_per_line() {
    let temp = Project::configured();
    temp.file(
        "ci.toml",
        &format!("[pipeline]\nname = \"ci\"\n{}", step("build", 1, "true")),
    );

    let run = temp
        .pw()
        .args(&["run", "ci.toml", "--output", "json"])
        .passes();

    let lines: Vec<serde_json::Value> = run
        .stdout()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert!(lines.iter().any(|l| l["type"] == "stage_started"));
    let last = lines.last().unwrap();
    assert_eq!(last["execution"]["status"], "success");
    assert_eq!(last["attempts"][0]["step_id"], "build");
}
