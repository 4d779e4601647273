//! Error reporting

use crate::prelude::*;

#[test]
fn missing_pipeline_file_is_reported() {
    let temp = Project::empty();
    temp.pw()
        .args(&["validate", "nope.toml"])
        .fails()
        .stderr_has("cannot load pipeline nope.toml");
}

#[test]
fn invalid_config_is_reported() {
    let temp = Project::empty();
    temp.file("pw.toml", "[engine]\nmax_workers = 0\n");
    temp.pw()
        .args(&["health"])
        .fails()
        .stderr_has("max_workers must be at least 1");
}

#[test]
fn unknown_config_keys_are_rejected() {
    let temp = Project::empty();
    temp.file("pw.toml", "[engine]\nworkers = 3\n");
    temp.pw()
        .args(&["health"])
        .fails()
        .stderr_has("cannot load config");
}

#[test]
fn bad_environment_override_is_reported() {
    let temp = Project::empty();
    temp.pw()
        .env("PW_MAX_WORKERS", "many")
        .args(&["health"])
        .fails()
        .stderr_has("PW_MAX_WORKERS is not a number");
}

#[test]
fn explicit_config_must_exist() {
    let temp = Project::empty();
    temp.pw()
        .args(&["--config", "missing.toml", "health"])
        .fails()
        .stderr_has("missing.toml");
}

#[test]
fn status_needs_a_state_directory() {
    let temp = Project::empty();
    temp.pw()
        .args(&["status"])
        .fails()
        .stderr_has("`pw status` needs a state directory")
        .stderr_has("PW_STATE_DIR");
}

#[test]
fn unknown_backend_is_a_usage_error() {
    let temp = Project::empty();
    temp.file(
        "ci.toml",
        "[pipeline]\nname = \"ci\"\n\n[[step]]\nid = \"a\"\nkind = \"shell\"\nstage = 1\nparams = { command = \"true\" }\n",
    );
    temp.pw()
        .args(&["render", "ci.toml", "--backend", "travis"])
        .fails()
        .stderr_has("unknown backend `travis`");
}
