// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use pw_core::Backend;
use std::collections::HashMap;
use yare::parameterized;

#[test]
fn empty_config_uses_defaults() {
    let config = Config::from_toml("").unwrap();
    assert_eq!(config.engine, EngineConfig::default());
    assert!(config.backends.jenkins.is_none());
    assert!(config.engine.wal_path().is_none());
}

#[test]
fn durations_parse_as_humantime() {
    let config = Config::from_toml(
        r#"
[engine]
max_workers = 3
poll_interval = "250ms"
default_step_timeout = "15m"
cancel_grace = "2s"
max_backoff = "1m"
state_dir = "/tmp/pw-state"
"#,
    )
    .unwrap();

    assert_eq!(config.engine.max_workers, 3);
    assert_eq!(config.engine.poll_interval, Duration::from_millis(250));
    assert_eq!(config.engine.default_step_timeout, Duration::from_secs(900));
    assert_eq!(config.engine.cancel_grace, Duration::from_secs(2));
    assert_eq!(config.engine.max_backoff, Duration::from_secs(60));
    assert_eq!(
        config.engine.wal_path(),
        Some(PathBuf::from("/tmp/pw-state").join(WAL_FILE))
    );
}

#[test]
fn backend_sections_parse() {
    let config = Config::from_toml(
        r#"
[backends.jenkins]
url = "https://ci.example.com"
job = "team/app"
user = "bot"
token_env = "JENKINS_TOKEN"

[backends.gitlab]
project = "group/app"
ref = "release"

[backends.github]
repo = "acme/app"
"#,
    )
    .unwrap();

    let jenkins = config.backends.jenkins.unwrap();
    assert_eq!(jenkins.job, "team/app");
    assert_eq!(jenkins.token_env.as_deref(), Some("JENKINS_TOKEN"));
    let gitlab = config.backends.gitlab.unwrap();
    assert_eq!(gitlab.git_ref, "release");
    assert_eq!(config.backends.github.unwrap().repo, "acme/app");
}

#[parameterized(
    zero_workers = { "[engine]\nmax_workers = 0" },
    zero_poll = { "[engine]\npoll_interval = \"0s\"" },
    unknown_key = { "[engine]\nworkers = 4" },
    bad_duration = { "[engine]\ncancel_grace = \"soon\"" },
)]
fn invalid_configs_are_rejected(content: &str) {
    assert!(Config::from_toml(content).is_err());
}

#[test]
fn env_overrides_apply() {
    let vars: HashMap<&str, &str> = [("PW_MAX_WORKERS", "2"), ("PW_STATE_DIR", "/srv/pw")].into();
    let mut config = Config::default();
    config
        .apply_overrides(|key| vars.get(key).map(|v| v.to_string()))
        .unwrap();

    assert_eq!(config.engine.max_workers, 2);
    assert_eq!(config.engine.state_dir, Some(PathBuf::from("/srv/pw")));
}

#[test]
fn bad_env_override_is_an_error() {
    let mut config = Config::default();
    let err = config
        .apply_overrides(|key| (key == "PW_MAX_WORKERS").then(|| "many".to_string()))
        .unwrap_err();
    assert!(err.to_string().contains("PW_MAX_WORKERS"));
}

#[test]
fn load_reads_file_and_reports_missing_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pw.toml");
    std::fs::write(&path, "[engine]\nmax_workers = 5\n").unwrap();

    assert_eq!(Config::load(&path).unwrap().engine.max_workers, 5);
    assert_eq!(
        Config::discover(Some(&path)).unwrap().engine.max_workers,
        5
    );

    let missing = dir.path().join("nope.toml");
    assert!(matches!(
        Config::load(&missing),
        Err(ConfigError::Io { .. })
    ));
}

#[test]
fn registry_without_remotes_has_only_local() {
    let registry = BackendsConfig::default()
        .build_registry(ExecutorRegistry::with_builtins(), Duration::from_secs(5))
        .unwrap();
    assert_eq!(registry.backends(), vec![Backend::Local]);
}

#[test]
fn registry_includes_configured_remotes() {
    let config = Config::from_toml(
        r#"
[backends.gitlab]
project = "group/app"
token = "glpat-test"

[backends.github]
repo = "acme/app"
token = "ghp-test"
"#,
    )
    .unwrap();
    let registry = config
        .backends
        .build_registry(ExecutorRegistry::with_builtins(), Duration::from_secs(5))
        .unwrap();
    assert_eq!(
        registry.backends(),
        vec![Backend::Local, Backend::Gitlab, Backend::Github]
    );
}
