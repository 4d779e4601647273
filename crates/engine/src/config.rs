// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine and backend configuration
//!
//! ```toml
//! [engine]
//! max_workers = 8
//! poll_interval = "1s"
//! state_dir = "/var/lib/pipewright"
//!
//! [backends.gitlab]
//! project = "group/app"
//! token_env = "GITLAB_TOKEN"
//! ```

use pw_adapters::{
    AdapterRegistry, ExecutorRegistry, GithubAdapter, GithubConfig, GitlabAdapter, GitlabConfig,
    HttpTransport, JenkinsAdapter, JenkinsConfig, LocalAdapter, TracedBackendAdapter, Transport,
};
use pw_core::AdapterError;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Name of the write-ahead log inside `state_dir`
pub const WAL_FILE: &str = "executions.wal";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
    #[error("backend setup failed: {0}")]
    Adapter(#[from] AdapterError),
}

/// Top-level config file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub engine: EngineConfig,
    pub backends: BackendsConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Steps running at once, across all executions
    pub max_workers: usize,
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    /// Applied to steps that set no timeout of their own
    #[serde(with = "humantime_serde")]
    pub default_step_timeout: Duration,
    /// How long a cancel request may take before the attempt is recorded anyway
    #[serde(with = "humantime_serde")]
    pub cancel_grace: Duration,
    /// Upper bound on any retry delay
    #[serde(with = "humantime_serde")]
    pub max_backoff: Duration,
    #[serde(with = "humantime_serde")]
    pub http_timeout: Duration,
    /// Where the WAL lives; None keeps state in memory
    pub state_dir: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_workers: 8,
            poll_interval: Duration::from_secs(1),
            default_step_timeout: Duration::from_secs(60 * 60),
            cancel_grace: Duration::from_secs(10),
            max_backoff: Duration::from_secs(5 * 60),
            http_timeout: Duration::from_secs(30),
            state_dir: None,
        }
    }
}

impl EngineConfig {
    pub fn wal_path(&self) -> Option<PathBuf> {
        self.state_dir.as_ref().map(|dir| dir.join(WAL_FILE))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_workers == 0 {
            return Err(ConfigError::Invalid("max_workers must be at least 1".into()));
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::Invalid("poll_interval must be positive".into()));
        }
        if self.default_step_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "default_step_timeout must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Remote backends; a missing section leaves that backend unconfigured
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BackendsConfig {
    pub jenkins: Option<JenkinsConfig>,
    pub gitlab: Option<GitlabConfig>,
    pub github: Option<GithubConfig>,
}

impl BackendsConfig {
    /// Build the adapter registry: local always, remotes as configured
    pub fn build_registry(
        &self,
        executors: ExecutorRegistry,
        http_timeout: Duration,
    ) -> Result<AdapterRegistry, ConfigError> {
        let mut registry = AdapterRegistry::new();
        registry.register(TracedBackendAdapter::new(LocalAdapter::new(executors)));

        if self.jenkins.is_none() && self.gitlab.is_none() && self.github.is_none() {
            return Ok(registry);
        }

        let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new(http_timeout)?);
        if let Some(config) = &self.jenkins {
            let adapter = JenkinsAdapter::new(config.clone(), Arc::clone(&transport))?;
            registry.register(TracedBackendAdapter::new(adapter));
        }
        if let Some(config) = &self.gitlab {
            let adapter = GitlabAdapter::new(config.clone(), Arc::clone(&transport))?;
            registry.register(TracedBackendAdapter::new(adapter));
        }
        if let Some(config) = &self.github {
            let adapter = GithubAdapter::new(config.clone(), Arc::clone(&transport))?;
            registry.register(TracedBackendAdapter::new(adapter));
        }
        Ok(registry)
    }
}

impl Config {
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.engine.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Load the first config that exists: `explicit`, `./pw.toml`, then the
    /// user config directory. Defaults when none is found.
    pub fn discover(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        for path in Self::search_paths() {
            if path.is_file() {
                tracing::debug!(path = %path.display(), "loading config");
                return Self::load(&path);
            }
        }
        Ok(Self::default())
    }

    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("pw.toml")];
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("pipewright").join("config.toml"));
        }
        paths
    }

    /// Apply `PW_*` overrides from the process environment
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(value) = lookup("PW_MAX_WORKERS") {
            self.engine.max_workers = value.trim().parse().map_err(|_| {
                ConfigError::Invalid(format!("PW_MAX_WORKERS is not a number: {}", value))
            })?;
        }
        if let Some(value) = lookup("PW_STATE_DIR") {
            self.engine.state_dir = Some(PathBuf::from(value));
        }
        self.engine.validate()
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
