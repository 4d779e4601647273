// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Backend adapters: one CI substrate each
//!
//! The engine is written against [`BackendAdapter`] only. Handles returned
//! by [`BackendAdapter::launch`] are opaque outside the adapter that made
//! them.

mod github;
mod gitlab;
mod jenkins;
mod local;

#[cfg(any(test, feature = "test-support"))]
mod fake;

pub use github::{GithubAdapter, GithubConfig};
pub use gitlab::{GitlabAdapter, GitlabConfig};
pub use jenkins::{JenkinsAdapter, JenkinsConfig};
pub use local::LocalAdapter;

#[cfg(any(test, feature = "test-support"))]
pub use fake::{BackendCall, FakeBackendAdapter, FakeRun};

use crate::script::shell_script;
use async_trait::async_trait;
use pw_core::{
    resolve, AdapterError, Backend, ExecutionHandle, ExecutionId, PipelineDefinition, Stage,
    Status, StepSpec,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Backend-native rendering of a pipeline, produced by `prepare`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderArtifact {
    pub backend: Backend,
    /// Conventional file name (`Jenkinsfile`, `.gitlab-ci.yml`, ...)
    pub file_name: String,
    pub content: String,
}

/// One step attempt handed to a backend
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchRequest {
    pub execution_id: ExecutionId,
    /// Parameters already rendered against the run context
    pub step: StepSpec,
    pub attempt: u32,
    pub environment: BTreeMap<String, String>,
    /// Resolved run parameters
    pub parameters: BTreeMap<String, String>,
}

impl LaunchRequest {
    /// Environment for the step process: pipeline env plus `PW_*` variables
    pub fn step_env(&self) -> BTreeMap<String, String> {
        let mut env = self.environment.clone();
        env.insert("PW_EXECUTION_ID".into(), self.execution_id.to_string());
        env.insert("PW_STEP_ID".into(), self.step.id.clone());
        env.insert("PW_ATTEMPT".into(), self.attempt.to_string());
        for (key, value) in &self.parameters {
            env.insert(param_var(key), value.clone());
        }
        env
    }

    /// Shell script of the step with its parameters as rendered for this attempt
    pub fn script(&self) -> Result<String, AdapterError> {
        Ok(shell_script(&self.step.kind, &self.step.parameters)?)
    }

    /// Token naming this attempt on a remote system
    pub fn run_token(&self) -> String {
        format!("{}-{}-{}", self.execution_id, self.step.id, self.attempt)
    }
}

/// `version` -> `PW_PARAM_VERSION`
pub fn param_var(key: &str) -> String {
    let name: String = key
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("PW_PARAM_{}", name)
}

/// Non-blocking status snapshot of a launched attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteStatus {
    pub status: Status,
    /// Backend's own wording, for error summaries
    pub detail: Option<String>,
    pub output: Option<String>,
    pub exit_code: Option<i32>,
}

impl RemoteStatus {
    pub fn new(status: Status) -> Self {
        Self {
            status,
            detail: None,
            output: None,
            exit_code: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Incremental log read
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogChunk {
    pub text: String,
    pub next_cursor: u64,
    /// False once the attempt is finished and every byte was returned
    pub has_more: bool,
}

/// Capability contract of a CI backend
#[async_trait]
pub trait BackendAdapter: Send + Sync + 'static {
    fn backend(&self) -> Backend;

    fn name(&self) -> &str {
        self.backend().as_str()
    }

    /// Render the pipeline into the backend's native format
    fn prepare(&self, definition: &PipelineDefinition) -> Result<ProviderArtifact, AdapterError>;

    /// Start one step attempt
    async fn launch(
        &self,
        artifact: &ProviderArtifact,
        request: &LaunchRequest,
    ) -> Result<ExecutionHandle, AdapterError>;

    /// Check progress without waiting
    async fn poll_status(&self, handle: &ExecutionHandle) -> Result<RemoteStatus, AdapterError>;

    async fn fetch_logs(&self, handle: &ExecutionHandle, cursor: u64) -> Result<LogChunk, AdapterError>;

    /// Best-effort stop; true when the backend accepted the request
    async fn cancel(&self, handle: &ExecutionHandle) -> Result<bool, AdapterError>;

    async fn health_check(&self) -> bool;
}

/// Reject artifacts rendered for another backend
pub(crate) fn check_artifact(backend: Backend, artifact: &ProviderArtifact) -> Result<(), AdapterError> {
    if artifact.backend == backend {
        Ok(())
    } else {
        Err(AdapterError::Unsupported(format!(
            "{} artifact cannot be launched on {}",
            artifact.backend, backend
        )))
    }
}

/// Stages for rendering; remote formats need the plan, not the flat list
pub(crate) fn plan(definition: &PipelineDefinition) -> Result<Vec<Stage>, AdapterError> {
    resolve(&definition.steps, &definition.groups)
        .map_err(|e| AdapterError::Unsupported(format!("cannot render pipeline: {}", e)))
}

/// Resolve a credential from an inline value or an environment variable
pub(crate) fn resolve_secret(
    inline: &Option<String>,
    env_var: &Option<String>,
) -> Result<Option<String>, AdapterError> {
    if let Some(value) = inline {
        return Ok(Some(value.clone()));
    }
    match env_var {
        Some(name) => std::env::var(name).map(Some).map_err(|_| {
            AdapterError::AuthenticationFailed(format!("environment variable {} is not set", name))
        }),
        None => Ok(None),
    }
}

/// Slice `text` from a byte cursor, snapping forward to a char boundary
pub(crate) fn tail_from(text: &str, cursor: u64) -> (&str, u64) {
    let mut start = usize::try_from(cursor).unwrap_or(usize::MAX).min(text.len());
    while !text.is_char_boundary(start) {
        start += 1;
    }
    (&text[start..], text.len() as u64)
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
