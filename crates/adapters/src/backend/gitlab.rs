// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! GitLab-CI-style backend
//!
//! Renders `.gitlab-ci.yml` with one job per step. Each launch creates a
//! pipeline with `PW_STEP_ID` set, and the job rules let only that step's
//! job run. Handles are `<pipeline id>/<step id>`.

use super::{
    check_artifact, param_var, plan, resolve_secret, tail_from, BackendAdapter, LaunchRequest,
    LogChunk, ProviderArtifact, RemoteStatus,
};
use crate::http::{join_url, Auth, HttpRequest, Transport};
use crate::script::{overridable, shell_script, SCRIPT_VAR};
use async_trait::async_trait;
use pw_core::{AdapterError, Backend, ExecutionHandle, PipelineDefinition, Status};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Top-level keys GitLab does not accept as job names
const RESERVED_JOB_NAMES: &[&str] = &[
    "image",
    "services",
    "stages",
    "types",
    "before_script",
    "after_script",
    "variables",
    "cache",
    "include",
    "default",
    "workflow",
];

fn default_url() -> String {
    "https://gitlab.com".to_string()
}

fn default_ref() -> String {
    "main".to_string()
}

/// Connection settings for a GitLab project
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GitlabConfig {
    #[serde(default = "default_url")]
    pub url: String,
    /// Numeric id or `group/project` path
    pub project: String,
    #[serde(rename = "ref", default = "default_ref")]
    pub git_ref: String,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub token_env: Option<String>,
}

#[derive(Debug, Serialize)]
struct CiFile {
    stages: Vec<String>,
    variables: BTreeMap<String, String>,
    #[serde(flatten)]
    jobs: BTreeMap<String, CiJob>,
}

#[derive(Debug, Serialize)]
struct CiJob {
    stage: String,
    script: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    timeout: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    allow_failure: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    needs: Vec<CiNeed>,
    rules: Vec<CiRule>,
}

#[derive(Debug, Serialize)]
struct CiNeed {
    job: String,
    /// The needed job is absent when another step was selected
    optional: bool,
}

#[derive(Debug, Serialize)]
struct CiRule {
    #[serde(rename = "if")]
    condition: String,
}

#[derive(Debug, Deserialize)]
struct CreatedPipeline {
    id: u64,
}

#[derive(Debug, Deserialize)]
struct PipelineState {
    status: String,
}

#[derive(Debug, Deserialize)]
struct JobState {
    id: u64,
    name: String,
    status: String,
}

fn stage_name(index: u32) -> String {
    format!("stage-{}", index)
}

/// Render `.gitlab-ci.yml`
pub(crate) fn render_gitlab_ci(definition: &PipelineDefinition) -> Result<String, AdapterError> {
    let stages = plan(definition)?;

    let mut variables = BTreeMap::from([
        ("PW_STEP_ID".to_string(), "all".to_string()),
        ("PW_EXECUTION_ID".to_string(), String::new()),
        ("PW_ATTEMPT".to_string(), "1".to_string()),
        (SCRIPT_VAR.to_string(), String::new()),
    ]);
    for (key, default) in &definition.parameters {
        variables.insert(param_var(key), default.clone());
    }
    variables.extend(definition.environment.clone());

    let mut jobs = BTreeMap::new();
    for stage in &stages {
        for step in stage.steps() {
            if RESERVED_JOB_NAMES.contains(&step.id.as_str()) || step.id.starts_with('.') {
                return Err(AdapterError::Unsupported(format!(
                    "step id `{}` is not a valid GitLab job name",
                    step.id
                )));
            }
            let job = CiJob {
                stage: stage_name(stage.index),
                script: vec![overridable(&shell_script(&step.kind, &step.parameters)?)],
                timeout: step
                    .timeout
                    .map(|t| format!("{} minutes", t.as_secs().div_ceil(60).max(1))),
                allow_failure: step.allow_failure,
                needs: step
                    .depends_on
                    .iter()
                    .map(|job| CiNeed {
                        job: job.clone(),
                        optional: true,
                    })
                    .collect(),
                rules: vec![CiRule {
                    condition: format!(
                        "$PW_STEP_ID == \"all\" || $PW_STEP_ID == \"{}\"",
                        step.id
                    ),
                }],
            };
            jobs.insert(step.id.clone(), job);
        }
    }

    let file = CiFile {
        stages: stages.iter().map(|s| stage_name(s.index)).collect(),
        variables,
        jobs,
    };
    let yaml = serde_yaml::to_string(&file)
        .map_err(|e| AdapterError::Protocol(format!("cannot render YAML: {}", e)))?;
    Ok(format!(
        "# Generated by pipewright from pipeline {}\n{}",
        definition.name, yaml
    ))
}

fn pipeline_status(status: &str) -> RemoteStatus {
    match status {
        "created" | "waiting_for_resource" | "preparing" | "pending" | "scheduled" | "manual" => {
            RemoteStatus::new(Status::Pending).with_detail(status)
        }
        "running" => RemoteStatus::new(Status::Running),
        "success" => RemoteStatus::new(Status::Success),
        "failed" => RemoteStatus::new(Status::Failed).with_detail("pipeline failed"),
        "canceled" | "canceling" => RemoteStatus::new(Status::Cancelled).with_detail(status),
        "skipped" => RemoteStatus::new(Status::Skipped).with_detail("pipeline skipped"),
        other => RemoteStatus::new(Status::Failed).with_detail(format!("unknown pipeline status {}", other)),
    }
}

fn job_finished(status: &str) -> bool {
    matches!(status, "success" | "failed" | "canceled" | "skipped")
}

fn split_handle(handle: &ExecutionHandle) -> Result<(u64, &str), AdapterError> {
    handle
        .as_str()
        .split_once('/')
        .and_then(|(id, step)| Some((id.parse().ok()?, step)))
        .ok_or_else(|| AdapterError::UnknownHandle(handle.to_string()))
}

pub struct GitlabAdapter {
    config: GitlabConfig,
    transport: Arc<dyn Transport>,
    auth: Option<Auth>,
}

impl GitlabAdapter {
    pub fn new(config: GitlabConfig, transport: Arc<dyn Transport>) -> Result<Self, AdapterError> {
        let auth = resolve_secret(&config.token, &config.token_env)?.map(|value| Auth::Header {
            name: "PRIVATE-TOKEN".to_string(),
            value,
        });
        Ok(Self {
            config,
            transport,
            auth,
        })
    }

    fn api(&self, path: &str) -> String {
        join_url(&self.config.url, &format!("api/v4/{}", path))
    }

    fn project_api(&self, path: &str) -> String {
        let project = self.config.project.replace('/', "%2F");
        self.api(&format!("projects/{}/{}", project, path))
    }

    fn get(&self, url: String) -> HttpRequest {
        HttpRequest::get(url).auth(self.auth.clone())
    }

    fn post(&self, url: String) -> HttpRequest {
        HttpRequest::post(url).auth(self.auth.clone())
    }
}

#[async_trait]
impl BackendAdapter for GitlabAdapter {
    fn backend(&self) -> Backend {
        Backend::Gitlab
    }

    fn prepare(&self, definition: &PipelineDefinition) -> Result<ProviderArtifact, AdapterError> {
        Ok(ProviderArtifact {
            backend: Backend::Gitlab,
            file_name: ".gitlab-ci.yml".to_string(),
            content: render_gitlab_ci(definition)?,
        })
    }

    async fn launch(
        &self,
        artifact: &ProviderArtifact,
        request: &LaunchRequest,
    ) -> Result<ExecutionHandle, AdapterError> {
        check_artifact(Backend::Gitlab, artifact)?;

        let script = request.script()?;
        let mut variables = vec![
            json!({"key": "PW_STEP_ID", "value": request.step.id}),
            json!({"key": "PW_EXECUTION_ID", "value": request.execution_id.as_str()}),
            json!({"key": "PW_ATTEMPT", "value": request.attempt.to_string()}),
            json!({"key": SCRIPT_VAR, "value": script}),
        ];
        for (key, value) in &request.parameters {
            variables.push(json!({"key": param_var(key), "value": value}));
        }
        let body = json!({"ref": self.config.git_ref, "variables": variables});

        let created: CreatedPipeline = self
            .transport
            .send(self.post(self.project_api("pipeline")).json(body))
            .await?
            .check()?
            .json()?;
        Ok(ExecutionHandle::from(format!("{}/{}", created.id, request.step.id)))
    }

    async fn poll_status(&self, handle: &ExecutionHandle) -> Result<RemoteStatus, AdapterError> {
        let (pipeline, _) = split_handle(handle)?;
        let url = self.project_api(&format!("pipelines/{}", pipeline));
        let state: PipelineState = self.transport.send(self.get(url)).await?.check()?.json()?;
        Ok(pipeline_status(&state.status))
    }

    async fn fetch_logs(&self, handle: &ExecutionHandle, cursor: u64) -> Result<LogChunk, AdapterError> {
        let (pipeline, step_id) = split_handle(handle)?;
        let url = self.project_api(&format!("pipelines/{}/jobs", pipeline));
        let jobs: Vec<JobState> = self.transport.send(self.get(url)).await?.check()?.json()?;

        let Some(job) = jobs.into_iter().find(|j| j.name == step_id) else {
            return Ok(LogChunk {
                text: String::new(),
                next_cursor: cursor,
                has_more: true,
            });
        };

        let url = self.project_api(&format!("jobs/{}/trace", job.id));
        let trace = self.transport.send(self.get(url)).await?.check()?;
        let (text, next_cursor) = tail_from(&trace.body, cursor);
        Ok(LogChunk {
            text: text.to_string(),
            next_cursor,
            has_more: !job_finished(&job.status),
        })
    }

    async fn cancel(&self, handle: &ExecutionHandle) -> Result<bool, AdapterError> {
        let (pipeline, _) = split_handle(handle)?;
        let url = self.project_api(&format!("pipelines/{}/cancel", pipeline));
        let response = self.transport.send(self.post(url)).await?;
        Ok(response.check().is_ok())
    }

    async fn health_check(&self) -> bool {
        match self.transport.send(self.get(self.api("user"))).await {
            Ok(response) => response.is_success(),
            Err(e) => {
                tracing::warn!(error = %e, "gitlab health check failed");
                false
            }
        }
    }
}

#[cfg(test)]
#[path = "gitlab_tests.rs"]
mod tests;
