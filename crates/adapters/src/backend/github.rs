// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! GitHub-Actions-style backend
//!
//! Renders a `workflow_dispatch` workflow with one job per step. A dispatch
//! returns no run id, so each launch carries a unique `run_token` that the
//! workflow uses as its run name; the run is found by that title and the id
//! cached. Handles are the run token.

use super::{
    check_artifact, param_var, plan, resolve_secret, BackendAdapter, LaunchRequest, LogChunk,
    ProviderArtifact, RemoteStatus,
};
use crate::http::{join_url, Auth, HttpRequest, Transport};
use crate::script::{overridable, shell_script, SCRIPT_VAR};
use async_trait::async_trait;
use pw_core::{AdapterError, Backend, ExecutionHandle, PipelineDefinition, Status};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

fn default_api_url() -> String {
    "https://api.github.com".to_string()
}

fn default_workflow() -> String {
    "pipewright.yml".to_string()
}

fn default_ref() -> String {
    "main".to_string()
}

/// Connection settings for a GitHub repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GithubConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// `owner/name`
    pub repo: String,
    /// Workflow file name under `.github/workflows`
    #[serde(default = "default_workflow")]
    pub workflow: String,
    #[serde(rename = "ref", default = "default_ref")]
    pub git_ref: String,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub token_env: Option<String>,
}

#[derive(Debug, Serialize)]
struct Workflow {
    name: String,
    #[serde(rename = "run-name")]
    run_name: String,
    on: Triggers,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    env: BTreeMap<String, String>,
    jobs: BTreeMap<String, Job>,
}

#[derive(Debug, Serialize)]
struct Triggers {
    workflow_dispatch: Dispatch,
}

#[derive(Debug, Serialize)]
struct Dispatch {
    inputs: BTreeMap<String, Input>,
}

#[derive(Debug, Serialize)]
struct Input {
    description: String,
    required: bool,
    default: String,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Serialize)]
struct Job {
    name: String,
    #[serde(rename = "runs-on")]
    runs_on: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    needs: Vec<String>,
    #[serde(rename = "if")]
    condition: String,
    #[serde(rename = "timeout-minutes", skip_serializing_if = "Option::is_none")]
    timeout_minutes: Option<u64>,
    #[serde(rename = "continue-on-error", skip_serializing_if = "std::ops::Not::not")]
    continue_on_error: bool,
    env: BTreeMap<String, String>,
    steps: Vec<JobStep>,
}

#[derive(Debug, Serialize)]
struct JobStep {
    name: String,
    run: String,
}

#[derive(Debug, Clone, Deserialize)]
struct WorkflowRun {
    id: u64,
    #[serde(default)]
    display_title: String,
    status: String,
    #[serde(default)]
    conclusion: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RunList {
    workflow_runs: Vec<WorkflowRun>,
}

#[derive(Debug, Deserialize)]
struct JobList {
    jobs: Vec<RunJob>,
}

#[derive(Debug, Deserialize)]
struct RunJob {
    name: String,
    #[serde(default)]
    conclusion: Option<String>,
    #[serde(default)]
    steps: Vec<RunJobStep>,
}

#[derive(Debug, Deserialize)]
struct RunJobStep {
    name: String,
    #[serde(default)]
    conclusion: Option<String>,
}

/// Job ids may only hold `[A-Za-z0-9_-]` and must not start with a digit
fn job_id(step_id: &str) -> String {
    let mut id: String = step_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if !id.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_') {
        id.insert(0, '_');
    }
    id
}

fn input(description: &str, default: &str) -> Input {
    Input {
        description: description.to_string(),
        required: false,
        default: default.to_string(),
        kind: "string".to_string(),
    }
}

/// Render the dispatch workflow
pub(crate) fn render_workflow(definition: &PipelineDefinition) -> Result<String, AdapterError> {
    let stages = plan(definition)?;

    let ids: HashMap<&str, String> = definition
        .steps
        .iter()
        .map(|s| (s.id.as_str(), job_id(&s.id)))
        .collect();
    let mut seen: HashMap<&str, &str> = HashMap::new();
    for (step, id) in &ids {
        if let Some(other) = seen.insert(id.as_str(), *step) {
            return Err(AdapterError::Unsupported(format!(
                "steps `{}` and `{}` map to the same job id `{}`",
                other, step, id
            )));
        }
    }

    let mut jobs = BTreeMap::new();
    for step in stages.iter().flat_map(|s| s.steps()) {
        let mut env = BTreeMap::from([
            ("PW_STEP_ID".to_string(), step.id.clone()),
            ("PW_EXECUTION_ID".to_string(), "${{ inputs.execution_id }}".to_string()),
            ("PW_ATTEMPT".to_string(), "${{ inputs.attempt }}".to_string()),
            (SCRIPT_VAR.to_string(), "${{ inputs.script }}".to_string()),
        ]);
        for (key, default) in &definition.parameters {
            env.insert(
                param_var(key),
                format!(
                    "${{{{ fromJSON(inputs.params).{} || '{}' }}}}",
                    key,
                    default.replace('\'', "''")
                ),
            );
        }

        let job = Job {
            name: step.name.clone(),
            runs_on: step
                .param_str("runs_on")
                .unwrap_or("ubuntu-latest")
                .to_string(),
            needs: step
                .depends_on
                .iter()
                .filter_map(|d| ids.get(d.as_str()).cloned())
                .collect(),
            // !cancelled() keeps the job eligible when its needs were skipped
            condition: format!(
                "${{{{ !cancelled() && (inputs.step_id == 'all' || inputs.step_id == '{}') }}}}",
                step.id.replace('\'', "''")
            ),
            timeout_minutes: step.timeout.map(|t| t.as_secs().div_ceil(60).max(1)),
            continue_on_error: step.allow_failure,
            env,
            steps: vec![JobStep {
                name: step.id.clone(),
                run: overridable(&shell_script(&step.kind, &step.parameters)?),
            }],
        };
        let id = ids.get(step.id.as_str()).cloned().unwrap_or_else(|| job_id(&step.id));
        jobs.insert(id, job);
    }

    let inputs = BTreeMap::from([
        ("step_id".to_string(), input("Step to run", "all")),
        ("run_token".to_string(), input("Unique run name", "")),
        ("execution_id".to_string(), input("Pipewright execution", "")),
        ("attempt".to_string(), input("Attempt number", "1")),
        ("params".to_string(), input("Run parameters as JSON", "{}")),
        ("script".to_string(), input("Rendered step script", "")),
    ]);

    let workflow = Workflow {
        name: definition.name.clone(),
        run_name: "${{ inputs.run_token || github.workflow }}".to_string(),
        on: Triggers {
            workflow_dispatch: Dispatch { inputs },
        },
        env: definition.environment.clone(),
        jobs,
    };
    let yaml = serde_yaml::to_string(&workflow)
        .map_err(|e| AdapterError::Protocol(format!("cannot render YAML: {}", e)))?;
    Ok(format!(
        "# Generated by pipewright from pipeline {}\n{}",
        definition.name, yaml
    ))
}

fn run_status(run: &WorkflowRun) -> RemoteStatus {
    match run.status.as_str() {
        "queued" | "requested" | "waiting" | "pending" => {
            RemoteStatus::new(Status::Pending).with_detail(run.status.clone())
        }
        "completed" => match run.conclusion.as_deref() {
            Some("success" | "neutral") => RemoteStatus::new(Status::Success),
            Some("cancelled") => RemoteStatus::new(Status::Cancelled).with_detail("run cancelled"),
            Some("timed_out") => RemoteStatus::new(Status::Timeout).with_detail("run timed out"),
            Some("skipped") => RemoteStatus::new(Status::Skipped).with_detail("run skipped"),
            Some(other) => RemoteStatus::new(Status::Failed).with_detail(format!("run concluded {}", other)),
            None => RemoteStatus::new(Status::Running),
        },
        _ => RemoteStatus::new(Status::Running),
    }
}

pub struct GithubAdapter {
    config: GithubConfig,
    transport: Arc<dyn Transport>,
    auth: Option<Auth>,
    /// Run token -> workflow run id
    runs: Mutex<HashMap<String, u64>>,
}

impl GithubAdapter {
    pub fn new(config: GithubConfig, transport: Arc<dyn Transport>) -> Result<Self, AdapterError> {
        let auth = resolve_secret(&config.token, &config.token_env)?.map(Auth::Bearer);
        Ok(Self {
            config,
            transport,
            auth,
            runs: Mutex::new(HashMap::new()),
        })
    }

    fn repo_api(&self, path: &str) -> String {
        let base = join_url(&self.config.api_url, &format!("repos/{}", self.config.repo));
        if path.is_empty() {
            base
        } else {
            join_url(&base, path)
        }
    }

    fn request(&self, request: HttpRequest) -> HttpRequest {
        request
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
            .auth(self.auth.clone())
    }

    fn cached(&self, token: &str) -> Option<u64> {
        self.runs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(token)
            .copied()
    }

    /// Current state of the run behind a token, once it exists
    async fn find_run(&self, token: &str) -> Result<Option<WorkflowRun>, AdapterError> {
        if let Some(id) = self.cached(token) {
            let url = self.repo_api(&format!("actions/runs/{}", id));
            let run = self
                .transport
                .send(self.request(HttpRequest::get(url)))
                .await?
                .check()?
                .json()?;
            return Ok(Some(run));
        }

        let url = self.repo_api(&format!("actions/workflows/{}/runs", self.config.workflow));
        let request = HttpRequest::get(url)
            .query("event", "workflow_dispatch")
            .query("per_page", "50");
        let list: RunList = self
            .transport
            .send(self.request(request))
            .await?
            .check()?
            .json()?;
        let run = list
            .workflow_runs
            .into_iter()
            .find(|r| r.display_title == token);
        if let Some(run) = &run {
            self.runs
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .insert(token.to_string(), run.id);
        }
        Ok(run)
    }
}

#[async_trait]
impl BackendAdapter for GithubAdapter {
    fn backend(&self) -> Backend {
        Backend::Github
    }

    fn prepare(&self, definition: &PipelineDefinition) -> Result<ProviderArtifact, AdapterError> {
        Ok(ProviderArtifact {
            backend: Backend::Github,
            file_name: self.config.workflow.clone(),
            content: render_workflow(definition)?,
        })
    }

    async fn launch(
        &self,
        artifact: &ProviderArtifact,
        request: &LaunchRequest,
    ) -> Result<ExecutionHandle, AdapterError> {
        check_artifact(Backend::Github, artifact)?;

        let token = request.run_token();
        let script = request.script()?;
        let params = serde_json::to_string(&request.parameters)
            .map_err(|e| AdapterError::Protocol(e.to_string()))?;
        let body = json!({
            "ref": self.config.git_ref,
            "inputs": {
                "step_id": request.step.id,
                "run_token": token,
                "execution_id": request.execution_id.as_str(),
                "attempt": request.attempt.to_string(),
                "params": params,
                "script": script,
            }
        });
        let url = self.repo_api(&format!("actions/workflows/{}/dispatches", self.config.workflow));
        self.transport
            .send(self.request(HttpRequest::post(url).json(body)))
            .await?
            .check()?;
        Ok(ExecutionHandle::from(token))
    }

    async fn poll_status(&self, handle: &ExecutionHandle) -> Result<RemoteStatus, AdapterError> {
        Ok(match self.find_run(handle.as_str()).await? {
            Some(run) => run_status(&run),
            None => RemoteStatus::new(Status::Pending).with_detail("waiting for workflow run"),
        })
    }

    async fn fetch_logs(&self, handle: &ExecutionHandle, cursor: u64) -> Result<LogChunk, AdapterError> {
        let Some(run) = self.find_run(handle.as_str()).await? else {
            return Ok(LogChunk {
                text: String::new(),
                next_cursor: cursor,
                has_more: true,
            });
        };

        let url = self.repo_api(&format!("actions/runs/{}/jobs", run.id));
        let list: JobList = self
            .transport
            .send(self.request(HttpRequest::get(url)))
            .await?
            .check()?
            .json()?;

        // Only finished steps are listed, so earlier lines never change
        let lines: Vec<String> = list
            .jobs
            .iter()
            .filter(|job| job.conclusion.as_deref() != Some("skipped"))
            .flat_map(|job| {
                job.steps.iter().filter_map(move |step| {
                    step.conclusion
                        .as_ref()
                        .map(|c| format!("{} / {}: {}\n", job.name, step.name, c))
                })
            })
            .collect();

        let finished = run.status == "completed";
        if finished {
            self.runs
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .remove(handle.as_str());
        }

        let skip = usize::try_from(cursor).unwrap_or(usize::MAX);
        Ok(LogChunk {
            text: lines.iter().skip(skip).map(String::as_str).collect(),
            next_cursor: (lines.len() as u64).max(cursor),
            has_more: !finished,
        })
    }

    async fn cancel(&self, handle: &ExecutionHandle) -> Result<bool, AdapterError> {
        let Some(run) = self.find_run(handle.as_str()).await? else {
            return Ok(false);
        };
        if run.status == "completed" {
            return Ok(false);
        }
        let url = self.repo_api(&format!("actions/runs/{}/cancel", run.id));
        let response = self.transport.send(self.request(HttpRequest::post(url))).await?;
        Ok(response.check().is_ok())
    }

    async fn health_check(&self) -> bool {
        let request = self.request(HttpRequest::get(self.repo_api("")));
        match self.transport.send(request).await {
            Ok(response) => response.is_success(),
            Err(e) => {
                tracing::warn!(error = %e, "github health check failed");
                false
            }
        }
    }
}

#[cfg(test)]
#[path = "github_tests.rs"]
mod tests;
