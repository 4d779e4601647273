// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Jenkins-style backend
//!
//! `prepare` renders a declarative Jenkinsfile with one Jenkins stage per
//! pipeline stage. Every step is guarded by the `STEP_ID` build parameter,
//! so a single build runs exactly one step attempt. Handles name the queue
//! item (`queue/<id>`); the build number is looked up once it exists.

use super::{
    check_artifact, param_var, plan, resolve_secret, BackendAdapter, LaunchRequest, LogChunk,
    ProviderArtifact, RemoteStatus,
};
use crate::http::{join_url, Auth, HttpRequest, Transport};
use crate::script::{overridable, shell_script, SCRIPT_VAR};
use async_trait::async_trait;
use pw_core::{AdapterError, Backend, ExecutionHandle, PipelineDefinition, Status, StepSpec};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Write;
use std::sync::{Arc, Mutex};

/// Connection settings for a Jenkins controller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JenkinsConfig {
    pub url: String,
    /// Job path, folders separated by `/`
    pub job: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub token_env: Option<String>,
}

pub struct JenkinsAdapter {
    config: JenkinsConfig,
    transport: Arc<dyn Transport>,
    auth: Option<Auth>,
    /// Queue item id -> build number
    builds: Mutex<HashMap<u64, u64>>,
}

#[derive(Debug, Deserialize)]
struct QueueItem {
    #[serde(default)]
    cancelled: bool,
    #[serde(default)]
    why: Option<String>,
    #[serde(default)]
    executable: Option<Executable>,
}

#[derive(Debug, Deserialize)]
struct Executable {
    number: u64,
}

#[derive(Debug, Deserialize)]
struct Build {
    #[serde(default)]
    building: bool,
    #[serde(default)]
    result: Option<String>,
}

impl JenkinsAdapter {
    pub fn new(config: JenkinsConfig, transport: Arc<dyn Transport>) -> Result<Self, AdapterError> {
        let token = resolve_secret(&config.token, &config.token_env)?;
        let auth = match (&config.user, token) {
            (Some(user), Some(password)) => Some(Auth::Basic {
                user: user.clone(),
                password,
            }),
            (None, Some(token)) => Some(Auth::Bearer(token)),
            _ => None,
        };
        Ok(Self {
            config,
            transport,
            auth,
            builds: Mutex::new(HashMap::new()),
        })
    }

    fn job_url(&self) -> String {
        let path = self
            .config
            .job
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| format!("job/{}", s))
            .collect::<Vec<_>>()
            .join("/");
        join_url(&self.config.url, &path)
    }

    fn get(&self, url: String) -> HttpRequest {
        HttpRequest::get(url).auth(self.auth.clone())
    }

    fn post(&self, url: String) -> HttpRequest {
        HttpRequest::post(url).auth(self.auth.clone())
    }

    /// Build number for a queue item, once Jenkins has started it
    async fn build_number(&self, queue_id: u64) -> Result<Result<u64, RemoteStatus>, AdapterError> {
        if let Some(number) = self
            .builds
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&queue_id)
        {
            return Ok(Ok(*number));
        }

        let url = join_url(&self.config.url, &format!("queue/item/{}/api/json", queue_id));
        let item: QueueItem = self.transport.send(self.get(url)).await?.check()?.json()?;
        if item.cancelled {
            return Ok(Err(
                RemoteStatus::new(Status::Cancelled).with_detail("queue item cancelled")
            ));
        }
        match item.executable {
            Some(executable) => {
                self.builds
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .insert(queue_id, executable.number);
                Ok(Ok(executable.number))
            }
            None => {
                let mut status = RemoteStatus::new(Status::Pending);
                status.detail = item.why;
                Ok(Err(status))
            }
        }
    }
}

fn queue_id(handle: &ExecutionHandle) -> Result<u64, AdapterError> {
    handle
        .as_str()
        .strip_prefix("queue/")
        .and_then(|id| id.parse().ok())
        .ok_or_else(|| AdapterError::UnknownHandle(handle.to_string()))
}

/// `.../queue/item/123/` -> 123
fn parse_queue_location(location: &str) -> Option<u64> {
    let mut segments = location.trim_end_matches('/').rsplit('/');
    let id = segments.next()?.parse().ok()?;
    (segments.next()? == "item").then_some(id)
}

fn build_status(build: &Build) -> RemoteStatus {
    if build.building {
        return RemoteStatus::new(Status::Running);
    }
    match build.result.as_deref() {
        Some("SUCCESS") => RemoteStatus::new(Status::Success),
        Some(result @ ("FAILURE" | "UNSTABLE")) => {
            RemoteStatus::new(Status::Failed).with_detail(format!("build result {}", result))
        }
        Some(result @ ("ABORTED" | "NOT_BUILT")) => {
            RemoteStatus::new(Status::Cancelled).with_detail(format!("build result {}", result))
        }
        Some(other) => {
            RemoteStatus::new(Status::Failed).with_detail(format!("unknown build result {}", other))
        }
        // Finished building but no result yet: post-build still running
        None => RemoteStatus::new(Status::Running),
    }
}

/// Single-quoted Groovy string literal
fn groovy_str(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '$' => out.push_str("\\$"),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

fn line(out: &mut String, depth: usize, text: &str) {
    let _ = writeln!(out, "{}{}", "    ".repeat(depth), text);
}

fn render_step(out: &mut String, depth: usize, step: &StepSpec) -> Result<(), AdapterError> {
    let script = overridable(&shell_script(&step.kind, &step.parameters)?);
    let id = groovy_str(&step.id);

    line(out, depth, &format!("stage({}) {{", id));
    line(
        out,
        depth + 1,
        &format!(
            "when {{ expression {{ params.STEP_ID == 'all' || params.STEP_ID == {} }} }}",
            id
        ),
    );
    line(out, depth + 1, &format!("environment {{ PW_STEP_ID = {} }}", id));
    if let Some(timeout) = step.timeout {
        line(
            out,
            depth + 1,
            &format!("options {{ timeout(time: {}, unit: 'SECONDS') }}", timeout.as_secs().max(1)),
        );
    }
    line(out, depth + 1, "steps {");
    line(out, depth + 2, "script {");
    // Pipewright drives retries itself when it launches a single step
    line(
        out,
        depth + 3,
        &format!(
            "retry(params.STEP_ID == 'all' ? {} : 1) {{",
            step.retry.max_attempts()
        ),
    );
    if step.allow_failure {
        line(out, depth + 4, "catchError(buildResult: 'SUCCESS', stageResult: 'FAILURE') {");
        line(out, depth + 5, &format!("sh {}", groovy_str(&script)));
        line(out, depth + 4, "}");
    } else {
        line(out, depth + 4, &format!("sh {}", groovy_str(&script)));
    }
    line(out, depth + 3, "}");
    line(out, depth + 2, "}");
    line(out, depth + 1, "}");
    line(out, depth, "}");
    Ok(())
}

/// Render a declarative Jenkinsfile
pub(crate) fn render_jenkinsfile(definition: &PipelineDefinition) -> Result<String, AdapterError> {
    let stages = plan(definition)?;
    let mut out = String::new();

    line(&mut out, 0, &format!("// Generated by pipewright from pipeline {}", definition.name));
    line(&mut out, 0, "pipeline {");
    line(&mut out, 1, "agent any");

    line(&mut out, 1, "parameters {");
    let choices = std::iter::once(groovy_str("all"))
        .chain(definition.steps.iter().map(|s| groovy_str(&s.id)))
        .collect::<Vec<_>>()
        .join(", ");
    line(
        &mut out,
        2,
        &format!("choice(name: 'STEP_ID', choices: [{}], description: 'Run a single step')", choices),
    );
    line(&mut out, 2, "string(name: 'PW_EXECUTION_ID', defaultValue: '', description: '')");
    line(&mut out, 2, "string(name: 'PW_ATTEMPT', defaultValue: '1', description: '')");
    line(
        &mut out,
        2,
        &format!("text(name: '{}', defaultValue: '', description: 'Rendered step script')", SCRIPT_VAR),
    );
    for (key, default) in &definition.parameters {
        line(
            &mut out,
            2,
            &format!(
                "string(name: {}, defaultValue: {}, description: '')",
                groovy_str(&param_var(key)),
                groovy_str(default)
            ),
        );
    }
    line(&mut out, 1, "}");

    if let Some(timeout) = definition.timeout {
        line(
            &mut out,
            1,
            &format!("options {{ timeout(time: {}, unit: 'SECONDS') }}", timeout.as_secs().max(1)),
        );
    }

    if !definition.environment.is_empty() {
        line(&mut out, 1, "environment {");
        for (key, value) in &definition.environment {
            line(&mut out, 2, &format!("{} = {}", key, groovy_str(value)));
        }
        line(&mut out, 1, "}");
    }

    line(&mut out, 1, "stages {");
    for stage in &stages {
        line(&mut out, 2, &format!("stage('stage {}') {{", stage.index));
        let steps: Vec<&StepSpec> = stage.steps().collect();
        if steps.len() > 1 {
            line(&mut out, 3, "parallel {");
            for step in steps {
                render_step(&mut out, 4, step)?;
            }
            line(&mut out, 3, "}");
        } else {
            line(&mut out, 3, "stages {");
            for step in steps {
                render_step(&mut out, 4, step)?;
            }
            line(&mut out, 3, "}");
        }
        line(&mut out, 2, "}");
    }
    line(&mut out, 1, "}");
    line(&mut out, 0, "}");
    Ok(out)
}

#[async_trait]
impl BackendAdapter for JenkinsAdapter {
    fn backend(&self) -> Backend {
        Backend::Jenkins
    }

    fn prepare(&self, definition: &PipelineDefinition) -> Result<ProviderArtifact, AdapterError> {
        Ok(ProviderArtifact {
            backend: Backend::Jenkins,
            file_name: "Jenkinsfile".to_string(),
            content: render_jenkinsfile(definition)?,
        })
    }

    async fn launch(
        &self,
        artifact: &ProviderArtifact,
        request: &LaunchRequest,
    ) -> Result<ExecutionHandle, AdapterError> {
        check_artifact(Backend::Jenkins, artifact)?;

        let mut http = self
            .post(format!("{}/buildWithParameters", self.job_url()))
            .query("STEP_ID", request.step.id.clone())
            .query("PW_EXECUTION_ID", request.execution_id.to_string())
            .query("PW_ATTEMPT", request.attempt.to_string())
            .query(SCRIPT_VAR, request.script()?);
        for (key, value) in &request.parameters {
            http = http.query(param_var(key), value.clone());
        }

        let response = self.transport.send(http).await?.check()?;
        let location = response
            .header("location")
            .ok_or_else(|| AdapterError::Protocol("build request returned no Location".to_string()))?;
        let id = parse_queue_location(location).ok_or_else(|| {
            AdapterError::Protocol(format!("unexpected queue location {}", location))
        })?;
        Ok(ExecutionHandle::from(format!("queue/{}", id)))
    }

    async fn poll_status(&self, handle: &ExecutionHandle) -> Result<RemoteStatus, AdapterError> {
        let number = match self.build_number(queue_id(handle)?).await? {
            Ok(number) => number,
            Err(status) => return Ok(status),
        };
        let url = format!("{}/{}/api/json", self.job_url(), number);
        let build: Build = self.transport.send(self.get(url)).await?.check()?.json()?;
        Ok(build_status(&build))
    }

    async fn fetch_logs(&self, handle: &ExecutionHandle, cursor: u64) -> Result<LogChunk, AdapterError> {
        let queue_id = queue_id(handle)?;
        let number = match self.build_number(queue_id).await? {
            Ok(number) => number,
            Err(status) => {
                return Ok(LogChunk {
                    text: String::new(),
                    next_cursor: cursor,
                    has_more: !status.status.is_terminal(),
                })
            }
        };

        let url = format!("{}/{}/logText/progressiveText", self.job_url(), number);
        let response = self
            .transport
            .send(self.get(url).query("start", cursor.to_string()))
            .await?
            .check()?;
        let next_cursor = response
            .header("x-text-size")
            .and_then(|v| v.parse().ok())
            .unwrap_or(cursor + response.body.len() as u64);
        let has_more = response
            .header("x-more-data")
            .is_some_and(|v| v.eq_ignore_ascii_case("true"));
        if !has_more {
            // Log stream is complete; later lookups go back through the queue
            self.builds
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .remove(&queue_id);
        }
        Ok(LogChunk {
            text: response.body,
            next_cursor,
            has_more,
        })
    }

    async fn cancel(&self, handle: &ExecutionHandle) -> Result<bool, AdapterError> {
        let id = queue_id(handle)?;
        let known = self
            .builds
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&id)
            .copied();
        let request = match known {
            Some(number) => self.post(format!("{}/{}/stop", self.job_url(), number)),
            None => self
                .post(join_url(&self.config.url, "queue/cancelItem"))
                .query("id", id.to_string()),
        };
        let response = self.transport.send(request).await?;
        Ok(response.check().is_ok())
    }

    async fn health_check(&self) -> bool {
        let url = join_url(&self.config.url, "api/json");
        match self.transport.send(self.get(url)).await {
            Ok(response) => response.is_success(),
            Err(e) => {
                tracing::warn!(error = %e, "jenkins health check failed");
                false
            }
        }
    }
}

#[cfg(test)]
#[path = "jenkins_tests.rs"]
mod tests;
