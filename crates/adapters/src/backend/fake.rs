// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake backend adapter for testing
#![cfg_attr(coverage_nightly, coverage(off))]

use super::{BackendAdapter, LaunchRequest, LogChunk, ProviderArtifact, RemoteStatus};
use async_trait::async_trait;
use pw_core::{AdapterError, Backend, ExecutionHandle, PipelineDefinition, Status};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Scripted behaviour of one launched attempt
#[derive(Debug, Clone)]
pub struct FakeRun {
    /// Returned from `launch` instead of a handle
    pub launch_error: Option<AdapterError>,
    /// Polls answered `Running` before the final status
    pub polls: u32,
    pub status: Status,
    pub output: Option<String>,
    pub exit_code: Option<i32>,
    pub logs: String,
}

impl Default for FakeRun {
    fn default() -> Self {
        Self {
            launch_error: None,
            polls: 0,
            status: Status::Success,
            output: None,
            exit_code: Some(0),
            logs: String::new(),
        }
    }
}

impl FakeRun {
    pub fn succeed() -> Self {
        Self::default()
    }

    pub fn fail() -> Self {
        Self {
            status: Status::Failed,
            exit_code: Some(1),
            ..Self::default()
        }
    }

    pub fn launch_error(error: AdapterError) -> Self {
        Self {
            launch_error: Some(error),
            ..Self::default()
        }
    }

    /// Keep reporting `Running` for this many polls
    pub fn after_polls(mut self, polls: u32) -> Self {
        self.polls = polls;
        self
    }

    pub fn with_logs(mut self, logs: impl Into<String>) -> Self {
        self.logs = logs.into();
        self
    }

    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = Some(output.into());
        self
    }
}

/// Recorded adapter call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    Prepare { pipeline: String },
    Launch { step_id: String, attempt: u32 },
    Poll { handle: String },
    FetchLogs { handle: String, cursor: u64 },
    Cancel { handle: String },
    HealthCheck,
}

struct Launched {
    step_id: String,
    run: FakeRun,
    polls_left: u32,
    cancelled: bool,
}

impl Launched {
    fn terminal(&self) -> bool {
        self.cancelled || self.polls_left == 0
    }
}

#[derive(Default)]
struct FakeState {
    scripts: HashMap<String, Vec<FakeRun>>,
    launched: HashMap<String, Launched>,
    calls: Vec<BackendCall>,
    next: u64,
}

/// Backend with scripted per-step, per-attempt outcomes.
///
/// Unscripted steps succeed on the first poll.
#[derive(Clone)]
pub struct FakeBackendAdapter {
    backend: Backend,
    healthy: Arc<Mutex<bool>>,
    inner: Arc<Mutex<FakeState>>,
}

impl Default for FakeBackendAdapter {
    fn default() -> Self {
        Self::new(Backend::Local)
    }
}

impl FakeBackendAdapter {
    pub fn new(backend: Backend) -> Self {
        Self {
            backend,
            healthy: Arc::new(Mutex::new(true)),
            inner: Arc::new(Mutex::new(FakeState::default())),
        }
    }

    /// Script the attempts of a step, in attempt order; the last repeats
    pub fn script(&self, step_id: &str, runs: Vec<FakeRun>) -> &Self {
        self.state().scripts.insert(step_id.to_string(), runs);
        self
    }

    pub fn set_healthy(&self, healthy: bool) {
        *self.healthy.lock().unwrap_or_else(|e| e.into_inner()) = healthy;
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.state().calls.clone()
    }

    /// Steps launched, in launch order
    pub fn launches(&self) -> Vec<(String, u32)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                BackendCall::Launch { step_id, attempt } => Some((step_id, attempt)),
                _ => None,
            })
            .collect()
    }

    /// Step ids whose runs were cancelled
    pub fn cancelled_steps(&self) -> Vec<String> {
        let state = self.state();
        let mut steps: Vec<String> = state
            .launched
            .values()
            .filter(|l| l.cancelled)
            .map(|l| l.step_id.clone())
            .collect();
        steps.sort();
        steps
    }

    fn state(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl BackendAdapter for FakeBackendAdapter {
    fn backend(&self) -> Backend {
        self.backend
    }

    fn prepare(&self, definition: &PipelineDefinition) -> Result<ProviderArtifact, AdapterError> {
        self.state().calls.push(BackendCall::Prepare {
            pipeline: definition.name.clone(),
        });
        Ok(ProviderArtifact {
            backend: self.backend,
            file_name: "fake".to_string(),
            content: definition.name.clone(),
        })
    }

    async fn launch(
        &self,
        _artifact: &ProviderArtifact,
        request: &LaunchRequest,
    ) -> Result<ExecutionHandle, AdapterError> {
        let mut state = self.state();
        let step_id = request.step.id.clone();
        state.calls.push(BackendCall::Launch {
            step_id: step_id.clone(),
            attempt: request.attempt,
        });

        let index = (request.attempt.max(1) - 1) as usize;
        let run = state
            .scripts
            .get(&step_id)
            .and_then(|runs| runs.get(index).or_else(|| runs.last()))
            .cloned()
            .unwrap_or_default();
        if let Some(error) = run.launch_error.clone() {
            return Err(error);
        }

        state.next += 1;
        let handle = format!("{}-{}", self.backend, state.next);
        state.launched.insert(
            handle.clone(),
            Launched {
                step_id,
                polls_left: run.polls,
                run,
                cancelled: false,
            },
        );
        Ok(ExecutionHandle::from(handle))
    }

    async fn poll_status(&self, handle: &ExecutionHandle) -> Result<RemoteStatus, AdapterError> {
        let mut state = self.state();
        state.calls.push(BackendCall::Poll {
            handle: handle.to_string(),
        });
        let launched = state
            .launched
            .get_mut(handle.as_str())
            .ok_or_else(|| AdapterError::UnknownHandle(handle.to_string()))?;

        if launched.cancelled {
            return Ok(RemoteStatus::new(Status::Cancelled).with_detail("cancelled"));
        }
        if launched.polls_left > 0 {
            launched.polls_left -= 1;
            return Ok(RemoteStatus::new(Status::Running));
        }
        let run = &launched.run;
        Ok(RemoteStatus {
            status: run.status,
            detail: (run.status == Status::Failed).then(|| "scripted failure".to_string()),
            output: run.output.clone(),
            exit_code: run.exit_code,
        })
    }

    async fn fetch_logs(&self, handle: &ExecutionHandle, cursor: u64) -> Result<LogChunk, AdapterError> {
        let mut state = self.state();
        state.calls.push(BackendCall::FetchLogs {
            handle: handle.to_string(),
            cursor,
        });
        let launched = state
            .launched
            .get(handle.as_str())
            .ok_or_else(|| AdapterError::UnknownHandle(handle.to_string()))?;
        let (text, next_cursor) = super::tail_from(&launched.run.logs, cursor);
        Ok(LogChunk {
            text: text.to_string(),
            next_cursor,
            has_more: !launched.terminal(),
        })
    }

    async fn cancel(&self, handle: &ExecutionHandle) -> Result<bool, AdapterError> {
        let mut state = self.state();
        state.calls.push(BackendCall::Cancel {
            handle: handle.to_string(),
        });
        let launched = state
            .launched
            .get_mut(handle.as_str())
            .ok_or_else(|| AdapterError::UnknownHandle(handle.to_string()))?;
        if launched.terminal() {
            return Ok(false);
        }
        launched.cancelled = true;
        Ok(true)
    }

    async fn health_check(&self) -> bool {
        self.state().calls.push(BackendCall::HealthCheck);
        *self.healthy.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
