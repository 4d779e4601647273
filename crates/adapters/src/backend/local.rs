// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process backend: runs step executors on spawned tasks
//!
//! A run stays in the table until its caller is done with it: the terminal
//! status was polled (or a cancel requested) and the logs were read to the
//! end. A run cancelled while still going is dropped when its task ends.

use super::{check_artifact, tail_from, BackendAdapter, LaunchRequest, LogChunk, ProviderArtifact, RemoteStatus};
use crate::executor::{ExecutorRegistry, LogSink, StepContext, StepError, StepOutput};
use async_trait::async_trait;
use pw_core::{AdapterError, Backend, ExecutionHandle, PipelineDefinition, Status};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

struct LocalRun {
    status: RemoteStatus,
    logs: String,
    cancel: CancellationToken,
    status_seen: bool,
    cancel_requested: bool,
    /// Logs were read after a cancel; nobody reads this run again
    released: bool,
}

type RunTable = Arc<Mutex<HashMap<String, LocalRun>>>;

/// Backend that runs every step in this process
#[derive(Clone)]
pub struct LocalAdapter {
    executors: ExecutorRegistry,
    runs: RunTable,
    next: Arc<AtomicU64>,
}

impl Default for LocalAdapter {
    fn default() -> Self {
        Self::new(ExecutorRegistry::with_builtins())
    }
}

impl LocalAdapter {
    pub fn new(executors: ExecutorRegistry) -> Self {
        Self {
            executors,
            runs: Arc::new(Mutex::new(HashMap::new())),
            next: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn executors(&self) -> &ExecutorRegistry {
        &self.executors
    }

    /// Runs still held in memory
    pub fn active_runs(&self) -> usize {
        self.lock_runs().len()
    }

    fn lock_runs(&self) -> std::sync::MutexGuard<'_, HashMap<String, LocalRun>> {
        self.runs.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn with_run<T>(
        &self,
        handle: &ExecutionHandle,
        f: impl FnOnce(&mut LocalRun) -> T,
    ) -> Result<T, AdapterError> {
        let mut runs = self.lock_runs();
        runs.get_mut(handle.as_str())
            .map(f)
            .ok_or_else(|| AdapterError::UnknownHandle(handle.to_string()))
    }
}

/// Map an executor result onto a terminal status
fn finished(result: Result<StepOutput, StepError>) -> RemoteStatus {
    match result {
        Ok(output) if output.is_success() => RemoteStatus {
            status: Status::Success,
            detail: None,
            output: output.output,
            exit_code: Some(output.exit_code),
        },
        Ok(output) => RemoteStatus {
            status: Status::Failed,
            detail: Some(format!("exited with code {}", output.exit_code)),
            output: output.output,
            exit_code: Some(output.exit_code),
        },
        Err(StepError::Cancelled) => RemoteStatus::new(Status::Cancelled).with_detail("cancelled"),
        Err(e) => RemoteStatus::new(Status::Failed).with_detail(e.to_string()),
    }
}

#[async_trait]
impl BackendAdapter for LocalAdapter {
    fn backend(&self) -> Backend {
        Backend::Local
    }

    fn prepare(&self, definition: &PipelineDefinition) -> Result<ProviderArtifact, AdapterError> {
        let content = serde_json::to_string_pretty(definition)
            .map_err(|e| AdapterError::Protocol(e.to_string()))?;
        Ok(ProviderArtifact {
            backend: Backend::Local,
            file_name: format!("{}.json", definition.name),
            content,
        })
    }

    async fn launch(
        &self,
        artifact: &ProviderArtifact,
        request: &LaunchRequest,
    ) -> Result<ExecutionHandle, AdapterError> {
        check_artifact(Backend::Local, artifact)?;
        let executor = self.executors.get(&request.step.kind).ok_or_else(|| {
            AdapterError::Unsupported(format!("no executor for step kind `{}`", request.step.kind))
        })?;

        let handle = format!("local-{}", self.next.fetch_add(1, Ordering::SeqCst));
        let cancel = CancellationToken::new();
        self.lock_runs().insert(
            handle.clone(),
            LocalRun {
                status: RemoteStatus::new(Status::Running),
                logs: String::new(),
                cancel: cancel.clone(),
                status_seen: false,
                cancel_requested: false,
                released: false,
            },
        );

        let sink_runs = Arc::clone(&self.runs);
        let sink_handle = handle.clone();
        let logs = LogSink::new(move |text| {
            let mut runs = sink_runs.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(run) = runs.get_mut(&sink_handle) {
                run.logs.push_str(text);
            }
        });

        let ctx = StepContext {
            execution_id: request.execution_id.clone(),
            step_id: request.step.id.clone(),
            attempt: request.attempt,
            kind: request.step.kind.clone(),
            params: request.step.parameters.clone(),
            env: request.step_env(),
            cancel,
            logs,
        };

        let runs = Arc::clone(&self.runs);
        let task_handle = handle.clone();
        tokio::spawn(async move {
            let status = finished(executor.run(ctx).await);
            let mut runs = runs.lock().unwrap_or_else(|e| e.into_inner());
            let released = match runs.get_mut(&task_handle) {
                Some(run) => {
                    run.status = status;
                    run.released
                }
                None => false,
            };
            if released {
                runs.remove(&task_handle);
            }
        });

        tracing::debug!(handle = %handle, step_id = %request.step.id, attempt = request.attempt, "local run started");
        Ok(ExecutionHandle::from(handle))
    }

    async fn poll_status(&self, handle: &ExecutionHandle) -> Result<RemoteStatus, AdapterError> {
        self.with_run(handle, |run| {
            if run.status.status.is_terminal() {
                run.status_seen = true;
            }
            run.status.clone()
        })
    }

    async fn fetch_logs(&self, handle: &ExecutionHandle, cursor: u64) -> Result<LogChunk, AdapterError> {
        let mut runs = self.lock_runs();
        let run = runs
            .get_mut(handle.as_str())
            .ok_or_else(|| AdapterError::UnknownHandle(handle.to_string()))?;
        let (text, next_cursor) = tail_from(&run.logs, cursor);
        let finished = run.status.status.is_terminal();
        let chunk = LogChunk {
            text: text.to_string(),
            next_cursor,
            has_more: !finished,
        };
        if run.cancel_requested {
            run.released = true;
        }
        if finished && (run.status_seen || run.cancel_requested) {
            runs.remove(handle.as_str());
        }
        Ok(chunk)
    }

    async fn cancel(&self, handle: &ExecutionHandle) -> Result<bool, AdapterError> {
        self.with_run(handle, |run| {
            run.cancel_requested = true;
            if run.status.status.is_terminal() {
                false
            } else {
                run.cancel.cancel();
                true
            }
        })
    }

    async fn health_check(&self) -> bool {
        true
    }
}

#[cfg(test)]
#[path = "local_tests.rs"]
mod tests;
