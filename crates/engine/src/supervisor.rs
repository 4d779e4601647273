// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Retry and timeout supervision of a single step
//!
//! One attempt is one launch on the stage's backend. The supervisor polls
//! the handle, copies new log text into the log book, enforces the step
//! timeout, and decides whether a finished attempt is retried.

use crate::config::EngineConfig;
use crate::coordinator::{StepResult, StepRunner};
use crate::error::EngineError;
use crate::interrupt::{Interrupt, StopReason};
use crate::recorder::Recorder;
use async_trait::async_trait;
use pw_adapters::{BackendAdapter, LaunchRequest, ProviderArtifact, RemoteStatus};
use pw_core::{
    Clock, ErrorDetail, ErrorKind, ExecutionHandle, ExecutionId, ExprContext, IdGen, Status,
    StepEvent, StepExecution, StepSpec,
};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::Instrument;

/// Consecutive transient poll errors tolerated before an attempt fails
const MAX_POLL_ERRORS: u32 = 5;

/// How a launched (or unlaunchable) attempt ended, before it is recorded
#[derive(Debug)]
enum Ending {
    Succeeded {
        output: Option<String>,
        exit_code: Option<i32>,
    },
    Failed {
        error: ErrorDetail,
        output: Option<String>,
        exit_code: Option<i32>,
        retryable: bool,
    },
    TimedOut {
        message: String,
    },
    /// Cancelled on the backend by someone other than us
    CancelledRemotely {
        reason: String,
    },
    Stopped(StopReason),
}

impl Ending {
    fn from_remote(remote: RemoteStatus) -> Self {
        match remote.status {
            Status::Success | Status::Skipped => Ending::Succeeded {
                output: remote.output,
                exit_code: remote.exit_code,
            },
            Status::Timeout => Ending::TimedOut {
                message: remote
                    .detail
                    .unwrap_or_else(|| "timed out on backend".to_string()),
            },
            Status::Cancelled => Ending::CancelledRemotely {
                reason: remote
                    .detail
                    .unwrap_or_else(|| "cancelled on backend".to_string()),
            },
            _ => Ending::Failed {
                error: ErrorDetail::step(
                    remote.detail.unwrap_or_else(|| "step failed".to_string()),
                ),
                output: remote.output,
                exit_code: remote.exit_code,
                retryable: true,
            },
        }
    }

    fn event(self) -> StepEvent {
        match self {
            Ending::Succeeded { output, exit_code } => StepEvent::Succeed { output, exit_code },
            Ending::Failed {
                error,
                output,
                exit_code,
                ..
            } => StepEvent::Fail {
                error,
                output,
                exit_code,
            },
            Ending::TimedOut { message } => StepEvent::TimedOut { message },
            Ending::CancelledRemotely { reason } => StepEvent::Cancel { reason },
            Ending::Stopped(reason) => reason.step_event(),
        }
    }
}

/// How a terminal commit interacts with the group interrupt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Guard {
    Plain,
    /// Skip the commit if anything has stopped
    UnlessStopped,
    /// Commit, then stop the group (fail_fast)
    StopGroup,
}

/// Runs the steps of one stage on that stage's backend
pub struct StepSupervisor<C: Clock, I: IdGen> {
    pub execution_id: ExecutionId,
    pub recorder: Arc<Recorder<C>>,
    pub adapter: Arc<dyn BackendAdapter>,
    pub artifact: Arc<ProviderArtifact>,
    /// Pipeline env, run parameters, and every step finished so far
    pub context: Arc<ExprContext>,
    pub config: Arc<EngineConfig>,
    pub id_gen: I,
    pub workers: Arc<Semaphore>,
}

#[async_trait]
impl<C: Clock, I: IdGen> StepRunner for StepSupervisor<C, I> {
    async fn run_step(
        &self,
        step: StepSpec,
        interrupt: Arc<Interrupt>,
        stop_on_failure: bool,
    ) -> StepResult {
        let span = tracing::info_span!(
            "step",
            execution_id = %self.execution_id,
            step_id = %step.id,
            backend = self.adapter.name(),
        );
        let status = match self
            .supervise(&step, &interrupt, stop_on_failure)
            .instrument(span.clone())
            .await
        {
            Ok(status) => status,
            Err(e) => {
                span.in_scope(|| tracing::error!(error = %e, "step supervision failed"));
                Status::Failed
            }
        };
        StepResult::new(&step, status)
    }
}

impl<C: Clock, I: IdGen> StepSupervisor<C, I> {
    async fn supervise(
        &self,
        step: &StepSpec,
        interrupt: &Interrupt,
        stop_on_failure: bool,
    ) -> Result<Status, EngineError> {
        let failure_guard = if stop_on_failure && !step.allow_failure {
            Guard::StopGroup
        } else {
            Guard::Plain
        };

        let permit = tokio::select! {
            biased;
            _ = interrupt.stopped() => None,
            permit = Arc::clone(&self.workers).acquire_owned() => Some(permit),
        };
        let Some(permit) = permit else {
            let attempt = self.new_attempt(step, 1)?;
            return self.stop(interrupt, &attempt).await;
        };
        // Only fails if the pool was closed, which the engine never does
        let _permit = permit.ok();

        if let Some(condition) = &step.condition {
            match self.context.evaluate(condition) {
                Ok(true) => {}
                Ok(false) => {
                    tracing::info!(condition = %condition, "condition false, skipping");
                    let attempt = self.new_attempt(step, 1)?;
                    let event = StepEvent::Skip {
                        reason: format!("condition `{}` is false", condition),
                    };
                    return self.commit(interrupt, &attempt, event, Guard::Plain).await;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "condition could not be evaluated");
                    let attempt = self.new_attempt(step, 1)?;
                    let event = StepEvent::Fail {
                        error: ErrorDetail::new(ErrorKind::Condition, e.to_string()),
                        output: None,
                        exit_code: None,
                    };
                    return self.commit(interrupt, &attempt, event, failure_guard).await;
                }
            }
        }

        let rendered = match self.context.render_params(&step.parameters) {
            Ok(parameters) => StepSpec {
                parameters,
                ..step.clone()
            },
            Err(e) => {
                let attempt = self.new_attempt(step, 1)?;
                let event = StepEvent::Fail {
                    error: ErrorDetail::new(ErrorKind::Validation, e.to_string()),
                    output: None,
                    exit_code: None,
                };
                return self.commit(interrupt, &attempt, event, failure_guard).await;
            }
        };

        let policy = &step.retry;
        let max_attempts = policy.max_attempts();
        let mut number = 1;
        loop {
            let attempt = self.new_attempt(step, number)?;
            let started = Instant::now();
            let ending = self.run_attempt(&rendered, &attempt, interrupt).await?;

            let retry = match &ending {
                Ending::Failed { retryable, .. } => *retryable && number < max_attempts,
                Ending::TimedOut { .. } => policy.retry_on_timeout && number < max_attempts,
                _ => false,
            };
            let guard = match &ending {
                Ending::Succeeded { .. } => Guard::UnlessStopped,
                Ending::Stopped(_) => Guard::Plain,
                _ if retry => Guard::Plain,
                _ => failure_guard,
            };
            let status = self.commit(interrupt, &attempt, ending.event(), guard).await?;
            tracing::info!(
                attempt = number,
                status = %status,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "attempt finished"
            );

            if !retry || status.is_successful() {
                return Ok(status);
            }

            let delay = policy.delay_after(number).min(self.config.max_backoff);
            tracing::info!(attempt = number, delay_ms = delay.as_millis() as u64, "retrying");
            tokio::select! {
                biased;
                _ = interrupt.stopped() => return Ok(status),
                _ = tokio::time::sleep(delay) => {}
            }
            number += 1;
        }
    }

    async fn run_attempt(
        &self,
        step: &StepSpec,
        attempt: &StepExecution,
        interrupt: &Interrupt,
    ) -> Result<Ending, EngineError> {
        if let Some(reason) = interrupt.reason() {
            return Ok(Ending::Stopped(reason));
        }

        let request = LaunchRequest {
            execution_id: self.execution_id.clone(),
            step: step.clone(),
            attempt: attempt.attempt,
            environment: self.context.env.clone(),
            parameters: self.context.params.clone(),
        };
        let launched = tokio::select! {
            biased;
            _ = interrupt.stopped() => return Ok(Ending::Stopped(stop_reason(interrupt))),
            launched = self.adapter.launch(&self.artifact, &request) => launched,
        };
        let handle = match launched {
            Ok(handle) => handle,
            Err(e) => {
                tracing::warn!(attempt = attempt.attempt, error = %e, "launch failed");
                return Ok(Ending::Failed {
                    error: ErrorDetail::from(&e),
                    output: None,
                    exit_code: None,
                    retryable: e.is_retryable(),
                });
            }
        };

        let (_, events) = self.recorder.transition_attempt(
            attempt,
            StepEvent::Start {
                backend: self.adapter.backend(),
                handle: handle.clone(),
            },
        )?;
        self.recorder.emit(events).await;

        let timeout = step.timeout.unwrap_or(self.config.default_step_timeout);
        let deadline = tokio::time::Instant::now() + timeout;
        let mut cursor = 0;
        let mut poll_errors = 0;
        loop {
            tokio::select! {
                biased;
                _ = interrupt.stopped() => {
                    self.cancel_remote(&handle).await;
                    self.pull_logs(&step.id, &handle, cursor).await;
                    return Ok(Ending::Stopped(stop_reason(interrupt)));
                }
                _ = tokio::time::sleep_until(deadline) => {
                    tracing::info!(timeout_ms = timeout.as_millis() as u64, "step timed out");
                    self.cancel_remote(&handle).await;
                    self.pull_logs(&step.id, &handle, cursor).await;
                    return Ok(Ending::TimedOut {
                        message: format!("step exceeded its timeout of {}s", timeout.as_secs()),
                    });
                }
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }

            cursor = self.pull_logs(&step.id, &handle, cursor).await;
            match self.adapter.poll_status(&handle).await {
                Ok(remote) if remote.status.is_terminal() => {
                    self.pull_logs(&step.id, &handle, cursor).await;
                    return Ok(Ending::from_remote(remote));
                }
                Ok(_) => poll_errors = 0,
                Err(e) if e.is_retryable() && poll_errors < MAX_POLL_ERRORS => {
                    poll_errors += 1;
                    tracing::warn!(error = %e, poll_errors, "poll failed, will retry");
                }
                Err(e) => {
                    self.cancel_remote(&handle).await;
                    return Ok(Ending::Failed {
                        error: ErrorDetail::from(&e),
                        output: None,
                        exit_code: None,
                        retryable: e.is_retryable(),
                    });
                }
            }
        }
    }

    /// Copy any new log text into the log book; returns the next cursor
    async fn pull_logs(&self, step_id: &str, handle: &ExecutionHandle, cursor: u64) -> u64 {
        let chunk = match self.adapter.fetch_logs(handle, cursor).await {
            Ok(chunk) => chunk,
            Err(e) => {
                tracing::debug!(error = %e, "log fetch failed");
                return cursor;
            }
        };
        match self
            .recorder
            .append_log(&self.execution_id, Some(step_id), &chunk.text)
        {
            Ok(event) => self.recorder.emit(event.into_iter().collect()).await,
            Err(e) => tracing::warn!(error = %e, "log not persisted"),
        }
        chunk.next_cursor.max(cursor)
    }

    /// Best-effort cancel, bounded by the configured grace period
    async fn cancel_remote(&self, handle: &ExecutionHandle) {
        match tokio::time::timeout(self.config.cancel_grace, self.adapter.cancel(handle)).await {
            Ok(Ok(true)) => tracing::debug!(handle = %handle, "cancel acknowledged"),
            Ok(Ok(false)) => tracing::debug!(handle = %handle, "already finished"),
            Ok(Err(e)) => tracing::warn!(handle = %handle, error = %e, "cancel failed"),
            Err(_) => tracing::warn!(handle = %handle, "cancel not acknowledged in time"),
        }
    }

    fn new_attempt(&self, step: &StepSpec, number: u32) -> Result<StepExecution, EngineError> {
        self.recorder.create_attempt(StepExecution::new(
            self.id_gen.next(),
            self.execution_id.clone(),
            step.id.clone(),
            number,
            self.recorder.clock(),
        ))
    }

    /// Record the stop of an attempt that never launched
    async fn stop(&self, interrupt: &Interrupt, attempt: &StepExecution) -> Result<Status, EngineError> {
        let event = stop_reason(interrupt).step_event();
        self.commit(interrupt, attempt, event, Guard::Plain).await
    }

    /// Record a terminal event and emit it; returns the recorded status
    async fn commit(
        &self,
        interrupt: &Interrupt,
        attempt: &StepExecution,
        event: StepEvent,
        guard: Guard,
    ) -> Result<Status, EngineError> {
        let write = |event: StepEvent| self.recorder.transition_attempt(attempt, event);
        let committed = match guard {
            Guard::Plain => Ok(write(event)),
            Guard::UnlessStopped => interrupt.commit_unless_stopped(|| write(event)),
            Guard::StopGroup => {
                let fallback = event.clone();
                match interrupt.commit_then_stop(StopReason::FailFast, || write(event)) {
                    // Already stopped: the failure still stands
                    Err(_) => Ok(write(fallback)),
                    ok => ok,
                }
            }
        };
        let (record, events) = match committed {
            Ok(result) => result?,
            // Stopped before a success could land
            Err(reason) => self.recorder.transition_attempt(attempt, reason.step_event())?,
        };
        self.recorder.emit(events).await;
        Ok(record.status)
    }
}

fn stop_reason(interrupt: &Interrupt) -> StopReason {
    interrupt.reason().unwrap_or(StopReason::Cancelled)
}

#[cfg(test)]
#[path = "supervisor_tests.rs"]
mod tests;
