// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake step executor for testing
#![cfg_attr(coverage_nightly, coverage(off))]

use super::{StepContext, StepError, StepExecutor, StepOutput};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Scripted behaviour of one attempt
#[derive(Debug, Clone)]
pub struct FakeStep {
    pub delay: Duration,
    pub exit_code: i32,
    pub output: Option<String>,
    pub error: Option<StepError>,
    pub log: Option<String>,
}

impl Default for FakeStep {
    fn default() -> Self {
        Self {
            delay: Duration::ZERO,
            exit_code: 0,
            output: None,
            error: None,
            log: None,
        }
    }
}

impl FakeStep {
    pub fn succeed() -> Self {
        Self::default()
    }

    pub fn fail(exit_code: i32) -> Self {
        Self {
            exit_code,
            ..Self::default()
        }
    }

    pub fn error(error: StepError) -> Self {
        Self {
            error: Some(error),
            ..Self::default()
        }
    }

    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = Some(output.into());
        self
    }

    pub fn with_log(mut self, log: impl Into<String>) -> Self {
        self.log = Some(log.into());
        self
    }
}

/// Recorded executor invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorCall {
    pub step_id: String,
    pub attempt: u32,
}

#[derive(Default)]
struct FakeState {
    /// Per step: scripted attempts in order; the last one repeats
    scripts: HashMap<String, Vec<FakeStep>>,
    calls: Vec<ExecutorCall>,
    cancelled: Vec<ExecutorCall>,
}

/// Fake executor with per-step, per-attempt scripted outcomes.
///
/// Unscripted steps succeed immediately.
#[derive(Clone, Default)]
pub struct FakeStepExecutor {
    inner: Arc<Mutex<FakeState>>,
}

impl FakeStepExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the attempts of a step, in attempt order
    pub fn script(&self, step_id: &str, attempts: Vec<FakeStep>) -> &Self {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .scripts
            .insert(step_id.to_string(), attempts);
        self
    }

    /// All invocations so far
    pub fn calls(&self) -> Vec<ExecutorCall> {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .calls
            .clone()
    }

    /// Invocations that observed cancellation
    pub fn cancelled(&self) -> Vec<ExecutorCall> {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .cancelled
            .clone()
    }

    /// Number of attempts made for one step
    pub fn attempts(&self, step_id: &str) -> usize {
        self.calls().iter().filter(|c| c.step_id == step_id).count()
    }

    fn next(&self, call: ExecutorCall) -> FakeStep {
        let mut state = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let index = (call.attempt.max(1) - 1) as usize;
        let step = state
            .scripts
            .get(&call.step_id)
            .and_then(|s| s.get(index).or_else(|| s.last()))
            .cloned()
            .unwrap_or_default();
        state.calls.push(call);
        step
    }
}

#[async_trait]
impl StepExecutor for FakeStepExecutor {
    async fn run(&self, ctx: StepContext) -> Result<StepOutput, StepError> {
        let call = ExecutorCall {
            step_id: ctx.step_id.clone(),
            attempt: ctx.attempt,
        };
        let step = self.next(call.clone());

        if let Some(log) = &step.log {
            ctx.logs.write(log);
        }

        tokio::select! {
            _ = tokio::time::sleep(step.delay) => {}
            _ = ctx.cancel.cancelled() => {
                self.inner
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .cancelled
                    .push(call);
                return Err(StepError::Cancelled);
            }
        }

        if let Some(error) = step.error {
            return Err(error);
        }
        Ok(StepOutput {
            output: step.output,
            exit_code: step.exit_code,
        })
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
