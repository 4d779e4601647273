// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Step attempt state machine
//!
//! One [`StepExecution`] exists per attempt. Retries create a fresh record
//! with the next attempt number; the latest attempt is authoritative.

use crate::clock::Clock;
use crate::definition::Backend;
use crate::error::ErrorDetail;
use crate::event::{Event, StatusEvent};
use crate::id::{ExecutionHandle, ExecutionId, StepExecutionId};
use crate::status::Status;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Events that can change a step attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepEvent {
    /// Work was handed to a backend
    Start {
        backend: Backend,
        handle: ExecutionHandle,
    },
    Succeed {
        output: Option<String>,
        exit_code: Option<i32>,
    },
    Fail {
        error: ErrorDetail,
        output: Option<String>,
        exit_code: Option<i32>,
    },
    Cancel {
        reason: String,
    },
    TimedOut {
        message: String,
    },
    /// Run condition evaluated false
    Skip {
        reason: String,
    },
}

/// A single attempt of a single step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepExecution {
    pub id: StepExecutionId,
    pub execution_id: ExecutionId,
    pub step_id: String,
    /// 1-based attempt number
    pub attempt: u32,
    pub status: Status,
    pub backend: Option<Backend>,
    pub handle: Option<ExecutionHandle>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub output: Option<String>,
    pub exit_code: Option<i32>,
    pub error: Option<ErrorDetail>,
}

impl StepExecution {
    /// Create a new attempt in the Pending state
    pub fn new(
        id: impl Into<StepExecutionId>,
        execution_id: ExecutionId,
        step_id: impl Into<String>,
        attempt: u32,
        clock: &impl Clock,
    ) -> Self {
        StepExecution {
            id: id.into(),
            execution_id,
            step_id: step_id.into(),
            attempt,
            status: Status::Pending,
            backend: None,
            handle: None,
            created_at: clock.now(),
            started_at: None,
            completed_at: None,
            output: None,
            exit_code: None,
            error: None,
        }
    }

    /// Storage key: (execution id, step id, attempt)
    pub fn key(&self) -> (ExecutionId, String, u32) {
        (self.execution_id.clone(), self.step_id.clone(), self.attempt)
    }

    /// Pure transition function - returns new state and events
    pub fn transition(&self, event: StepEvent, clock: &impl Clock) -> (StepExecution, Vec<Event>) {
        let now = clock.now();

        match (self.status, event) {
            (Status::Pending, StepEvent::Start { backend, handle }) => {
                let step = StepExecution {
                    status: Status::Running,
                    backend: Some(backend),
                    handle: Some(handle),
                    started_at: Some(now),
                    ..self.clone()
                };
                let events = vec![self.status_event(Status::Running, now)];
                (step, events)
            }

            (Status::Running, StepEvent::Succeed { output, exit_code }) => {
                let step = StepExecution {
                    output,
                    exit_code,
                    ..self.finished(Status::Success, None, now)
                };
                (step, vec![self.status_event(Status::Success, now)])
            }

            (
                Status::Pending | Status::Running,
                StepEvent::Fail {
                    error,
                    output,
                    exit_code,
                },
            ) => {
                let step = StepExecution {
                    output,
                    exit_code,
                    ..self.finished(Status::Failed, Some(error), now)
                };
                (step, vec![self.status_event(Status::Failed, now)])
            }

            (Status::Pending | Status::Running, StepEvent::Cancel { reason }) => {
                let step = self.finished(Status::Cancelled, Some(ErrorDetail::cancelled(reason)), now);
                (step, vec![self.status_event(Status::Cancelled, now)])
            }

            (Status::Pending | Status::Running, StepEvent::TimedOut { message }) => {
                let step = self.finished(Status::Timeout, Some(ErrorDetail::timeout(message)), now);
                (step, vec![self.status_event(Status::Timeout, now)])
            }

            (Status::Pending, StepEvent::Skip { reason }) => {
                let step = StepExecution {
                    output: Some(reason),
                    ..self.finished(Status::Skipped, None, now)
                };
                (step, vec![self.status_event(Status::Skipped, now)])
            }

            // Terminal (or otherwise invalid) transitions - no change
            _ => (self.clone(), vec![]),
        }
    }

    fn finished(&self, status: Status, error: Option<ErrorDetail>, now: DateTime<Utc>) -> StepExecution {
        StepExecution {
            status,
            error,
            completed_at: Some(now),
            ..self.clone()
        }
    }

    fn status_event(&self, new_status: Status, timestamp: DateTime<Utc>) -> Event {
        Event::Status(StatusEvent {
            execution_id: self.execution_id.clone(),
            step_id: Some(self.step_id.clone()),
            attempt: Some(self.attempt),
            old_status: self.status,
            new_status,
            timestamp,
        })
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
#[path = "step_tests.rs"]
mod tests;
