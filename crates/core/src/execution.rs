// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Execution state machine
//!
//! An execution is one run of a pipeline definition. It moves
//! `pending → running → {success, failed, cancelled, timeout}` and never
//! leaves a terminal state; late events (duplicate remote callbacks, a
//! cancel racing completion) leave the record unchanged.

use crate::clock::Clock;
use crate::definition::Trigger;
use crate::error::ErrorDetail;
use crate::event::{Event, StatusEvent};
use crate::id::ExecutionId;
use crate::status::Status;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Events that can change execution state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionEvent {
    /// A stage began; the first one moves the execution to running
    StageStarted { index: usize },
    /// Every stage succeeded
    Succeed,
    /// A stage failed and nothing can recover it
    Fail { error: ErrorDetail },
    /// Explicit user cancellation
    Cancel { reason: String },
    /// The global timeout elapsed
    TimedOut { message: String },
}

/// The authoritative record of a pipeline run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Execution {
    pub id: ExecutionId,
    pub pipeline: String,
    pub trigger: Trigger,
    pub status: Status,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Key of the accumulated log in the log book
    pub log_key: String,
    /// Resolved at launch, immutable afterwards
    pub parameters: BTreeMap<String, String>,
    pub stage_count: usize,
    pub current_stage: Option<usize>,
    /// First stage index this execution runs (non-zero when resumed)
    #[serde(default)]
    pub start_stage: usize,
    #[serde(default)]
    pub resumed_from: Option<ExecutionId>,
    pub error: Option<ErrorDetail>,
}

impl Execution {
    /// Create a new execution in the Pending state
    pub fn new(
        id: impl Into<ExecutionId>,
        pipeline: impl Into<String>,
        trigger: Trigger,
        parameters: BTreeMap<String, String>,
        stage_count: usize,
        clock: &impl Clock,
    ) -> Self {
        let id = id.into();
        Execution {
            log_key: format!("executions/{}", id),
            id,
            pipeline: pipeline.into(),
            trigger,
            status: Status::Pending,
            created_at: clock.now(),
            started_at: None,
            completed_at: None,
            parameters,
            stage_count,
            current_stage: None,
            start_stage: 0,
            resumed_from: None,
            error: None,
        }
    }

    /// Mark this execution as a resume of an earlier one
    pub fn resuming(mut self, previous: ExecutionId, start_stage: usize) -> Self {
        self.resumed_from = Some(previous);
        self.start_stage = start_stage;
        self
    }

    /// Pure transition function - returns new state and events
    pub fn transition(&self, event: ExecutionEvent, clock: &impl Clock) -> (Execution, Vec<Event>) {
        let now = clock.now();

        match (self.status, event) {
            // Pending → Running on the first stage
            (Status::Pending, ExecutionEvent::StageStarted { index }) => {
                let execution = Execution {
                    status: Status::Running,
                    started_at: Some(now),
                    current_stage: Some(index),
                    ..self.clone()
                };
                let events = vec![self.status_event(Status::Running, now)];
                (execution, events)
            }

            // Running: later stages only move the cursor
            (Status::Running, ExecutionEvent::StageStarted { index }) => {
                let execution = Execution {
                    current_stage: Some(index),
                    ..self.clone()
                };
                (execution, vec![])
            }

            // An empty plan succeeds straight from pending
            (Status::Pending | Status::Running, ExecutionEvent::Succeed) => {
                self.finish(Status::Success, None, now)
            }

            (Status::Pending | Status::Running, ExecutionEvent::Fail { error }) => {
                self.finish(Status::Failed, Some(error), now)
            }

            (Status::Pending | Status::Running, ExecutionEvent::Cancel { reason }) => {
                self.finish(Status::Cancelled, Some(ErrorDetail::cancelled(reason)), now)
            }

            (Status::Pending | Status::Running, ExecutionEvent::TimedOut { message }) => {
                self.finish(Status::Timeout, Some(ErrorDetail::timeout(message)), now)
            }

            // Terminal (or otherwise invalid) transitions - no change
            _ => (self.clone(), vec![]),
        }
    }

    fn finish(
        &self,
        status: Status,
        error: Option<ErrorDetail>,
        now: DateTime<Utc>,
    ) -> (Execution, Vec<Event>) {
        let execution = Execution {
            status,
            error,
            started_at: self.started_at.or(Some(now)),
            completed_at: Some(now),
            ..self.clone()
        };
        let events = vec![self.status_event(status, now)];
        (execution, events)
    }

    fn status_event(&self, new_status: Status, timestamp: DateTime<Utc>) -> Event {
        Event::Status(StatusEvent {
            execution_id: self.id.clone(),
            step_id: None,
            attempt: None,
            old_status: self.status,
            new_status,
            timestamp,
        })
    }

    /// Check if execution is terminal
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Check if a failed run can be resumed
    pub fn is_resumable(&self) -> bool {
        matches!(
            self.status,
            Status::Failed | Status::Timeout | Status::Cancelled
        )
    }
}

#[cfg(test)]
#[path = "execution_tests.rs"]
mod tests;
