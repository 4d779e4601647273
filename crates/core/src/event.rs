// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Events emitted to the notification collaborator

use crate::id::ExecutionId;
use crate::status::Status;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single status transition of an execution or a step attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEvent {
    pub execution_id: ExecutionId,
    /// None for execution-level transitions
    pub step_id: Option<String>,
    pub attempt: Option<u32>,
    pub old_status: Status,
    pub new_status: Status,
    pub timestamp: DateTime<Utc>,
}

/// Events produced while an execution advances
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    Status(StatusEvent),
    StageStarted {
        execution_id: ExecutionId,
        index: usize,
        stage: u32,
    },
    StageFinished {
        execution_id: ExecutionId,
        index: usize,
        stage: u32,
        status: Status,
    },
    LogAppended {
        execution_id: ExecutionId,
        #[serde(default)]
        step_id: Option<String>,
        text: String,
    },
}

impl Event {
    /// Event name for log spans and subscription filters
    pub fn name(&self) -> &'static str {
        match self {
            Event::Status(e) if e.step_id.is_some() => "step:status",
            Event::Status(_) => "execution:status",
            Event::StageStarted { .. } => "stage:started",
            Event::StageFinished { .. } => "stage:finished",
            Event::LogAppended { .. } => "log:appended",
        }
    }

    pub fn execution_id(&self) -> &ExecutionId {
        match self {
            Event::Status(e) => &e.execution_id,
            Event::StageStarted { execution_id, .. }
            | Event::StageFinished { execution_id, .. }
            | Event::LogAppended { execution_id, .. } => execution_id,
        }
    }

    /// Get the status transition, if this is one
    pub fn as_status(&self) -> Option<&StatusEvent> {
        match self {
            Event::Status(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
