// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Operations for the write-ahead log
//!
//! Every state change the engine commits is one of these. Records carry the
//! full post-transition value, so replay is a plain upsert and applying the
//! same operation twice is harmless.

use crate::execution::Execution;
use crate::id::ExecutionId;
use crate::step::StepExecution;
use serde::{Deserialize, Serialize};

/// Operations that can be persisted to the WAL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    /// A new execution was created
    ExecutionCreated { execution: Execution },

    /// An execution changed state
    ExecutionUpdated { execution: Execution },

    /// A new step attempt was created
    StepAttemptCreated { step: StepExecution },

    /// A step attempt changed state
    StepAttemptUpdated { step: StepExecution },

    /// Log text was appended for an execution (and optionally one step)
    LogAppended {
        execution_id: ExecutionId,
        #[serde(default)]
        step_id: Option<String>,
        text: String,
    },
}

impl Operation {
    /// The execution this operation belongs to
    pub fn execution_id(&self) -> &ExecutionId {
        match self {
            Operation::ExecutionCreated { execution } | Operation::ExecutionUpdated { execution } => {
                &execution.id
            }
            Operation::StepAttemptCreated { step } | Operation::StepAttemptUpdated { step } => {
                &step.execution_id
            }
            Operation::LogAppended { execution_id, .. } => execution_id,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Operation::ExecutionCreated { .. } => "execution_created",
            Operation::ExecutionUpdated { .. } => "execution_updated",
            Operation::StepAttemptCreated { .. } => "step_attempt_created",
            Operation::StepAttemptUpdated { .. } => "step_attempt_updated",
            Operation::LogAppended { .. } => "log_appended",
        }
    }
}

#[cfg(test)]
#[path = "operation_tests.rs"]
mod tests;
