// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Materialized state from WAL replay

use crate::logs::LogBook;
use pw_core::{Execution, ExecutionId, Operation, StepExecution};
use std::collections::{BTreeMap, HashMap};

/// Attempt records keyed by (execution, step, attempt)
type AttemptKey = (ExecutionId, String, u32);

/// Materialized state built from WAL operations
#[derive(Debug, Default)]
pub struct MaterializedState {
    pub executions: HashMap<ExecutionId, Execution>,
    pub attempts: BTreeMap<AttemptKey, StepExecution>,
    pub logs: LogBook,
}

impl MaterializedState {
    /// Get an execution by ID or unique prefix (like git commit hashes)
    pub fn get_execution(&self, id: &str) -> Option<&Execution> {
        if let Some(execution) = self.executions.get(&ExecutionId::from(id)) {
            return Some(execution);
        }

        let matches: Vec<_> = self
            .executions
            .iter()
            .filter(|(k, _)| k.as_str().starts_with(id))
            .collect();

        if matches.len() == 1 {
            Some(matches[0].1)
        } else {
            None
        }
    }

    /// Every attempt of one execution, ordered by step id then attempt
    pub fn attempts_for(&self, execution_id: &ExecutionId) -> Vec<&StepExecution> {
        let from = (execution_id.clone(), String::new(), 0);
        self.attempts
            .range(from..)
            .take_while(|(key, _)| &key.0 == execution_id)
            .map(|(_, step)| step)
            .collect()
    }

    /// Every attempt of one step
    pub fn step_attempts(&self, execution_id: &ExecutionId, step_id: &str) -> Vec<&StepExecution> {
        let from = (execution_id.clone(), step_id.to_string(), 0);
        let to = (execution_id.clone(), step_id.to_string(), u32::MAX);
        self.attempts.range(from..=to).map(|(_, s)| s).collect()
    }

    /// The authoritative (highest-numbered) attempt of each step
    pub fn latest_attempts(&self, execution_id: &ExecutionId) -> BTreeMap<String, &StepExecution> {
        let mut latest = BTreeMap::new();
        // Range order puts higher attempts last, so later inserts win
        for step in self.attempts_for(execution_id) {
            latest.insert(step.step_id.clone(), step);
        }
        latest
    }

    /// Apply an operation to update the state
    ///
    /// Execution and attempt records carry full values, so those are upserts.
    pub fn apply(&mut self, op: &Operation) {
        match op {
            Operation::ExecutionCreated { execution } | Operation::ExecutionUpdated { execution } => {
                self.executions
                    .insert(execution.id.clone(), execution.clone());
            }

            Operation::StepAttemptCreated { step } | Operation::StepAttemptUpdated { step } => {
                self.attempts.insert(step.key(), step.clone());
            }

            Operation::LogAppended {
                execution_id,
                step_id,
                text,
            } => {
                self.logs.append(execution_id, step_id.as_deref(), text);
            }
        }
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
