// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Single writer for execution state
//!
//! Every record change goes through the [`Recorder`]: the state machine
//! computes the next value, the store appends it to the WAL, and only then
//! are the resulting events handed to the notification sinks. Commits are
//! synchronous so callers can run them under an interrupt lock; emission is
//! a separate async step.

use crate::error::EngineError;
use pw_adapters::NotifyAdapter;
use pw_core::{
    Clock, Event, Execution, ExecutionEvent, ExecutionId, Operation, StepEvent, StepExecution,
};
use pw_storage::{LogChunk, Store};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// An execution and every attempt recorded for it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionSnapshot {
    pub execution: Execution,
    /// Ordered by step id, then attempt
    pub attempts: Vec<StepExecution>,
}

impl ExecutionSnapshot {
    /// The latest attempt of each step
    pub fn latest(&self) -> BTreeMap<&str, &StepExecution> {
        let mut latest = BTreeMap::new();
        for attempt in &self.attempts {
            latest.insert(attempt.step_id.as_str(), attempt);
        }
        latest
    }

    pub fn attempts_of(&self, step_id: &str) -> Vec<&StepExecution> {
        self.attempts.iter().filter(|a| a.step_id == step_id).collect()
    }
}

pub struct Recorder<C: Clock> {
    store: Mutex<Store>,
    sinks: Mutex<Vec<Arc<dyn NotifyAdapter>>>,
    clock: C,
}

impl<C: Clock> Recorder<C> {
    pub fn new(store: Store, clock: C) -> Self {
        Self {
            store: Mutex::new(store),
            sinks: Mutex::new(Vec::new()),
            clock,
        }
    }

    pub fn add_sink(&self, sink: Arc<dyn NotifyAdapter>) {
        self.sinks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(sink);
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn create_execution(&self, execution: Execution) -> Result<Execution, EngineError> {
        self.store().commit(Operation::ExecutionCreated {
            execution: execution.clone(),
        })?;
        Ok(execution)
    }

    /// Apply an event to an execution and persist the result
    ///
    /// Events against a terminal execution are dropped.
    pub fn transition_execution(
        &self,
        id: &ExecutionId,
        event: ExecutionEvent,
    ) -> Result<(Execution, Vec<Event>), EngineError> {
        let mut store = self.store();
        let current = store
            .state()
            .executions
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(id.to_string()))?;
        if current.is_terminal() {
            tracing::debug!(execution_id = %id, status = %current.status, "ignoring event for finished execution");
            return Ok((current, vec![]));
        }

        let (next, events) = current.transition(event, &self.clock);
        if next != current {
            store.commit(Operation::ExecutionUpdated {
                execution: next.clone(),
            })?;
        }
        Ok((next, events))
    }

    pub fn create_attempt(&self, attempt: StepExecution) -> Result<StepExecution, EngineError> {
        self.store().commit(Operation::StepAttemptCreated {
            step: attempt.clone(),
        })?;
        Ok(attempt)
    }

    /// Apply an event to one attempt and persist the result
    pub fn transition_attempt(
        &self,
        attempt: &StepExecution,
        event: StepEvent,
    ) -> Result<(StepExecution, Vec<Event>), EngineError> {
        let mut store = self.store();
        let key = attempt.key();
        let current = store
            .state()
            .attempts
            .get(&key)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(format!("{}/{}#{}", key.0, key.1, key.2)))?;
        if current.is_terminal() {
            tracing::debug!(
                execution_id = %key.0,
                step_id = %key.1,
                attempt = key.2,
                status = %current.status,
                "ignoring event for finished attempt"
            );
            return Ok((current, vec![]));
        }

        let (next, events) = current.transition(event, &self.clock);
        if next != current {
            store.commit(Operation::StepAttemptUpdated { step: next.clone() })?;
        }
        Ok((next, events))
    }

    pub fn append_log(
        &self,
        execution_id: &ExecutionId,
        step_id: Option<&str>,
        text: &str,
    ) -> Result<Option<Event>, EngineError> {
        if text.is_empty() {
            return Ok(None);
        }
        self.store().commit(Operation::LogAppended {
            execution_id: execution_id.clone(),
            step_id: step_id.map(str::to_string),
            text: text.to_string(),
        })?;
        Ok(Some(Event::LogAppended {
            execution_id: execution_id.clone(),
            step_id: step_id.map(str::to_string),
            text: text.to_string(),
        }))
    }

    /// Hand events to every sink; delivery failures are logged, not raised
    pub async fn emit(&self, events: Vec<Event>) {
        if events.is_empty() {
            return;
        }
        let sinks = self
            .sinks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        for event in &events {
            for sink in &sinks {
                if let Err(e) = sink.notify(event).await {
                    tracing::warn!(event = event.name(), error = %e, "event not delivered");
                }
            }
        }
    }

    pub fn execution(&self, id: &str) -> Option<Execution> {
        self.store().state().get_execution(id).cloned()
    }

    pub fn snapshot(&self, id: &str) -> Option<ExecutionSnapshot> {
        let store = self.store();
        let state = store.state();
        let execution = state.get_execution(id)?.clone();
        let attempts = state
            .attempts_for(&execution.id)
            .into_iter()
            .cloned()
            .collect();
        Some(ExecutionSnapshot {
            execution,
            attempts,
        })
    }

    pub fn latest_attempts(&self, id: &ExecutionId) -> BTreeMap<String, StepExecution> {
        self.store()
            .state()
            .latest_attempts(id)
            .into_iter()
            .map(|(step, attempt)| (step, attempt.clone()))
            .collect()
    }

    pub fn logs(&self, id: &ExecutionId, step_id: Option<&str>, cursor: usize) -> LogChunk {
        self.store().state().logs.read(id, step_id, cursor)
    }

    /// Every execution, oldest first
    pub fn executions(&self) -> Vec<Execution> {
        let store = self.store();
        let mut executions: Vec<Execution> = store.state().executions.values().cloned().collect();
        executions.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        executions
    }

    /// Executions that were still pending or running when state was loaded
    pub fn unfinished(&self) -> Vec<Execution> {
        self.executions()
            .into_iter()
            .filter(|e| !e.is_terminal())
            .collect()
    }

    fn store(&self) -> MutexGuard<'_, Store> {
        self.store.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
#[path = "recorder_tests.rs"]
mod tests;
