// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Parallel group coordination
//!
//! Members of a group start together and are combined under the group's
//! sync policy. The coordinator never records step outcomes itself; the
//! [`StepRunner`] persists each member before handing back its result.

use crate::interrupt::{Interrupt, StopReason};
use async_trait::async_trait;
use pw_core::{PlannedGroup, Status, StepSpec, SyncPolicy};
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio::time::Instant;

/// Final outcome of one group member
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepResult {
    pub step_id: String,
    pub status: Status,
    pub allow_failure: bool,
}

impl StepResult {
    pub fn new(step: &StepSpec, status: Status) -> Self {
        Self {
            step_id: step.id.clone(),
            status,
            allow_failure: step.allow_failure,
        }
    }

    /// Success, skip, or a best-effort step that finished any way at all
    pub fn is_ok(&self) -> bool {
        self.status.is_successful() || (self.allow_failure && self.status.is_terminal())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupResult {
    pub group_id: String,
    /// Success or Failed
    pub status: Status,
    /// The group's own timeout ended it
    pub timed_out: bool,
    /// Members that finished before the group did, in member order
    pub results: Vec<StepResult>,
}

impl GroupResult {
    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }

    pub fn failed_steps(&self) -> Vec<&str> {
        self.results
            .iter()
            .filter(|r| !r.is_ok())
            .map(|r| r.step_id.as_str())
            .collect()
    }
}

/// Whether a finished group passed under its sync policy, judged from the
/// recorded status of each member
pub fn group_passed(group: &PlannedGroup, status_of: impl Fn(&str) -> Option<Status>) -> bool {
    let results: Vec<StepResult> = group
        .steps
        .iter()
        .filter_map(|step| Some(StepResult::new(step, status_of(&step.id)?)))
        .collect();
    let all_ok = results.len() == group.steps.len() && results.iter().all(StepResult::is_ok);
    match group.policy {
        SyncPolicy::WaitAny => all_ok || results.iter().any(|r| r.status.is_successful()),
        SyncPolicy::WaitAll | SyncPolicy::FailFast => all_ok,
    }
}

/// Runs one step to completion, persisting every attempt
#[async_trait]
pub trait StepRunner: Send + Sync + 'static {
    /// With `stop_on_failure`, the step's final failure stops `interrupt`
    /// in the same commit that records it.
    async fn run_step(
        &self,
        step: StepSpec,
        interrupt: Arc<Interrupt>,
        stop_on_failure: bool,
    ) -> StepResult;
}

/// Run every member of a group and combine their results
pub async fn run_group(
    group: &PlannedGroup,
    runner: Arc<dyn StepRunner>,
    parent: &Arc<Interrupt>,
) -> GroupResult {
    let interrupt = parent.child();
    let stop_on_failure = group.policy == SyncPolicy::FailFast;

    let mut tasks = JoinSet::new();
    for step in &group.steps {
        let runner = Arc::clone(&runner);
        let interrupt = Arc::clone(&interrupt);
        let step = step.clone();
        tasks.spawn(async move { runner.run_step(step, interrupt, stop_on_failure).await });
    }
    tracing::debug!(
        group = %group.id,
        policy = group.policy.as_str(),
        members = group.steps.len(),
        "group started"
    );

    let deadline = group.timeout.map(|t| Instant::now() + t);
    let mut timed_out = false;
    let mut winner = false;
    let mut results = Vec::new();

    loop {
        let next = match deadline.filter(|_| !timed_out) {
            Some(deadline) => tokio::select! {
                next = tasks.join_next() => Some(next),
                _ = tokio::time::sleep_until(deadline) => None,
            },
            None => Some(tasks.join_next().await),
        };
        let Some(next) = next else {
            tracing::info!(group = %group.id, "group timed out");
            timed_out = true;
            interrupt.stop(StopReason::GroupTimeout);
            continue;
        };
        let Some(joined) = next else { break };

        let result = match joined {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(group = %group.id, error = %e, "step task ended abnormally");
                continue;
            }
        };

        let won = group.policy == SyncPolicy::WaitAny && result.status.is_successful();
        results.push(result);
        if won {
            winner = true;
            interrupt.stop(StopReason::Superseded);
            // Losers record their cancellation without holding up the group
            let mut losers = std::mem::take(&mut tasks);
            tokio::spawn(async move { while losers.join_next().await.is_some() {} });
            break;
        }
    }

    results.sort_by_key(|r| group.steps.iter().position(|s| s.id == r.step_id));
    let all_ok = results.len() == group.steps.len() && results.iter().all(StepResult::is_ok);
    let status = if winner {
        Status::Success
    } else if timed_out {
        Status::Failed
    } else if all_ok {
        // For wait_any this means every member was a best-effort failure
        Status::Success
    } else {
        Status::Failed
    };

    tracing::info!(group = %group.id, status = %status, "group finished");
    GroupResult {
        group_id: group.id.clone(),
        status,
        timed_out: timed_out && !winner,
        results,
    }
}

#[cfg(test)]
#[path = "coordinator_tests.rs"]
mod tests;
