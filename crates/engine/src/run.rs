// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The per-execution task: stages in order, groups within a stage at once

use crate::config::EngineConfig;
use crate::coordinator::{run_group, GroupResult, StepRunner};
use crate::interrupt::{Interrupt, StopReason};
use crate::recorder::Recorder;
use crate::supervisor::StepSupervisor;
use pw_adapters::{BackendAdapter, ProviderArtifact};
use pw_core::{
    Clock, ErrorDetail, ErrorKind, Event, Execution, ExecutionEvent, ExprContext, IdGen, PipelineDefinition,
    Stage, Status, StepExecution, StepOutcome,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::Instrument;

/// The adapter a stage runs on and what it prepared for this pipeline
#[derive(Clone)]
pub(crate) struct Route {
    pub adapter: Arc<dyn BackendAdapter>,
    pub artifact: Arc<ProviderArtifact>,
}

pub(crate) struct ExecutionRun<C: Clock, I: IdGen> {
    pub execution: Execution,
    pub definition: Arc<PipelineDefinition>,
    pub stages: Vec<Stage>,
    /// One per stage
    pub routes: Vec<Route>,
    /// Outcomes carried over from the execution this one resumes
    pub prior: BTreeMap<String, StepOutcome>,
    pub recorder: Arc<Recorder<C>>,
    pub config: Arc<EngineConfig>,
    pub id_gen: I,
    pub workers: Arc<Semaphore>,
    pub interrupt: Arc<Interrupt>,
}

pub(crate) fn outcome(attempt: &StepExecution) -> StepOutcome {
    StepOutcome {
        status: attempt.status,
        output: attempt.output.clone(),
        exit_code: attempt.exit_code,
    }
}

impl<C: Clock, I: IdGen> ExecutionRun<C, I> {
    pub async fn run(self) -> Option<Execution> {
        let span = tracing::info_span!(
            "execution",
            execution_id = %self.execution.id,
            pipeline = %self.execution.pipeline,
        );
        self.run_stages().instrument(span).await
    }

    async fn run_stages(self) -> Option<Execution> {
        let started = Instant::now();
        let id = self.execution.id.clone();
        tracing::info!(
            stages = self.stages.len(),
            start_stage = self.execution.start_stage,
            "execution started"
        );

        let timer = self.definition.timeout.map(|timeout| {
            let interrupt = Arc::clone(&self.interrupt);
            tokio::spawn(async move {
                tokio::select! {
                    _ = tokio::time::sleep(timeout) => {
                        tracing::info!(timeout_ms = timeout.as_millis() as u64, "execution timed out");
                        interrupt.stop(StopReason::ExecutionTimeout);
                    }
                    _ = interrupt.stopped() => {}
                }
            })
        });

        let mut outcomes = self.prior.clone();
        let mut failure = None;
        let mut finished_all = true;
        for (index, stage) in self.stages.iter().enumerate() {
            if index < self.execution.start_stage {
                continue;
            }
            if self.interrupt.is_stopped() {
                finished_all = false;
                break;
            }
            let Some(route) = self.routes.get(index) else {
                failure = Some(ErrorDetail::new(
                    ErrorKind::Adapter,
                    format!("no backend routed for stage {}", stage.index),
                ));
                finished_all = false;
                break;
            };

            self.advance(ExecutionEvent::StageStarted { index }).await?;
            self.recorder
                .emit(vec![Event::StageStarted {
                    execution_id: id.clone(),
                    index,
                    stage: stage.index,
                }])
                .await;

            let results = self.run_stage(stage, route, &outcomes).await;
            let status = results
                .iter()
                .find(|g| !g.is_success())
                .map(|g| g.status)
                .unwrap_or(Status::Success);
            self.recorder
                .emit(vec![Event::StageFinished {
                    execution_id: id.clone(),
                    index,
                    stage: stage.index,
                    status,
                }])
                .await;

            let latest = self.recorder.latest_attempts(&id);
            for step in stage.steps() {
                if let Some(attempt) = latest.get(&step.id) {
                    outcomes.insert(step.id.clone(), outcome(attempt));
                }
            }

            if let Some(group) = results.iter().find(|g| !g.is_success()) {
                failure = Some(group_failure(stage, group));
                finished_all = false;
                break;
            }
        }

        if let Some(timer) = timer {
            timer.abort();
        }

        let event = match (self.interrupt.reason(), failure) {
            _ if finished_all => ExecutionEvent::Succeed,
            (Some(StopReason::ExecutionTimeout), _) => ExecutionEvent::TimedOut {
                message: StopReason::ExecutionTimeout.message().to_string(),
            },
            (Some(reason), _) => ExecutionEvent::Cancel {
                reason: reason.message().to_string(),
            },
            (None, Some(error)) => ExecutionEvent::Fail { error },
            (None, None) => ExecutionEvent::Fail {
                error: ErrorDetail::step("execution stopped before its last stage"),
            },
        };
        let execution = self.advance(event).await?;
        tracing::info!(
            status = %execution.status,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "execution finished"
        );
        Some(execution)
    }

    async fn run_stage(
        &self,
        stage: &Stage,
        route: &Route,
        outcomes: &BTreeMap<String, StepOutcome>,
    ) -> Vec<GroupResult> {
        let context = ExprContext {
            steps: outcomes.clone(),
            ..ExprContext::new(
                self.definition.environment.clone(),
                self.execution.parameters.clone(),
            )
        };
        let runner: Arc<dyn StepRunner> = Arc::new(StepSupervisor {
            execution_id: self.execution.id.clone(),
            recorder: Arc::clone(&self.recorder),
            adapter: Arc::clone(&route.adapter),
            artifact: Arc::clone(&route.artifact),
            context: Arc::new(context),
            config: Arc::clone(&self.config),
            id_gen: self.id_gen.clone(),
            workers: Arc::clone(&self.workers),
        });

        let mut groups = JoinSet::new();
        for group in &stage.groups {
            let group = group.clone();
            let runner = Arc::clone(&runner);
            let interrupt = Arc::clone(&self.interrupt);
            groups.spawn(async move { run_group(&group, runner, &interrupt).await }.in_current_span());
        }

        let mut results = Vec::new();
        while let Some(joined) = groups.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(e) => tracing::error!(stage = stage.index, error = %e, "group task ended abnormally"),
            }
        }
        if results.len() < stage.groups.len() {
            // A lost group cannot be reported as passing
            results.push(GroupResult {
                group_id: "unknown".to_string(),
                status: Status::Failed,
                timed_out: false,
                results: Vec::new(),
            });
        }
        results.sort_by_key(|r| stage.groups.iter().position(|g| g.id == r.group_id));
        results
    }

    /// Commit an execution event and emit what it produced
    async fn advance(&self, event: ExecutionEvent) -> Option<Execution> {
        match self.recorder.transition_execution(&self.execution.id, event) {
            Ok((execution, events)) => {
                self.recorder.emit(events).await;
                Some(execution)
            }
            Err(e) => {
                tracing::error!(error = %e, "could not record execution state");
                self.interrupt.stop(StopReason::Cancelled);
                None
            }
        }
    }
}

fn group_failure(stage: &Stage, group: &GroupResult) -> ErrorDetail {
    let label = if group.group_id == "unknown" {
        "a parallel group".to_string()
    } else {
        format!("group {}", group.group_id)
    };
    if group.timed_out {
        return ErrorDetail::timeout(format!("stage {}: {} timed out", stage.index, label));
    }
    let failed = group.failed_steps();
    if failed.is_empty() {
        ErrorDetail::step(format!("stage {}: {} failed", stage.index, label))
    } else {
        ErrorDetail::step(format!(
            "stage {}: {} failed (steps: {})",
            stage.index,
            label,
            failed.join(", ")
        ))
    }
}

#[cfg(test)]
#[path = "run_tests.rs"]
mod tests;
