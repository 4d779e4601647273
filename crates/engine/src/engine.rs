// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine entrypoints
//!
//! [`Engine::execute`] does all of its checking up front: a definition that
//! does not resolve, a parameter set that fails its schema, or a backend
//! that fails its health check is rejected before any record exists. From
//! then on every outcome is recorded on the execution.

use crate::config::EngineConfig;
use crate::coordinator::group_passed;
use crate::error::EngineError;
use crate::interrupt::{Interrupt, StopReason};
use crate::recorder::{ExecutionSnapshot, Recorder};
use crate::run::{outcome, ExecutionRun, Route};
use pw_adapters::{AdapterRegistry, ChannelNotifyAdapter, NotifyAdapter, ProviderArtifact};
use pw_core::{
    Backend, Clock, ErrorDetail, Event, Execution, ExecutionEvent, ExecutionId, IdGen,
    PipelineDefinition, Stage, StepOutcome, Trigger, TriggerKind,
};
use pw_pipeline::{stage_backend, validate};
use pw_storage::{LogChunk, Store};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, watch, Semaphore};

struct Running {
    interrupt: Arc<Interrupt>,
    done: watch::Receiver<bool>,
}

struct EngineInner<C: Clock, I: IdGen> {
    registry: AdapterRegistry,
    recorder: Arc<Recorder<C>>,
    config: Arc<EngineConfig>,
    id_gen: I,
    workers: Arc<Semaphore>,
    channel: ChannelNotifyAdapter,
    running: Mutex<HashMap<ExecutionId, Running>>,
    /// Definitions of executions started by this engine, for resume
    definitions: Mutex<HashMap<ExecutionId, Arc<PipelineDefinition>>>,
}

/// Orchestrates pipeline executions across the configured backends
pub struct Engine<C: Clock, I: IdGen> {
    inner: Arc<EngineInner<C, I>>,
}

impl<C: Clock, I: IdGen> Clone for Engine<C, I> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: Clock, I: IdGen> Engine<C, I> {
    pub fn new(
        registry: AdapterRegistry,
        store: Store,
        config: EngineConfig,
        clock: C,
        id_gen: I,
    ) -> Self {
        let recorder = Arc::new(Recorder::new(store, clock));
        let channel = ChannelNotifyAdapter::default();
        recorder.add_sink(Arc::new(channel.clone()));
        Self {
            inner: Arc::new(EngineInner {
                registry,
                recorder,
                workers: Arc::new(Semaphore::new(config.max_workers)),
                config: Arc::new(config),
                id_gen,
                channel,
                running: Mutex::new(HashMap::new()),
                definitions: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Also deliver every event to `sink`
    pub fn with_notify(self, sink: Arc<dyn NotifyAdapter>) -> Self {
        self.inner.recorder.add_sink(sink);
        self
    }

    /// Start an execution and return its pending record
    pub async fn execute(
        &self,
        definition: Arc<PipelineDefinition>,
        trigger: Trigger,
    ) -> Result<Execution, EngineError> {
        if !definition.accepts(trigger.kind) {
            return Err(EngineError::TriggerRejected {
                pipeline: definition.name.clone(),
                trigger: trigger.kind,
            });
        }
        let stages = validate(&definition)?;
        let routes = self.route(&definition, &stages).await?;

        let parameters = definition.resolve_parameters(&trigger);
        let execution = Execution::new(
            self.inner.id_gen.next(),
            definition.name.clone(),
            trigger,
            parameters,
            stages.len(),
            self.inner.recorder.clock(),
        );
        self.start(execution, definition, stages, routes, BTreeMap::new())
    }

    /// Resume a failed, timed-out, or cancelled execution started by this engine
    pub async fn resume(&self, id: &ExecutionId) -> Result<Execution, EngineError> {
        let previous = self
            .inner
            .recorder
            .execution(id.as_str())
            .ok_or_else(|| EngineError::NotFound(id.to_string()))?;
        if !previous.is_resumable() {
            return Err(EngineError::NotResumable {
                id: previous.id,
                status: previous.status,
            });
        }
        let definition = self
            .lock_definitions()
            .get(&previous.id)
            .cloned()
            .ok_or_else(|| EngineError::DefinitionMissing(previous.id.clone()))?;
        self.resume_with(id, definition).await
    }

    /// Resume with an explicitly supplied definition (e.g. after a restart)
    pub async fn resume_with(
        &self,
        id: &ExecutionId,
        definition: Arc<PipelineDefinition>,
    ) -> Result<Execution, EngineError> {
        let previous = self
            .inner
            .recorder
            .execution(id.as_str())
            .ok_or_else(|| EngineError::NotFound(id.to_string()))?;
        if !previous.is_resumable() {
            return Err(EngineError::NotResumable {
                id: previous.id,
                status: previous.status,
            });
        }
        if definition.name != previous.pipeline {
            return Err(EngineError::DefinitionMismatch {
                expected: previous.pipeline,
                given: definition.name.clone(),
            });
        }

        let stages = validate(&definition)?;
        let outcomes = self.carried_outcomes(&previous);
        let start_stage = stages
            .iter()
            .position(|stage| !stage_passed(stage, &outcomes))
            .ok_or_else(|| EngineError::NotResumable {
                id: previous.id.clone(),
                status: previous.status,
            })?;
        let prior = stages[..start_stage]
            .iter()
            .flat_map(Stage::steps)
            .filter_map(|step| Some((step.id.clone(), outcomes.get(&step.id)?.clone())))
            .collect();
        let routes = self.route(&definition, &stages).await?;

        let trigger = Trigger {
            kind: TriggerKind::Resume,
            actor: previous.trigger.actor.clone(),
            parameters: previous.trigger.parameters.clone(),
        };
        let execution = Execution::new(
            self.inner.id_gen.next(),
            definition.name.clone(),
            trigger,
            previous.parameters.clone(),
            stages.len(),
            self.inner.recorder.clock(),
        )
        .resuming(previous.id.clone(), start_stage);
        tracing::info!(
            resumed_from = %previous.id,
            execution_id = %execution.id,
            start_stage,
            "resuming execution"
        );
        self.start(execution, definition, stages, routes, prior)
    }

    /// Request cancellation; false if the execution is not running
    pub fn cancel(&self, id: &ExecutionId) -> bool {
        let Some(id) = self.resolve_id(id.as_str()) else {
            return false;
        };
        let running = self.lock_running();
        match running.get(&id) {
            Some(run) => {
                let first = run.interrupt.stop(StopReason::Cancelled);
                if first {
                    tracing::info!(execution_id = %id, "cancellation requested");
                }
                first
            }
            None => false,
        }
    }

    /// The execution record and every attempt; ids may be unique prefixes
    pub fn status(&self, id: &ExecutionId) -> Option<ExecutionSnapshot> {
        self.inner.recorder.snapshot(id.as_str())
    }

    /// Accumulated log text after `cursor`, for one step or the whole run
    pub fn logs(&self, id: &ExecutionId, step_id: Option<&str>, cursor: usize) -> LogChunk {
        match self.resolve_id(id.as_str()) {
            Some(id) => self.inner.recorder.logs(&id, step_id, cursor),
            None => LogChunk {
                text: String::new(),
                cursor,
            },
        }
    }

    /// Wait for an execution to finish and return its final record
    pub async fn wait(&self, id: &ExecutionId) -> Option<Execution> {
        let id = self.resolve_id(id.as_str())?;
        let done = self.lock_running().get(&id).map(|r| r.done.clone());
        if let Some(mut done) = done {
            while !*done.borrow_and_update() {
                if done.changed().await.is_err() {
                    break;
                }
            }
        }
        self.inner.recorder.execution(id.as_str())
    }

    /// Every event the engine emits from now on
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.inner.channel.subscribe()
    }

    /// Every known execution, oldest first
    pub fn executions(&self) -> Vec<Execution> {
        self.inner.recorder.executions()
    }

    pub async fn health(&self) -> Vec<(Backend, bool)> {
        self.inner.registry.health_report().await
    }

    /// The provider artifact `backend` would run for this definition
    pub fn render(
        &self,
        definition: &PipelineDefinition,
        backend: Backend,
    ) -> Result<ProviderArtifact, EngineError> {
        validate(definition)?;
        Ok(self.inner.registry.get(backend)?.prepare(definition)?)
    }

    /// Fail executions a previous process left unfinished so they can be resumed
    pub async fn recover(&self) -> Vec<ExecutionId> {
        let mut recovered = Vec::new();
        for execution in self.inner.recorder.unfinished() {
            if self.lock_running().contains_key(&execution.id) {
                continue;
            }
            let event = ExecutionEvent::Fail {
                error: ErrorDetail::step("engine stopped before the execution finished"),
            };
            match self.inner.recorder.transition_execution(&execution.id, event) {
                Ok((_, events)) => {
                    self.inner.recorder.emit(events).await;
                    tracing::warn!(execution_id = %execution.id, "marked interrupted execution failed");
                    recovered.push(execution.id);
                }
                Err(e) => tracing::error!(execution_id = %execution.id, error = %e, "recovery failed"),
            }
        }
        recovered
    }

    /// Pick, health-check, and prepare the backend of every stage
    async fn route(
        &self,
        definition: &PipelineDefinition,
        stages: &[Stage],
    ) -> Result<Vec<Route>, EngineError> {
        let mut prepared: BTreeMap<Backend, Route> = BTreeMap::new();
        let mut routes = Vec::with_capacity(stages.len());
        for stage in stages {
            let backend = stage_backend(definition.execution_mode, stage)?;
            if !prepared.contains_key(&backend) {
                let adapter = self.inner.registry.ensure_healthy(backend).await?;
                let artifact = Arc::new(adapter.prepare(definition)?);
                prepared.insert(backend, Route { adapter, artifact });
            }
            if let Some(route) = prepared.get(&backend) {
                routes.push(route.clone());
            }
        }
        Ok(routes)
    }

    fn start(
        &self,
        execution: Execution,
        definition: Arc<PipelineDefinition>,
        stages: Vec<Stage>,
        routes: Vec<Route>,
        prior: BTreeMap<String, StepOutcome>,
    ) -> Result<Execution, EngineError> {
        let execution = self.inner.recorder.create_execution(execution)?;
        let id = execution.id.clone();
        self.lock_definitions()
            .insert(id.clone(), Arc::clone(&definition));

        let interrupt = Interrupt::new();
        let (done_tx, done_rx) = watch::channel(false);
        self.lock_running().insert(
            id.clone(),
            Running {
                interrupt: Arc::clone(&interrupt),
                done: done_rx,
            },
        );

        let run = ExecutionRun {
            execution: execution.clone(),
            definition,
            stages,
            routes,
            prior,
            recorder: Arc::clone(&self.inner.recorder),
            config: Arc::clone(&self.inner.config),
            id_gen: self.inner.id_gen.clone(),
            workers: Arc::clone(&self.inner.workers),
            interrupt,
        };
        let engine = self.clone();
        tokio::spawn(async move {
            run.run().await;
            // Only resumable executions need their definition again
            let resumable = engine
                .inner
                .recorder
                .execution(id.as_str())
                .is_some_and(|e| e.is_resumable());
            if !resumable {
                engine.lock_definitions().remove(&id);
            }
            engine.lock_running().remove(&id);
            let _ = done_tx.send(true);
        });

        Ok(execution)
    }

    /// Latest outcome of every step across the chain of resumed executions
    fn carried_outcomes(&self, execution: &Execution) -> BTreeMap<String, StepOutcome> {
        let mut chain = vec![execution.id.clone()];
        let mut cursor = execution.resumed_from.clone();
        while let Some(id) = cursor {
            if chain.contains(&id) {
                break;
            }
            cursor = self
                .inner
                .recorder
                .execution(id.as_str())
                .and_then(|e| e.resumed_from);
            chain.push(id);
        }

        let mut outcomes = BTreeMap::new();
        for id in chain.iter().rev() {
            for (step, attempt) in self.inner.recorder.latest_attempts(id) {
                outcomes.insert(step, outcome(&attempt));
            }
        }
        outcomes
    }

    fn resolve_id(&self, id: &str) -> Option<ExecutionId> {
        self.inner.recorder.execution(id).map(|e| e.id)
    }

    fn lock_running(&self) -> std::sync::MutexGuard<'_, HashMap<ExecutionId, Running>> {
        self.inner.running.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_definitions(
        &self,
    ) -> std::sync::MutexGuard<'_, HashMap<ExecutionId, Arc<PipelineDefinition>>> {
        self.inner
            .definitions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }
}

/// Every group of the stage passed under its own sync policy
fn stage_passed(stage: &Stage, outcomes: &BTreeMap<String, StepOutcome>) -> bool {
    stage
        .groups
        .iter()
        .all(|group| group_passed(group, |step| outcomes.get(step).map(|o| o.status)))
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
