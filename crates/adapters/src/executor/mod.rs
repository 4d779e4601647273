// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Step executors: the code that actually runs one step kind
//!
//! The local backend dispatches on [`StepKind`] through an
//! [`ExecutorRegistry`]; new kinds are added by registering an executor, not
//! by teaching the engine about them.

mod message;
mod shell;

#[cfg(any(test, feature = "test-support"))]
mod fake;

pub use message::MessageExecutor;
pub use shell::ShellExecutor;

#[cfg(any(test, feature = "test-support"))]
pub use fake::{ExecutorCall, FakeStep, FakeStepExecutor};

use async_trait::async_trait;
use pw_core::{ExecutionId, StepKind};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Errors from running a step (not the step's own non-zero exit)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StepError {
    #[error("invalid parameters: {0}")]
    InvalidParams(String),
    #[error("failed to run step: {0}")]
    Io(String),
    #[error("step failed: {0}")]
    Failed(String),
    #[error("cancelled")]
    Cancelled,
}

/// Streams log text out of a running step
#[derive(Clone)]
pub struct LogSink {
    write: Arc<dyn Fn(&str) + Send + Sync>,
}

impl LogSink {
    pub fn new(write: impl Fn(&str) + Send + Sync + 'static) -> Self {
        Self {
            write: Arc::new(write),
        }
    }

    /// A sink that drops everything
    pub fn discard() -> Self {
        Self::new(|_| {})
    }

    pub fn write(&self, text: &str) {
        (self.write)(text)
    }
}

impl std::fmt::Debug for LogSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("LogSink")
    }
}

/// Everything an executor gets to see about one attempt
#[derive(Debug, Clone)]
pub struct StepContext {
    pub execution_id: ExecutionId,
    pub step_id: String,
    pub attempt: u32,
    pub kind: StepKind,
    pub params: BTreeMap<String, Value>,
    pub env: BTreeMap<String, String>,
    /// Fires when the attempt should stop; check it between sub-steps
    pub cancel: CancellationToken,
    pub logs: LogSink,
}

/// What a finished step reports back
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutput {
    pub output: Option<String>,
    pub exit_code: i32,
}

impl StepOutput {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            output: Some(output.into()),
            exit_code: 0,
        }
    }

    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs exactly one kind of step
#[async_trait]
pub trait StepExecutor: Send + Sync + 'static {
    async fn run(&self, ctx: StepContext) -> Result<StepOutput, StepError>;
}

/// Step kind to executor mapping
#[derive(Clone, Default)]
pub struct ExecutorRegistry {
    executors: HashMap<StepKind, Arc<dyn StepExecutor>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in kind backed by the shell
    pub fn with_builtins() -> Self {
        let shell: Arc<dyn StepExecutor> = Arc::new(ShellExecutor::new());
        let mut registry = Self::new();
        for kind in [
            StepKind::Shell,
            StepKind::Test,
            StepKind::Checkout,
            StepKind::ContainerBuild,
            StepKind::Deploy,
        ] {
            registry.executors.insert(kind, Arc::clone(&shell));
        }
        registry
            .executors
            .insert(StepKind::Notify, Arc::new(MessageExecutor));
        registry
    }

    pub fn register(&mut self, kind: impl Into<StepKind>, executor: impl StepExecutor) -> &mut Self {
        self.executors.insert(kind.into(), Arc::new(executor));
        self
    }

    pub fn register_arc(&mut self, kind: impl Into<StepKind>, executor: Arc<dyn StepExecutor>) -> &mut Self {
        self.executors.insert(kind.into(), executor);
        self
    }

    pub fn get(&self, kind: &StepKind) -> Option<Arc<dyn StepExecutor>> {
        self.executors.get(kind).cloned()
    }

    pub fn supports(&self, kind: &StepKind) -> bool {
        self.executors.contains_key(kind)
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
