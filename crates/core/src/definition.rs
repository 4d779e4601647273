// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pipeline definition model
//!
//! A [`PipelineDefinition`] is the immutable snapshot used by one execution.
//! Callers build (or parse) a fresh definition per run and hand it to the
//! engine behind an `Arc`; later edits to the source never reach an
//! in-flight execution.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// What a step does. New kinds are added by registering an executor for
/// `Custom(name)`, not by teaching the engine about them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StepKind {
    Shell,
    Checkout,
    Test,
    ContainerBuild,
    Deploy,
    Notify,
    Custom(String),
}

impl StepKind {
    pub fn as_str(&self) -> &str {
        match self {
            StepKind::Shell => "shell",
            StepKind::Checkout => "checkout",
            StepKind::Test => "test",
            StepKind::ContainerBuild => "container_build",
            StepKind::Deploy => "deploy",
            StepKind::Notify => "notify",
            StepKind::Custom(name) => name,
        }
    }
}

impl From<String> for StepKind {
    fn from(s: String) -> Self {
        match s.as_str() {
            "shell" => StepKind::Shell,
            "checkout" => StepKind::Checkout,
            "test" => StepKind::Test,
            "container_build" => StepKind::ContainerBuild,
            "deploy" => StepKind::Deploy,
            "notify" => StepKind::Notify,
            _ => StepKind::Custom(s),
        }
    }
}

impl From<&str> for StepKind {
    fn from(s: &str) -> Self {
        StepKind::from(s.to_string())
    }
}

impl From<StepKind> for String {
    fn from(kind: StepKind) -> Self {
        kind.as_str().to_string()
    }
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a parallel group derives its status from its members
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPolicy {
    /// Wait for every member; any failure fails the group
    #[default]
    WaitAll,
    /// First success wins; losers are cancelled best-effort
    WaitAny,
    /// Like `WaitAll`, but the first failure cancels the rest immediately
    FailFast,
}

impl SyncPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncPolicy::WaitAll => "wait_all",
            SyncPolicy::WaitAny => "wait_any",
            SyncPolicy::FailFast => "fail_fast",
        }
    }
}

/// Delay growth between retry attempts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackoffStrategy {
    #[default]
    Fixed,
    Exponential {
        factor: u32,
        #[serde(with = "humantime_serde")]
        max: Duration,
    },
}

/// Retry policy for a single step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Additional attempts after the first one
    #[serde(default)]
    pub max_retries: u32,
    /// Base delay between attempts
    #[serde(default = "default_retry_delay", with = "humantime_serde")]
    pub delay: Duration,
    #[serde(default)]
    pub backoff: BackoffStrategy,
    /// Whether a timed-out attempt is retried like a failure
    #[serde(default)]
    pub retry_on_timeout: bool,
}

fn default_retry_delay() -> Duration {
    Duration::from_secs(1)
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            delay: default_retry_delay(),
            backoff: BackoffStrategy::Fixed,
            retry_on_timeout: false,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, delay: Duration) -> Self {
        Self {
            max_retries,
            delay,
            ..Self::default()
        }
    }

    pub fn exponential(mut self, factor: u32, max: Duration) -> Self {
        self.backoff = BackoffStrategy::Exponential { factor, max };
        self
    }

    pub fn retry_on_timeout(mut self) -> Self {
        self.retry_on_timeout = true;
        self
    }

    /// Total number of attempts this policy allows
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay to wait after the given (1-based) failed attempt
    pub fn delay_after(&self, attempt: u32) -> Duration {
        match self.backoff {
            BackoffStrategy::Fixed => self.delay,
            BackoffStrategy::Exponential { factor, max } => {
                let exponent = attempt.saturating_sub(1);
                let multiplier = factor.max(1).saturating_pow(exponent);
                self.delay.saturating_mul(multiplier).min(max)
            }
        }
    }
}

/// One atomic unit of pipeline work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepSpec {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub kind: StepKind,
    /// Ordering key; steps run stage by stage in ascending order
    pub stage: u32,
    #[serde(default)]
    pub parallel_group: Option<String>,
    /// Steps whose completion gates this one (must live in earlier stages)
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub parameters: BTreeMap<String, serde_json::Value>,
    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,
    #[serde(default)]
    pub retry: RetryPolicy,
    /// Expression evaluated against earlier step outcomes and the environment
    #[serde(default)]
    pub condition: Option<String>,
    /// Best-effort step: its failure is recorded but never fails the group
    #[serde(default)]
    pub allow_failure: bool,
}

impl StepSpec {
    pub fn new(id: impl Into<String>, kind: impl Into<StepKind>, stage: u32) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            kind: kind.into(),
            stage,
            parallel_group: None,
            depends_on: Vec::new(),
            parameters: BTreeMap::new(),
            timeout: None,
            retry: RetryPolicy::default(),
            condition: None,
            allow_failure: false,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn in_group(mut self, group: impl Into<String>) -> Self {
        self.parallel_group = Some(group.into());
        self
    }

    pub fn depends_on(mut self, step: impl Into<String>) -> Self {
        self.depends_on.push(step.into());
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    pub fn allow_failure(mut self) -> Self {
        self.allow_failure = true;
        self
    }

    /// Get a string parameter
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).and_then(|v| v.as_str())
    }

    /// Backend affinity hint used by hybrid execution
    pub fn backend_hint(&self) -> Option<&str> {
        self.param_str("backend")
    }
}

/// A set of steps in one stage sharing a synchronization policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParallelGroupSpec {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub sync_policy: SyncPolicy,
    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,
}

impl ParallelGroupSpec {
    pub fn new(id: impl Into<String>, sync_policy: SyncPolicy) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            sync_policy,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// A CI substrate that can run steps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    Local,
    Jenkins,
    Gitlab,
    Github,
}

impl Backend {
    pub const ALL: [Backend; 4] = [
        Backend::Local,
        Backend::Jenkins,
        Backend::Gitlab,
        Backend::Github,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Local => "local",
            Backend::Jenkins => "jenkins",
            Backend::Gitlab => "gitlab",
            Backend::Github => "github",
        }
    }

    pub fn parse(s: &str) -> Option<Backend> {
        Backend::ALL.into_iter().find(|b| b.as_str() == s)
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pipeline-level choice of where steps run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    #[default]
    Local,
    Jenkins,
    Gitlab,
    Github,
    /// Route each stage by the `backend` hint of its steps
    Hybrid,
}

impl ExecutionMode {
    /// The single backend for non-hybrid modes
    pub fn backend(&self) -> Option<Backend> {
        match self {
            ExecutionMode::Local => Some(Backend::Local),
            ExecutionMode::Jenkins => Some(Backend::Jenkins),
            ExecutionMode::Gitlab => Some(Backend::Gitlab),
            ExecutionMode::Github => Some(Backend::Github),
            ExecutionMode::Hybrid => None,
        }
    }
}

/// What started an execution
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    #[default]
    Manual,
    Push,
    Schedule,
    Api,
    Resume,
}

/// Trigger type and actor recorded on an execution
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trigger {
    pub kind: TriggerKind,
    #[serde(default)]
    pub actor: Option<String>,
    /// Extra run parameters supplied with the trigger
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}

impl Trigger {
    pub fn manual(actor: impl Into<String>) -> Self {
        Self {
            kind: TriggerKind::Manual,
            actor: Some(actor.into()),
            parameters: BTreeMap::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }
}

/// Immutable snapshot of a pipeline for one execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineDefinition {
    pub name: String,
    #[serde(default)]
    pub steps: Vec<StepSpec>,
    #[serde(default)]
    pub groups: Vec<ParallelGroupSpec>,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
    /// Defaults for run parameters; trigger parameters override them
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,
    #[serde(default)]
    pub execution_mode: ExecutionMode,
    /// Trigger kinds this pipeline accepts (empty accepts any)
    #[serde(default)]
    pub triggers: Vec<TriggerKind>,
}

impl PipelineDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
            groups: Vec::new(),
            environment: BTreeMap::new(),
            parameters: BTreeMap::new(),
            timeout: None,
            execution_mode: ExecutionMode::Local,
            triggers: Vec::new(),
        }
    }

    pub fn with_step(mut self, step: StepSpec) -> Self {
        self.steps.push(step);
        self
    }

    pub fn with_group(mut self, group: ParallelGroupSpec) -> Self {
        self.groups.push(group);
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.execution_mode = mode;
        self
    }

    /// Get a step by id
    pub fn step(&self, id: &str) -> Option<&StepSpec> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// Get a parallel group by id
    pub fn group(&self, id: &str) -> Option<&ParallelGroupSpec> {
        self.groups.iter().find(|g| g.id == id)
    }

    /// Check whether a trigger kind may start this pipeline
    pub fn accepts(&self, kind: TriggerKind) -> bool {
        kind == TriggerKind::Resume || self.triggers.is_empty() || self.triggers.contains(&kind)
    }

    /// Merge definition defaults with trigger parameters
    pub fn resolve_parameters(&self, trigger: &Trigger) -> BTreeMap<String, String> {
        let mut params = self.parameters.clone();
        params.extend(trigger.parameters.clone());
        params
    }
}

#[cfg(test)]
#[path = "definition_tests.rs"]
mod tests;
