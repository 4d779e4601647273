// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pipeline TOML parsing
//!
//! ```toml
//! [pipeline]
//! name = "ci"
//! mode = "hybrid"
//! timeout = "30m"
//!
//! [env]
//! CARGO_TERM_COLOR = "always"
//!
//! [[group]]
//! id = "checks"
//! sync_policy = "fail_fast"
//!
//! [[step]]
//! id = "test"
//! kind = "test"
//! stage = 2
//! group = "checks"
//! params = { command = "cargo test" }
//! retry = { max_retries = 2, delay = "5s" }
//! ```

use pw_core::{
    ExecutionMode, ParallelGroupSpec, PipelineDefinition, RetryPolicy, StepKind, StepSpec,
    TriggerKind,
};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during pipeline parsing
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid format: {0}")]
    InvalidFormat(String),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawFile {
    pipeline: RawHeader,
    #[serde(default)]
    env: BTreeMap<String, String>,
    #[serde(default)]
    group: Vec<ParallelGroupSpec>,
    #[serde(default)]
    step: Vec<RawStep>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawHeader {
    name: String,
    #[serde(default)]
    mode: ExecutionMode,
    #[serde(default, with = "humantime_serde")]
    timeout: Option<Duration>,
    #[serde(default)]
    triggers: Vec<TriggerKind>,
    #[serde(default)]
    parameters: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawStep {
    id: String,
    #[serde(default)]
    name: Option<String>,
    kind: StepKind,
    stage: u32,
    #[serde(default)]
    group: Option<String>,
    #[serde(default)]
    depends_on: Vec<String>,
    #[serde(default)]
    params: toml::Table,
    #[serde(default, with = "humantime_serde")]
    timeout: Option<Duration>,
    #[serde(default)]
    retry: RetryPolicy,
    #[serde(default, rename = "if")]
    condition: Option<String>,
    #[serde(default)]
    allow_failure: bool,
}

impl RawStep {
    fn into_spec(self) -> Result<StepSpec, ParseError> {
        let mut parameters = BTreeMap::new();
        for (key, value) in self.params {
            let json = serde_json::to_value(&value).map_err(|e| {
                ParseError::InvalidFormat(format!("step.{}.params.{}: {}", self.id, key, e))
            })?;
            parameters.insert(key, json);
        }

        Ok(StepSpec {
            name: self.name.unwrap_or_else(|| self.id.clone()),
            id: self.id,
            kind: self.kind,
            stage: self.stage,
            parallel_group: self.group,
            depends_on: self.depends_on,
            parameters,
            timeout: self.timeout,
            retry: self.retry,
            condition: self.condition,
            allow_failure: self.allow_failure,
        })
    }
}

/// Parse a pipeline definition from TOML content
///
/// Only the file structure is checked here; see [`crate::validate`] for
/// stage resolution and parameter schemas.
pub fn parse_pipeline(content: &str) -> Result<PipelineDefinition, ParseError> {
    let raw: RawFile = toml::from_str(content)?;

    if raw.pipeline.name.trim().is_empty() {
        return Err(ParseError::InvalidFormat(
            "pipeline.name must not be empty".to_string(),
        ));
    }

    let steps = raw
        .step
        .into_iter()
        .map(RawStep::into_spec)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(PipelineDefinition {
        name: raw.pipeline.name,
        steps,
        groups: raw.group,
        environment: raw.env,
        parameters: raw.pipeline.parameters,
        timeout: raw.pipeline.timeout,
        execution_mode: raw.pipeline.mode,
        triggers: raw.pipeline.triggers,
    })
}

/// Read and parse a pipeline file
pub fn load_pipeline(path: &Path) -> Result<PipelineDefinition, ParseError> {
    let content = std::fs::read_to_string(path).map_err(|source| ParseError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_pipeline(&content)
}

#[cfg(test)]
#[path = "parser_tests.rs"]
mod tests;
