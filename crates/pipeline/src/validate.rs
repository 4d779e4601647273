// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Whole-definition validation

use crate::schema::{check_step, SchemaError};
use pw_core::{resolve, Backend, ExecutionMode, PipelineDefinition, ResolutionError, Stage};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error(transparent)]
    Resolution(#[from] ResolutionError),
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error("stage {stage} mixes backends {first} and {second}")]
    MixedBackends {
        stage: u32,
        first: Backend,
        second: Backend,
    },
}

/// Validate a definition and return its resolved stages
pub fn validate(definition: &PipelineDefinition) -> Result<Vec<Stage>, ValidationError> {
    for step in &definition.steps {
        check_step(step)?;
    }

    let stages = resolve(&definition.steps, &definition.groups)?;

    for stage in &stages {
        stage_backend(definition.execution_mode, stage)?;
    }

    Ok(stages)
}

/// The backend a stage runs on under the given mode
///
/// Hybrid stages follow the `backend` hint of their steps and default to
/// local when no step carries one.
pub fn stage_backend(mode: ExecutionMode, stage: &Stage) -> Result<Backend, ValidationError> {
    if let Some(backend) = mode.backend() {
        return Ok(backend);
    }

    let mut chosen: Option<Backend> = None;
    for hint in stage.steps().filter_map(|s| s.backend_hint()) {
        let Some(backend) = Backend::parse(hint) else {
            continue;
        };
        match chosen {
            Some(first) if first != backend => {
                return Err(ValidationError::MixedBackends {
                    stage: stage.index,
                    first,
                    second: backend,
                });
            }
            _ => chosen = Some(backend),
        }
    }
    Ok(chosen.unwrap_or(Backend::Local))
}

#[cfg(test)]
#[path = "validate_tests.rs"]
mod tests;
