// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for the engine

use pw_core::{AdapterError, ExecutionId, Status, TriggerKind};
use pw_pipeline::ValidationError;
use pw_storage::WalError;
use thiserror::Error;

/// Errors returned synchronously by engine entrypoints
///
/// Anything that goes wrong after an execution has been accepted is
/// recorded on the execution instead.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("backend unavailable: {0}")]
    Adapter(#[from] AdapterError),
    #[error("storage error: {0}")]
    Storage(#[from] WalError),
    #[error("pipeline {pipeline} does not accept {trigger:?} triggers")]
    TriggerRejected {
        pipeline: String,
        trigger: TriggerKind,
    },
    #[error("execution not found: {0}")]
    NotFound(String),
    #[error("execution {id} is {status} and cannot be resumed")]
    NotResumable { id: ExecutionId, status: Status },
    #[error("no pipeline definition retained for execution {0}")]
    DefinitionMissing(ExecutionId),
    #[error("definition {given} does not match execution pipeline {expected}")]
    DefinitionMismatch { expected: String, given: String },
}
