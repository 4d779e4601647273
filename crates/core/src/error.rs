// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error taxonomy shared across crates

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from turning steps into stages. Raised before any state exists.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
    #[error("step {step} references unknown parallel group {group}")]
    UnknownGroup { step: String, group: String },
    #[error("parallel group {group} spans stages {first} and {second}")]
    GroupSpansStages {
        group: String,
        first: u32,
        second: u32,
    },
    #[error("step {step} depends on {dependency}, which is not in an earlier stage")]
    CyclicOrBackwardDependency { step: String, dependency: String },
    #[error("duplicate step id: {step}")]
    DuplicateStep { step: String },
    #[error("step {step} depends on unknown step {dependency}")]
    UnknownDependency { step: String, dependency: String },
}

/// Errors raised by backend adapters
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdapterError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),
    #[error("remote rejected request: {0}")]
    RemoteRejected(String),
    #[error("unsupported: {0}")]
    Unsupported(String),
    #[error("unknown execution handle: {0}")]
    UnknownHandle(String),
    #[error("unexpected response: {0}")]
    Protocol(String),
}

impl AdapterError {
    /// Authentication and capability errors never improve on retry
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            AdapterError::AuthenticationFailed(_) | AdapterError::Unsupported(_)
        )
    }
}

/// Structured tag carried by every failed terminal record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Resolution,
    Validation,
    Adapter,
    Step,
    Timeout,
    Cancelled,
    Condition,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Resolution => "resolution",
            ErrorKind::Validation => "validation",
            ErrorKind::Adapter => "adapter",
            ErrorKind::Step => "step",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Condition => "condition",
        }
    }
}

/// Human-readable summary plus taxonomy tag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub kind: ErrorKind,
    pub message: String,
}

impl ErrorDetail {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn step(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Step, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Cancelled, message)
    }
}

impl From<&AdapterError> for ErrorDetail {
    fn from(err: &AdapterError) -> Self {
        ErrorDetail::new(ErrorKind::Adapter, err.to_string())
    }
}

impl From<&ResolutionError> for ErrorDetail {
    fn from(err: &ResolutionError) -> Self {
        ErrorDetail::new(ErrorKind::Resolution, err.to_string())
    }
}

impl std::fmt::Display for ErrorDetail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.kind.as_str(), self.message)
    }
}
