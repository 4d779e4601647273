// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! pw-core: Core library for Pipewright
//!
//! This crate provides:
//! - The pipeline data model (definitions, steps, parallel groups)
//! - Pure state machines for executions and step attempts
//! - The dependency resolver that turns steps into ordered stages
//! - Run-condition and parameter template evaluation
//! - The operation records persisted by storage

pub mod clock;
pub mod id;

pub mod definition;
pub mod error;
pub mod event;
pub mod expr;
pub mod resolve;
pub mod status;

// State machines (order matters for dependencies)
pub mod execution;
pub mod step;
pub mod operation;

// Re-exports
pub use clock::{Clock, FakeClock, SystemClock};
pub use definition::{
    Backend, BackoffStrategy, ExecutionMode, ParallelGroupSpec, PipelineDefinition, RetryPolicy,
    StepKind, StepSpec, SyncPolicy, Trigger, TriggerKind,
};
pub use error::{AdapterError, ErrorDetail, ErrorKind, ResolutionError};
pub use event::{Event, StatusEvent};
pub use execution::{Execution, ExecutionEvent};
pub use expr::{ExprContext, ExprError, StepOutcome};
pub use id::{ExecutionHandle, ExecutionId, IdGen, SequentialIdGen, StepExecutionId, UuidIdGen};
pub use operation::Operation;
pub use resolve::{resolve, PlannedGroup, Stage};
pub use status::Status;
pub use step::{StepEvent, StepExecution};
