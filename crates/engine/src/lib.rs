// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Pipeline execution engine
//!
//! Each execution runs on its own task. Stages run in order, the parallel
//! groups of a stage run at once, and every step attempt is supervised for
//! retries and timeouts. All state changes go through a single recorder.

mod config;
mod coordinator;
mod engine;
mod error;
mod interrupt;
mod recorder;
mod run;
mod supervisor;

pub use config::{BackendsConfig, Config, ConfigError, EngineConfig, WAL_FILE};
pub use coordinator::{group_passed, run_group, GroupResult, StepResult, StepRunner};
pub use engine::Engine;
pub use error::EngineError;
pub use interrupt::{Interrupt, StopReason};
pub use recorder::{ExecutionSnapshot, Recorder};
pub use supervisor::StepSupervisor;
