// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Durable execution state: write-ahead log plus materialized views

mod logs;
mod state;
mod store;
mod wal;

pub use logs::{LogBook, LogChunk, LogLine};
pub use state::MaterializedState;
pub use store::Store;
pub use wal::{Wal, WalError};
