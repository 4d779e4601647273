// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WAL-backed state store

use crate::state::MaterializedState;
use crate::wal::{Wal, WalError};
use pw_core::Operation;
use std::path::Path;

/// Single writer for execution state
///
/// Every change goes to the WAL first and is applied to the materialized
/// view only once the append succeeded. An in-memory store skips the WAL.
pub struct Store {
    wal: Option<Wal>,
    state: MaterializedState,
}

impl Store {
    pub fn in_memory() -> Self {
        Self {
            wal: None,
            state: MaterializedState::default(),
        }
    }

    /// Open a durable store, replaying any existing log
    pub fn open(path: &Path) -> Result<Self, WalError> {
        let wal = Wal::open(path)?;
        let mut state = MaterializedState::default();
        for op in Wal::replay(path)? {
            state.apply(&op);
        }
        Ok(Self {
            wal: Some(wal),
            state,
        })
    }

    pub fn commit(&mut self, op: Operation) -> Result<(), WalError> {
        if let Some(wal) = self.wal.as_mut() {
            wal.append(&op)?;
        }
        self.state.apply(&op);
        Ok(())
    }

    pub fn state(&self) -> &MaterializedState {
        &self.state
    }

    pub fn is_durable(&self) -> bool {
        self.wal.is_some()
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::in_memory()
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
