// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cooperative stop signals for executions and groups
//!
//! An execution owns a root [`Interrupt`]; every group run gets a child.
//! Stopping a parent stops its children. The stop reason is guarded by a
//! lock that terminal commits also take, so a commit either lands before
//! the stop or observes it.

use pw_core::StepEvent;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Cancelled by a caller
    Cancelled,
    /// The execution's global timeout elapsed
    ExecutionTimeout,
    GroupTimeout,
    /// A sibling in a fail_fast group failed
    FailFast,
    /// A sibling in a wait_any group succeeded
    Superseded,
}

impl StopReason {
    pub fn message(&self) -> &'static str {
        match self {
            StopReason::Cancelled => "cancelled by request",
            StopReason::ExecutionTimeout => "execution timed out",
            StopReason::GroupTimeout => "parallel group timed out",
            StopReason::FailFast => "cancelled after a sibling failed",
            StopReason::Superseded => "cancelled after a sibling succeeded",
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, StopReason::ExecutionTimeout | StopReason::GroupTimeout)
    }

    /// The terminal event for a step stopped for this reason
    pub fn step_event(&self) -> StepEvent {
        if self.is_timeout() {
            StepEvent::TimedOut {
                message: self.message().to_string(),
            }
        } else {
            StepEvent::Cancel {
                reason: self.message().to_string(),
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct Interrupt {
    token: CancellationToken,
    reason: Mutex<Option<StopReason>>,
    parent: Option<Arc<Interrupt>>,
}

impl Interrupt {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A child that stops with this interrupt but can also stop on its own
    pub fn child(self: &Arc<Self>) -> Arc<Self> {
        Arc::new(Self {
            token: self.token.child_token(),
            reason: Mutex::new(None),
            parent: Some(Arc::clone(self)),
        })
    }

    /// Request a stop. Returns false if this interrupt was already stopped.
    pub fn stop(&self, reason: StopReason) -> bool {
        let first = {
            let mut guard = self.lock();
            if guard.is_none() {
                *guard = Some(reason);
                true
            } else {
                false
            }
        };
        self.token.cancel();
        first
    }

    /// Why this interrupt (or an ancestor) stopped; outer reasons win
    pub fn reason(&self) -> Option<StopReason> {
        let inherited = self.parent.as_ref().and_then(|p| p.reason());
        inherited.or(*self.lock())
    }

    pub fn is_stopped(&self) -> bool {
        self.reason().is_some()
    }

    /// Resolves once a stop has been requested here or above
    pub async fn stopped(&self) {
        self.token.cancelled().await
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Run `f` only if nothing has stopped, holding off any stop until done
    pub fn commit_unless_stopped<T>(&self, f: impl FnOnce() -> T) -> Result<T, StopReason> {
        let guards = self.lock_chain();
        if let Some(reason) = guards.iter().find_map(|guard| **guard) {
            return Err(reason);
        }
        let value = f();
        drop(guards);
        Ok(value)
    }

    /// Like [`commit_unless_stopped`](Self::commit_unless_stopped), then
    /// stop with `reason` before any other commit can slip in
    pub fn commit_then_stop<T>(
        &self,
        reason: StopReason,
        f: impl FnOnce() -> T,
    ) -> Result<T, StopReason> {
        let mut guards = self.lock_chain();
        if let Some(stopped) = guards.iter().find_map(|guard| **guard) {
            return Err(stopped);
        }
        let value = f();
        if let Some(own) = guards.last_mut() {
            **own = Some(reason);
        }
        drop(guards);
        self.token.cancel();
        Ok(value)
    }

    /// Locks of this interrupt and its ancestors, root first, self last
    fn lock_chain(&self) -> Vec<MutexGuard<'_, Option<StopReason>>> {
        let mut chain: Vec<&Interrupt> = vec![self];
        let mut current = self;
        while let Some(parent) = &current.parent {
            current = parent.as_ref();
            chain.push(current);
        }
        chain.iter().rev().map(|interrupt| interrupt.lock()).collect()
    }

    fn lock(&self) -> MutexGuard<'_, Option<StopReason>> {
        self.reason.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
#[path = "interrupt_tests.rs"]
mod tests;
