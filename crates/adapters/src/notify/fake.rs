// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake notification adapter for testing
#![cfg_attr(coverage_nightly, coverage(off))]

use super::{NotifyAdapter, NotifyError};
use async_trait::async_trait;
use pw_core::{Event, StatusEvent};
use std::sync::{Arc, Mutex};

/// Records every event it receives
#[derive(Clone, Default)]
pub struct FakeNotifyAdapter {
    events: Arc<Mutex<Vec<Event>>>,
}

impl FakeNotifyAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all recorded events
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Recorded status transitions only
    pub fn status_events(&self) -> Vec<StatusEvent> {
        self.events()
            .iter()
            .filter_map(|e| e.as_status().cloned())
            .collect()
    }
}

#[async_trait]
impl NotifyAdapter for FakeNotifyAdapter {
    async fn notify(&self, event: &Event) -> Result<(), NotifyError> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event.clone());
        Ok(())
    }
}
