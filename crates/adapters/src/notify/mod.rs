// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Status event sinks
//!
//! The engine hands every event to one [`NotifyAdapter`]. Delivery beyond
//! that point (fan-out, persistence) belongs to the sink.

#[cfg(any(test, feature = "test-support"))]
mod fake;

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeNotifyAdapter;

use async_trait::async_trait;
use pw_core::Event;
use thiserror::Error;
use tokio::sync::broadcast;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotifyError {
    #[error("notification not delivered: {0}")]
    Delivery(String),
}

#[async_trait]
pub trait NotifyAdapter: Send + Sync + 'static {
    async fn notify(&self, event: &Event) -> Result<(), NotifyError>;
}

/// Sink that drops every event
#[derive(Clone, Copy, Debug, Default)]
pub struct NoOpNotifyAdapter;

impl NoOpNotifyAdapter {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl NotifyAdapter for NoOpNotifyAdapter {
    async fn notify(&self, _event: &Event) -> Result<(), NotifyError> {
        Ok(())
    }
}

/// In-process fan-out over a tokio broadcast channel.
///
/// Events sent with no subscriber are dropped; slow subscribers see
/// `RecvError::Lagged` rather than blocking the engine.
#[derive(Clone, Debug)]
pub struct ChannelNotifyAdapter {
    sender: broadcast::Sender<Event>,
}

impl Default for ChannelNotifyAdapter {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl ChannelNotifyAdapter {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }
}

#[async_trait]
impl NotifyAdapter for ChannelNotifyAdapter {
    async fn notify(&self, event: &Event) -> Result<(), NotifyError> {
        // No receivers is not a failure
        let _ = self.sender.send(event.clone());
        Ok(())
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
