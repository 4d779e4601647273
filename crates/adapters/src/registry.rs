// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Backend to adapter mapping, built once at startup

use crate::backend::BackendAdapter;
use pw_core::{AdapterError, Backend};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: HashMap<Backend, Arc<dyn BackendAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter under its own backend, replacing any previous one
    pub fn register(&mut self, adapter: impl BackendAdapter) -> &mut Self {
        self.register_arc(Arc::new(adapter))
    }

    pub fn register_arc(&mut self, adapter: Arc<dyn BackendAdapter>) -> &mut Self {
        self.adapters.insert(adapter.backend(), adapter);
        self
    }

    pub fn get(&self, backend: Backend) -> Result<Arc<dyn BackendAdapter>, AdapterError> {
        self.adapters
            .get(&backend)
            .cloned()
            .ok_or_else(|| AdapterError::Unsupported(format!("no adapter configured for {}", backend)))
    }

    /// Adapter for `backend`, provided its health check passes
    pub async fn ensure_healthy(&self, backend: Backend) -> Result<Arc<dyn BackendAdapter>, AdapterError> {
        let adapter = self.get(backend)?;
        if adapter.health_check().await {
            Ok(adapter)
        } else {
            Err(AdapterError::ConnectionFailed(format!(
                "{} backend failed its health check",
                backend
            )))
        }
    }

    /// Configured backends in a stable order
    pub fn backends(&self) -> Vec<Backend> {
        let mut backends: Vec<Backend> = self.adapters.keys().copied().collect();
        backends.sort();
        backends
    }

    /// Health of every configured backend
    pub async fn health_report(&self) -> Vec<(Backend, bool)> {
        let mut report = Vec::new();
        for backend in self.backends() {
            if let Some(adapter) = self.adapters.get(&backend) {
                report.push((backend, adapter.health_check().await));
            }
        }
        report
    }
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("backends", &self.backends())
            .finish()
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
