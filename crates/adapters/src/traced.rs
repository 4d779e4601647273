// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Traced adapter wrapper for consistent observability

use crate::backend::{BackendAdapter, LaunchRequest, LogChunk, ProviderArtifact, RemoteStatus};
use async_trait::async_trait;
use pw_core::{AdapterError, Backend, ExecutionHandle, PipelineDefinition};
use std::time::Instant;
use tracing::Instrument;

/// Wrapper that adds tracing to any BackendAdapter
#[derive(Clone)]
pub struct TracedBackendAdapter<A> {
    inner: A,
}

impl<A> TracedBackendAdapter<A> {
    pub fn new(inner: A) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &A {
        &self.inner
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

#[async_trait]
impl<A: BackendAdapter> BackendAdapter for TracedBackendAdapter<A> {
    fn backend(&self) -> Backend {
        self.inner.backend()
    }

    fn name(&self) -> &str {
        self.inner.name()
    }

    fn prepare(&self, definition: &PipelineDefinition) -> Result<ProviderArtifact, AdapterError> {
        let span = tracing::info_span!("backend.prepare", backend = %self.backend(), pipeline = %definition.name);
        let _guard = span.enter();

        let result = self.inner.prepare(definition);
        match &result {
            Ok(artifact) => tracing::info!(
                file = %artifact.file_name,
                bytes = artifact.content.len(),
                "rendered"
            ),
            Err(e) => tracing::error!(error = %e, "render failed"),
        }
        result
    }

    async fn launch(
        &self,
        artifact: &ProviderArtifact,
        request: &LaunchRequest,
    ) -> Result<ExecutionHandle, AdapterError> {
        let span = tracing::info_span!(
            "backend.launch",
            backend = %self.backend(),
            execution_id = %request.execution_id,
            step_id = %request.step.id,
            attempt = request.attempt,
        );
        async {
            tracing::info!(kind = %request.step.kind, "launching");
            let start = Instant::now();
            let result = self.inner.launch(artifact, request).await;
            match &result {
                Ok(handle) => tracing::info!(%handle, elapsed_ms = elapsed_ms(start), "launched"),
                Err(e) => tracing::error!(elapsed_ms = elapsed_ms(start), error = %e, "launch failed"),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn poll_status(&self, handle: &ExecutionHandle) -> Result<RemoteStatus, AdapterError> {
        let result = self.inner.poll_status(handle).await;
        match &result {
            Ok(status) => tracing::trace!(
                backend = %self.backend(),
                %handle,
                status = %status.status,
                "polled"
            ),
            Err(e) => tracing::warn!(backend = %self.backend(), %handle, error = %e, "poll failed"),
        }
        result
    }

    async fn fetch_logs(&self, handle: &ExecutionHandle, cursor: u64) -> Result<LogChunk, AdapterError> {
        let result = self.inner.fetch_logs(handle, cursor).await;
        tracing::trace!(
            backend = %self.backend(),
            %handle,
            cursor,
            fetched = result.as_ref().map(|c| c.text.len()).ok(),
            "fetched logs"
        );
        result
    }

    async fn cancel(&self, handle: &ExecutionHandle) -> Result<bool, AdapterError> {
        let span = tracing::info_span!("backend.cancel", backend = %self.backend(), %handle);
        async {
            let result = self.inner.cancel(handle).await;
            // Refusal is normal when the run already finished
            match &result {
                Ok(accepted) => tracing::info!(accepted, "cancel requested"),
                Err(e) => tracing::warn!(error = %e, "cancel failed"),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn health_check(&self) -> bool {
        let start = Instant::now();
        let healthy = self.inner.health_check().await;
        if healthy {
            tracing::debug!(backend = %self.backend(), elapsed_ms = elapsed_ms(start), "healthy");
        } else {
            tracing::warn!(backend = %self.backend(), elapsed_ms = elapsed_ms(start), "health check failed");
        }
        healthy
    }
}

#[cfg(test)]
#[path = "traced_tests.rs"]
mod tests;
