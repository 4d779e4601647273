// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::backend::FakeBackendAdapter;

#[tokio::test]
async fn missing_backend_is_unsupported() {
    let registry = AdapterRegistry::new();
    let err = registry.ensure_healthy(Backend::Jenkins).await.err().unwrap();
    assert!(matches!(err, AdapterError::Unsupported(_)));
}

#[tokio::test]
async fn unhealthy_backend_is_refused() {
    let fake = FakeBackendAdapter::new(Backend::Gitlab);
    fake.set_healthy(false);
    let mut registry = AdapterRegistry::new();
    registry.register(fake.clone());

    let err = registry.ensure_healthy(Backend::Gitlab).await.err().unwrap();
    assert!(matches!(err, AdapterError::ConnectionFailed(_)));

    fake.set_healthy(true);
    let adapter = registry.ensure_healthy(Backend::Gitlab).await.unwrap();
    assert_eq!(adapter.backend(), Backend::Gitlab);
}

#[tokio::test]
async fn health_report_covers_every_backend_in_order() {
    let unhealthy = FakeBackendAdapter::new(Backend::Github);
    unhealthy.set_healthy(false);
    let mut registry = AdapterRegistry::new();
    registry
        .register(unhealthy)
        .register(FakeBackendAdapter::new(Backend::Local));

    assert_eq!(registry.backends(), vec![Backend::Local, Backend::Github]);
    assert_eq!(
        registry.health_report().await,
        vec![(Backend::Local, true), (Backend::Github, false)]
    );
}
