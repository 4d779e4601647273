// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
// Enable coverage(off) attribute for excluding test infrastructure
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Adapters for external I/O: step executors, CI backends, HTTP and
//! notification sinks

pub mod backend;
pub mod executor;
pub mod http;
pub mod notify;
pub mod registry;
pub mod script;
pub mod traced;

pub use backend::{
    BackendAdapter, GithubAdapter, GithubConfig, GitlabAdapter, GitlabConfig, JenkinsAdapter,
    JenkinsConfig, LaunchRequest, LocalAdapter, LogChunk, ProviderArtifact, RemoteStatus,
};
pub use executor::{
    ExecutorRegistry, LogSink, MessageExecutor, ShellExecutor, StepContext, StepError,
    StepExecutor, StepOutput,
};
pub use http::{HttpTransport, Transport};
pub use notify::{ChannelNotifyAdapter, NoOpNotifyAdapter, NotifyAdapter, NotifyError};
pub use registry::AdapterRegistry;
pub use traced::TracedBackendAdapter;

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
pub use backend::{BackendCall, FakeBackendAdapter, FakeRun};
#[cfg(any(test, feature = "test-support"))]
pub use executor::{ExecutorCall, FakeStep, FakeStepExecutor};
#[cfg(any(test, feature = "test-support"))]
pub use http::FakeTransport;
#[cfg(any(test, feature = "test-support"))]
pub use notify::FakeNotifyAdapter;
