// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scripted HTTP transport for testing
#![cfg_attr(coverage_nightly, coverage(off))]

use super::{HttpRequest, HttpResponse, Method, Transport};
use async_trait::async_trait;
use pw_core::AdapterError;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

struct Route {
    method: Method,
    /// Matched as a substring of the request URL
    pattern: String,
    responses: VecDeque<Result<HttpResponse, AdapterError>>,
}

#[derive(Default)]
struct FakeState {
    routes: Vec<Route>,
    requests: Vec<HttpRequest>,
}

/// Transport that answers from scripted routes.
///
/// Each route replays its queued responses in order and keeps repeating the
/// last one. Requests matching no route get a 404.
#[derive(Clone, Default)]
pub struct FakeTransport {
    inner: Arc<Mutex<FakeState>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response for requests matching `method` and `pattern`
    pub fn on(&self, method: Method, pattern: &str, response: HttpResponse) -> &Self {
        self.push(method, pattern, Ok(response))
    }

    /// Queue a transport-level failure
    pub fn fail(&self, method: Method, pattern: &str, error: AdapterError) -> &Self {
        self.push(method, pattern, Err(error))
    }

    fn push(
        &self,
        method: Method,
        pattern: &str,
        response: Result<HttpResponse, AdapterError>,
    ) -> &Self {
        let mut state = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        match state
            .routes
            .iter_mut()
            .find(|r| r.method == method && r.pattern == pattern)
        {
            Some(route) => route.responses.push_back(response),
            None => state.routes.push(Route {
                method,
                pattern: pattern.to_string(),
                responses: VecDeque::from([response]),
            }),
        }
        self
    }

    /// All requests sent so far
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .requests
            .clone()
    }

    /// Requests whose URL contains `pattern`
    pub fn requests_to(&self, method: Method, pattern: &str) -> Vec<HttpRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == method && r.url.contains(pattern))
            .collect()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, AdapterError> {
        let mut state = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        state.requests.push(request.clone());

        // Longest pattern wins so specific routes can shadow general ones
        let route = state
            .routes
            .iter_mut()
            .filter(|r| r.method == request.method && request.url.contains(&r.pattern))
            .max_by_key(|r| r.pattern.len());

        match route {
            Some(route) if route.responses.len() > 1 => route
                .responses
                .pop_front()
                .unwrap_or_else(|| Ok(HttpResponse::new(404, "not found"))),
            Some(route) => route
                .responses
                .front()
                .cloned()
                .unwrap_or_else(|| Ok(HttpResponse::new(404, "not found"))),
            None => Ok(HttpResponse::new(404, "not found")),
        }
    }
}
