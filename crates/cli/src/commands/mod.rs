// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! CLI command implementations

pub mod execution;
pub mod pipeline;
pub mod run;

use crate::context::Context;
use std::process::ExitCode;

/// `pw health` - one line per configured backend
pub async fn health(ctx: &Context) -> anyhow::Result<ExitCode> {
    let engine = ctx.engine()?;
    let report = engine.health().await;

    let mut all_healthy = true;
    for (backend, healthy) in report {
        all_healthy &= healthy;
        let state = if healthy { "ok" } else { "unreachable" };
        println!("{:<8} {}", backend.as_str(), state);
    }

    Ok(if all_healthy {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Parse `key=value` arguments
pub fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let pos = s
        .find('=')
        .ok_or_else(|| format!("invalid key=value: no `=` found in `{s}`"))?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

/// Parse a backend name
pub fn parse_backend(s: &str) -> Result<pw_core::Backend, String> {
    pw_core::Backend::parse(s)
        .ok_or_else(|| format!("unknown backend `{s}` (local, jenkins, gitlab, github)"))
}
