// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! User-facing errors with suggestions.

use pw_core::Backend;
use std::fmt;

/// Error with context and recovery suggestions for display on stderr
#[derive(Debug)]
pub struct PwError {
    pub message: String,
    pub context: Vec<String>,
    pub suggestions: Vec<String>,
}

impl PwError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            context: Vec::new(),
            suggestions: Vec::new(),
        }
    }

    pub fn with_context(mut self, ctx: impl Into<String>) -> Self {
        self.context.push(ctx.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    /// Commands that read recorded executions need a WAL
    pub fn no_state_dir(command: &str) -> Self {
        PwError::new(format!("`pw {}` needs a state directory", command))
            .with_context("Executions are only recorded when engine.state_dir is set")
            .with_suggestion("Set state_dir under [engine] in pw.toml")
            .with_suggestion("Or export PW_STATE_DIR=<dir>")
    }

    pub fn execution_not_found(id: &str) -> Self {
        PwError::new(format!("Execution '{}' not found", id))
            .with_context("The id may be ambiguous or recorded in another state directory")
            .with_suggestion("List recorded executions: pw status")
    }

    pub fn backend_not_configured(backend: Backend) -> Self {
        PwError::new(format!("No {} backend configured", backend))
            .with_suggestion(format!("Add a [backends.{}] section to pw.toml", backend))
            .with_suggestion("Check reachability: pw health")
    }
}

impl fmt::Display for PwError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "error: {}", self.message)?;

        if !self.context.is_empty() {
            writeln!(f)?;
            for ctx in &self.context {
                writeln!(f, "  -> {}", ctx)?;
            }
        }

        if !self.suggestions.is_empty() {
            writeln!(f)?;
            writeln!(f, "suggestions:")?;
            for (i, suggestion) in self.suggestions.iter().enumerate() {
                writeln!(f, "  {}. {}", i + 1, suggestion)?;
            }
        }

        Ok(())
    }
}

impl std::error::Error for PwError {}
