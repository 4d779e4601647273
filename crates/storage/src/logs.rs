// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Accumulated execution logs
//!
//! Logs are append-only per execution. Readers page through them with a
//! cursor that counts entries in the (optionally step-filtered) view, so a
//! cursor handed out earlier stays valid as more text arrives.

use pw_core::ExecutionId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One appended piece of log text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogLine {
    pub step_id: Option<String>,
    pub text: String,
}

/// A page of log text and the cursor to continue from
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogChunk {
    pub text: String,
    pub cursor: usize,
}

#[derive(Debug, Default)]
pub struct LogBook {
    entries: HashMap<ExecutionId, Vec<LogLine>>,
}

impl LogBook {
    pub fn append(&mut self, execution_id: &ExecutionId, step_id: Option<&str>, text: &str) {
        if text.is_empty() {
            return;
        }
        self.entries
            .entry(execution_id.clone())
            .or_default()
            .push(LogLine {
                step_id: step_id.map(str::to_string),
                text: text.to_string(),
            });
    }

    /// Read everything after `cursor` for an execution, optionally one step
    pub fn read(&self, execution_id: &ExecutionId, step_id: Option<&str>, cursor: usize) -> LogChunk {
        let Some(lines) = self.entries.get(execution_id) else {
            return LogChunk {
                text: String::new(),
                cursor,
            };
        };

        let mut seen = 0;
        let mut text = String::new();
        for line in lines
            .iter()
            .filter(|l| step_id.is_none() || l.step_id.as_deref() == step_id)
        {
            if seen >= cursor {
                text.push_str(&line.text);
            }
            seen += 1;
        }

        LogChunk {
            text,
            cursor: seen.max(cursor),
        }
    }

    pub fn len(&self, execution_id: &ExecutionId) -> usize {
        self.entries.get(execution_id).map(Vec::len).unwrap_or(0)
    }

    pub fn is_empty(&self, execution_id: &ExecutionId) -> bool {
        self.len(execution_id) == 0
    }
}

#[cfg(test)]
#[path = "logs_tests.rs"]
mod tests;
