// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lifecycle status shared by executions and step attempts

use serde::{Deserialize, Serialize};

/// Status of an execution or a single step attempt.
///
/// `Skipped` is only reachable by step attempts whose run condition
/// evaluated false.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Pending,
    Running,
    Success,
    Failed,
    Cancelled,
    Timeout,
    Skipped,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::Running => "running",
            Status::Success => "success",
            Status::Failed => "failed",
            Status::Cancelled => "cancelled",
            Status::Timeout => "timeout",
            Status::Skipped => "skipped",
        }
    }

    /// Check if no further transitions are accepted
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Status::Pending | Status::Running)
    }

    /// Check if this outcome satisfies a group's success requirement
    pub fn is_successful(&self) -> bool {
        matches!(self, Status::Success | Status::Skipped)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use yare::parameterized;

    #[parameterized(
        pending = { Status::Pending, false },
        running = { Status::Running, false },
        success = { Status::Success, true },
        failed = { Status::Failed, true },
        cancelled = { Status::Cancelled, true },
        timeout = { Status::Timeout, true },
        skipped = { Status::Skipped, true },
    )]
    fn terminal_states(status: Status, terminal: bool) {
        assert_eq!(status.is_terminal(), terminal);
    }

    #[test]
    fn skipped_counts_as_successful() {
        assert!(Status::Skipped.is_successful());
        assert!(Status::Success.is_successful());
        assert!(!Status::Timeout.is_successful());
    }

    #[test]
    fn status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&Status::Cancelled).unwrap(),
            "\"cancelled\""
        );
    }
}
