// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process executor for notify steps

use super::{StepContext, StepError, StepExecutor, StepOutput};
use async_trait::async_trait;

/// Writes the step's `message` (with an optional `channel` prefix) to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct MessageExecutor;

#[async_trait]
impl StepExecutor for MessageExecutor {
    async fn run(&self, ctx: StepContext) -> Result<StepOutput, StepError> {
        let message = ctx
            .params
            .get("message")
            .and_then(|v| v.as_str())
            .ok_or_else(|| StepError::InvalidParams("missing parameter `message`".to_string()))?;

        let line = match ctx.params.get("channel").and_then(|v| v.as_str()) {
            Some(channel) => format!("[{}] {}", channel, message),
            None => message.to_string(),
        };
        ctx.logs.write(&format!("{}\n", line));
        tracing::info!(step_id = %ctx.step_id, message = %line, "notify step");

        Ok(StepOutput::success(line))
    }
}
