// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shell-backed executor for the built-in step kinds

use super::{LogSink, StepContext, StepError, StepExecutor, StepOutput};
use crate::script::{shell_script, ScriptError};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;

/// Only the tail of stdout is kept as the step's output
const OUTPUT_LIMIT: usize = 4096;

/// Runs the shell form of a step with `sh -c`
#[derive(Debug, Clone)]
pub struct ShellExecutor {
    shell: String,
}

impl Default for ShellExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl ShellExecutor {
    pub fn new() -> Self {
        Self {
            shell: "sh".to_string(),
        }
    }

    pub fn with_shell(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
        }
    }
}

impl From<ScriptError> for StepError {
    fn from(err: ScriptError) -> Self {
        StepError::InvalidParams(err.to_string())
    }
}

#[async_trait]
impl StepExecutor for ShellExecutor {
    async fn run(&self, ctx: StepContext) -> Result<StepOutput, StepError> {
        let script = shell_script(&ctx.kind, &ctx.params)?;
        if ctx.cancel.is_cancelled() {
            return Err(StepError::Cancelled);
        }

        tracing::debug!(step_id = %ctx.step_id, attempt = ctx.attempt, script = %script, "spawning");

        let mut child = Command::new(&self.shell)
            .arg("-c")
            .arg(&script)
            .envs(&ctx.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| StepError::Io(e.to_string()))?;

        let stdout = child
            .stdout
            .take()
            .map(|out| tokio::spawn(pump(out, ctx.logs.clone())));
        let stderr = child
            .stderr
            .take()
            .map(|err| tokio::spawn(pump(err, ctx.logs.clone())));

        let status = tokio::select! {
            status = child.wait() => status.map_err(|e| StepError::Io(e.to_string()))?,
            _ = ctx.cancel.cancelled() => {
                if let Err(e) = child.kill().await {
                    tracing::warn!(step_id = %ctx.step_id, error = %e, "kill failed");
                }
                return Err(StepError::Cancelled);
            }
        };

        let mut output = match stdout {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };
        if let Some(task) = stderr {
            // stderr is already in the log; drain so the pipe closes cleanly
            let _ = task.await;
        }
        truncate_front(&mut output, OUTPUT_LIMIT);

        // Killed by a signal: no exit code
        let exit_code = status.code().unwrap_or(-1);
        Ok(StepOutput {
            output: Some(output.trim_end().to_string()),
            exit_code,
        })
    }
}

/// Forward lines to the sink and collect them
async fn pump<R: AsyncRead + Unpin>(reader: R, sink: LogSink) -> String {
    let mut lines = BufReader::new(reader).lines();
    let mut collected = String::new();
    while let Ok(Some(line)) = lines.next_line().await {
        let line = format!("{}\n", line);
        sink.write(&line);
        collected.push_str(&line);
    }
    collected
}

/// Keep at most `limit` bytes from the end of `s`, on a char boundary
fn truncate_front(s: &mut String, limit: usize) {
    if s.len() <= limit {
        return;
    }
    let mut start = s.len() - limit;
    while !s.is_char_boundary(start) {
        start += 1;
    }
    s.drain(..start);
}

#[cfg(test)]
#[path = "shell_tests.rs"]
mod tests;
