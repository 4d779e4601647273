// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shell form of the built-in step kinds
//!
//! The local executors run these scripts directly and the remote renderers
//! embed them in generated job definitions, so a step does the same thing on
//! every backend.

use pw_core::{AdapterError, StepKind};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScriptError {
    #[error("{0} has no shell form")]
    NoShellForm(String),
    #[error("missing parameter `{0}`")]
    MissingParam(&'static str),
}

impl From<ScriptError> for AdapterError {
    fn from(err: ScriptError) -> Self {
        AdapterError::Unsupported(err.to_string())
    }
}

/// Variable through which a launch hands a remote job its rendered script
pub const SCRIPT_VAR: &str = "PW_STEP_SCRIPT";

/// Run `$PW_STEP_SCRIPT` when a launch supplied one, else `script`
pub fn overridable(script: &str) -> String {
    format!(
        "if [ -n \"${{{0}:-}}\" ]; then eval \"${0}\"; else\n{1}\nfi",
        SCRIPT_VAR, script
    )
}

/// Quote a string for POSIX sh
pub fn sh_quote(s: &str) -> String {
    if !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=@%+,".contains(c))
    {
        return s.to_string();
    }
    format!("'{}'", s.replace('\'', r"'\''"))
}

fn param<'a>(params: &'a BTreeMap<String, Value>, key: &str) -> Option<&'a str> {
    params.get(key).and_then(Value::as_str)
}

fn required<'a>(
    params: &'a BTreeMap<String, Value>,
    key: &'static str,
) -> Result<&'a str, ScriptError> {
    param(params, key).ok_or(ScriptError::MissingParam(key))
}

/// Build the shell script for a step of a built-in kind
pub fn shell_script(kind: &StepKind, params: &BTreeMap<String, Value>) -> Result<String, ScriptError> {
    let script = match kind {
        StepKind::Shell | StepKind::Test => required(params, "command")?.to_string(),

        StepKind::Checkout => {
            let mut parts = vec!["git clone --depth 1".to_string()];
            if let Some(git_ref) = param(params, "ref") {
                parts.push(format!("--branch {}", sh_quote(git_ref)));
            }
            parts.push("--".to_string());
            parts.push(sh_quote(required(params, "repository")?));
            parts.push(sh_quote(param(params, "path").unwrap_or(".")));
            parts.join(" ")
        }

        StepKind::ContainerBuild => {
            let image = required(params, "image")?;
            let reference = match param(params, "tag") {
                Some(tag) => format!("{}:{}", image, tag),
                None => image.to_string(),
            };
            let mut parts = vec![format!("docker build -t {}", sh_quote(&reference))];
            if let Some(dockerfile) = param(params, "dockerfile") {
                parts.push(format!("-f {}", sh_quote(dockerfile)));
            }
            parts.push(sh_quote(param(params, "context").unwrap_or(".")));
            parts.join(" ")
        }

        StepKind::Deploy => match param(params, "command") {
            Some(command) => command.to_string(),
            None => {
                return Err(ScriptError::NoShellForm(
                    "deploy without `command`".to_string(),
                ))
            }
        },

        StepKind::Notify => format!("printf '%s\\n' {}", sh_quote(required(params, "message")?)),

        StepKind::Custom(name) => return Err(ScriptError::NoShellForm(format!("step kind `{}`", name))),
    };

    Ok(match param(params, "cwd") {
        Some(cwd) => format!("cd {} && {}", sh_quote(cwd), script),
        None => script,
    })
}

#[cfg(test)]
#[path = "script_tests.rs"]
mod tests;
