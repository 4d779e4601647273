// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Run conditions and parameter templates.
//!
//! Both use Jinja2 syntax against the same context:
//!
//! - `env.NAME`: pipeline environment
//! - `params.NAME`: resolved run parameters
//! - `steps.ID.status` / `steps.ID.output` / `steps.ID.exit_code`: the
//!   latest attempt of every step that has finished so far
//!
//! A condition is a bare expression such as
//! `steps.test.status == "success" and env.BRANCH == "main"`.

use crate::status::Status;
use minijinja::Environment;
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors from condition evaluation or template rendering
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExprError {
    #[error("syntax error in `{expr}`: {message}")]
    Syntax { expr: String, message: String },

    #[error("cannot evaluate `{expr}`: {message}")]
    Evaluation { expr: String, message: String },
}

impl ExprError {
    fn from_minijinja(expr: &str, err: minijinja::Error) -> Self {
        let message = err.to_string();
        match err.kind() {
            minijinja::ErrorKind::SyntaxError => ExprError::Syntax {
                expr: expr.to_string(),
                message,
            },
            _ => ExprError::Evaluation {
                expr: expr.to_string(),
                message,
            },
        }
    }
}

/// What an expression can see about a finished step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepOutcome {
    pub status: Status,
    pub output: Option<String>,
    pub exit_code: Option<i32>,
}

/// Variables visible to conditions and templates
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExprContext {
    pub env: BTreeMap<String, String>,
    pub params: BTreeMap<String, String>,
    pub steps: BTreeMap<String, StepOutcome>,
}

impl ExprContext {
    pub fn new(env: BTreeMap<String, String>, params: BTreeMap<String, String>) -> Self {
        Self {
            env,
            params,
            steps: BTreeMap::new(),
        }
    }

    pub fn with_step(mut self, id: impl Into<String>, outcome: StepOutcome) -> Self {
        self.steps.insert(id.into(), outcome);
        self
    }

    /// Evaluate a run condition to a boolean using Jinja truthiness
    pub fn evaluate(&self, condition: &str) -> Result<bool, ExprError> {
        let env = Environment::new();
        let expr = env
            .compile_expression(condition)
            .map_err(|e| ExprError::from_minijinja(condition, e))?;
        let value = expr
            .eval(self)
            .map_err(|e| ExprError::from_minijinja(condition, e))?;
        Ok(value.is_true())
    }

    /// Render a string template
    pub fn render(&self, template: &str) -> Result<String, ExprError> {
        if !is_template(template) {
            return Ok(template.to_string());
        }
        Environment::new()
            .render_str(template, self)
            .map_err(|e| ExprError::from_minijinja(template, e))
    }

    /// Render every string parameter, recursing into arrays and objects
    pub fn render_params(
        &self,
        params: &BTreeMap<String, serde_json::Value>,
    ) -> Result<BTreeMap<String, serde_json::Value>, ExprError> {
        params
            .iter()
            .map(|(k, v)| Ok((k.clone(), self.render_value(v)?)))
            .collect()
    }

    fn render_value(&self, value: &serde_json::Value) -> Result<serde_json::Value, ExprError> {
        use serde_json::Value;
        Ok(match value {
            Value::String(s) => Value::String(self.render(s)?),
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|v| self.render_value(v))
                    .collect::<Result<_, _>>()?,
            ),
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| Ok((k.clone(), self.render_value(v)?)))
                    .collect::<Result<_, ExprError>>()?,
            ),
            other => other.clone(),
        })
    }
}

fn is_template(s: &str) -> bool {
    s.contains("{{") || s.contains("{%")
}

#[cfg(test)]
#[path = "expr_tests.rs"]
mod tests;
