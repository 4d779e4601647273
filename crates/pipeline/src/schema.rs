// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-kind step parameter schemas
//!
//! Built-in kinds have required string parameters; custom kinds are checked
//! only by whatever executor ends up running them.

use pw_core::{Backend, StepKind, StepSpec};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("step {step} ({kind}) is missing required parameter `{param}`")]
    MissingParam {
        step: String,
        kind: String,
        param: String,
    },
    #[error("step {step} ({kind}) needs one of: {}", .params.join(", "))]
    MissingOneOf {
        step: String,
        kind: String,
        params: Vec<String>,
    },
    #[error("step {step}: parameter `{param}` must be a {expected}")]
    WrongType {
        step: String,
        param: String,
        expected: &'static str,
    },
    #[error("step {step}: unknown backend `{backend}`")]
    UnknownBackend { step: String, backend: String },
}

/// Parameter requirements for one step kind
struct Schema {
    required: &'static [&'static str],
    /// At least one of these must be present (empty means no constraint)
    one_of: &'static [&'static str],
    optional: &'static [&'static str],
}

fn schema_for(kind: &StepKind) -> Option<Schema> {
    let schema = match kind {
        StepKind::Shell | StepKind::Test => Schema {
            required: &["command"],
            one_of: &[],
            optional: &["cwd", "shell"],
        },
        StepKind::Checkout => Schema {
            required: &["repository"],
            one_of: &[],
            optional: &["ref", "path"],
        },
        StepKind::ContainerBuild => Schema {
            required: &["image"],
            one_of: &[],
            optional: &["tag", "context", "dockerfile"],
        },
        StepKind::Deploy => Schema {
            required: &[],
            one_of: &["target", "command"],
            optional: &["environment"],
        },
        StepKind::Notify => Schema {
            required: &["message"],
            one_of: &[],
            optional: &["channel"],
        },
        StepKind::Custom(_) => return None,
    };
    Some(schema)
}

/// Check a step's parameters against its kind
pub fn check_step(step: &StepSpec) -> Result<(), SchemaError> {
    if let Some(value) = step.parameters.get("backend") {
        let backend = value.as_str().ok_or_else(|| SchemaError::WrongType {
            step: step.id.clone(),
            param: "backend".to_string(),
            expected: "string",
        })?;
        if Backend::parse(backend).is_none() {
            return Err(SchemaError::UnknownBackend {
                step: step.id.clone(),
                backend: backend.to_string(),
            });
        }
    }

    let Some(schema) = schema_for(&step.kind) else {
        return Ok(());
    };

    for param in schema.required {
        if !step.parameters.contains_key(*param) {
            return Err(SchemaError::MissingParam {
                step: step.id.clone(),
                kind: step.kind.to_string(),
                param: param.to_string(),
            });
        }
    }

    if !schema.one_of.is_empty() && !schema.one_of.iter().any(|p| step.parameters.contains_key(*p))
    {
        return Err(SchemaError::MissingOneOf {
            step: step.id.clone(),
            kind: step.kind.to_string(),
            params: schema.one_of.iter().map(|p| p.to_string()).collect(),
        });
    }

    // Every known parameter is a string
    let known = schema
        .required
        .iter()
        .chain(schema.one_of)
        .chain(schema.optional);
    for param in known {
        if let Some(value) = step.parameters.get(*param) {
            if !value.is_string() {
                return Err(SchemaError::WrongType {
                    step: step.id.clone(),
                    param: param.to_string(),
                    expected: "string",
                });
            }
        }
    }

    Ok(())
}

#[cfg(test)]
#[path = "schema_tests.rs"]
mod tests;
