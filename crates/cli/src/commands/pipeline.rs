// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `pw validate` and `pw render`

use super::parse_backend;
use crate::context::Context;
use crate::error::PwError;
use anyhow::{Context as _, Result};
use clap::Args;
use pw_core::{AdapterError, Backend, PipelineDefinition, Stage};
use pw_engine::EngineError;
use pw_pipeline::{load_pipeline, stage_backend, validate as validate_plan};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Args)]
pub struct ValidateArgs {
    /// Pipeline definition file (TOML)
    pub pipeline: PathBuf,
}

#[derive(Args)]
pub struct RenderArgs {
    /// Pipeline definition file (TOML)
    pub pipeline: PathBuf,

    /// Backend to render for
    #[arg(short, long, value_parser = parse_backend, default_value = "local")]
    pub backend: Backend,

    /// Write the artifact here instead of stdout
    #[arg(short, long)]
    pub out: Option<PathBuf>,
}

pub fn load(path: &Path) -> Result<PipelineDefinition> {
    load_pipeline(path).with_context(|| format!("cannot load pipeline {}", path.display()))
}

pub fn validate(args: ValidateArgs) -> Result<ExitCode> {
    let definition = load(&args.pipeline)?;
    let stages = validate_plan(&definition)?;
    print!("{}", describe_plan(&definition, &stages)?);
    Ok(ExitCode::SUCCESS)
}

pub fn render(ctx: &Context, args: RenderArgs) -> Result<ExitCode> {
    let definition = load(&args.pipeline)?;
    let engine = ctx.engine()?;
    let artifact = match engine.render(&definition, args.backend) {
        Err(EngineError::Adapter(AdapterError::Unsupported(_))) => {
            return Err(PwError::backend_not_configured(args.backend).into())
        }
        other => other?,
    };

    match args.out {
        Some(path) => {
            std::fs::write(&path, &artifact.content)
                .with_context(|| format!("cannot write {}", path.display()))?;
            println!("Wrote {} ({})", path.display(), artifact.file_name);
        }
        None => print!("{}", artifact.content),
    }
    Ok(ExitCode::SUCCESS)
}

/// Human-readable stage plan
fn describe_plan(definition: &PipelineDefinition, stages: &[Stage]) -> Result<String> {
    let steps: usize = stages.iter().map(|s| s.steps().count()).sum();
    let mut out = format!(
        "Pipeline {}: {} stage{}, {} step{}\n",
        definition.name,
        stages.len(),
        plural(stages.len()),
        steps,
        plural(steps)
    );
    for stage in stages {
        let backend = stage_backend(definition.execution_mode, stage)?;
        out.push_str(&format!("  stage {} ({})\n", stage.index, backend));
        for group in &stage.groups {
            let ids: Vec<&str> = group.steps.iter().map(|s| s.id.as_str()).collect();
            if group.implicit {
                out.push_str(&format!("    {}\n", ids.join(", ")));
            } else {
                out.push_str(&format!(
                    "    [{} {}] {}\n",
                    group.id,
                    group.policy.as_str(),
                    ids.join(", ")
                ));
            }
        }
    }
    Ok(out)
}

fn plural(n: usize) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
