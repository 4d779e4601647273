// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `pw status` and `pw logs` over recorded executions

use crate::context::Context;
use crate::error::PwError;
use crate::output::{print, print_list, truncate, OutputFormat};
use anyhow::Result;
use clap::Args;
use pw_core::{Execution, ExecutionId};
use pw_engine::ExecutionSnapshot;
use serde::Serialize;
use std::fmt;
use std::process::ExitCode;

#[derive(Args)]
pub struct StatusArgs {
    /// Execution to show (a unique prefix is enough); lists all when omitted
    pub id: Option<String>,

    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    pub output: OutputFormat,
}

#[derive(Args)]
pub struct LogsArgs {
    /// Execution id (a unique prefix is enough)
    pub id: String,

    /// Only this step's output
    #[arg(long)]
    pub step: Option<String>,
}

pub fn status(ctx: &Context, args: StatusArgs) -> Result<ExitCode> {
    let engine = ctx.recorded("status")?;

    let Some(id) = args.id else {
        let rows: Vec<ExecutionRow> = engine.executions().into_iter().map(ExecutionRow).collect();
        if rows.is_empty() && args.output == OutputFormat::Text {
            println!("No executions");
        } else {
            if args.output == OutputFormat::Text {
                println!(
                    "{:<10} {:<20} {:<10} {:<8} CREATED",
                    "ID", "PIPELINE", "STATUS", "TRIGGER"
                );
            }
            print_list(&rows, args.output);
        }
        return Ok(ExitCode::SUCCESS);
    };

    let snapshot = engine
        .status(&ExecutionId::from(id.as_str()))
        .ok_or_else(|| PwError::execution_not_found(&id))?;
    print(&SnapshotView(snapshot), args.output);
    Ok(ExitCode::SUCCESS)
}

pub fn logs(ctx: &Context, args: LogsArgs) -> Result<ExitCode> {
    let engine = ctx.recorded("logs")?;
    let id = ExecutionId::from(args.id.as_str());
    if engine.status(&id).is_none() {
        return Err(PwError::execution_not_found(&args.id).into());
    }
    let chunk = engine.logs(&id, args.step.as_deref(), 0);
    print!("{}", chunk.text);
    Ok(ExitCode::SUCCESS)
}

#[derive(Serialize)]
#[serde(transparent)]
struct ExecutionRow(Execution);

impl fmt::Display for ExecutionRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let e = &self.0;
        write!(
            f,
            "{:<10} {:<20} {:<10} {:<8} {}",
            truncate(e.id.as_str(), 8),
            truncate(&e.pipeline, 20),
            e.status.as_str(),
            format!("{:?}", e.trigger.kind).to_lowercase(),
            e.created_at.format("%Y-%m-%d %H:%M:%S")
        )
    }
}

#[derive(Serialize)]
#[serde(transparent)]
struct SnapshotView(ExecutionSnapshot);

impl fmt::Display for SnapshotView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let e = &self.0.execution;
        writeln!(f, "Execution: {}", e.id)?;
        writeln!(f, "  Pipeline: {}", e.pipeline)?;
        writeln!(f, "  Status: {}", e.status)?;
        writeln!(f, "  Trigger: {:?}", e.trigger.kind)?;
        if let Some(previous) = &e.resumed_from {
            writeln!(f, "  Resumed from: {} (stage {})", previous, e.start_stage + 1)?;
        }
        if let Some(error) = &e.error {
            writeln!(f, "  Error: {}", error.message)?;
        }
        if !e.parameters.is_empty() {
            writeln!(f, "  Parameters:")?;
            for (k, v) in &e.parameters {
                writeln!(f, "    {}: {}", k, v)?;
            }
        }
        if !self.0.attempts.is_empty() {
            writeln!(f, "  Steps:")?;
            for (step, attempt) in self.0.latest() {
                let tries = self.0.attempts_of(step).len();
                let backend = attempt.backend.map(|b| b.as_str()).unwrap_or("-");
                write!(f, "    {:<20} {:<10} {:<8}", step, attempt.status.as_str(), backend)?;
                if tries > 1 {
                    write!(f, " {} attempts", tries)?;
                }
                writeln!(f)?;
            }
        }
        Ok(())
    }
}
