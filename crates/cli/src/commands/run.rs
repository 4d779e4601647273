// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `pw run` and `pw resume` - start an execution and follow it

use super::parse_key_val;
use super::pipeline::load;
use crate::context::{CliEngine, Context};
use crate::error::PwError;
use crate::output::{print_json_line, OutputFormat};
use anyhow::Result;
use clap::{Args, ValueEnum};
use pw_core::{Event, Execution, ExecutionId, Status, Trigger, TriggerKind};
use pw_engine::EngineError;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};

#[derive(Args)]
pub struct RunArgs {
    /// Pipeline definition file (TOML)
    pub pipeline: PathBuf,

    /// Run parameter (key=value), overrides the pipeline default
    #[arg(short = 'p', long = "param", value_parser = parse_key_val)]
    pub params: Vec<(String, String)>,

    /// Trigger recorded on the execution
    #[arg(long, value_enum, default_value_t = TriggerArg::Manual)]
    pub trigger: TriggerArg,

    /// Who started the run (default: $USER)
    #[arg(long)]
    pub actor: Option<String>,

    #[command(flatten)]
    pub follow: FollowArgs,
}

#[derive(Args)]
pub struct ResumeArgs {
    /// Execution to resume (a unique prefix is enough)
    pub id: String,

    /// Pipeline definition the execution was started from
    #[arg(long)]
    pub pipeline: PathBuf,

    #[command(flatten)]
    pub follow: FollowArgs,
}

#[derive(Args)]
pub struct FollowArgs {
    /// Print step logs as they arrive
    #[arg(long)]
    pub logs: bool,

    /// Progress output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    pub output: OutputFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TriggerArg {
    Manual,
    Push,
    Schedule,
    Api,
}

impl From<TriggerArg> for TriggerKind {
    fn from(arg: TriggerArg) -> Self {
        match arg {
            TriggerArg::Manual => TriggerKind::Manual,
            TriggerArg::Push => TriggerKind::Push,
            TriggerArg::Schedule => TriggerKind::Schedule,
            TriggerArg::Api => TriggerKind::Api,
        }
    }
}

pub async fn run(ctx: &Context, args: RunArgs) -> Result<ExitCode> {
    let definition = load(&args.pipeline)?;
    let engine = ctx.engine()?;
    recover(&engine).await;

    let trigger = Trigger {
        kind: args.trigger.into(),
        actor: args.actor.or_else(|| std::env::var("USER").ok()),
        parameters: args.params.into_iter().collect::<BTreeMap<_, _>>(),
    };
    let events = engine.subscribe();
    let execution = engine.execute(Arc::new(definition), trigger).await?;
    follow(&engine, execution, events, &args.follow).await
}

pub async fn resume(ctx: &Context, args: ResumeArgs) -> Result<ExitCode> {
    let definition = load(&args.pipeline)?;
    let engine = ctx.recorded("resume")?;
    recover(&engine).await;

    let events = engine.subscribe();
    let id = ExecutionId::from(args.id.as_str());
    let execution = match engine.resume_with(&id, Arc::new(definition)).await {
        Err(EngineError::NotFound(_)) => return Err(PwError::execution_not_found(&args.id).into()),
        other => other?,
    };
    follow(&engine, execution, events, &args.follow).await
}

async fn recover(engine: &CliEngine) {
    for id in engine.recover().await {
        eprintln!("Marked interrupted execution {} as failed", id);
    }
}

/// Print progress until the execution finishes; ctrl-c cancels it
async fn follow(
    engine: &CliEngine,
    execution: Execution,
    mut events: broadcast::Receiver<Event>,
    args: &FollowArgs,
) -> Result<ExitCode> {
    let id = execution.id.clone();
    let progress = Progress {
        id: id.clone(),
        logs: args.logs,
        format: args.output,
    };
    if args.output == OutputFormat::Text {
        match &execution.resumed_from {
            Some(previous) => println!(
                "Resuming {} as {} from stage {}",
                previous,
                id,
                execution.start_stage + 1
            ),
            None => println!("Started {} ({})", execution.pipeline, id),
        }
    }

    let wait = engine.wait(&id);
    tokio::pin!(wait);
    let mut cancelling = false;
    let finished = loop {
        tokio::select! {
            biased;
            event = events.recv() => match event {
                Ok(event) => progress.show(&event),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "progress output fell behind");
                }
                Err(RecvError::Closed) => break (&mut wait).await,
            },
            signal = tokio::signal::ctrl_c(), if !cancelling => {
                cancelling = true;
                if signal.is_ok() && engine.cancel(&id) {
                    eprintln!("Cancelling {}...", id);
                }
            }
            finished = &mut wait => break finished,
        }
    };
    while let Ok(event) = events.try_recv() {
        progress.show(&event);
    }

    let Some(finished) = finished else {
        return Err(PwError::execution_not_found(id.as_str()).into());
    };
    progress.summary(engine, &finished);
    Ok(if finished.status == Status::Success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

struct Progress {
    id: ExecutionId,
    logs: bool,
    format: OutputFormat,
}

impl Progress {
    fn show(&self, event: &Event) {
        if event.execution_id() != &self.id {
            return;
        }
        if self.format == OutputFormat::Json {
            if self.logs || !matches!(event, Event::LogAppended { .. }) {
                print_json_line(event);
            }
            return;
        }
        match event {
            Event::StageStarted { stage, .. } => println!("stage {}", stage),
            Event::Status(status) => {
                if let Some(step) = &status.step_id {
                    let attempt = status.attempt.unwrap_or(1);
                    if attempt > 1 {
                        println!("  {:<20} {} (attempt {})", step, status.new_status, attempt);
                    } else {
                        println!("  {:<20} {}", step, status.new_status);
                    }
                }
            }
            Event::LogAppended { step_id, text, .. } if self.logs => {
                let prefix = step_id.as_deref().unwrap_or("-");
                for line in text.lines() {
                    println!("  {} | {}", prefix, line);
                }
            }
            _ => {}
        }
    }

    fn summary(&self, engine: &CliEngine, execution: &Execution) {
        if self.format == OutputFormat::Json {
            if let Some(snapshot) = engine.status(&execution.id) {
                print_json_line(&snapshot);
            }
            return;
        }
        println!("Execution {} {}", execution.id, execution.status);
        if let Some(error) = &execution.error {
            println!("  error: {}", error.message);
        }
        if execution.is_resumable() {
            println!("  resume with: pw resume {} --pipeline <file>", execution.id);
        }
    }
}
