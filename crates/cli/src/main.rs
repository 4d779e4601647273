// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! pw - Pipewright CLI

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod commands;
mod completions;
mod context;
mod error;
mod output;

use clap::{Parser, Subcommand};
use commands::{execution, pipeline, run};
use completions::CompletionsArgs;
use context::Context;
use error::PwError;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(
    name = "pw",
    version,
    about = "Pipewright - run one pipeline definition on any CI backend"
)]
struct Cli {
    /// Engine config file (default: ./pw.toml, then the user config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log engine activity to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a pipeline and follow it to completion
    Run(run::RunArgs),
    /// Resume a failed, timed-out, or cancelled execution
    Resume(run::ResumeArgs),
    /// Check a pipeline file and print its stage plan
    Validate(pipeline::ValidateArgs),
    /// Print the provider artifact a backend would run
    Render(pipeline::RenderArgs),
    /// Check every configured backend
    Health,
    /// List executions, or show one
    Status(execution::StatusArgs),
    /// Print recorded step logs
    Logs(execution::LogsArgs),
    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match dispatch(cli).await {
        Ok(code) => code,
        Err(e) => {
            match e.downcast_ref::<PwError>() {
                Some(err) => eprint!("{}", err),
                None => eprintln!("error: {:#}", e),
            }
            ExitCode::FAILURE
        }
    }
}

async fn dispatch(cli: Cli) -> anyhow::Result<ExitCode> {
    let ctx = Context::load(cli.config.as_deref())?;
    match cli.command {
        Commands::Run(args) => run::run(&ctx, args).await,
        Commands::Resume(args) => run::resume(&ctx, args).await,
        Commands::Validate(args) => pipeline::validate(args),
        Commands::Render(args) => pipeline::render(&ctx, args),
        Commands::Health => commands::health(&ctx).await,
        Commands::Status(args) => execution::status(&ctx, args),
        Commands::Logs(args) => execution::logs(&ctx, args),
        Commands::Completions(args) => {
            completions::generate_completions::<Cli>(args.shell);
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn setup_logging(verbose: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let default = if verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_env("PW_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .init();
}
