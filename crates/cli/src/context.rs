// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Config loading and engine construction shared by every command

use crate::error::PwError;
use anyhow::{Context as _, Result};
use pw_adapters::ExecutorRegistry;
use pw_core::{SystemClock, UuidIdGen};
use pw_engine::{Config, Engine};
use pw_storage::Store;
use std::path::Path;

pub type CliEngine = Engine<SystemClock, UuidIdGen>;

pub struct Context {
    pub config: Config,
}

impl Context {
    /// Discover the config file and apply `PW_*` overrides
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = Config::discover(explicit).context("cannot load config")?;
        config.apply_env()?;
        Ok(Self { config })
    }

    /// Engine over every configured backend, recording to the WAL when a
    /// state directory is set
    pub fn engine(&self) -> Result<CliEngine> {
        let registry = self.config.backends.build_registry(
            ExecutorRegistry::with_builtins(),
            self.config.engine.http_timeout,
        )?;
        let store = match self.config.engine.wal_path() {
            Some(path) => Store::open(&path)
                .with_context(|| format!("cannot open state at {}", path.display()))?,
            None => Store::in_memory(),
        };
        Ok(Engine::new(
            registry,
            store,
            self.config.engine.clone(),
            SystemClock,
            UuidIdGen,
        ))
    }

    /// Engine over recorded state; fails without a state directory
    pub fn recorded(&self, command: &str) -> Result<CliEngine> {
        if self.config.engine.state_dir.is_none() {
            return Err(PwError::no_state_dir(command).into());
        }
        self.engine()
    }
}
