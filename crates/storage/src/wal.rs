// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Write-ahead log for durable storage
//!
//! One JSON object per line, fsynced after every append. A record is
//! visible to readers only after its line is on disk.

use pw_core::Operation;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur in WAL operations
#[derive(Debug, Error)]
pub enum WalError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("corrupt WAL entry at line {line}: {source}")]
    Corrupt {
        line: usize,
        source: serde_json::Error,
    },
}

/// Write-ahead log for durable operation storage
pub struct Wal {
    path: PathBuf,
    file: File,
    sequence: u64,
}

impl Wal {
    /// Open or create a WAL at the given path
    pub fn open(path: &Path) -> Result<Self, WalError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(path)?;

        // Drop a torn tail so the next append starts on a fresh line
        let (entries, valid_len) = Self::entries(path)?;
        if file.metadata()?.len() > valid_len {
            file.set_len(valid_len)?;
        }
        let sequence = entries.last().map(|entry| entry.seq).unwrap_or(0);

        Ok(Self {
            path: path.to_path_buf(),
            file,
            sequence,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append an operation to the log
    pub fn append(&mut self, op: &Operation) -> Result<u64, WalError> {
        let entry = WalEntry {
            seq: self.sequence + 1,
            op: op.clone(),
        };
        let line = serde_json::to_string(&entry)?;
        writeln!(self.file, "{}", line)?;
        self.file.sync_all()?;
        self.sequence = entry.seq;
        Ok(self.sequence)
    }

    /// Get the current sequence number
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Replay all operations from the log
    pub fn replay(path: &Path) -> Result<Vec<Operation>, WalError> {
        let (entries, _) = Self::entries(path)?;
        Ok(entries.into_iter().map(|e| e.op).collect())
    }

    /// Parsed entries plus the byte length of the readable prefix
    fn entries(path: &Path) -> Result<(Vec<WalEntry>, u64), WalError> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok((Vec::new(), 0)),
            Err(e) => return Err(e.into()),
        };

        let lines: Vec<&str> = content.split_inclusive('\n').collect();
        let last = lines.iter().rposition(|l| !l.trim().is_empty());

        let mut entries = Vec::new();
        let mut valid_len = 0u64;
        for (index, line) in lines.iter().enumerate() {
            if line.trim().is_empty() {
                valid_len += line.len() as u64;
                continue;
            }
            let complete = line.ends_with('\n');
            match serde_json::from_str::<WalEntry>(line.trim_end()) {
                Ok(entry) if complete => {
                    entries.push(entry);
                    valid_len += line.len() as u64;
                }
                Err(source) if Some(index) != last => {
                    return Err(WalError::Corrupt {
                        line: index + 1,
                        source,
                    })
                }
                // A torn final line is a write that never completed
                _ => break,
            }
        }

        Ok((entries, valid_len))
    }
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct WalEntry {
    seq: u64,
    op: Operation,
}

#[cfg(test)]
#[path = "wal_tests.rs"]
mod tests;
