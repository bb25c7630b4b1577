//! Rename journal.
//!
//! Every rename goes into the journal before the task store is written.
//! If the process dies between the task-store write and the interval
//! retag, the intervals are left carrying an FQL no task has anymore; the
//! journal is what lets reconciliation map that stale leaf back to a uuid.
//!
//! Format is JSON lines, one [`RenameEntry`] per line, append-only except
//! for [`Journal::retain`], which rewrites the file atomically.

use std::fs::{self, File};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::error::Result;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RenameEntry {
    pub entry_id: String,
    pub uuid: String,
    pub old_fql: String,
    pub new_fql: String,
    pub recorded_at: DateTime<Utc>,
}

impl RenameEntry {
    pub fn new(uuid: impl Into<String>, old_fql: impl Into<String>, new_fql: impl Into<String>) -> Self {
        Self {
            entry_id: Ulid::new().to_string(),
            uuid: uuid.into(),
            old_fql: old_fql.into(),
            new_fql: new_fql.into(),
            recorded_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Journal {
    path: PathBuf,
}

impl Journal {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, entry: &RenameEntry) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string(entry)?;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{json}")?;
        file.sync_all()?;
        tracing::debug!(
            uuid = %entry.uuid,
            old = %entry.old_fql,
            new = %entry.new_fql,
            "journaled rename"
        );
        Ok(())
    }

    /// All entries in append order. A missing file is an empty journal.
    pub fn load(&self) -> Result<Vec<RenameEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let reader = BufReader::new(File::open(&self.path)?);
        let mut entries = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            entries.push(serde_json::from_str(&line)?);
        }
        Ok(entries)
    }

    /// Keep only entries matching `keep`; returns how many were dropped.
    pub fn retain<F>(&self, keep: F) -> Result<usize>
    where
        F: Fn(&RenameEntry) -> bool,
    {
        let entries = self.load()?;
        let before = entries.len();
        let kept: Vec<RenameEntry> = entries.into_iter().filter(|entry| keep(entry)).collect();
        let dropped = before - kept.len();
        if dropped == 0 {
            return Ok(0);
        }

        let mut buffer = Vec::new();
        for entry in &kept {
            serde_json::to_writer(&mut buffer, entry)?;
            buffer.push(b'\n');
        }
        write_atomic(&self.path, &buffer)?;
        tracing::debug!(dropped, kept = kept.len(), "pruned rename journal");
        Ok(dropped)
    }
}

/// Latest journaled uuid for a stale FQL.
pub fn uuid_for<'a>(entries: &'a [RenameEntry], old_fql: &str) -> Option<&'a str> {
    entries
        .iter()
        .rev()
        .find(|entry| entry.old_fql == old_fql)
        .map(|entry| entry.uuid.as_str())
}

fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let temp_path = path.with_extension("tmp");
    let mut file = File::create(&temp_path)?;
    file.write_all(data)?;
    file.sync_all()?;
    fs::rename(&temp_path, path)?;
    Ok(())
}
