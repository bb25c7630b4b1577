//! Repository interfaces for the two external stores.
//!
//! The task store and the interval store are independent, separately
//! persisted services. Everything in this crate reaches them only through
//! [`TaskStore`] and [`IntervalStore`]; the process-backed clients live in
//! [`taskwarrior`] and [`timewarrior`], in-memory doubles in [`memory`].

use std::collections::BTreeSet;
use std::io::Write;
use std::process::{Command, Stdio};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::config::StoreCommandConfig;
use crate::error::{Error, Result};
use crate::interval::Interval;
use crate::task::{Task, TaskStatus};

pub mod memory;
pub mod taskwarrior;
pub mod timewarrior;

/// Which task records an export returns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskFilter {
    /// Include completed and deleted tasks
    pub include_closed: bool,
    /// Restrict to one uuid
    pub uuid: Option<String>,
}

impl TaskFilter {
    pub fn open() -> Self {
        Self::default()
    }

    pub fn all() -> Self {
        Self {
            include_closed: true,
            uuid: None,
        }
    }

    pub fn uuid(uuid: impl Into<String>) -> Self {
        Self {
            include_closed: true,
            uuid: Some(uuid.into()),
        }
    }

    pub fn matches(&self, task: &Task) -> bool {
        if !self.include_closed && task.status.is_closed() {
            return false;
        }
        match &self.uuid {
            Some(uuid) => task.uuid.eq_ignore_ascii_case(uuid),
            None => true,
        }
    }
}

/// Field writes applied to one task in a single logical mutation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FieldChanges {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
}

impl FieldChanges {
    pub fn is_empty(&self) -> bool {
        self.label.is_none()
            && self.project.is_none()
            && self.description.is_none()
            && self.status.is_none()
    }

    /// Apply to a task record in place.
    pub fn apply_to(&self, task: &mut Task) {
        if let Some(label) = &self.label {
            task.label = Some(label.clone());
        }
        if let Some(project) = &self.project {
            task.project = Some(project.clone());
        }
        if let Some(description) = &self.description {
            task.description = description.clone();
        }
        if let Some(status) = self.status {
            task.status = status;
        }
    }
}

/// Which intervals an export returns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntervalFilter {
    /// Only intervals carrying this tag
    pub tag: Option<String>,
}

impl IntervalFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn tagged(tag: impl Into<String>) -> Self {
        Self {
            tag: Some(tag.into()),
        }
    }

    pub fn matches(&self, interval: &Interval) -> bool {
        match &self.tag {
            Some(tag) => interval.tags.contains(tag),
            None => true,
        }
    }
}

pub trait TaskStore {
    fn export(&self, filter: &TaskFilter) -> Result<Vec<Task>>;

    fn mutate(&self, uuid: &str, changes: &FieldChanges) -> Result<()>;

    /// Create a minimally populated record and return its durable uuid.
    fn new_stub(&self) -> Result<String>;

    /// Write a raw task record as the store would have at `at`, keeping
    /// the record's own entry and modification times.
    fn import(&self, record: &Map<String, Value>, at: DateTime<Utc>) -> Result<()>;
}

pub trait IntervalStore {
    fn export(&self, filter: &IntervalFilter) -> Result<Vec<Interval>>;

    /// Rewrite one interval's tags in a single store call.
    ///
    /// `interval` is the snapshot the caller planned against; its id names
    /// the interval and its tags are the baseline the change is applied to.
    fn retag(
        &self,
        interval: &Interval,
        remove: &BTreeSet<String>,
        add: &BTreeSet<String>,
    ) -> Result<()>;

    fn start(&self, tags: &BTreeSet<String>) -> Result<()>;

    fn resume(&self, interval: &Interval) -> Result<()>;

    fn stop(&self) -> Result<()>;
}

/// Run a store executable and return its stdout.
///
/// A spawn failure or nonzero exit becomes `StoreUnavailable`.
pub(crate) fn run_store_command(store: &StoreCommandConfig, args: &[String]) -> Result<Vec<u8>> {
    run_store_command_with_input(store, args, None)
}

/// [`run_store_command`], feeding `input` on stdin.
pub(crate) fn run_store_command_with_input(
    store: &StoreCommandConfig,
    args: &[String],
    input: Option<&[u8]>,
) -> Result<Vec<u8>> {
    tracing::debug!(command = %store.command, ?args, "store call");
    let unavailable =
        |err: std::io::Error| Error::StoreUnavailable(format!("failed to run '{}': {err}", store.command));
    let mut child = Command::new(&store.command)
        .args(&store.args)
        .args(args)
        .stdin(if input.is_some() { Stdio::piped() } else { Stdio::null() })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(unavailable)?;
    // A store that exits without reading is judged by its exit status.
    if let (Some(input), Some(mut stdin)) = (input, child.stdin.take()) {
        match stdin.write_all(input) {
            Err(err) if err.kind() != std::io::ErrorKind::BrokenPipe => {
                return Err(unavailable(err));
            }
            _ => {}
        }
    }
    let output = child.wait_with_output().map_err(unavailable)?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::StoreUnavailable(format!(
            "'{} {}' exited with {}: {}",
            store.command,
            args.join(" "),
            output.status,
            stderr.trim()
        )));
    }
    Ok(output.stdout)
}
