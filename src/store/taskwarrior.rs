//! Task store client backed by the `task` executable.

use chrono::{DateTime, Local, Utc};
use serde_json::{Map, Value};

use crate::config::StoreCommandConfig;
use crate::error::{Error, Result};
use crate::task::{Task, TaskStatus};

use super::{
    run_store_command, run_store_command_with_input, FieldChanges, TaskFilter, TaskStore,
};

/// Placeholder description for freshly created stub records.
pub const STUB_DESCRIPTION: &str = "(new task)";

/// Overrides applied to every invocation so output is machine-readable
/// and nothing prompts.
const BASE_RC: [&str; 4] = [
    "rc.confirmation=off",
    "rc.bulk=0",
    "rc.json.array=on",
    "rc.hooks=off",
];

const DEFAULT_FAKETIME: &str = "faketime";

#[derive(Debug, Clone)]
pub struct TaskwarriorCli {
    command: StoreCommandConfig,
    /// Clock-faking wrapper used to backdate imports
    faketime: String,
}

impl TaskwarriorCli {
    pub fn new(command: StoreCommandConfig) -> Self {
        Self {
            command,
            faketime: DEFAULT_FAKETIME.to_string(),
        }
    }

    pub fn with_faketime(mut self, faketime: impl Into<String>) -> Self {
        self.faketime = faketime.into();
        self
    }

    fn run(&self, args: Vec<String>) -> Result<Vec<u8>> {
        let mut full: Vec<String> = BASE_RC.iter().map(|rc| rc.to_string()).collect();
        full.extend(args);
        run_store_command(&self.command, &full)
    }

    /// `faketime '<local time>' task <rc overrides> import`
    fn import_command(&self, at: DateTime<Utc>) -> (StoreCommandConfig, Vec<String>) {
        let stamp = at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string();
        let mut args = vec![stamp, self.command.command.clone()];
        args.extend(self.command.args.iter().cloned());
        args.extend(BASE_RC.iter().map(|rc| rc.to_string()));
        args.push("import".to_string());
        let wrapper = StoreCommandConfig {
            command: self.faketime.clone(),
            args: Vec::new(),
        };
        (wrapper, args)
    }
}

fn filter_args(filter: &TaskFilter) -> Vec<String> {
    let mut args = Vec::new();
    if let Some(uuid) = &filter.uuid {
        args.push(format!("uuid:{uuid}"));
    }
    if !filter.include_closed {
        args.push("status.not:completed".to_string());
        args.push("status.not:deleted".to_string());
    }
    args
}

fn modify_args(uuid: &str, changes: &FieldChanges) -> Vec<String> {
    let mut args = vec![uuid.to_string(), "modify".to_string()];
    if let Some(label) = &changes.label {
        args.push(format!("label:{label}"));
    }
    if let Some(project) = &changes.project {
        args.push(format!("project:{project}"));
    }
    if let Some(description) = &changes.description {
        args.push(format!("description:{description}"));
    }
    args
}

impl TaskStore for TaskwarriorCli {
    fn export(&self, filter: &TaskFilter) -> Result<Vec<Task>> {
        let mut args = vec!["rc.verbose=nothing".to_string()];
        args.extend(filter_args(filter));
        args.push("export".to_string());
        let stdout = self.run(args)?;
        let tasks: Vec<Task> = serde_json::from_slice(&stdout)?;
        tracing::debug!(count = tasks.len(), "task export");
        Ok(tasks)
    }

    fn mutate(&self, uuid: &str, changes: &FieldChanges) -> Result<()> {
        let fields = FieldChanges {
            status: None,
            ..changes.clone()
        };
        if !fields.is_empty() {
            self.run(modify_args(uuid, &fields))?;
        }
        match changes.status {
            Some(TaskStatus::Completed) => {
                self.run(vec![uuid.to_string(), "done".to_string()])?;
            }
            Some(TaskStatus::Deleted) => {
                self.run(vec![uuid.to_string(), "delete".to_string()])?;
            }
            Some(TaskStatus::Started) => {
                self.run(vec![uuid.to_string(), "start".to_string()])?;
            }
            Some(other) => {
                return Err(Error::InvalidArgument(format!(
                    "task store cannot set status '{other}' directly"
                )));
            }
            None => {}
        }
        Ok(())
    }

    fn new_stub(&self) -> Result<String> {
        let stdout = self.run(vec![
            "rc.verbose=new-uuid".to_string(),
            "add".to_string(),
            STUB_DESCRIPTION.to_string(),
        ])?;
        let text = String::from_utf8_lossy(&stdout);
        parse_created_uuid(&text).ok_or_else(|| {
            Error::StoreUnavailable(format!("could not read new task uuid from '{}'", text.trim()))
        })
    }

    fn import(&self, record: &Map<String, Value>, at: DateTime<Utc>) -> Result<()> {
        let (wrapper, args) = self.import_command(at);
        let input = serde_json::to_vec(record)?;
        run_store_command_with_input(&wrapper, &args, Some(&input))?;
        Ok(())
    }
}

/// Pull the uuid out of `Created task <uuid>.`
fn parse_created_uuid(output: &str) -> Option<String> {
    output
        .split_whitespace()
        .map(|word| word.trim_end_matches('.'))
        .find_map(|word| uuid::Uuid::parse_str(word).ok())
        .map(|uuid| uuid.hyphenated().to_string())
}
