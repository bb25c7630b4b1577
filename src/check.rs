//! Integrity checks over a task store export.
//!
//! Every check is a pure function from the export to a list of offending
//! records. All of them run on every pass, whatever the others report, and
//! nothing here ever writes to a store.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::{CheckConfig, FqlConfig, LabelScope};
use crate::error::{Error, Result};
use crate::fql;
use crate::task::{Task, TaskStatus};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckOutcome {
    pub name: &'static str,
    pub passed: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CheckReport {
    pub tasks: usize,
    pub outcomes: Vec<CheckOutcome>,
}

impl CheckReport {
    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|outcome| !outcome.passed).count()
    }

    pub fn failed_names(&self) -> Vec<String> {
        self.outcomes
            .iter()
            .filter(|outcome| !outcome.passed)
            .map(|outcome| outcome.name.to_string())
            .collect()
    }

    pub fn outcome(&self, name: &str) -> Option<&CheckOutcome> {
        self.outcomes.iter().find(|outcome| outcome.name == name)
    }

    /// `IntegrityViolation` carrying every failed check and its records.
    pub fn into_result(self) -> Result<Self> {
        if self.failed() == 0 {
            return Ok(self);
        }
        Err(Error::IntegrityViolation {
            checks: self
                .outcomes
                .into_iter()
                .filter(|outcome| !outcome.passed)
                .collect(),
        })
    }
}

type CheckFn = fn(&Checker<'_>, &[Task]) -> Vec<String>;

const CHECKS: [(&str, CheckFn); 8] = [
    ("uuid-prefix", uuid_prefix),
    ("duplicate-labels", duplicate_labels),
    ("fql-collision", fql_collision),
    ("malformed-identity", malformed_identity),
    ("project-without-label", project_without_label),
    ("display-width", display_width),
    ("stale-waiting", stale_waiting),
    ("waiting-blocker", waiting_blocker),
];

pub struct Checker<'a> {
    check: &'a CheckConfig,
    fql: &'a FqlConfig,
    now: DateTime<Utc>,
}

impl<'a> Checker<'a> {
    pub fn new(check: &'a CheckConfig, fql: &'a FqlConfig) -> Self {
        Self {
            check,
            fql,
            now: Utc::now(),
        }
    }

    /// Evaluate time-dependent checks against a fixed instant.
    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    pub fn names() -> impl Iterator<Item = &'static str> {
        CHECKS.iter().map(|(name, _)| *name)
    }

    /// Run every check over a full export (closed tasks included).
    pub fn run(&self, tasks: &[Task]) -> CheckReport {
        let outcomes = CHECKS
            .iter()
            .map(|&(name, check)| {
                let details = check(self, tasks);
                if !details.is_empty() {
                    tracing::debug!(check = name, failures = details.len(), "check failed");
                }
                CheckOutcome {
                    name,
                    passed: details.is_empty(),
                    details,
                }
            })
            .collect();
        CheckReport {
            tasks: tasks.len(),
            outcomes,
        }
    }
}

fn uuid_prefix(checker: &Checker<'_>, tasks: &[Task]) -> Vec<String> {
    let width = checker.fql.uuid_prefix_len;
    let mut groups: BTreeMap<String, Vec<&Task>> = BTreeMap::new();
    for task in tasks {
        let uuid = task.uuid.to_ascii_lowercase();
        let prefix = uuid.get(..width).unwrap_or(uuid.as_str()).to_string();
        groups.entry(prefix).or_default().push(task);
    }
    groups
        .into_iter()
        .filter(|(_, group)| group.len() > 1)
        .map(|(prefix, group)| format!("prefix {prefix} is shared by {}", uuids(&group)))
        .collect()
}

fn duplicate_labels(checker: &Checker<'_>, tasks: &[Task]) -> Vec<String> {
    let mut groups: BTreeMap<(String, String), Vec<&Task>> = BTreeMap::new();
    for task in open(tasks) {
        let Some(label) = task.label() else { continue };
        let scope = match checker.check.label_scope {
            LabelScope::Global => String::new(),
            LabelScope::Hierarchy => task
                .project()
                .and_then(|project| project.split(fql::PROJECT_SEP).next())
                .unwrap_or_default()
                .to_string(),
        };
        groups
            .entry((scope, label.to_string()))
            .or_default()
            .push(task);
    }
    groups
        .into_iter()
        .filter(|(_, group)| group.len() > 1)
        .map(|((scope, label), group)| {
            let place = if scope.is_empty() {
                String::new()
            } else {
                format!(" under '{scope}'")
            };
            format!("label '{label}'{place} is used by {}", uuids(&group))
        })
        .collect()
}

/// Duplicate FQLs, and FQLs equal to another task's project path.
fn fql_collision(_checker: &Checker<'_>, tasks: &[Task]) -> Vec<String> {
    let mut by_path: BTreeMap<String, Vec<&Task>> = BTreeMap::new();
    for task in open(tasks) {
        if let Some(path) = task.fql_lossy() {
            by_path.entry(path).or_default().push(task);
        }
    }

    let mut ancestors: HashMap<String, &Task> = HashMap::new();
    for (path, group) in &by_path {
        for ancestor in fql::tag_set(path).ancestors {
            let bare = ancestor.trim_end_matches(fql::PATH_SEP).to_string();
            ancestors.entry(bare).or_insert(group[0]);
        }
    }

    let mut out = Vec::new();
    for (path, group) in &by_path {
        if group.len() > 1 {
            out.push(format!("{path} is the FQL of {}", uuids(group)));
        }
        if let Some(owner) = ancestors.get(path) {
            out.push(format!(
                "{path} ({}) is a project path of {}",
                uuids(group),
                owner.short_uuid()
            ));
        }
    }
    out
}

fn malformed_identity(_checker: &Checker<'_>, tasks: &[Task]) -> Vec<String> {
    open(tasks)
        .filter_map(|task| {
            let err = task.validate_identity().err()?;
            Some(format!("{}: {err}", task.short_uuid()))
        })
        .collect()
}

fn project_without_label(_checker: &Checker<'_>, tasks: &[Task]) -> Vec<String> {
    open(tasks)
        .filter(|task| task.project().is_some() && task.label().is_none())
        .map(|task| {
            format!(
                "{} has project '{}' but no label",
                task.short_uuid(),
                task.project().unwrap_or_default()
            )
        })
        .collect()
}

fn display_width(checker: &Checker<'_>, tasks: &[Task]) -> Vec<String> {
    let budget = checker.check.display_budget;
    tasks
        .iter()
        .filter(|task| matches!(task.status, TaskStatus::Pending | TaskStatus::Started))
        .filter_map(|task| {
            let width = task.display_line().chars().count();
            (width > budget).then(|| {
                format!("{} renders {width} chars (budget {budget})", task.short_uuid())
            })
        })
        .collect()
}

fn stale_waiting(checker: &Checker<'_>, tasks: &[Task]) -> Vec<String> {
    tasks
        .iter()
        .filter(|task| task.status == TaskStatus::Waiting)
        .filter_map(|task| {
            let wait = task.wait?;
            (wait <= checker.now).then(|| {
                format!(
                    "{} is waiting until {} which has passed",
                    task.short_uuid(),
                    wait.to_rfc3339()
                )
            })
        })
        .collect()
}

fn waiting_blocker(checker: &Checker<'_>, tasks: &[Task]) -> Vec<String> {
    let waiting: HashMap<String, &Task> = tasks
        .iter()
        .filter(|task| is_waiting(task, checker.now))
        .map(|task| (task.uuid.to_ascii_lowercase(), task))
        .collect();

    let mut reported = HashSet::new();
    let mut out = Vec::new();
    for task in open(tasks) {
        for dep in &task.depends {
            let key = dep.to_ascii_lowercase();
            if let Some(blocker) = waiting.get(&key) {
                if reported.insert((key, task.uuid.clone())) {
                    out.push(format!(
                        "{} blocks {} but is waiting",
                        blocker.short_uuid(),
                        task.short_uuid()
                    ));
                }
            }
        }
    }
    out
}

/// Newer task stores export hidden tasks as pending with a future wait.
fn is_waiting(task: &Task, now: DateTime<Utc>) -> bool {
    match task.status {
        TaskStatus::Waiting => true,
        TaskStatus::Pending => task.wait.is_some_and(|wait| wait > now),
        _ => false,
    }
}

fn open(tasks: &[Task]) -> impl Iterator<Item = &Task> {
    tasks.iter().filter(|task| !task.status.is_closed())
}

fn uuids(tasks: &[&Task]) -> String {
    tasks
        .iter()
        .map(|task| task.uuid.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
