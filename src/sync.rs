//! Synchronization between task identity and interval tags.
//!
//! Interval tags are a snapshot of a task's FQL taken when tracking
//! started, so every rename leaves history behind. This module keeps the
//! two stores consistent:
//!
//! - [`plan_rename`] and [`plan_reconcile`] are pure: snapshots in, tag
//!   rewrites out. They never emit a rewrite that would not change anything,
//!   which is what makes re-running them safe.
//! - [`SyncEngine`] reads the stores, runs the planners and applies the
//!   result. A failed retag does not stop the loop; every failure is
//!   collected in the [`SyncReport`].
//!
//! The task-store write is the durability point. A rename is journaled
//! first, then written to the task store, then propagated. Anything that
//! dies after the task-store write is repaired by [`SyncEngine::reconcile`].

use std::collections::{BTreeSet, HashMap};

use serde::{Serialize, Serializer};

use crate::config::FqlConfig;
use crate::error::{Error, Result};
use crate::fql;
use crate::interval::{Interval, IntervalRef};
use crate::journal::{self, Journal, RenameEntry};
use crate::store::timewarrior::retagged;
use crate::store::{FieldChanges, IntervalFilter, IntervalStore, TaskFilter, TaskStore};
use crate::task::{Task, TaskStatus};

/// Tag changes for one interval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagRewrite {
    #[serde(serialize_with = "serialize_interval_ref")]
    pub interval: Interval,
    pub remove: BTreeSet<String>,
    pub add: BTreeSet<String>,
}

impl TagRewrite {
    /// Build a rewrite, or `None` when it would leave the tags unchanged.
    fn between(interval: &Interval, remove: BTreeSet<String>, add: BTreeSet<String>) -> Option<Self> {
        let remove: BTreeSet<String> = remove
            .into_iter()
            .filter(|tag| interval.tags.contains(tag) && !add.contains(tag))
            .collect();
        let add: BTreeSet<String> = add
            .into_iter()
            .filter(|tag| !interval.tags.contains(tag))
            .collect();
        if remove.is_empty() && add.is_empty() {
            return None;
        }
        Some(Self {
            interval: interval.clone(),
            remove,
            add,
        })
    }

    /// Tags the interval carries once the rewrite is applied.
    pub fn after(&self) -> BTreeSet<String> {
        retagged(&self.interval, &self.remove, &self.add)
    }
}

fn serialize_interval_ref<S: Serializer>(interval: &Interval, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_str(&interval.reference())
}

/// Rewrites that move every interval tagged `old_fql` onto `new_fql`.
///
/// Only path tags change; carried task tags and unrelated tags stay.
pub fn plan_rename(old_fql: &str, new_fql: &str, intervals: &[Interval], marker: char) -> Vec<TagRewrite> {
    if old_fql == new_fql {
        return Vec::new();
    }
    let old_tags = fql::tag_set(old_fql);
    let new_tags = fql::tag_set(new_fql);

    intervals
        .iter()
        .filter(|interval| interval.leaf_tags(marker).contains(&old_fql))
        .filter_map(|interval| TagRewrite::between(interval, old_tags.to_set(), new_tags.to_set()))
        .collect()
}

/// Why reconciliation left an interval alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnmappedReason {
    /// Leaf tag matches no task and no journal entry
    NotJournaled,
    /// Journal points at a task that is gone or has no FQL now
    TaskGone,
    /// More than one leaf tag on one interval
    MultipleLeaves,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Unmapped {
    pub interval: IntervalRef,
    pub tags: Vec<String>,
    pub reason: UnmappedReason,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcilePlan {
    pub rewrites: Vec<TagRewrite>,
    pub unmapped: Vec<Unmapped>,
}

/// Re-derive every interval's path tags from current task state.
///
/// A leaf that is some task's current FQL (or a pseudo-task path) only has
/// its ancestor tags normalized. A stale leaf is mapped through the rename
/// journal to a uuid and from there to that task's current FQL, so chains
/// of renames collapse to the latest one. Stale leaves the journal cannot
/// explain are reported, never guessed.
pub fn plan_reconcile(
    tasks: &[Task],
    intervals: &[Interval],
    entries: &[RenameEntry],
    config: &FqlConfig,
) -> ReconcilePlan {
    let marker = config.marker();
    let mut by_fql: HashMap<String, &Task> = HashMap::new();
    for task in tasks {
        if let Some(path) = task.fql_lossy() {
            // Open tasks win a shared path over closed ones.
            let replace = by_fql
                .get(&path)
                .map_or(true, |existing| existing.status.is_closed() && !task.status.is_closed());
            if replace {
                by_fql.insert(path, task);
            }
        }
    }
    let by_uuid: HashMap<String, &Task> = tasks
        .iter()
        .map(|task| (task.uuid.to_ascii_lowercase(), task))
        .collect();

    let mut plan = ReconcilePlan::default();
    for interval in intervals {
        let leaves = interval.leaf_tags(marker);
        let leaf = match leaves.as_slice() {
            [] => continue,
            [only] => *only,
            many => {
                plan.unmapped.push(Unmapped {
                    interval: interval.reference(),
                    tags: many.iter().map(|tag| tag.to_string()).collect(),
                    reason: UnmappedReason::MultipleLeaves,
                });
                continue;
            }
        };

        let target = if fql::is_pseudo_task(leaf, &config.pseudo_namespace) || by_fql.contains_key(leaf) {
            leaf.to_string()
        } else {
            let current = journal::uuid_for(entries, leaf)
                .ok_or(UnmappedReason::NotJournaled)
                .and_then(|uuid| {
                    by_uuid
                        .get(&uuid.to_ascii_lowercase())
                        .and_then(|task| task.fql_lossy())
                        .ok_or(UnmappedReason::TaskGone)
                });
            match current {
                Ok(path) => path,
                Err(reason) => {
                    tracing::warn!(interval = %interval.reference(), leaf, ?reason, "stale leaf tag");
                    plan.unmapped.push(Unmapped {
                        interval: interval.reference(),
                        tags: vec![leaf.to_string()],
                        reason,
                    });
                    continue;
                }
            }
        };

        let desired = fql::tag_set(&target);
        let stale: BTreeSet<String> = interval
            .tags
            .iter()
            .filter(|tag| fql::is_path_tag(tag, marker) && !desired.contains(tag))
            .cloned()
            .collect();
        if let Some(rewrite) = TagRewrite::between(interval, stale, desired.to_set()) {
            plan.rewrites.push(rewrite);
        }
    }
    plan
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RetagFailure {
    pub interval: IntervalRef,
    pub error: String,
}

/// Outcome of applying a batch of rewrites.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub applied: Vec<TagRewrite>,
    pub failures: Vec<RetagFailure>,
}

impl SyncReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Every retag failure folded into one error.
    pub fn failure_error(&self) -> Option<Error> {
        if self.failures.is_empty() {
            return None;
        }
        let detail: Vec<String> = self
            .failures
            .iter()
            .map(|failure| format!("{}: {}", failure.interval, failure.error))
            .collect();
        Some(Error::StoreUnavailable(format!(
            "{} of {} interval retags failed ({})",
            self.failures.len(),
            self.failures.len() + self.applied.len(),
            detail.join("; ")
        )))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RenameOutcome {
    pub uuid: String,
    pub old_fql: Option<String>,
    pub new_fql: Option<String>,
    pub sync: SyncReport,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub dry_run: bool,
    pub plan: ReconcilePlan,
    pub sync: SyncReport,
    pub pruned: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompletionOutcome {
    pub uuid: String,
    pub was_tracking: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handoff: Option<String>,
}

/// What is being tracked right now, fetched once per operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TrackingContext {
    pub interval: Option<Interval>,
    pub leaf: Option<String>,
    pub task: Option<Task>,
}

impl TrackingContext {
    pub fn load(tasks: &dyn TaskStore, intervals: &dyn IntervalStore, config: &FqlConfig) -> Result<Self> {
        let open = intervals
            .export(&IntervalFilter::all())?
            .into_iter()
            .filter(Interval::is_open)
            .min_by_key(|interval| interval.id);
        let Some(interval) = open else {
            return Ok(Self::default());
        };

        let leaf = interval.leaf(config.marker()).map(str::to_string);
        let task = match &leaf {
            Some(path) if !fql::is_pseudo_task(path, &config.pseudo_namespace) => {
                let mut matches: Vec<Task> = tasks
                    .export(&TaskFilter::all())?
                    .into_iter()
                    .filter(|task| task.fql_lossy().as_deref() == Some(path.as_str()))
                    .collect();
                matches.sort_by_key(|task| task.status.is_closed());
                matches.into_iter().next()
            }
            _ => None,
        };
        Ok(Self {
            interval: Some(interval),
            leaf,
            task,
        })
    }

    pub fn is_tracking(&self) -> bool {
        self.interval.is_some()
    }

    /// True if the open interval's leaf is this task's FQL.
    pub fn tracks(&self, task: &Task) -> bool {
        match (&self.leaf, task.fql_lossy()) {
            (Some(leaf), Some(path)) => *leaf == path,
            _ => false,
        }
    }
}

pub struct SyncEngine<'a> {
    tasks: &'a dyn TaskStore,
    intervals: &'a dyn IntervalStore,
    config: &'a FqlConfig,
    journal: Option<&'a Journal>,
}

impl<'a> SyncEngine<'a> {
    pub fn new(tasks: &'a dyn TaskStore, intervals: &'a dyn IntervalStore, config: &'a FqlConfig) -> Self {
        Self {
            tasks,
            intervals,
            config,
            journal: None,
        }
    }

    pub fn with_journal(mut self, journal: &'a Journal) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Change a task's label and/or project and propagate the new FQL.
    pub fn rename(&self, task: &Task, label: Option<&str>, project: Option<&str>) -> Result<RenameOutcome> {
        if label.is_none() && project.is_none() {
            return Err(Error::InvalidArgument(
                "rename needs a new label or project".to_string(),
            ));
        }
        if let Some(label) = label {
            fql::validate_label(label)?;
        }
        if let Some(project) = project {
            fql::validate_project(project)?;
            self.reject_pseudo_project(project)?;
        }

        let old_fql = task.fql_lossy();
        let new_fql = match (label.or(task.label()), project.or(task.project())) {
            (Some(label), Some(project)) => Some(fql::to_fql(label, project)?),
            _ => None,
        };

        let changes = FieldChanges {
            label: label.filter(|value| Some(*value) != task.label()).map(str::to_string),
            project: project.filter(|value| Some(*value) != task.project()).map(str::to_string),
            ..FieldChanges::default()
        };
        let mut outcome = RenameOutcome {
            uuid: task.uuid.clone(),
            old_fql: old_fql.clone(),
            new_fql: new_fql.clone(),
            sync: SyncReport::default(),
        };
        if changes.is_empty() {
            tracing::debug!(uuid = %task.uuid, "rename is a no-op");
            return Ok(outcome);
        }

        self.journal_rename(&task.uuid, old_fql.as_deref(), new_fql.as_deref())?;
        self.tasks.mutate(&task.uuid, &changes)?;
        if let (Some(old), Some(new)) = (&old_fql, &new_fql) {
            outcome.sync = self.propagate(old, new)?;
        }
        Ok(outcome)
    }

    /// Sync for a modification the task store is about to persist.
    ///
    /// Used by the task store's on-modify hook, where the store itself does
    /// the write; only journal and interval tags are touched here.
    pub fn on_modify(&self, old: &Task, new: &Task) -> Result<RenameOutcome> {
        let old_fql = old.fql_lossy();
        let new_fql = new.fql()?;
        if let Some(project) = new.project() {
            if new.project() != old.project() {
                self.reject_pseudo_project(project)?;
            }
        }

        let mut outcome = RenameOutcome {
            uuid: new.uuid.clone(),
            old_fql: old_fql.clone(),
            new_fql: new_fql.clone(),
            sync: SyncReport::default(),
        };
        if let (Some(old), Some(new_path)) = (&old_fql, &new_fql) {
            if old != new_path {
                self.journal_rename(&new.uuid, Some(old), Some(new_path))?;
                outcome.sync = self.propagate(old, new_path)?;
            }
        }
        if new.status.is_closed() && !old.status.is_closed() {
            tracing::debug!(uuid = %new.uuid, status = %new.status, "task closed");
        }
        Ok(outcome)
    }

    /// Mark a task completed, then optionally hand tracking to a pseudo-task.
    ///
    /// Handoff only happens when the open interval was tracking this task.
    pub fn complete(&self, task: &Task, handoff: Option<&str>, context: &TrackingContext) -> Result<CompletionOutcome> {
        if let Some(path) = handoff {
            fql::split_path(path)?;
            if !fql::is_pseudo_task(path, &self.config.pseudo_namespace) {
                return Err(Error::MalformedIdentity(format!(
                    "handoff target '{path}' is not under '{}/'",
                    self.config.pseudo_namespace
                )));
            }
        }

        let was_tracking = context.tracks(task);
        if task.status != TaskStatus::Completed {
            self.tasks.mutate(
                &task.uuid,
                &FieldChanges {
                    status: Some(TaskStatus::Completed),
                    ..FieldChanges::default()
                },
            )?;
        }

        let handoff = match handoff {
            Some(path) if was_tracking => {
                self.intervals.start(&fql::tag_set(path).to_set())?;
                tracing::info!(uuid = %task.uuid, handoff = path, "tracking handed off");
                Some(path.to_string())
            }
            _ => {
                if was_tracking {
                    self.intervals.stop()?;
                    tracing::info!(uuid = %task.uuid, "tracking stopped");
                }
                None
            }
        };
        Ok(CompletionOutcome {
            uuid: task.uuid.clone(),
            was_tracking,
            handoff,
        })
    }

    /// Start tracking a task, or a pseudo-task path when `task` is `None`.
    pub fn start(&self, task: Option<&Task>, path: &str) -> Result<BTreeSet<String>> {
        fql::split_path(path)?;
        let marker = self.config.marker();
        let mut tags = fql::tag_set(path).to_set();
        match task {
            Some(task) => {
                tags.extend(task.tags.iter().map(|tag| fql::carried_tag(tag, marker)));
                self.intervals.start(&tags)?;
                if task.status == TaskStatus::Pending {
                    self.tasks.mutate(
                        &task.uuid,
                        &FieldChanges {
                            status: Some(TaskStatus::Started),
                            ..FieldChanges::default()
                        },
                    )?;
                }
            }
            None => {
                if !fql::is_pseudo_task(path, &self.config.pseudo_namespace) {
                    return Err(Error::InvalidArgument(format!(
                        "'{path}' has no task and is not a pseudo-task"
                    )));
                }
                self.intervals.start(&tags)?;
            }
        }
        tracing::info!(path, "tracking started");
        Ok(tags)
    }

    /// Continue the most recent interval with its tags.
    pub fn resume_latest(&self) -> Result<Interval> {
        let latest = self
            .intervals
            .export(&IntervalFilter::all())?
            .into_iter()
            .min_by_key(|interval| interval.id)
            .ok_or_else(|| Error::NotFound("no interval to continue".to_string()))?;
        if latest.is_open() {
            return Err(Error::InvalidArgument(format!(
                "{} is still tracking",
                latest.reference()
            )));
        }
        self.intervals.resume(&latest)?;
        tracing::info!(interval = %latest.reference(), "tracking continued");
        Ok(latest)
    }

    /// Full-store reconciliation pass. Safe to repeat.
    pub fn reconcile(&self, dry_run: bool) -> Result<ReconcileReport> {
        let tasks = self.tasks.export(&TaskFilter::all())?;
        let intervals = self.intervals.export(&IntervalFilter::all())?;
        let entries = match self.journal {
            Some(journal) => journal.load()?,
            None => Vec::new(),
        };

        let plan = plan_reconcile(&tasks, &intervals, &entries, self.config);
        tracing::debug!(
            rewrites = plan.rewrites.len(),
            unmapped = plan.unmapped.len(),
            "reconcile plan"
        );
        let mut report = ReconcileReport {
            dry_run,
            plan,
            ..ReconcileReport::default()
        };
        if dry_run {
            return Ok(report);
        }

        report.sync = self.apply(&report.plan.rewrites);
        if report.sync.is_clean() {
            if let Some(journal) = self.journal {
                report.pruned = self.prune(journal)?;
            }
        }
        Ok(report)
    }

    /// Apply rewrites one interval at a time, continuing past failures.
    pub fn apply(&self, rewrites: &[TagRewrite]) -> SyncReport {
        let mut report = SyncReport::default();
        for rewrite in rewrites {
            let reference = rewrite.interval.reference();
            match self
                .intervals
                .retag(&rewrite.interval, &rewrite.remove, &rewrite.add)
            {
                Ok(()) => {
                    tracing::info!(
                        interval = %reference,
                        removed = ?rewrite.remove,
                        added = ?rewrite.add,
                        "retagged"
                    );
                    report.applied.push(rewrite.clone());
                }
                Err(err) => {
                    tracing::warn!(interval = %reference, %err, "retag failed");
                    report.failures.push(RetagFailure {
                        interval: reference,
                        error: err.to_string(),
                    });
                }
            }
        }
        report
    }

    fn propagate(&self, old_fql: &str, new_fql: &str) -> Result<SyncReport> {
        let intervals = self.intervals.export(&IntervalFilter::tagged(old_fql))?;
        let rewrites = plan_rename(old_fql, new_fql, &intervals, self.config.marker());
        tracing::debug!(old = old_fql, new = new_fql, intervals = rewrites.len(), "propagating rename");
        Ok(self.apply(&rewrites))
    }

    fn journal_rename(&self, uuid: &str, old_fql: Option<&str>, new_fql: Option<&str>) -> Result<()> {
        match (self.journal, old_fql, new_fql) {
            (Some(journal), Some(old), Some(new)) if old != new => {
                journal.append(&RenameEntry::new(uuid, old, new))
            }
            _ => Ok(()),
        }
    }

    /// Drop journal entries whose old FQL no interval carries anymore.
    fn prune(&self, journal: &Journal) -> Result<usize> {
        let intervals = self.intervals.export(&IntervalFilter::all())?;
        let live: BTreeSet<&str> = intervals
            .iter()
            .flat_map(|interval| interval.tags.iter().map(String::as_str))
            .collect();
        journal.retain(|entry| live.contains(entry.old_fql.as_str()))
    }

    fn reject_pseudo_project(&self, project: &str) -> Result<()> {
        let top = project.split(fql::PROJECT_SEP).next().unwrap_or_default();
        if top == self.config.pseudo_namespace {
            return Err(Error::MalformedIdentity(format!(
                "project '{project}' is in the reserved '{top}' namespace"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::{MemoryIntervalStore, MemoryTaskStore};
    use chrono::Utc;

    fn set(tags: &[&str]) -> BTreeSet<String> {
        tags.iter().map(|tag| tag.to_string()).collect()
    }

    fn interval(id: u64, tags: &[&str], open: bool) -> Interval {
        Interval {
            id,
            start: Utc::now(),
            end: if open { None } else { Some(Utc::now()) },
            tags: set(tags),
        }
    }

    fn task(uuid: &str, project: &str, label: &str) -> Task {
        Task {
            uuid: uuid.to_string(),
            id: 1,
            label: Some(label.to_string()),
            project: Some(project.to_string()),
            status: TaskStatus::Pending,
            description: "work".to_string(),
            modified: Utc::now(),
            wait: None,
            annotations: Vec::new(),
            depends: Vec::new(),
            tags: Vec::new(),
        }
    }

    #[test]
    fn rename_plan_swaps_path_tags_only() {
        let intervals = vec![
            interval(1, &["proj/", "proj/old", "+urgent"], false),
            interval(2, &["proj/", "proj/other"], false),
        ];
        let rewrites = plan_rename("proj/old", "proj/new", &intervals, '+');
        assert_eq!(rewrites.len(), 1);
        assert_eq!(rewrites[0].interval.id, 1);
        assert_eq!(rewrites[0].remove, set(&["proj/old"]));
        assert_eq!(rewrites[0].add, set(&["proj/new"]));
        assert_eq!(rewrites[0].after(), set(&["proj/", "proj/new", "+urgent"]));
    }

    #[test]
    fn rename_plan_is_empty_when_nothing_changes() {
        let intervals = vec![interval(1, &["a/", "a/x"], false)];
        assert!(plan_rename("a/x", "a/x", &intervals, '+').is_empty());
        assert!(plan_rename("a/gone", "a/y", &intervals, '+').is_empty());
    }

    #[test]
    fn rename_plan_moves_across_hierarchies() {
        let intervals = vec![interval(3, &["a/", "a/b/", "a/b/x"], false)];
        let rewrites = plan_rename("a/b/x", "c/x", &intervals, '+');
        assert_eq!(rewrites[0].after(), set(&["c/", "c/x"]));
    }

    #[test]
    fn reconcile_maps_stale_leaf_through_journal_chain() {
        let tasks = vec![task("u-1", "src.tools", "gadget")];
        let intervals = vec![interval(1, &["src/", "src/tools/", "src/tools/widget"], false)];
        let entries = vec![
            RenameEntry::new("u-1", "src/tools/widget", "src/tools/gizmo"),
            RenameEntry::new("u-1", "src/tools/gizmo", "src/tools/gadget"),
        ];
        let plan = plan_reconcile(&tasks, &intervals, &entries, &FqlConfig::default());
        assert!(plan.unmapped.is_empty());
        assert_eq!(
            plan.rewrites[0].after(),
            set(&["src/", "src/tools/", "src/tools/gadget"])
        );
    }

    #[test]
    fn reconcile_repairs_ancestors_and_reports_unknown_leaves() {
        let tasks = vec![task("u-1", "a.b", "x")];
        let intervals = vec![
            interval(1, &["a/", "a/x/", "a/b/x"], false),
            interval(2, &["z/", "z/mystery"], false),
            interval(3, &["time/", "time/lunch"], false),
            interval(4, &["a/", "a/b/", "a/b/x"], false),
        ];
        let plan = plan_reconcile(&tasks, &intervals, &[], &FqlConfig::default());
        assert_eq!(plan.rewrites.len(), 1);
        assert_eq!(plan.rewrites[0].remove, set(&["a/x/"]));
        assert_eq!(plan.rewrites[0].add, set(&["a/b/"]));
        assert_eq!(plan.unmapped.len(), 1);
        assert_eq!(plan.unmapped[0].interval, IntervalRef(2));
        assert_eq!(plan.unmapped[0].reason, UnmappedReason::NotJournaled);
    }

    #[test]
    fn apply_continues_after_failures() {
        let tasks = MemoryTaskStore::default();
        let store = MemoryIntervalStore::new(vec![
            interval(1, &["p/", "p/old"], true),
            interval(2, &["p/", "p/old"], false),
            interval(3, &["p/", "p/old"], false),
        ]);
        store.fail_retag(2);
        let config = FqlConfig::default();
        let engine = SyncEngine::new(&tasks, &store, &config);

        let rewrites = plan_rename("p/old", "p/new", &store.snapshot(), '+');
        let report = engine.apply(&rewrites);
        assert_eq!(report.applied.len(), 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].interval, IntervalRef(2));
        assert!(matches!(report.failure_error(), Some(Error::StoreUnavailable(_))));
        assert!(store.get(3).expect("interval").tags.contains("p/new"));
    }

    #[test]
    fn rename_journals_writes_and_propagates() {
        let dir = tempfile::tempdir().expect("tempdir");
        let journal = Journal::new(dir.path().join("renames.jsonl"));
        let original = task("u-1", "proj", "old");
        let tasks = MemoryTaskStore::new(vec![original.clone()]);
        let intervals = MemoryIntervalStore::new(vec![interval(1, &["proj/", "proj/old"], false)]);
        let config = FqlConfig::default();
        let engine = SyncEngine::new(&tasks, &intervals, &config).with_journal(&journal);

        let outcome = engine.rename(&original, Some("new"), None).expect("rename");
        assert_eq!(outcome.new_fql.as_deref(), Some("proj/new"));
        assert!(outcome.sync.is_clean());
        assert_eq!(tasks.get("u-1").and_then(|t| t.label), Some("new".to_string()));
        assert_eq!(intervals.get(1).expect("interval").tags, set(&["proj/", "proj/new"]));
        assert_eq!(journal.load().expect("load").len(), 1);

        let renamed = tasks.get("u-1").expect("task");
        let again = engine.rename(&renamed, Some("new"), None).expect("rename");
        assert!(again.sync.applied.is_empty());
        assert_eq!(journal.load().expect("load").len(), 1);
    }

    #[test]
    fn rename_rejects_bad_input_before_writing() {
        let original = task("u-1", "proj", "old");
        let tasks = MemoryTaskStore::new(vec![original.clone()]);
        let intervals = MemoryIntervalStore::default();
        let config = FqlConfig::default();
        let engine = SyncEngine::new(&tasks, &intervals, &config);

        assert!(matches!(
            engine.rename(&original, Some("bad/label"), None),
            Err(Error::MalformedIdentity(_))
        ));
        assert!(matches!(
            engine.rename(&original, None, Some("time.meetings")),
            Err(Error::MalformedIdentity(_))
        ));
        assert_eq!(tasks.get("u-1"), Some(original));
    }

    #[test]
    fn complete_hands_off_only_when_tracking() {
        let target = task("u-1", "a", "x");
        let tasks = MemoryTaskStore::new(vec![target.clone()]);
        let intervals = MemoryIntervalStore::new(vec![interval(1, &["a/", "a/x"], true)]);
        let config = FqlConfig::default();
        let engine = SyncEngine::new(&tasks, &intervals, &config);

        let context = TrackingContext::load(&tasks, &intervals, &config).expect("context");
        assert!(context.tracks(&target));
        let outcome = engine
            .complete(&target, Some("time/slack"), &context)
            .expect("complete");
        assert!(outcome.was_tracking);
        assert_eq!(outcome.handoff.as_deref(), Some("time/slack"));
        assert_eq!(tasks.get("u-1").expect("task").status, TaskStatus::Completed);
        assert_eq!(intervals.get(1).expect("interval").tags, set(&["time/", "time/slack"]));
        assert!(!intervals.get(2).expect("interval").is_open());
    }

    #[test]
    fn complete_without_handoff_stops_tracking() {
        let target = task("u-1", "a", "x");
        let tasks = MemoryTaskStore::new(vec![target.clone()]);
        let intervals = MemoryIntervalStore::new(vec![interval(1, &["a/", "a/x"], true)]);
        let config = FqlConfig::default();
        let engine = SyncEngine::new(&tasks, &intervals, &config);

        let context = TrackingContext::load(&tasks, &intervals, &config).expect("context");
        let outcome = engine.complete(&target, None, &context).expect("complete");
        assert!(outcome.was_tracking);
        assert!(outcome.handoff.is_none());
        assert!(!intervals.get(1).expect("interval").is_open());

        let resumed = engine.resume_latest().expect("resume");
        assert_eq!(resumed.tags, set(&["a/", "a/x"]));
        assert!(intervals.get(1).expect("interval").is_open());
        assert!(matches!(engine.resume_latest(), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn complete_rejects_real_task_handoff() {
        let target = task("u-1", "a", "x");
        let tasks = MemoryTaskStore::new(vec![target.clone()]);
        let intervals = MemoryIntervalStore::default();
        let config = FqlConfig::default();
        let engine = SyncEngine::new(&tasks, &intervals, &config);
        let err = engine
            .complete(&target, Some("a/y"), &TrackingContext::default())
            .expect_err("not pseudo");
        assert!(matches!(err, Error::MalformedIdentity(_)));
        assert_eq!(tasks.get("u-1").expect("task").status, TaskStatus::Pending);
    }

    #[test]
    fn start_carries_marked_task_tags() {
        let mut target = task("u-1", "src.tools", "widget");
        target.tags = vec!["urgent".to_string()];
        let tasks = MemoryTaskStore::new(vec![target.clone()]);
        let intervals = MemoryIntervalStore::default();
        let config = FqlConfig::default();
        let engine = SyncEngine::new(&tasks, &intervals, &config);

        let tags = engine.start(Some(&target), "src/tools/widget").expect("start");
        assert_eq!(tags, set(&["src/", "src/tools/", "src/tools/widget", "+urgent"]));
        assert_eq!(tasks.get("u-1").expect("task").status, TaskStatus::Started);

        assert!(matches!(
            engine.start(None, "src/tools/nothing"),
            Err(Error::InvalidArgument(_))
        ));
        engine.start(None, "time/lunch").expect("pseudo start");
    }
}
