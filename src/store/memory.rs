//! In-memory task and interval stores.
//!
//! Used by tests and by dry runs that replay a plan against a snapshot.
//! Both stores can be told to fail so partial-failure paths are reachable.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeSet, HashSet};

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::interval::Interval;
use crate::task::{Task, TaskStatus};

use super::taskwarrior::STUB_DESCRIPTION;
use super::timewarrior::retagged;
use super::{FieldChanges, IntervalFilter, IntervalStore, TaskFilter, TaskStore};

#[derive(Debug, Default)]
pub struct MemoryTaskStore {
    tasks: RefCell<Vec<Task>>,
    imported: RefCell<Vec<(DateTime<Utc>, Map<String, Value>)>>,
    unavailable: Cell<bool>,
}

impl MemoryTaskStore {
    pub fn new(tasks: Vec<Task>) -> Self {
        Self {
            tasks: RefCell::new(tasks),
            ..Self::default()
        }
    }

    /// Raw records passed to `import`, with their timestamps, in call order.
    pub fn imported(&self) -> Vec<(DateTime<Utc>, Map<String, Value>)> {
        self.imported.borrow().clone()
    }

    /// Make every subsequent call fail with `StoreUnavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.set(unavailable);
    }

    pub fn snapshot(&self) -> Vec<Task> {
        self.tasks.borrow().clone()
    }

    pub fn get(&self, uuid: &str) -> Option<Task> {
        self.tasks
            .borrow()
            .iter()
            .find(|task| task.uuid == uuid)
            .cloned()
    }

    /// Replace a record wholesale, as another process writing the store would.
    pub fn put(&self, task: Task) {
        let mut tasks = self.tasks.borrow_mut();
        match tasks.iter_mut().find(|existing| existing.uuid == task.uuid) {
            Some(existing) => *existing = task,
            None => tasks.push(task),
        }
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.get() {
            return Err(Error::StoreUnavailable("task store offline".to_string()));
        }
        Ok(())
    }
}

impl TaskStore for MemoryTaskStore {
    fn export(&self, filter: &TaskFilter) -> Result<Vec<Task>> {
        self.check_available()?;
        Ok(self
            .tasks
            .borrow()
            .iter()
            .filter(|task| filter.matches(task))
            .cloned()
            .collect())
    }

    fn mutate(&self, uuid: &str, changes: &FieldChanges) -> Result<()> {
        self.check_available()?;
        let mut tasks = self.tasks.borrow_mut();
        let task = tasks
            .iter_mut()
            .find(|task| task.uuid == uuid)
            .ok_or_else(|| Error::StoreUnavailable(format!("no task with uuid {uuid}")))?;
        changes.apply_to(task);
        if task.status.is_closed() {
            task.id = 0;
        }
        task.modified = Utc::now();
        Ok(())
    }

    fn new_stub(&self) -> Result<String> {
        self.check_available()?;
        let mut tasks = self.tasks.borrow_mut();
        let next_id = tasks.iter().map(|task| task.id).max().unwrap_or(0) + 1;
        let uuid = uuid::Uuid::new_v4().to_string();
        tasks.push(Task {
            uuid: uuid.clone(),
            id: next_id,
            label: None,
            project: None,
            status: TaskStatus::Pending,
            description: STUB_DESCRIPTION.to_string(),
            modified: Utc::now(),
            wait: None,
            annotations: Vec::new(),
            depends: Vec::new(),
            tags: Vec::new(),
        });
        Ok(uuid)
    }

    fn import(&self, record: &Map<String, Value>, at: DateTime<Utc>) -> Result<()> {
        self.check_available()?;
        self.imported.borrow_mut().push((at, record.clone()));
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryIntervalStore {
    intervals: RefCell<Vec<Interval>>,
    failing: RefCell<HashSet<u64>>,
    unavailable: Cell<bool>,
}

impl MemoryIntervalStore {
    pub fn new(intervals: Vec<Interval>) -> Self {
        Self {
            intervals: RefCell::new(intervals),
            failing: RefCell::new(HashSet::new()),
            unavailable: Cell::new(false),
        }
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.set(unavailable);
    }

    /// Make retags of the interval at this position fail.
    pub fn fail_retag(&self, id: u64) {
        self.failing.borrow_mut().insert(id);
    }

    pub fn snapshot(&self) -> Vec<Interval> {
        self.intervals.borrow().clone()
    }

    pub fn get(&self, id: u64) -> Option<Interval> {
        self.intervals
            .borrow()
            .iter()
            .find(|interval| interval.id == id)
            .cloned()
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.get() {
            return Err(Error::StoreUnavailable("interval store offline".to_string()));
        }
        Ok(())
    }

    fn close_open(intervals: &mut [Interval], now: DateTime<Utc>) {
        for interval in intervals.iter_mut().filter(|interval| interval.is_open()) {
            interval.end = Some(now);
        }
    }

    fn push_front(&self, tags: BTreeSet<String>) {
        let now = Utc::now();
        let mut intervals = self.intervals.borrow_mut();
        Self::close_open(&mut intervals, now);
        for interval in intervals.iter_mut() {
            interval.id += 1;
        }
        intervals.insert(
            0,
            Interval {
                id: 1,
                start: now,
                end: None,
                tags,
            },
        );
    }
}

impl IntervalStore for MemoryIntervalStore {
    fn export(&self, filter: &IntervalFilter) -> Result<Vec<Interval>> {
        self.check_available()?;
        Ok(self
            .intervals
            .borrow()
            .iter()
            .filter(|interval| filter.matches(interval))
            .cloned()
            .collect())
    }

    fn retag(
        &self,
        interval: &Interval,
        remove: &BTreeSet<String>,
        add: &BTreeSet<String>,
    ) -> Result<()> {
        self.check_available()?;
        if self.failing.borrow().contains(&interval.id) {
            return Err(Error::StoreUnavailable(format!(
                "retag {} rejected",
                interval.reference()
            )));
        }
        let mut intervals = self.intervals.borrow_mut();
        let stored = intervals
            .iter_mut()
            .find(|stored| stored.id == interval.id)
            .ok_or_else(|| {
                Error::StoreUnavailable(format!("no interval {}", interval.reference()))
            })?;
        let next = retagged(stored, remove, add);
        stored.tags = next;
        Ok(())
    }

    fn start(&self, tags: &BTreeSet<String>) -> Result<()> {
        self.check_available()?;
        self.push_front(tags.clone());
        Ok(())
    }

    fn resume(&self, interval: &Interval) -> Result<()> {
        self.check_available()?;
        let tags = self
            .get(interval.id)
            .map(|stored| stored.tags)
            .ok_or_else(|| {
                Error::StoreUnavailable(format!("no interval {}", interval.reference()))
            })?;
        self.push_front(tags);
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        self.check_available()?;
        Self::close_open(&mut self.intervals.borrow_mut(), Utc::now());
        Ok(())
    }
}
