//! Interval store client backed by the `timew` executable.

use std::collections::BTreeSet;

use crate::config::StoreCommandConfig;
use crate::error::Result;
use crate::interval::Interval;

use super::{run_store_command, IntervalFilter, IntervalStore};

#[derive(Debug, Clone)]
pub struct TimewarriorCli {
    command: StoreCommandConfig,
}

impl TimewarriorCli {
    pub fn new(command: StoreCommandConfig) -> Self {
        Self { command }
    }

    fn run(&self, args: Vec<String>) -> Result<Vec<u8>> {
        run_store_command(&self.command, &args)
    }
}

/// Tag set an interval ends up with after a retag.
pub fn retagged(
    interval: &Interval,
    remove: &BTreeSet<String>,
    add: &BTreeSet<String>,
) -> BTreeSet<String> {
    interval
        .tags
        .iter()
        .filter(|tag| !remove.contains(*tag))
        .chain(add.iter())
        .cloned()
        .collect()
}

impl IntervalStore for TimewarriorCli {
    fn export(&self, filter: &IntervalFilter) -> Result<Vec<Interval>> {
        let mut args = vec!["export".to_string()];
        if let Some(tag) = &filter.tag {
            args.push(tag.clone());
        }
        let stdout = self.run(args)?;
        let intervals: Vec<Interval> = serde_json::from_slice(&stdout)?;
        tracing::debug!(count = intervals.len(), "interval export");
        Ok(intervals)
    }

    // One `retag` call replaces the whole tag set, so ancestors and leaf
    // never end up half rewritten.
    fn retag(
        &self,
        interval: &Interval,
        remove: &BTreeSet<String>,
        add: &BTreeSet<String>,
    ) -> Result<()> {
        let mut args = vec!["retag".to_string(), interval.reference().to_string()];
        args.extend(retagged(interval, remove, add));
        self.run(args)?;
        Ok(())
    }

    fn start(&self, tags: &BTreeSet<String>) -> Result<()> {
        let mut args = vec!["start".to_string()];
        args.extend(tags.iter().cloned());
        self.run(args)?;
        Ok(())
    }

    fn resume(&self, interval: &Interval) -> Result<()> {
        self.run(vec!["continue".to_string(), interval.reference().to_string()])?;
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        self.run(vec!["stop".to_string()])?;
        Ok(())
    }
}
