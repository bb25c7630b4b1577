//! Store-wide commands: reconcile, check, import-undo.

use std::io::{self, IsTerminal, Read};
use std::path::Path;

use crate::check::Checker;
use crate::error::{Error, Result};
use crate::output::{emit_success, HumanOutput};
use crate::store::{TaskFilter, TaskStore};
use crate::undo::{self, ImportReport, UndoLog};

use super::Context;

pub fn run_reconcile(ctx: &Context, dry_run: bool) -> Result<()> {
    let report = ctx.engine().reconcile(dry_run)?;
    if let Some(err) = report.sync.failure_error() {
        return Err(err);
    }

    let header = if dry_run {
        "Reconcile plan"
    } else {
        "Reconciled"
    };
    let mut human = HumanOutput::new(header);
    let count = if dry_run {
        report.plan.rewrites.len()
    } else {
        report.sync.applied.len()
    };
    human.push_summary("Intervals retagged", count.to_string());
    human.push_summary("Unmapped", report.plan.unmapped.len().to_string());
    if !dry_run {
        human.push_summary("Journal entries pruned", report.pruned.to_string());
    }
    for rewrite in &report.plan.rewrites {
        let removed: Vec<&str> = rewrite.remove.iter().map(String::as_str).collect();
        let added: Vec<&str> = rewrite.add.iter().map(String::as_str).collect();
        human.push_detail(format!(
            "{}: -{} +{}",
            rewrite.interval.reference(),
            removed.join(","),
            added.join(",")
        ));
    }
    for unmapped in &report.plan.unmapped {
        human.push_warning(format!(
            "{} {} ({:?})",
            unmapped.interval,
            unmapped.tags.join(","),
            unmapped.reason
        ));
    }
    if dry_run && !report.plan.rewrites.is_empty() {
        human.push_next_step("twtools reconcile");
    }

    emit_success(ctx.output, "reconcile", &report, Some(&human))
}

/// Runs every check. Any failure exits nonzero; in human mode the full
/// report is printed first, in JSON mode only the error envelope is.
pub fn run_check(ctx: &Context) -> Result<()> {
    let tasks = ctx.tasks.export(&TaskFilter::all())?;
    let report = Checker::new(&ctx.config.check, &ctx.config.fql).run(&tasks);

    if report.failed() > 0 && ctx.output.json {
        return report.into_result().map(drop);
    }

    let mut human = HumanOutput::new("Integrity check");
    human.push_summary("Tasks", report.tasks.to_string());
    human.push_summary("Failed checks", report.failed().to_string());
    for outcome in &report.outcomes {
        let mark = if outcome.passed { "ok" } else { "FAIL" };
        human.push_detail(format!("{mark} {}", outcome.name));
        for detail in &outcome.details {
            human.push_detail(format!("  {detail}"));
        }
    }

    emit_success(ctx.output, "check", &report, Some(&human))?;
    report.into_result().map(drop)
}

/// Reads the whole log first; nothing is imported if any entry is bad.
pub fn run_import_undo(ctx: &Context, path: Option<&Path>, dry_run: bool) -> Result<()> {
    let input = match path {
        Some(path) => std::fs::read(path)?,
        None => {
            let stdin = io::stdin();
            if stdin.is_terminal() {
                return Err(Error::InvalidArgument(
                    "pass an undo.data path or pipe the log on stdin".to_string(),
                ));
            }
            let mut input = Vec::new();
            stdin.lock().read_to_end(&mut input)?;
            input
        }
    };

    let records = UndoLog::parse(&input).into_records()?;
    tracing::info!(records = records.len(), dry_run, "undo log parsed");
    let report = if dry_run {
        ImportReport {
            records: records.len(),
            imported: 0,
            dry_run,
        }
    } else {
        undo::import_records(&ctx.tasks, &records)?
    };

    let mut human = HumanOutput::new(if dry_run { "Undo log checked" } else { "Undo log imported" });
    human.push_summary("Records", report.records.to_string());
    if dry_run {
        human.push_next_step("twtools import-undo without --dry-run");
    } else {
        human.push_summary("Imported", report.imported.to_string());
    }
    emit_success(ctx.output, "import-undo", &report, Some(&human))
}
