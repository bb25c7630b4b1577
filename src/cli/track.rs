//! Tracking commands: start, done, current.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::error::{Error, Result};
use crate::fql;
use crate::output::{emit_success, HumanOutput};
use crate::resolver::ResolveOptions;
use crate::sync::TrackingContext;

use super::Context;

#[derive(Serialize)]
struct StartOutput<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    uuid: Option<&'a str>,
    fql: &'a str,
    tags: BTreeSet<String>,
}

pub fn run_start(ctx: &Context, reference: &str) -> Result<()> {
    let engine = ctx.engine();
    let pseudo = reference.contains(fql::PATH_SEP)
        && fql::is_pseudo_task(reference, &ctx.config.fql.pseudo_namespace);

    let (task, path) = if pseudo {
        (None, reference.to_string())
    } else {
        let task = ctx.resolve_one(reference, ResolveOptions::default())?;
        let path = task.fql()?.ok_or_else(|| {
            Error::MalformedIdentity(format!(
                "task {} has no FQL to track under",
                task.short_uuid()
            ))
        })?;
        (Some(task), path)
    };

    let tags = engine.start(task.as_ref(), &path)?;

    let mut human = HumanOutput::new(format!("Tracking {path}"));
    if let Some(task) = &task {
        human.push_summary("Task", task.display_line());
    }
    human.push_summary("Tags", tags.iter().cloned().collect::<Vec<_>>().join(" "));

    emit_success(
        ctx.output,
        "start",
        &StartOutput {
            uuid: task.as_ref().map(|task| task.uuid.as_str()),
            fql: &path,
            tags,
        },
        Some(&human),
    )
}

pub fn run_continue(ctx: &Context) -> Result<()> {
    let resumed = ctx.engine().resume_latest()?;

    let mut human = HumanOutput::new(format!("Continued {}", resumed.reference()));
    human.push_summary(
        "Tags",
        resumed.tags.iter().cloned().collect::<Vec<_>>().join(" "),
    );

    emit_success(ctx.output, "start", &resumed, Some(&human))
}

pub fn run_done(ctx: &Context, reference: &str, handoff: Option<&str>) -> Result<()> {
    let task = ctx.resolve_one(reference, ResolveOptions::default())?;
    let tracking = TrackingContext::load(&ctx.tasks, &ctx.intervals, &ctx.config.fql)?;
    let outcome = ctx.engine().complete(&task, handoff, &tracking)?;

    let mut human = HumanOutput::new(format!("Completed {}", task.display_line()));
    human.push_summary("UUID", outcome.uuid.clone());
    match &outcome.handoff {
        Some(path) => human.push_summary("Now tracking", path.clone()),
        None if outcome.was_tracking => {
            human.push_summary("Tracking", "stopped");
            human.push_next_step("twtools start time/<activity>");
        }
        None => {}
    }

    emit_success(ctx.output, "done", &outcome, Some(&human))
}

pub fn run_current(ctx: &Context) -> Result<()> {
    let tracking = TrackingContext::load(&ctx.tasks, &ctx.intervals, &ctx.config.fql)?;

    let mut human = match (&tracking.interval, &tracking.leaf) {
        (Some(interval), Some(leaf)) => {
            let mut human = HumanOutput::new(format!("Tracking {leaf}"));
            human.push_summary("Interval", interval.reference().to_string());
            human.push_summary("Since", interval.start.to_rfc3339());
            human
        }
        (Some(interval), None) => {
            let mut human = HumanOutput::new("Tracking an interval without a single leaf tag");
            human.push_summary("Interval", interval.reference().to_string());
            human
        }
        (None, _) => HumanOutput::new("Not tracking"),
    };
    match &tracking.task {
        Some(task) => human.push_summary("Task", format!("{} ({})", task.display_line(), task.short_uuid())),
        None => {
            let pseudo = tracking
                .leaf
                .as_deref()
                .is_some_and(|leaf| fql::is_pseudo_task(leaf, &ctx.config.fql.pseudo_namespace));
            if tracking.is_tracking() && !pseudo {
                human.push_warning("no task has this FQL; it may be stale");
                human.push_next_step("twtools reconcile --dry-run");
            }
        }
    }

    emit_success(ctx.output, "current", &tracking, Some(&human))
}
