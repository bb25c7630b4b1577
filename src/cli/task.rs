//! Task identity commands: get, fql, new, rename.

use serde::Serialize;

use crate::error::{Error, Result};
use crate::fql::{self, TagSet};
use crate::output::{emit_success, HumanOutput};
use crate::resolver::{Resolution, ResolveOptions, Strategy};
use crate::store::{FieldChanges, TaskFilter, TaskStore};
use crate::sync::RenameOutcome;
use crate::task::Task;

use super::Context;

#[derive(Serialize)]
struct TaskView<'a> {
    #[serde(flatten)]
    task: &'a Task,
    #[serde(skip_serializing_if = "Option::is_none")]
    fql: Option<String>,
}

impl<'a> TaskView<'a> {
    fn new(task: &'a Task) -> Self {
        Self {
            task,
            fql: task.fql_lossy(),
        }
    }
}

#[derive(Serialize)]
struct GetOutput<'a> {
    reference: &'a str,
    strategy: Strategy,
    task: TaskView<'a>,
}

pub fn run_get(ctx: &Context, reference: &str, options: ResolveOptions) -> Result<()> {
    let filter = if options.include_completed {
        TaskFilter::all()
    } else {
        TaskFilter::open()
    };
    let tasks = ctx.tasks.export(&filter)?;
    let resolution = ctx.resolver().resolve(reference, &tasks, options)?;
    let Resolution::Unique { task, strategy } = resolution else {
        return resolution.into_task(reference).map(drop);
    };

    let mut human = HumanOutput::new(task.display_line());
    human.push_summary("UUID", task.uuid.clone());
    if task.id > 0 {
        human.push_summary("ID", task.id.to_string());
    }
    if let Some(path) = task.fql_lossy() {
        human.push_summary("FQL", path);
    }
    human.push_summary("Status", task.status.to_string());
    human.push_summary("Matched by", strategy.as_str());

    emit_success(
        ctx.output,
        "get",
        &GetOutput {
            reference,
            strategy,
            task: TaskView::new(&task),
        },
        Some(&human),
    )
}

#[derive(Serialize)]
struct FqlOutput<'a> {
    uuid: &'a str,
    fql: &'a str,
    tags: TagSet,
}

pub fn run_fql(ctx: &Context, reference: &str, all: bool) -> Result<()> {
    let task = ctx.resolve_one(
        reference,
        ResolveOptions {
            include_completed: all,
            ..ResolveOptions::default()
        },
    )?;
    let path = task.fql()?.ok_or_else(|| {
        Error::MalformedIdentity(format!(
            "task {} needs both label and project to have an FQL",
            task.short_uuid()
        ))
    })?;
    let tags = fql::tag_set(&path);

    let mut human = HumanOutput::new(path.clone());
    human.push_summary("Tags", tags.iter().collect::<Vec<_>>().join(" "));

    emit_success(
        ctx.output,
        "fql",
        &FqlOutput {
            uuid: &task.uuid,
            fql: &path,
            tags,
        },
        Some(&human),
    )
}

#[derive(Serialize)]
struct NewOutput {
    uuid: String,
    fql: String,
}

pub fn run_new(ctx: &Context, description: &str, project: &str, label: &str) -> Result<()> {
    let path = fql::to_fql(label, project)?;
    if fql::is_pseudo_task(&path, &ctx.config.fql.pseudo_namespace) {
        return Err(Error::MalformedIdentity(format!(
            "'{path}' is in the reserved pseudo-task namespace"
        )));
    }
    if description.trim().is_empty() {
        return Err(Error::InvalidArgument("description cannot be empty".to_string()));
    }

    let existing = ctx.tasks.export(&TaskFilter::open())?;
    if let Some(clash) = existing
        .iter()
        .find(|task| task.fql_lossy().as_deref() == Some(path.as_str()))
    {
        return Err(Error::InvalidArgument(format!(
            "{path} already belongs to task {}",
            clash.short_uuid()
        )));
    }

    let uuid = ctx.tasks.new_stub()?;
    let changes = FieldChanges {
        label: Some(label.to_string()),
        project: Some(project.to_string()),
        description: Some(description.to_string()),
        status: None,
    };
    if let Err(err) = ctx.tasks.mutate(&uuid, &changes) {
        tracing::warn!(%uuid, %err, "stub left without identity");
        return Err(err);
    }
    tracing::info!(%uuid, fql = %path, "task created");

    let mut human = HumanOutput::new("Task created");
    human.push_summary("UUID", uuid.clone());
    human.push_summary("FQL", path.clone());

    emit_success(ctx.output, "new", &NewOutput { uuid, fql: path }, Some(&human))
}

pub fn run_rename(
    ctx: &Context,
    reference: &str,
    label: Option<&str>,
    project: Option<&str>,
) -> Result<()> {
    let task = ctx.resolve_one(reference, ResolveOptions::default())?;
    let outcome: RenameOutcome = ctx.engine().rename(&task, label, project)?;
    if let Some(err) = outcome.sync.failure_error() {
        return Err(err);
    }

    let mut human = HumanOutput::new("Task renamed");
    human.push_summary("UUID", outcome.uuid.clone());
    human.push_summary("From", outcome.old_fql.clone().unwrap_or_else(|| "-".to_string()));
    human.push_summary("To", outcome.new_fql.clone().unwrap_or_else(|| "-".to_string()));
    human.push_summary("Intervals retagged", outcome.sync.applied.len().to_string());
    for rewrite in &outcome.sync.applied {
        human.push_detail(rewrite.interval.reference().to_string());
    }
    if outcome.old_fql.is_some() && outcome.new_fql.is_none() {
        human.push_warning("task has no FQL now; past intervals keep the old tags");
        human.push_next_step("twtools reconcile");
    }

    emit_success(ctx.output, "rename", &outcome, Some(&human))
}
