//! Task store hooks.
//!
//! The task store runs hooks with task JSON on stdin and expects the task
//! echoed back on stdout, followed by free-form feedback lines. A nonzero
//! exit rejects the change.
//!
//! Both hooks reject malformed identities and projects in the pseudo-task
//! namespace. Past that, on-modify never rejects: the task-store write is
//! the durability point, so a failed interval sync is reported and left for
//! `twtools reconcile`.

use std::io::{self, Read, Write};
use std::path::Path;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::fql;
use crate::output::OutputOptions;
use crate::sync::RenameOutcome;
use crate::task::Task;

use super::{Context, HookCommands};

const FEEDBACK_PREFIX: &str = "twtools:";

pub fn run(hook: HookCommands, config_path: Option<&Path>) -> Result<()> {
    let mut input = String::new();
    io::stdin().read_to_string(&mut input)?;
    let stdout = io::stdout();
    let mut out = stdout.lock();

    let config = Config::load_or_default(config_path).unwrap_or_else(|err| {
        tracing::warn!(%err, "hook falling back to default config");
        Config::default()
    });
    let pseudo_namespace = config.fql.pseudo_namespace.as_str();

    match hook {
        HookCommands::OnModify => on_modify(&input, &mut out, pseudo_namespace, |old, new| {
            let ctx = Context::load(
                config_path,
                OutputOptions {
                    json: false,
                    quiet: true,
                },
            )?;
            ctx.engine().on_modify(old, new)
        }),
        HookCommands::OnAdd => on_add(&input, &mut out, pseudo_namespace),
    }
}

/// Identity rules a task must meet before the store may persist it.
fn admit(task: &Task, pseudo_namespace: &str) -> Result<()> {
    task.validate_identity()?;
    let top = task
        .project()
        .and_then(|project| project.split(fql::PROJECT_SEP).next());
    if top == Some(pseudo_namespace) {
        return Err(Error::MalformedIdentity(format!(
            "project '{pseudo_namespace}' is reserved for pseudo-tasks"
        )));
    }
    Ok(())
}

fn reject<W: Write>(out: &mut W, err: Error) -> Result<()> {
    writeln!(out, "{FEEDBACK_PREFIX} rejected: {err}")?;
    Err(err)
}

fn task_lines(input: &str) -> Vec<&str> {
    input.lines().filter(|line| !line.trim().is_empty()).collect()
}

pub(crate) fn on_modify<W, F>(input: &str, out: &mut W, pseudo_namespace: &str, sync: F) -> Result<()>
where
    W: Write,
    F: FnOnce(&Task, &Task) -> Result<RenameOutcome>,
{
    let lines = task_lines(input);
    let &[old_raw, new_raw] = lines.as_slice() else {
        return Err(Error::InvalidArgument(
            "on-modify expects the original and the modified task on stdin".to_string(),
        ));
    };
    let parsed = serde_json::from_str::<Task>(old_raw)
        .and_then(|old| serde_json::from_str::<Task>(new_raw).map(|new| (old, new)));

    // Unchanged identities pass through, so a task that is already broken
    // can still be completed or annotated.
    if let Ok((old, new)) = &parsed {
        let renamed = old.label() != new.label() || old.project() != new.project();
        if renamed {
            if let Err(err) = admit(new, pseudo_namespace) {
                return reject(out, err);
            }
        }
    }
    writeln!(out, "{new_raw}")?;

    let outcome = parsed
        .map_err(Error::from)
        .and_then(|(old, new)| sync(&old, &new));

    match outcome {
        Ok(outcome) => {
            if let (Some(old), Some(new)) = (&outcome.old_fql, &outcome.new_fql) {
                if !outcome.sync.applied.is_empty() {
                    writeln!(
                        out,
                        "{FEEDBACK_PREFIX} retagged {} interval(s) {old} -> {new}",
                        outcome.sync.applied.len()
                    )?;
                }
            }
            if !outcome.sync.is_clean() {
                writeln!(
                    out,
                    "{FEEDBACK_PREFIX} {} retag(s) failed; run 'twtools reconcile'",
                    outcome.sync.failures.len()
                )?;
            }
        }
        // Reconcile cannot repair an identity the task already had broken.
        Err(err @ Error::MalformedIdentity(_)) => {
            tracing::warn!(%err, "on-modify sync skipped");
            writeln!(out, "{FEEDBACK_PREFIX} sync skipped: {err}")?;
        }
        Err(err) => {
            tracing::warn!(%err, "on-modify sync skipped");
            writeln!(out, "{FEEDBACK_PREFIX} sync skipped: {err}; run 'twtools reconcile'")?;
        }
    }
    Ok(())
}

pub(crate) fn on_add<W: Write>(input: &str, out: &mut W, pseudo_namespace: &str) -> Result<()> {
    let lines = task_lines(input);
    let &[raw] = lines.as_slice() else {
        return Err(Error::InvalidArgument(
            "on-add expects one task on stdin".to_string(),
        ));
    };
    let task: Task = serde_json::from_str(raw)?;
    if let Err(err) = admit(&task, pseudo_namespace) {
        return reject(out, err);
    }

    writeln!(out, "{raw}")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FqlConfig;
    use crate::interval::Interval;
    use crate::store::memory::{MemoryIntervalStore, MemoryTaskStore};
    use crate::sync::SyncEngine;
    use chrono::Utc;

    const OLD: &str = r#"{"uuid":"u-1","status":"pending","description":"d","label":"old","project":"proj","modified":"20240101T000000Z"}"#;
    const NEW: &str = r#"{"uuid":"u-1","status":"pending","description":"d","label":"new","project":"proj","modified":"20240102T000000Z"}"#;

    #[test]
    fn on_modify_echoes_and_retags() {
        let tasks = MemoryTaskStore::default();
        let intervals = MemoryIntervalStore::new(vec![Interval {
            id: 1,
            start: Utc::now(),
            end: Some(Utc::now()),
            tags: ["proj/", "proj/old"].iter().map(|t| t.to_string()).collect(),
        }]);
        let config = FqlConfig::default();
        let engine = SyncEngine::new(&tasks, &intervals, &config);

        let mut out = Vec::new();
        on_modify(&format!("{OLD}\n{NEW}\n"), &mut out, "time", |old, new| {
            engine.on_modify(old, new)
        })
        .expect("hook");
        let text = String::from_utf8(out).expect("utf8");
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some(NEW));
        assert!(lines.next().expect("feedback").contains("proj/old -> proj/new"));
        assert!(intervals.get(1).expect("interval").tags.contains("proj/new"));
    }

    #[test]
    fn on_modify_accepts_even_when_sync_fails() {
        let mut out = Vec::new();
        on_modify(&format!("{OLD}\n{NEW}\n"), &mut out, "time", |_, _| {
            Err(Error::StoreUnavailable("timew missing".to_string()))
        })
        .expect("hook accepts");
        let text = String::from_utf8(out).expect("utf8");
        assert!(text.starts_with(NEW));
        assert!(text.contains("sync skipped"));
    }

    #[test]
    fn on_modify_rejects_malformed_and_reserved() {
        for new in [
            NEW.replace("\"new\"", "\"bad/label\""),
            NEW.replace("\"proj\"", "\"time.lunch\""),
        ] {
            let mut out = Vec::new();
            let mut synced = false;
            let err = on_modify(&format!("{OLD}\n{new}\n"), &mut out, "time", |_, _| {
                synced = true;
                Ok(RenameOutcome::default())
            })
            .expect_err("rejected");
            assert!(matches!(err, Error::MalformedIdentity(_)));
            assert!(!synced);
            let text = String::from_utf8(out).expect("utf8");
            assert!(!text.contains(&new));
            assert!(text.contains("rejected"));
            assert!(!text.contains("reconcile"));
        }
    }

    #[test]
    fn on_modify_passes_unchanged_broken_identity() {
        let old = OLD.replace("\"old\"", "\"bad/label\"");
        let new = old.replace("\"pending\"", "\"completed\"");
        let mut out = Vec::new();
        on_modify(&format!("{old}\n{new}\n"), &mut out, "time", |_, _| {
            Err(Error::MalformedIdentity("label 'bad/label' contains reserved '/'".to_string()))
        })
        .expect("accepted");
        let text = String::from_utf8(out).expect("utf8");
        assert!(text.starts_with(&new));
        assert!(text.contains("sync skipped"));
        assert!(!text.contains("reconcile"));
    }

    #[test]
    fn on_add_rejects_malformed_and_reserved() {
        let mut out = Vec::new();
        on_add(NEW, &mut out, "time").expect("valid task");
        assert_eq!(String::from_utf8(out).expect("utf8").trim(), NEW);

        let bad = NEW.replace("\"new\"", "\"bad/label\"");
        let mut out = Vec::new();
        assert!(matches!(
            on_add(&bad, &mut out, "time"),
            Err(Error::MalformedIdentity(_))
        ));

        let reserved = NEW.replace("\"proj\"", "\"time.lunch\"");
        let mut out = Vec::new();
        assert!(on_add(&reserved, &mut out, "time").is_err());
        assert!(String::from_utf8(out).expect("utf8").contains("rejected"));
    }
}
