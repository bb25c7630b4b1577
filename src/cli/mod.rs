//! Command-line interface for twtools
//!
//! This module defines the CLI structure using clap derive macros.
//! Handlers live in submodules grouped by what they touch.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

use crate::config::Config;
use crate::error::Result;
use crate::journal::Journal;
use crate::notes::NotesDir;
use crate::output::OutputOptions;
use crate::resolver::{ResolveOptions, Resolver};
use crate::store::taskwarrior::TaskwarriorCli;
use crate::store::timewarrior::TimewarriorCli;
use crate::store::{TaskFilter, TaskStore};
use crate::sync::SyncEngine;
use crate::task::Task;

pub mod dispatch;
mod hook;
mod maintain;
mod task;
mod track;

/// twtools - task/interval store coordination
///
/// Resolves task references, keeps interval tags in step with task
/// renames and checks the invariants both stores rely on.
#[derive(Parser, Debug)]
#[command(name = "twtools")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Config file (defaults to <config dir>/twtools/config.toml)
    #[arg(long, global = true, env = "TWTOOLS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Enable debug logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Resolve a reference to a task
    Get {
        /// Display id, uuid, uuid prefix, label, FQL or search text
        reference: String,

        /// Exact matches only (no substring or regex fallback)
        #[arg(long)]
        exact: bool,

        /// Only display id, uuid and uuid prefix
        #[arg(long)]
        id_only: bool,

        /// Include completed and deleted tasks
        #[arg(long)]
        all: bool,

        /// Also try the reference as a regex over fields and notes
        #[arg(long)]
        regex: bool,

        /// Pick the most recently modified task when ambiguous
        #[arg(long)]
        recent: bool,
    },

    /// Print a task's FQL and its interval tags
    Fql {
        reference: String,

        /// Include completed and deleted tasks
        #[arg(long)]
        all: bool,
    },

    /// Create a task with label and project set together
    New {
        /// Task description
        #[arg(required = true, num_args = 1..)]
        description: Vec<String>,

        /// Dot-separated project (e.g. "src.tools")
        #[arg(short, long)]
        project: String,

        /// Label, unique leaf name of the task
        #[arg(short, long)]
        label: String,
    },

    /// Change label and/or project and retag past intervals
    Rename {
        reference: String,

        #[arg(short, long)]
        label: Option<String>,

        #[arg(short, long)]
        project: Option<String>,
    },

    /// Start tracking a task (or a pseudo-task path such as time/lunch)
    Start {
        /// Omit to continue the most recent interval
        reference: Option<String>,
    },

    /// Complete a task, optionally handing tracking to a pseudo-task
    Done {
        reference: String,

        /// Pseudo-task path to start if the task was being tracked
        #[arg(long)]
        handoff: Option<String>,
    },

    /// Show the open interval and the task it tracks
    Current,

    /// Re-derive every interval's path tags from current task state
    Reconcile {
        /// Show the plan without retagging
        #[arg(long)]
        dry_run: bool,
    },

    /// Run the integrity checks
    Check,

    /// Import a version 2 undo.data log, replaying each task state at its
    /// original time
    ImportUndo {
        /// Log file (defaults to stdin)
        path: Option<PathBuf>,

        /// Parse and validate only
        #[arg(long)]
        dry_run: bool,
    },

    /// Task store hook entry points
    #[command(subcommand)]
    Hook(HookCommands),
}

/// Task store hook subcommands
#[derive(Subcommand, Debug, Clone, Copy)]
pub enum HookCommands {
    /// on-modify: sync interval tags for a rename
    OnModify,
    /// on-add: reject malformed identities
    OnAdd,
}

/// Stores and settings shared by every command.
pub(crate) struct Context {
    pub config: Config,
    pub tasks: TaskwarriorCli,
    pub intervals: TimewarriorCli,
    pub journal: Journal,
    pub notes: Option<NotesDir>,
    pub output: OutputOptions,
}

impl Context {
    pub fn load(config_path: Option<&Path>, output: OutputOptions) -> Result<Self> {
        let config = Config::load_or_default(config_path)?;
        let journal = Journal::new(config.journal_path()?);
        let notes = config.notes_dir().map(NotesDir::new);
        tracing::debug!(
            task = %config.task.command,
            interval = %config.interval.command,
            journal = %journal.path().display(),
            "context loaded"
        );
        Ok(Self {
            tasks: TaskwarriorCli::new(config.task.clone())
                .with_faketime(config.import.faketime.clone()),
            intervals: TimewarriorCli::new(config.interval.clone()),
            config,
            journal,
            notes,
            output,
        })
    }

    pub fn engine(&self) -> SyncEngine<'_> {
        SyncEngine::new(&self.tasks, &self.intervals, &self.config.fql).with_journal(&self.journal)
    }

    pub fn resolver(&self) -> Resolver<'_> {
        let resolver = Resolver::new(&self.config.fql);
        match &self.notes {
            Some(notes) => resolver.with_notes(notes),
            None => resolver,
        }
    }

    /// Resolve to exactly one task or fail with `NotFound` / `Ambiguous`.
    pub fn resolve_one(&self, reference: &str, options: ResolveOptions) -> Result<Task> {
        let filter = if options.include_completed {
            TaskFilter::all()
        } else {
            TaskFilter::open()
        };
        let tasks = self.tasks.export(&filter)?;
        self.resolver()
            .resolve(reference, &tasks, options)?
            .into_task(reference)
    }
}

impl Cli {
    /// Execute the CLI command
    pub fn run(self) -> Result<()> {
        let output = OutputOptions {
            json: self.json,
            quiet: self.quiet,
        };

        // Hooks speak the task store's stdin/stdout protocol and load
        // their own context so input is echoed even if config is broken.
        if let Commands::Hook(hook) = self.command {
            return hook::run(hook, self.config.as_deref());
        }

        let ctx = Context::load(self.config.as_deref(), output)?;
        match self.command {
            Commands::Get {
                reference,
                exact,
                id_only,
                all,
                regex,
                recent,
            } => task::run_get(
                &ctx,
                &reference,
                ResolveOptions {
                    exact_only: exact,
                    id_only,
                    include_completed: all,
                    use_regex: regex,
                    prefer_recent: recent,
                },
            ),
            Commands::Fql { reference, all } => task::run_fql(&ctx, &reference, all),
            Commands::New {
                description,
                project,
                label,
            } => task::run_new(&ctx, &description.join(" "), &project, &label),
            Commands::Rename {
                reference,
                label,
                project,
            } => task::run_rename(&ctx, &reference, label.as_deref(), project.as_deref()),
            Commands::Start { reference } => match reference {
                Some(reference) => track::run_start(&ctx, &reference),
                None => track::run_continue(&ctx),
            },
            Commands::Done { reference, handoff } => {
                track::run_done(&ctx, &reference, handoff.as_deref())
            }
            Commands::Current => track::run_current(&ctx),
            Commands::Reconcile { dry_run } => maintain::run_reconcile(&ctx, dry_run),
            Commands::Check => maintain::run_check(&ctx),
            Commands::ImportUndo { path, dry_run } => {
                maintain::run_import_undo(&ctx, path.as_deref(), dry_run)
            }
            Commands::Hook(_) => Ok(()),
        }
    }
}
