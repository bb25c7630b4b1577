//! Reference resolution.
//!
//! Turns a user-supplied reference into zero, one or many tasks by trying
//! a fixed sequence of strategies. The first strategy that matches anything
//! decides the outcome, even when its match is ambiguous:
//!
//! 1. display id (`42`)
//! 2. full uuid
//! 3. uuid prefix (at least `fql.uuid_prefix_len` hex chars)
//! 4. exact label (no `/`)
//! 5. exact FQL (has `/`)
//! 6. FQL substring (has `/`)
//! 7. substring of description, label or project
//! 8. regex over description, label, project and note text
//!
//! Candidates within a strategy are ordered most recently modified first.
//! Ambiguity is never collapsed unless the caller asks for `prefer_recent`.

use std::collections::HashSet;

use regex::Regex;
use serde::Serialize;

use crate::check::CheckOutcome;
use crate::config::FqlConfig;
use crate::error::{Error, Result};
use crate::fql;
use crate::notes::NoteSearch;
use crate::task::Task;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    DisplayId,
    Uuid,
    UuidPrefix,
    Label,
    Fql,
    FqlSubstring,
    Substring,
    Regex,
}

impl Strategy {
    pub const ORDER: [Strategy; 8] = [
        Strategy::DisplayId,
        Strategy::Uuid,
        Strategy::UuidPrefix,
        Strategy::Label,
        Strategy::Fql,
        Strategy::FqlSubstring,
        Strategy::Substring,
        Strategy::Regex,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Strategy::DisplayId => "display-id",
            Strategy::Uuid => "uuid",
            Strategy::UuidPrefix => "uuid-prefix",
            Strategy::Label => "label",
            Strategy::Fql => "fql",
            Strategy::FqlSubstring => "fql-substring",
            Strategy::Substring => "substring",
            Strategy::Regex => "regex",
        }
    }

    fn is_id_like(self) -> bool {
        matches!(
            self,
            Strategy::DisplayId | Strategy::Uuid | Strategy::UuidPrefix
        )
    }

    fn is_fuzzy(self) -> bool {
        matches!(
            self,
            Strategy::FqlSubstring | Strategy::Substring | Strategy::Regex
        )
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ResolveOptions {
    /// Skip substring and regex fallbacks
    pub exact_only: bool,
    /// Only display id, uuid and uuid prefix
    pub id_only: bool,
    /// Consider completed and deleted tasks
    pub include_completed: bool,
    /// Enable the regex strategy
    pub use_regex: bool,
    /// Collapse an ambiguous match to its most recently modified task.
    /// Ignored together with `exact_only` or `id_only`.
    pub prefer_recent: bool,
}

impl ResolveOptions {
    fn allows(&self, strategy: Strategy) -> bool {
        if self.id_only && !strategy.is_id_like() {
            return false;
        }
        if self.exact_only && strategy.is_fuzzy() {
            return false;
        }
        strategy != Strategy::Regex || self.use_regex
    }

    fn may_pick_recent(&self) -> bool {
        self.prefer_recent && !self.exact_only && !self.id_only
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Resolution {
    Unique { task: Box<Task>, strategy: Strategy },
    Ambiguous { candidates: Vec<Task>, strategy: Strategy },
    NotFound,
}

impl Resolution {
    pub fn strategy(&self) -> Option<Strategy> {
        match self {
            Resolution::Unique { strategy, .. } | Resolution::Ambiguous { strategy, .. } => {
                Some(*strategy)
            }
            Resolution::NotFound => None,
        }
    }

    pub fn candidates(&self) -> Vec<&Task> {
        match self {
            Resolution::Unique { task, .. } => vec![task.as_ref()],
            Resolution::Ambiguous { candidates, .. } => candidates.iter().collect(),
            Resolution::NotFound => Vec::new(),
        }
    }

    /// The unique task, or `NotFound` / `Ambiguous` as errors.
    pub fn into_task(self, reference: &str) -> Result<Task> {
        match self {
            Resolution::Unique { task, .. } => Ok(*task),
            Resolution::Ambiguous { candidates, .. } => Err(Error::Ambiguous {
                reference: reference.to_string(),
                candidates: candidates.iter().map(candidate_name).collect(),
            }),
            Resolution::NotFound => Err(Error::NotFound(reference.to_string())),
        }
    }
}

fn candidate_name(task: &Task) -> String {
    match task.fql_lossy() {
        Some(path) => format!("{} ({path})", task.short_uuid()),
        None => format!("{} ({})", task.short_uuid(), task.description),
    }
}

pub struct Resolver<'a> {
    config: &'a FqlConfig,
    notes: Option<&'a dyn NoteSearch>,
}

impl<'a> Resolver<'a> {
    pub fn new(config: &'a FqlConfig) -> Self {
        Self {
            config,
            notes: None,
        }
    }

    /// Merge note-text matches into the regex strategy.
    pub fn with_notes(mut self, notes: &'a dyn NoteSearch) -> Self {
        self.notes = Some(notes);
        self
    }

    /// Resolve `reference` against a task store export.
    pub fn resolve(
        &self,
        reference: &str,
        tasks: &[Task],
        options: ResolveOptions,
    ) -> Result<Resolution> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(Error::MalformedIdentity("empty task reference".to_string()));
        }
        if reference.chars().any(char::is_control) {
            return Err(Error::MalformedIdentity(format!(
                "task reference {reference:?} contains control characters"
            )));
        }

        let pool: Vec<&Task> = tasks
            .iter()
            .filter(|task| options.include_completed || !task.status.is_closed())
            .collect();

        for strategy in Strategy::ORDER {
            if !options.allows(strategy) || !self.applies(strategy, reference) {
                continue;
            }
            let mut matched = self.run(strategy, reference, &pool)?;
            if matched.is_empty() {
                continue;
            }

            let mut seen = HashSet::new();
            matched.retain(|task| seen.insert(task.uuid.to_ascii_lowercase()));
            matched.sort_by(|a, b| {
                b.modified
                    .cmp(&a.modified)
                    .then_with(|| a.uuid.cmp(&b.uuid))
            });
            tracing::debug!(
                reference,
                strategy = strategy.as_str(),
                matches = matched.len(),
                "reference matched"
            );

            if strategy == Strategy::UuidPrefix && matched.len() > 1 {
                // A prefix this long must be unique store-wide.
                let shared = matched
                    .iter()
                    .map(|task| task.uuid.as_str())
                    .collect::<Vec<_>>()
                    .join(", ");
                return Err(Error::IntegrityViolation {
                    checks: vec![CheckOutcome {
                        name: "uuid-prefix",
                        passed: false,
                        details: vec![format!("prefix {reference} is shared by {shared}")],
                    }],
                });
            }

            if matched.len() == 1 || options.may_pick_recent() {
                let task = matched.swap_remove(0).clone();
                return Ok(Resolution::Unique {
                    task: Box::new(task),
                    strategy,
                });
            }
            return Ok(Resolution::Ambiguous {
                candidates: matched.into_iter().cloned().collect(),
                strategy,
            });
        }

        tracing::debug!(reference, "reference matched nothing");
        Ok(Resolution::NotFound)
    }

    /// Whether a strategy is meaningful for the shape of the reference.
    fn applies(&self, strategy: Strategy, reference: &str) -> bool {
        let has_sep = reference.contains(fql::PATH_SEP);
        let path_like = reference
            .chars()
            .all(|ch| fql::is_segment_char(ch) || ch == fql::PATH_SEP);
        match strategy {
            Strategy::DisplayId => matches!(reference.parse::<u64>(), Ok(id) if id > 0),
            Strategy::Uuid => uuid::Uuid::parse_str(reference).is_ok(),
            Strategy::UuidPrefix => {
                reference.len() >= self.config.uuid_prefix_len
                    && reference.chars().all(|ch| ch.is_ascii_hexdigit() || ch == '-')
            }
            Strategy::Label => !has_sep && path_like,
            Strategy::Fql | Strategy::FqlSubstring => has_sep && path_like,
            Strategy::Substring | Strategy::Regex => true,
        }
    }

    fn run<'t>(
        &self,
        strategy: Strategy,
        reference: &str,
        pool: &[&'t Task],
    ) -> Result<Vec<&'t Task>> {
        let keep = |pred: &dyn Fn(&Task) -> bool| -> Vec<&'t Task> {
            pool.iter().copied().filter(|task| pred(task)).collect()
        };

        Ok(match strategy {
            Strategy::DisplayId => {
                let id: u64 = reference.parse().unwrap_or(0);
                keep(&|task| task.id == id)
            }
            Strategy::Uuid => match uuid::Uuid::parse_str(reference) {
                Ok(wanted) => keep(&|task| {
                    uuid::Uuid::parse_str(&task.uuid).is_ok_and(|uuid| uuid == wanted)
                }),
                Err(_) => Vec::new(),
            },
            Strategy::UuidPrefix => {
                let prefix = reference.to_ascii_lowercase();
                keep(&|task| task.uuid.to_ascii_lowercase().starts_with(&prefix))
            }
            Strategy::Label => keep(&|task| task.label() == Some(reference)),
            Strategy::Fql => match fql::split_path(reference) {
                Ok((segments, label)) => {
                    let project = fql::project_string(&segments);
                    keep(&|task| {
                        task.label() == Some(label.as_str())
                            && task.project() == Some(project.as_str())
                    })
                }
                Err(_) => Vec::new(),
            },
            Strategy::FqlSubstring => keep(&|task| {
                task.fql_lossy()
                    .is_some_and(|path| path.contains(reference))
            }),
            Strategy::Substring => {
                let needle = reference.to_lowercase();
                keep(&|task| {
                    searchable_fields(task).any(|field| field.to_lowercase().contains(&needle))
                })
            }
            Strategy::Regex => {
                let pattern = Regex::new(&format!("(?i){reference}"))?;
                let noted = match self.notes {
                    Some(notes) => notes.matching(&pattern)?,
                    None => HashSet::new(),
                };
                keep(&|task| {
                    searchable_fields(task).any(|field| pattern.is_match(field))
                        || noted.contains(&task.uuid.to_ascii_lowercase())
                })
            }
        })
    }
}

fn searchable_fields(task: &Task) -> impl Iterator<Item = &str> {
    std::iter::once(task.description.as_str())
        .chain(task.label())
        .chain(task.project())
}
