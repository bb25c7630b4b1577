//! Configuration loading and management
//!
//! Handles parsing of `config.toml` from the user's config directory (or an
//! explicit `--config` path).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Config file name inside the config directory
pub const CONFIG_FILE: &str = "config.toml";

const APP_NAME: &str = "twtools";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Task store collaborator
    #[serde(default = "StoreCommandConfig::task_default")]
    pub task: StoreCommandConfig,

    /// Interval store collaborator
    #[serde(default = "StoreCommandConfig::interval_default")]
    pub interval: StoreCommandConfig,

    /// Naming scheme parameters
    #[serde(default)]
    pub fql: FqlConfig,

    /// Integrity checker parameters
    #[serde(default)]
    pub check: CheckConfig,

    /// Attached note files searched by regex lookups
    #[serde(default)]
    pub notes: NotesConfig,

    /// Rename journal location
    #[serde(default)]
    pub journal: JournalConfig,

    /// Undo log import
    #[serde(default)]
    pub import: ImportConfig,
}

/// External store executable configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreCommandConfig {
    /// Executable name or path
    pub command: String,

    /// Extra arguments placed before every invocation (e.g. `rc.data.location=...`)
    #[serde(default)]
    pub args: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            task: StoreCommandConfig::task_default(),
            interval: StoreCommandConfig::interval_default(),
            fql: FqlConfig::default(),
            check: CheckConfig::default(),
            notes: NotesConfig::default(),
            journal: JournalConfig::default(),
            import: ImportConfig::default(),
        }
    }
}

impl StoreCommandConfig {
    fn task_default() -> Self {
        Self {
            command: "task".to_string(),
            args: Vec::new(),
        }
    }

    fn interval_default() -> Self {
        Self {
            command: "timew".to_string(),
            args: Vec::new(),
        }
    }
}

/// FQL naming configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FqlConfig {
    /// Reserved top-level segment for pseudo-tasks
    #[serde(default = "default_pseudo_namespace")]
    pub pseudo_namespace: String,

    /// Leading marker distinguishing carried task tags from path tags
    #[serde(default = "default_tag_marker")]
    pub tag_marker: String,

    /// Width of the uuid prefix accepted as a unique reference
    #[serde(default = "default_uuid_prefix_len")]
    pub uuid_prefix_len: usize,
}

fn default_pseudo_namespace() -> String {
    "time".to_string()
}

fn default_tag_marker() -> String {
    "+".to_string()
}

fn default_uuid_prefix_len() -> usize {
    8
}

impl Default for FqlConfig {
    fn default() -> Self {
        Self {
            pseudo_namespace: default_pseudo_namespace(),
            tag_marker: default_tag_marker(),
            uuid_prefix_len: default_uuid_prefix_len(),
        }
    }
}

/// Scope within which task labels must be unique
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LabelScope {
    /// Store-wide; the stricter rule currently enforced
    #[default]
    Global,
    /// Within one top-level project hierarchy
    Hierarchy,
}

/// Integrity checker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckConfig {
    /// Max rendered length of `label: description` for pending tasks
    #[serde(default = "default_display_budget")]
    pub display_budget: usize,

    #[serde(default)]
    pub label_scope: LabelScope,
}

fn default_display_budget() -> usize {
    60
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            display_budget: default_display_budget(),
            label_scope: LabelScope::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotesConfig {
    /// Directory holding one note file per task, named by uuid
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JournalConfig {
    /// Rename journal path; defaults to the user data directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportConfig {
    /// Wrapper that runs the task store under a fixed clock
    #[serde(default = "default_faketime")]
    pub faketime: String,
}

fn default_faketime() -> String {
    "faketime".to_string()
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            faketime: default_faketime(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from an explicit path, else the default location, else defaults.
    ///
    /// An explicit path must exist; the default location is optional.
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        match default_config_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Resolved journal path (configured or default data dir)
    pub fn journal_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.journal.path {
            return Ok(expand_home(path));
        }
        directories::ProjectDirs::from("", "", APP_NAME)
            .map(|dirs| dirs.data_dir().join("renames.jsonl"))
            .ok_or_else(|| {
                Error::InvalidConfig("cannot determine data directory for journal".to_string())
            })
    }

    /// Resolved notes directory, if configured
    pub fn notes_dir(&self) -> Option<PathBuf> {
        self.notes.dir.as_deref().map(expand_home)
    }

    fn validate(&self) -> Result<()> {
        for (field, store) in [("task", &self.task), ("interval", &self.interval)] {
            if store.command.trim().is_empty() {
                return Err(Error::InvalidConfig(format!(
                    "{field}.command cannot be empty"
                )));
            }
        }
        if self.import.faketime.trim().is_empty() {
            return Err(Error::InvalidConfig(
                "import.faketime cannot be empty".to_string(),
            ));
        }
        self.fql.validate()?;
        if self.check.display_budget < 20 {
            return Err(Error::InvalidConfig(
                "check.display_budget must be >= 20".to_string(),
            ));
        }
        Ok(())
    }
}

impl FqlConfig {
    fn validate(&self) -> Result<()> {
        let ns = self.pseudo_namespace.as_str();
        if ns.is_empty() || !ns.chars().all(crate::fql::is_segment_char) {
            return Err(Error::InvalidConfig(format!(
                "fql.pseudo_namespace '{ns}' is not a valid path segment"
            )));
        }

        let mut marker = self.tag_marker.chars();
        match (marker.next(), marker.next()) {
            (Some(ch), None) if !crate::fql::is_segment_char(ch) && ch != '/' => {}
            _ => {
                return Err(Error::InvalidConfig(format!(
                    "fql.tag_marker '{}' must be a single non-path character",
                    self.tag_marker
                )));
            }
        }

        if !(4..=32).contains(&self.uuid_prefix_len) {
            return Err(Error::InvalidConfig(
                "fql.uuid_prefix_len must be within 4..=32".to_string(),
            ));
        }
        Ok(())
    }

    /// The marker as a char; validated to be exactly one character.
    pub fn marker(&self) -> char {
        self.tag_marker.chars().next().unwrap_or('+')
    }
}

/// Default config file location (`<config dir>/twtools/config.toml`)
pub fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.config_dir().join(CONFIG_FILE))
}

fn expand_home(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match directories::BaseDirs::new() {
        Some(base) => base.home_dir().join(rest),
        None => path.to_path_buf(),
    }
}
