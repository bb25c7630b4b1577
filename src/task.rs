//! Task records as exported by the task store.
//!
//! Field names follow the store's JSON export. Timestamps use the store's
//! compact form (`20240131T235959Z`); RFC 3339 is accepted on input too.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::Result;
use crate::fql;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Started,
    Completed,
    Deleted,
    Waiting,
    Recurring,
}

impl TaskStatus {
    /// Completed and deleted tasks are closed.
    pub fn is_closed(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Deleted)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Started => "started",
            TaskStatus::Completed => "completed",
            TaskStatus::Deleted => "deleted",
            TaskStatus::Waiting => "waiting",
            TaskStatus::Recurring => "recurring",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Annotation {
    #[serde(default, with = "timestamp::option")]
    pub entry: Option<DateTime<Utc>>,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Task {
    pub uuid: String,
    /// Ephemeral display id; 0 for closed tasks
    #[serde(default)]
    pub id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    pub status: TaskStatus,
    #[serde(default)]
    pub description: String,
    /// Hook input for a brand new task may omit this
    #[serde(with = "timestamp", default = "Utc::now")]
    pub modified: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "timestamp::option")]
    pub wait: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub annotations: Vec<Annotation>,
    #[serde(
        default,
        skip_serializing_if = "Vec::is_empty",
        deserialize_with = "deserialize_depends"
    )]
    pub depends: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl Task {
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref().filter(|value| !value.is_empty())
    }

    pub fn project(&self) -> Option<&str> {
        self.project.as_deref().filter(|value| !value.is_empty())
    }

    /// The task's FQL, or `None` when it has no label or no project.
    pub fn fql(&self) -> Result<Option<String>> {
        match (self.label(), self.project()) {
            (Some(label), Some(project)) => fql::to_fql(label, project).map(Some),
            _ => Ok(None),
        }
    }

    /// Charset and structure of whichever identity fields are set.
    pub fn validate_identity(&self) -> Result<()> {
        match (self.label(), self.project()) {
            (Some(label), Some(project)) => fql::to_fql(label, project).map(drop),
            (Some(label), None) => fql::validate_label(label),
            (None, Some(project)) => fql::validate_project(project),
            (None, None) => Ok(()),
        }
    }

    /// The FQL if it can be derived, ignoring malformed identities.
    pub fn fql_lossy(&self) -> Option<String> {
        self.fql().ok().flatten()
    }

    /// Short uuid form used in human output.
    pub fn short_uuid(&self) -> &str {
        self.uuid.get(..8).unwrap_or(&self.uuid)
    }

    /// `label: description` as shown in reports.
    pub fn display_line(&self) -> String {
        match self.label() {
            Some(label) => format!("{label}: {}", self.description),
            None => self.description.clone(),
        }
    }
}

/// The store exports `depends` as an array; older exports use a comma list.
fn deserialize_depends<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Depends {
        List(Vec<String>),
        Joined(String),
    }

    Ok(match Option::<Depends>::deserialize(deserializer)? {
        Some(Depends::List(values)) => values,
        Some(Depends::Joined(joined)) => joined
            .split(',')
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
            .collect(),
        None => Vec::new(),
    })
}

/// Serde codec for store timestamps.
pub mod timestamp {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub const FORMAT: &str = "%Y%m%dT%H%M%SZ";

    pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
        let raw = raw.trim();
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, FORMAT) {
            return Some(naive.and_utc());
        }
        DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|value| value.with_timezone(&Utc))
    }

    pub fn format(value: &DateTime<Utc>) -> String {
        value.format(FORMAT).to_string()
    }

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{raw}'")))
    }

    pub mod option {
        use chrono::{DateTime, Utc};
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            value: &Option<DateTime<Utc>>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(value) => super::serialize(value, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<DateTime<Utc>>, D::Error> {
            match Option::<String>::deserialize(deserializer)? {
                Some(raw) => super::parse(&raw)
                    .map(Some)
                    .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{raw}'"))),
                None => Ok(None),
            }
        }
    }
}
