//! Fully qualified labels.
//!
//! A task's FQL is its dot-delimited project hierarchy followed by its
//! label, joined with `/`:
//!
//! ```text
//! project = "src.tools", label = "widget"  ->  "src/tools/widget"
//! ```
//!
//! Intervals carry the FQL as a tag set: one trailing-slash tag per
//! ancestor prefix plus the bare leaf (`src/`, `src/tools/`, `src/tools/widget`).
//! Free-form task tags ride along behind a reserved marker (`+urgent`).

use std::collections::BTreeSet;

use serde::Serialize;

use crate::error::{Error, Result};

pub const PATH_SEP: char = '/';
pub const PROJECT_SEP: char = '.';

/// Characters allowed in a label or a single project segment.
pub fn is_segment_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '-'
}

/// Validate a label: non-empty, `[A-Za-z0-9-]` only.
pub fn validate_label(label: &str) -> Result<()> {
    if label.is_empty() {
        return Err(Error::MalformedIdentity("label cannot be empty".to_string()));
    }
    if label.contains(PATH_SEP) {
        return Err(Error::MalformedIdentity(format!(
            "label '{label}' contains reserved '/'"
        )));
    }
    if let Some(bad) = label.chars().find(|ch| !is_segment_char(*ch)) {
        return Err(Error::MalformedIdentity(format!(
            "label '{label}' contains invalid character '{bad}'"
        )));
    }
    Ok(())
}

/// Validate a dot-delimited project: non-empty segments of `[A-Za-z0-9-]`.
pub fn validate_project(project: &str) -> Result<()> {
    if project.is_empty() {
        return Err(Error::MalformedIdentity(
            "project cannot be empty for a labelled task".to_string(),
        ));
    }
    if project.contains(PATH_SEP) {
        return Err(Error::MalformedIdentity(format!(
            "project '{project}' contains reserved '/'"
        )));
    }
    for segment in project.split(PROJECT_SEP) {
        if segment.is_empty() {
            return Err(Error::MalformedIdentity(format!(
                "project '{project}' has an empty segment"
            )));
        }
        if let Some(bad) = segment.chars().find(|ch| !is_segment_char(*ch)) {
            return Err(Error::MalformedIdentity(format!(
                "project '{project}' contains invalid character '{bad}'"
            )));
        }
    }
    Ok(())
}

/// Build the FQL for a label within a project.
pub fn to_fql(label: &str, project: &str) -> Result<String> {
    validate_label(label)?;
    validate_project(project)?;
    let mut path = project.replace(PROJECT_SEP, "/");
    path.push(PATH_SEP);
    path.push_str(label);
    Ok(path)
}

/// Split an FQL into its project segments and label.
///
/// A bare label (no `/`) is not an FQL.
pub fn split_path(path: &str) -> Result<(Vec<String>, String)> {
    let Some((project, label)) = path.rsplit_once(PATH_SEP) else {
        return Err(Error::MalformedIdentity(format!(
            "'{path}' has no project component"
        )));
    };
    let segments: Vec<String> = project.split(PATH_SEP).map(str::to_string).collect();
    validate_label(label)?;
    validate_project(&segments.join("."))?;
    Ok((segments, label.to_string()))
}

/// Dot-delimited project string for a list of segments.
pub fn project_string(segments: &[String]) -> String {
    segments.join(".")
}

/// True iff the first path segment is the pseudo-task namespace.
pub fn is_pseudo_task(path: &str, namespace: &str) -> bool {
    path.split(PATH_SEP).next() == Some(namespace)
}

/// Interval tags derived from one FQL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagSet {
    /// Ancestor prefixes, shortest first, each ending in `/`
    pub ancestors: Vec<String>,
    /// The full path
    pub leaf: String,
}

impl TagSet {
    /// Ancestors then leaf, in path order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.ancestors
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(self.leaf.as_str()))
    }

    pub fn to_set(&self) -> BTreeSet<String> {
        self.iter().map(str::to_string).collect()
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.iter().any(|t| t == tag)
    }
}

/// Tag set for a path. Total: a path without `/` yields only a leaf.
pub fn tag_set(path: &str) -> TagSet {
    let ancestors = path
        .match_indices(PATH_SEP)
        .map(|(idx, _)| path[..=idx].to_string())
        .collect();
    TagSet {
        ancestors,
        leaf: path.to_string(),
    }
}

/// True for tags that belong to the path scheme (not carried task tags).
pub fn is_path_tag(tag: &str, marker: char) -> bool {
    !tag.starts_with(marker)
}

/// Path tags that are leaves (no trailing `/`).
pub fn leaf_tags<'a, I>(tags: I, marker: char) -> impl Iterator<Item = &'a str>
where
    I: IntoIterator<Item = &'a String>,
{
    tags.into_iter()
        .map(String::as_str)
        .filter(move |tag| is_path_tag(tag, marker) && !tag.ends_with(PATH_SEP))
}

/// Interval tag carrying a free-form task tag.
pub fn carried_tag(tag: &str, marker: char) -> String {
    format!("{marker}{tag}")
}
