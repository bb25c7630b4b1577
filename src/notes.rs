//! Note text search for regex lookups.
//!
//! Notes are plain files, one per task, named by the task uuid (any
//! extension). The resolver only consumes the set of uuids whose note
//! matched; reading and editing notes is someone else's job.

use std::collections::HashSet;
use std::path::PathBuf;

use regex::Regex;

use crate::error::Result;

pub trait NoteSearch {
    /// Uuids of tasks whose note text matches `pattern`.
    fn matching(&self, pattern: &Regex) -> Result<HashSet<String>>;
}

#[derive(Debug, Clone)]
pub struct NotesDir {
    dir: PathBuf,
}

impl NotesDir {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl NoteSearch for NotesDir {
    fn matching(&self, pattern: &Regex) -> Result<HashSet<String>> {
        let mut out = HashSet::new();
        if !self.dir.is_dir() {
            tracing::debug!(dir = %self.dir.display(), "notes dir missing");
            return Ok(out);
        }

        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            let text = match std::fs::read_to_string(&path) {
                Ok(text) => text,
                Err(err) => {
                    tracing::warn!(path = %path.display(), %err, "skipping unreadable note");
                    continue;
                }
            };
            if pattern.is_match(&text) {
                out.insert(stem.to_ascii_lowercase());
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_matching_notes_by_uuid_stem() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("AAAA-1.md"), "talk to the vendor\n").expect("write");
        std::fs::write(dir.path().join("bbbb-2.txt"), "nothing here\n").expect("write");

        let notes = NotesDir::new(dir.path());
        let re = Regex::new("vendor").expect("regex");
        let hits = notes.matching(&re).expect("search");
        assert_eq!(hits, HashSet::from(["aaaa-1".to_string()]));
    }

    #[test]
    fn missing_dir_matches_nothing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let notes = NotesDir::new(dir.path().join("absent"));
        let re = Regex::new(".").expect("regex");
        assert!(notes.matching(&re).expect("search").is_empty());
    }
}
