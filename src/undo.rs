//! Reader for the version 2 task store's `undo.data` transaction log.
//!
//! Each transaction is two or three lines followed by a `---` separator:
//!
//! ```text
//! time 1700000000
//! old [description:"before" status:"pending" uuid:"..."]
//! new [description:"after" status:"pending" uuid:"..."]
//! ---
//! ```
//!
//! The `old` line is absent for newly created tasks and is ignored; only the
//! `new` state is imported. Brackets inside task data are stored as `&open;`
//! and `&close;`. The whole log is read before anything is imported, and any
//! problem aborts the import.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::store::TaskStore;

const SEPARATOR: &str = "---";

/// List fields written both comma-joined and as one prefixed key per value.
const LIST_FIELDS: [(&str, &str); 2] = [("depends", "dep_"), ("tags", "tags_")];

/// One task state from the log, stamped with the time it was written.
#[derive(Debug, Clone, PartialEq)]
pub struct UndoRecord {
    /// Line of the `new` entry, for diagnostics
    pub line: usize,
    pub time: DateTime<Utc>,
    pub task: Map<String, Value>,
}

#[derive(Debug, Default)]
pub struct UndoLog {
    pub records: Vec<UndoRecord>,
    /// `line N: message` for every malformed entry
    pub problems: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub records: usize,
    pub imported: usize,
    pub dry_run: bool,
}

impl UndoLog {
    pub fn parse(input: &[u8]) -> Self {
        let mut log = UndoLog::default();
        let lines = log.decode_lines(input);
        log.read_records(&lines);
        log
    }

    /// The records, or an error listing every problem if there were any.
    pub fn into_records(self) -> Result<Vec<UndoRecord>> {
        if self.problems.is_empty() {
            Ok(self.records)
        } else {
            Err(Error::UndoLog {
                problems: self.problems,
            })
        }
    }

    fn problem(&mut self, line: usize, message: impl std::fmt::Display) {
        tracing::debug!(line, %message, "undo log problem");
        self.problems.push(format!("line {line}: {message}"));
    }

    fn decode_lines(&mut self, input: &[u8]) -> Vec<String> {
        let body = input.strip_suffix(b"\n").unwrap_or(input);
        if body.is_empty() {
            return Vec::new();
        }
        body.split(|byte| *byte == b'\n')
            .enumerate()
            .map(|(index, raw)| {
                decode_line(raw).unwrap_or_else(|| {
                    self.problem(index + 1, "not valid utf-8");
                    String::new()
                })
            })
            .collect()
    }

    fn read_records(&mut self, lines: &[String]) {
        let mut pos = 0;
        let mut last_time = i64::MIN;
        let mut skipping = false;
        let mut complete = false;

        while let Some(line) = lines.get(pos) {
            pos += 1;
            let lineno = pos;
            if line.is_empty() {
                continue;
            }
            if line == SEPARATOR {
                if skipping {
                    skipping = false;
                } else if complete {
                    complete = false;
                } else {
                    self.problem(lineno, "transaction ended unfinished");
                }
                continue;
            }
            if skipping {
                continue;
            }
            skipping = true;

            let Some(stamp) = line.strip_prefix("time ") else {
                self.problem(lineno, "expected a 'time' line");
                continue;
            };
            let Ok(seconds) = stamp.trim().parse::<i64>() else {
                self.problem(lineno, format!("bad timestamp '{}'", stamp.trim()));
                continue;
            };
            if seconds < last_time {
                self.problem(lineno, "timestamp goes backwards");
                continue;
            }
            let Some(time) = DateTime::from_timestamp(seconds, 0) else {
                self.problem(lineno, format!("timestamp {seconds} out of range"));
                continue;
            };
            last_time = seconds;

            if lines.get(pos).is_some_and(|next| next.starts_with("old ")) {
                pos += 1;
            }
            // End of input right after the header is a truncated tail, not
            // a malformed entry.
            let Some(new) = lines.get(pos) else { break };
            pos += 1;
            let lineno = pos;
            let Some(data) = new.strip_prefix("new ") else {
                self.problem(lineno, "expected a 'new' line");
                continue;
            };

            match parse_task(data) {
                Ok(task) => {
                    self.records.push(UndoRecord {
                        line: lineno,
                        time,
                        task,
                    });
                    skipping = false;
                    complete = true;
                }
                Err(message) => self.problem(lineno, message),
            }
        }
    }
}

/// Replay records oldest first. Stops at the first store failure.
pub fn import_records<S: TaskStore>(store: &S, records: &[UndoRecord]) -> Result<ImportReport> {
    let mut report = ImportReport {
        records: records.len(),
        ..ImportReport::default()
    };
    for record in records {
        store.import(&record.task, record.time)?;
        report.imported += 1;
        tracing::debug!(
            line = record.line,
            imported = report.imported,
            total = report.records,
            "undo record imported"
        );
    }
    Ok(report)
}

/// UTF-8, tolerating UTF-16BE surrogate pairs that older stores wrote
/// into otherwise UTF-8 text for characters outside the BMP.
fn decode_line(raw: &[u8]) -> Option<String> {
    if let Ok(text) = std::str::from_utf8(raw) {
        return Some(text.to_string());
    }

    let mut fixed = Vec::with_capacity(raw.len());
    let mut index = 0;
    while index < raw.len() {
        if let &[0xd8, high, 0xdd, low, ..] = &raw[index..] {
            let units = [u16::from_be_bytes([0xd8, high]), u16::from_be_bytes([0xdd, low])];
            if let Some(Ok(ch)) = char::decode_utf16(units).next() {
                let mut buf = [0; 4];
                fixed.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
                index += 4;
                continue;
            }
        }
        fixed.push(raw[index]);
        index += 1;
    }
    String::from_utf8(fixed).ok()
}

/// `[key:"value" key:"value" ...]` into a JSON object.
fn parse_task(data: &str) -> std::result::Result<Map<String, Value>, String> {
    let inner = data
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .ok_or_else(|| "task data is not enclosed in brackets".to_string())?;
    let inner = inner.replace("&open;", "[").replace("&close;", "]");

    let mut task = Map::new();
    let mut rest = inner.as_str();
    loop {
        rest = rest.trim_start();
        if rest.is_empty() {
            break;
        }
        let (key, after) = rest
            .split_once(":\"")
            .ok_or_else(|| format!("expected key:\"value\" at '{}'", truncate(rest)))?;
        let end = closing_quote(after)
            .ok_or_else(|| format!("unterminated value for '{key}'"))?;
        let value: String = serde_json::from_str(&format!("\"{}\"", &after[..end]))
            .map_err(|err| format!("bad value for '{key}': {err}"))?;
        task.insert(key.to_string(), Value::String(value));
        rest = &after[end + 1..];
    }

    merge_list_fields(&mut task);
    Ok(task)
}

fn closing_quote(value: &str) -> Option<usize> {
    let mut escaped = false;
    for (index, ch) in value.char_indices() {
        match ch {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '"' => return Some(index),
            _ => {}
        }
    }
    None
}

/// Union the comma-joined and the per-value key forms into one JSON array.
///
/// The array is always written, so an import clears values the task lost.
fn merge_list_fields(task: &mut Map<String, Value>) {
    for (field, prefix) in LIST_FIELDS {
        let mut values = BTreeSet::new();
        if let Some(Value::String(joined)) = task.get(field) {
            values.extend(
                joined
                    .split(',')
                    .filter(|value| !value.is_empty())
                    .map(str::to_string),
            );
        }
        let keyed: Vec<String> = task
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect();
        for key in keyed {
            task.remove(&key);
            if let Some(value) = key.strip_prefix(prefix) {
                values.insert(value.to_string());
            }
        }
        task.insert(
            field.to_string(),
            Value::Array(values.into_iter().map(Value::String).collect()),
        );
    }
}

fn truncate(text: &str) -> &str {
    text.char_indices().nth(24).map_or(text, |(index, _)| &text[..index])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryTaskStore;

    const CREATE: &str = "time 1700000000\n\
        new [description:\"write &open;draft&close;\" status:\"pending\" uuid:\"a-1\" tags:\"x,y\" tags_z:\"x\"]\n\
        ---\n";
    const MODIFY: &str = "time 1700000100\n\
        old [description:\"write &open;draft&close;\" status:\"pending\" uuid:\"a-1\"]\n\
        new [description:\"say \\\"hi\\\"\" status:\"completed\" uuid:\"a-1\" depends:\"b-2\" dep_c-3:\"x\"]\n\
        ---\n";

    fn strings(value: &Value) -> Vec<&str> {
        value
            .as_array()
            .expect("array")
            .iter()
            .filter_map(Value::as_str)
            .collect()
    }

    #[test]
    fn reads_create_and_modify() {
        let log = UndoLog::parse(format!("{CREATE}{MODIFY}").as_bytes());
        assert!(log.problems.is_empty(), "{:?}", log.problems);
        assert_eq!(log.records.len(), 2);

        let created = &log.records[0];
        assert_eq!(created.time.timestamp(), 1_700_000_000);
        assert_eq!(created.task["description"], "write [draft]");
        assert_eq!(strings(&created.task["tags"]), vec!["x", "y", "z"]);
        assert_eq!(strings(&created.task["depends"]), Vec::<&str>::new());
        assert!(!created.task.contains_key("tags_z"));

        let modified = &log.records[1];
        assert_eq!(modified.line, 6);
        assert_eq!(modified.task["description"], "say \"hi\"");
        assert_eq!(modified.task["status"], "completed");
        assert_eq!(strings(&modified.task["depends"]), vec!["b-2", "c-3"]);
    }

    #[test]
    fn collects_every_problem() {
        let input = "time 1700000100\nnew [uuid:\"a\"]\n---\n\
            time 1700000000\nnew [uuid:\"b\"]\n---\n\
            bogus\n---\n\
            time 1700000200\nnew uuid:\"c\"\n---\n\
            ---\n";
        let log = UndoLog::parse(input.as_bytes());
        assert_eq!(log.records.len(), 1);
        assert_eq!(
            log.problems,
            vec![
                "line 4: timestamp goes backwards",
                "line 7: expected a 'time' line",
                "line 10: task data is not enclosed in brackets",
                "line 12: transaction ended unfinished",
            ]
        );
        assert!(matches!(
            log.into_records(),
            Err(Error::UndoLog { problems }) if problems.len() == 4
        ));
    }

    #[test]
    fn truncated_tail_is_not_a_problem() {
        let log = UndoLog::parse(format!("{CREATE}time 1700000200\n").as_bytes());
        assert!(log.problems.is_empty());
        assert_eq!(log.records.len(), 1);
    }

    #[test]
    fn missing_new_line_is_a_problem() {
        let log = UndoLog::parse(b"time 1700000000\n\n---\n");
        assert_eq!(log.problems, vec!["line 2: expected a 'new' line"]);
    }

    #[test]
    fn repairs_utf16_surrogates() {
        // U+1F600 written as its UTF-16BE surrogate pair
        let mut raw = b"new [description:\"".to_vec();
        raw.extend_from_slice(&[0xd8, 0x3d, 0xde, 0x00]);
        raw.extend_from_slice(b"\"]");
        assert!(decode_line(&raw).is_none());

        let mut raw = b"say ".to_vec();
        raw.extend_from_slice(&[0xd8, 0x3d, 0xdd, 0x00]);
        assert_eq!(decode_line(&raw).as_deref(), Some("say \u{1f500}"));
    }

    #[test]
    fn invalid_bytes_are_reported() {
        let mut input = CREATE.as_bytes().to_vec();
        input.extend_from_slice(b"time 1700000100\nnew [uuid:\"\xff\"]\n---\n");
        let log = UndoLog::parse(&input);
        assert!(log.problems.iter().any(|problem| problem == "line 5: not valid utf-8"));
    }

    #[test]
    fn import_replays_with_original_times() {
        let records = UndoLog::parse(format!("{CREATE}{MODIFY}").as_bytes())
            .into_records()
            .expect("clean log");
        let store = MemoryTaskStore::default();

        let report = import_records(&store, &records).expect("import");
        assert_eq!(report.imported, 2);
        let imported = store.imported();
        assert_eq!(imported[0].0.timestamp(), 1_700_000_000);
        assert_eq!(imported[1].0.timestamp(), 1_700_000_100);
        assert_eq!(imported[1].1["status"], "completed");

        let down = MemoryTaskStore::default();
        down.set_unavailable(true);
        assert!(matches!(
            import_records(&down, &records),
            Err(Error::StoreUnavailable(_))
        ));
        assert!(down.imported().is_empty());
    }
}
