//! Interval records as exported by the interval store.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::fql;
use crate::task::timestamp;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Interval {
    /// Position in the store, 1 = most recent. Not stable across mutations.
    pub id: u64,
    #[serde(with = "timestamp")]
    pub start: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "timestamp::option")]
    pub end: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

impl Interval {
    /// An interval with no end is currently tracking.
    pub fn is_open(&self) -> bool {
        self.end.is_none()
    }

    pub fn reference(&self) -> IntervalRef {
        IntervalRef(self.id)
    }

    /// Leaf path tags (path tags without a trailing `/`).
    pub fn leaf_tags(&self, marker: char) -> Vec<&str> {
        fql::leaf_tags(&self.tags, marker).collect()
    }

    /// The single leaf tag, if there is exactly one.
    pub fn leaf(&self, marker: char) -> Option<&str> {
        match self.leaf_tags(marker).as_slice() {
            [only] => Some(*only),
            _ => None,
        }
    }
}

/// Positional interval reference as the store's CLI spells it (`@3`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct IntervalRef(pub u64);

impl fmt::Display for IntervalRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}
