//! twtools - task/interval store coordination library
//!
//! Two independently persisted stores describe the same work: a task store
//! (units of work with a label and a dot-separated project) and an interval
//! store (time-tracking sessions carrying free-form tags). This crate keeps
//! them consistent.
//!
//! # Core Concepts
//!
//! - **FQL**: project segments and label joined by `/` (`src/tools/widget`),
//!   the identity shared by both stores
//! - **Tag set**: an FQL flattened into interval tags, one `a/`-style tag
//!   per ancestor plus the leaf
//! - **Resolver**: an ordered list of lookup strategies turning a user
//!   reference into one task, several, or none
//! - **Synchronization**: rewriting interval tags when a task's FQL changes,
//!   plus a full-store reconciliation pass
//! - **Integrity checks**: independent read-only predicates over a store
//!   export
//!
//! # Module Organization
//!
//! - `fql`: path and tag-set derivation
//! - `task`, `interval`: records as the stores export them
//! - `store`: repository traits and their process-backed/in-memory clients
//! - `resolver`: reference resolution
//! - `notes`: note text search used by regex lookups
//! - `journal`: rename journal used by reconciliation
//! - `sync`: rename propagation, completion, reconciliation
//! - `check`: integrity checks
//! - `undo`: version 2 undo log reader and importer
//! - `cli`: command-line interface using clap
//! - `config`: configuration loading from `config.toml`
//! - `error`: error types and result aliases
//! - `output`: JSON envelope and human output

pub mod check;
pub mod cli;
pub mod config;
pub mod error;
pub mod fql;
pub mod interval;
pub mod journal;
pub mod notes;
pub mod output;
pub mod resolver;
pub mod store;
pub mod sync;
pub mod task;
pub mod undo;

pub use error::{Error, Result};
