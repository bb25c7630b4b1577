//! Error types for twtools
//!
//! Every failure exits with the same nonzero code; callers tell failures
//! apart by the diagnostic text (or the `kind` field in JSON mode).

use thiserror::Error;

use crate::check::CheckOutcome;

/// Exit codes for the twtools CLI
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    /// sysexits `EX_SOFTWARE`
    pub const FAILURE: i32 = 70;
}

/// Main error type for twtools operations
#[derive(Error, Debug)]
pub enum Error {
    // Rejected before any store access
    #[error("Malformed identity: {0}")]
    MalformedIdentity(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // Resolver outcomes surfaced as failures by the CLI
    #[error("No task matches '{0}'")]
    NotFound(String),

    #[error("Reference '{reference}' is ambiguous: {}", candidates.join(", "))]
    Ambiguous {
        reference: String,
        candidates: Vec<String>,
    },

    // Store and data failures
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// Each failed check with the records it flagged.
    #[error("Integrity violation: {} check(s) failed ({})", checks.len(), check_names(checks))]
    IntegrityViolation { checks: Vec<CheckOutcome> },

    #[error("Undo log has {} problem(s); nothing imported", problems.len())]
    UndoLog { problems: Vec<String> },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("Invalid regex: {0}")]
    Regex(#[from] regex::Error),
}

impl Error {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        exit_codes::FAILURE
    }

    /// Stable machine-readable name of the failure kind
    pub fn kind(&self) -> &'static str {
        match self {
            Error::MalformedIdentity(_) => "malformed_identity",
            Error::InvalidArgument(_) => "invalid_argument",
            Error::InvalidConfig(_) => "invalid_config",
            Error::NotFound(_) => "not_found",
            Error::Ambiguous { .. } => "ambiguous",
            Error::StoreUnavailable(_) | Error::Io(_) => "store_unavailable",
            Error::IntegrityViolation { .. } => "integrity_violation",
            Error::UndoLog { .. } => "undo_log",
            Error::Json(_) => "json",
            Error::TomlParse(_) => "config_format",
            Error::Regex(_) => "invalid_regex",
        }
    }

    /// Structured details for the JSON error envelope
    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Error::Ambiguous {
                reference,
                candidates,
            } => Some(serde_json::json!({
                "reference": reference,
                "candidates": candidates,
            })),
            Error::IntegrityViolation { checks } => Some(serde_json::json!({
                "failed": checks.len(),
                "checks": checks,
            })),
            Error::UndoLog { problems } => Some(serde_json::json!({
                "problems": problems,
            })),
            _ => None,
        }
    }
}

fn check_names(checks: &[CheckOutcome]) -> String {
    checks
        .iter()
        .map(|check| check.name)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Result type alias for twtools operations
pub type Result<T> = std::result::Result<T, Error>;

/// Wrapper for displaying errors in JSON format
#[derive(serde::Serialize)]
pub struct JsonError {
    pub error: String,
    pub kind: &'static str,
    pub code: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl From<&Error> for JsonError {
    fn from(err: &Error) -> Self {
        JsonError {
            error: err.to_string(),
            kind: err.kind(),
            code: err.exit_code(),
            details: err.details(),
        }
    }
}
