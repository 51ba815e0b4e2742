//! Error types for IncidentScout.
//!
//! Library crates use [`IncidentScoutError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.
//!
//! Only two conditions abort a pipeline run: [`IncidentScoutError::StoreUnavailable`]
//! and [`IncidentScoutError::ReportPersist`] (after its one retry). Everything
//! else is either recovered locally by a stage or surfaced as a note in the
//! final report.

use std::path::PathBuf;

/// Top-level error type for all IncidentScout operations.
#[derive(Debug, thiserror::Error)]
pub enum IncidentScoutError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Text completion service transport or protocol error.
    #[error("completion error: {0}")]
    Completion(String),

    /// Structured incident store unreachable or rejected a statement.
    /// Fatal to the run; never triggers the web-search fallback.
    #[error("incident store unavailable: {0}")]
    StoreUnavailable(String),

    /// A generated query referenced columns outside the incident schema.
    /// Rejected before execution, never sent to the store.
    #[error("invalid generated query: {message}")]
    QueryInvalid { message: String },

    /// External knowledge gateway unreachable. Recovered by the knowledge
    /// stage with an empty result set.
    #[error("knowledge gateway unavailable: {0}")]
    KnowledgeUnavailable(String),

    /// A handoff slot could not be read in any supported encoding.
    /// Carries the slot identity so the report can name the offending artifact.
    #[error("artifact read failure for slot '{slot}': {message}")]
    ArtifactRead { slot: String, message: String },

    /// Final report write failed after the alternate-strategy retry.
    #[error("report persist failure: {message}")]
    ReportPersist { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (schema mismatch, invalid format, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, IncidentScoutError>;

impl IncidentScoutError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a query-validation error from any displayable message.
    pub fn query_invalid(msg: impl Into<String>) -> Self {
        Self::QueryInvalid {
            message: msg.into(),
        }
    }

    /// Create an artifact-read error naming the offending slot.
    pub fn artifact_read(slot: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::ArtifactRead {
            slot: slot.into(),
            message: msg.into(),
        }
    }

    /// Create a report-persist error from any displayable message.
    pub fn report_persist(msg: impl Into<String>) -> Self {
        Self::ReportPersist {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
