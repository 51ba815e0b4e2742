//! Shared types, error model, and configuration for IncidentScout.
//!
//! This crate is the foundation depended on by all other IncidentScout crates.
//! It provides:
//! - [`IncidentScoutError`] — the unified error type
//! - Domain types ([`IncidentRecord`], [`StructuredQuery`], [`KnowledgeDocument`], [`RunId`])
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CompletionConfig, DefaultsConfig, KnowledgeGatewayConfig, config_dir,
    config_file_path, expand_path, init_config, load_config, load_config_from,
    validate_completion_key,
};
pub use error::{IncidentScoutError, Result};
pub use types::{
    INCIDENT_TABLE, IncidentRecord, KeywordSet, KnowledgeDocument, KnowledgeResult, ORDER_COLUMN,
    RESULT_LIMIT, ReliabilityTier, Remediation, RunId, RunNote, SEARCH_COLUMNS, StructuredQuery,
    StructuredResult,
};
