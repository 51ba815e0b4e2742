//! Pipeline orchestration for IncidentScout.
//!
//! The stages live in their own modules; [`pipeline::run_pipeline`] wires
//! them together over the capability traits from the `llm` and `search`
//! crates, the incident store, and the per-run handoff store.

pub mod keywords;
pub mod knowledge;
pub mod pipeline;
pub mod querygen;
pub mod reporting;

pub use pipeline::{
    PipelineConfig, PipelineState, ProgressReporter, RunReport, SilentProgress, run_pipeline,
};
