//! Shared domain types and low-level time utilities for the churn
//! auditor crates.

mod time_utils;
mod types;

pub use time_utils::{current_unix_timestamp, current_unix_timestamp_ms};
pub use types::{
    normalized_unit, ActionType, AnalysisRecord, AnalysisStatus, ChurnCause, ChurnDossier,
    ChurnEvent, EventValidationError, Evidence, EvidenceSource, ExecutedAction, ExecutionStatus,
    ModelTier, PipelineMetadata, PipelineSource, PipelineStep, Priority, RecommendedAction,
    TriageVerdict,
};
