//! Volatile keyed stores backing the analysis pipeline: the analysis
//! record store and the separate pipeline-step tracker.
//!
//! Both are `Mutex<BTreeMap>` maps accessed by key. Readers always get
//! cloned snapshots, so a long-running stage update can never expose a
//! torn record. The single-writer-per-key discipline (creation, then
//! exactly one orchestrator task per analysis id) is upheld by the
//! callers; the store only guarantees per-call atomicity.

use std::collections::BTreeMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use thiserror::Error;

use auditor_core::{
    AnalysisRecord, AnalysisStatus, ChurnDossier, ChurnEvent, ExecutedAction, PipelineMetadata,
    PipelineStep,
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("analysis '{0}' not found")]
    RecordNotFound(String),
    #[error("store lock poisoned")]
    LockPoisoned,
    #[error("status cannot move from {from:?} to {to:?}")]
    StatusRegression {
        from: AnalysisStatus,
        to: AnalysisStatus,
    },
}

#[derive(Debug, Clone, Default, PartialEq)]
/// Partial update applied to a stored record in one atomic merge.
/// Absent fields leave the record untouched; re-applying the same
/// update is idempotent.
pub struct AnalysisUpdate {
    pub status: Option<AnalysisStatus>,
    pub dossier: Option<ChurnDossier>,
    pub executed_actions: Option<Vec<ExecutedAction>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub processing_time_ms: Option<u64>,
    pub pipeline_metadata: Option<PipelineMetadata>,
}

impl AnalysisUpdate {
    pub fn status(status: AnalysisStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }
}

/// Outcome of a guarded bulk insert: the ids that went in, or how many
/// records were already present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeedOutcome {
    Seeded(Vec<String>),
    AlreadyPopulated(usize),
}

#[derive(Debug, Default)]
/// In-memory store of analysis records keyed by analysis id.
pub struct AnalysisStore {
    records: Mutex<BTreeMap<String, AnalysisRecord>>,
}

impl AnalysisStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a `pending` record for the event and returns a snapshot.
    pub fn create(&self, event: ChurnEvent) -> Result<AnalysisRecord, StoreError> {
        let record = AnalysisRecord::new(event);
        let mut records = self.records.lock().map_err(|_| StoreError::LockPoisoned)?;
        records.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    pub fn get(&self, id: &str) -> Result<Option<AnalysisRecord>, StoreError> {
        let records = self.records.lock().map_err(|_| StoreError::LockPoisoned)?;
        Ok(records.get(id).cloned())
    }

    /// All records, newest creation first.
    pub fn list_newest_first(&self) -> Result<Vec<AnalysisRecord>, StoreError> {
        let records = self.records.lock().map_err(|_| StoreError::LockPoisoned)?;
        let mut all: Vec<AnalysisRecord> = records.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(all)
    }

    /// Applies a partial update under a single lock acquisition and
    /// returns the merged record. Status merges are forward-only.
    pub fn merge(&self, id: &str, update: AnalysisUpdate) -> Result<AnalysisRecord, StoreError> {
        let mut records = self.records.lock().map_err(|_| StoreError::LockPoisoned)?;
        let record = records
            .get_mut(id)
            .ok_or_else(|| StoreError::RecordNotFound(id.to_string()))?;

        if let Some(status) = update.status {
            if !record.status.can_advance_to(status) {
                return Err(StoreError::StatusRegression {
                    from: record.status,
                    to: status,
                });
            }
            record.status = status;
        }
        if let Some(dossier) = update.dossier {
            record.dossier = Some(dossier);
        }
        if let Some(executed_actions) = update.executed_actions {
            record.executed_actions = executed_actions;
        }
        if let Some(completed_at) = update.completed_at {
            record.completed_at = Some(completed_at);
        }
        if let Some(processing_time_ms) = update.processing_time_ms {
            record.processing_time_ms = Some(processing_time_ms);
        }
        if let Some(metadata) = update.pipeline_metadata {
            record.pipeline_metadata = Some(metadata);
        }
        Ok(record.clone())
    }

    pub fn len(&self) -> Result<usize, StoreError> {
        let records = self.records.lock().map_err(|_| StoreError::LockPoisoned)?;
        Ok(records.len())
    }

    /// Inserts fully-formed records only when the store is empty. The
    /// emptiness check and the inserts happen under one lock
    /// acquisition, so concurrent callers cannot both seed.
    pub fn insert_if_empty(
        &self,
        new_records: Vec<AnalysisRecord>,
    ) -> Result<SeedOutcome, StoreError> {
        let mut records = self.records.lock().map_err(|_| StoreError::LockPoisoned)?;
        if !records.is_empty() {
            return Ok(SeedOutcome::AlreadyPopulated(records.len()));
        }
        let ids = new_records.iter().map(|record| record.id.clone()).collect();
        for record in new_records {
            records.insert(record.id.clone(), record);
        }
        Ok(SeedOutcome::Seeded(ids))
    }
}

#[derive(Debug, Default)]
/// Keyed map from analysis id to the current pipeline step, decoupled
/// from the record store so stage writes never block record readers.
pub struct ProgressTracker {
    steps: Mutex<BTreeMap<String, PipelineStep>>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Best-effort: a poisoned lock drops the update rather than
    /// failing a pipeline stage over a progress marker.
    pub fn set_step(&self, id: &str, step: PipelineStep) {
        if let Ok(mut steps) = self.steps.lock() {
            steps.insert(id.to_string(), step);
        }
    }

    pub fn step(&self, id: &str) -> Option<PipelineStep> {
        self.steps.lock().ok().and_then(|steps| steps.get(id).copied())
    }

    pub fn clear_step(&self, id: &str) {
        if let Ok(mut steps) = self.steps.lock() {
            steps.remove(id);
        }
    }
}
