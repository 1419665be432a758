use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
/// Primary root cause assigned by a churn diagnosis.
pub enum ChurnCause {
    Pricing,
    Bugs,
    Support,
    Competition,
    Features,
    Onboarding,
    Other,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
/// Recovery action categories the pipeline can recommend and execute.
pub enum ActionType {
    LinearTicket,
    WinbackEmail,
    SlackAlert,
    ManualReview,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Urgent,
    High,
    Medium,
    Low,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Urgent => "urgent",
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceSource {
    SupportTicket,
    UsageData,
    ExitSurvey,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
/// Reasoning-service cost/latency tier. `Fast` maps to the flash model,
/// `Deep` to the pro model; the wire names keep the model vocabulary the
/// dashboard already renders.
pub enum ModelTier {
    #[serde(rename = "flash")]
    Fast,
    #[serde(rename = "pro")]
    Deep,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
/// Which path produced the terminal analysis result.
pub enum PipelineSource {
    Live,
    Simulated,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
/// Immutable cancellation fact observed by a collaborator (webhook,
/// simulation, or direct submission). Never mutated after creation.
pub struct ChurnEvent {
    pub id: String,
    pub customer_id: String,
    pub customer_email: String,
    pub customer_name: String,
    pub mrr: f64,
    pub plan: String,
    pub canceled_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub subscription_id: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventValidationError {
    #[error("event field '{0}' must not be empty")]
    EmptyField(&'static str),
    #[error("customer email '{0}' is not an email address")]
    InvalidEmail(String),
    #[error("mrr must be a positive amount")]
    NonPositiveMrr,
}

impl ChurnEvent {
    /// Rejects malformed events before any record is created.
    pub fn validate(&self) -> Result<(), EventValidationError> {
        for (name, value) in [
            ("id", &self.id),
            ("customerId", &self.customer_id),
            ("customerName", &self.customer_name),
            ("plan", &self.plan),
            ("subscriptionId", &self.subscription_id),
        ] {
            if value.trim().is_empty() {
                return Err(EventValidationError::EmptyField(name));
            }
        }
        if !self.customer_email.contains('@') || self.customer_email.trim().is_empty() {
            return Err(EventValidationError::InvalidEmail(
                self.customer_email.clone(),
            ));
        }
        if !self.mrr.is_finite() || self.mrr <= 0.0 {
            return Err(EventValidationError::NonPositiveMrr);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
/// One cited fragment backing a diagnosis.
pub struct Evidence {
    pub source: EvidenceSource,
    pub quote: String,
    pub relevance: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RecommendedAction {
    #[serde(rename = "type")]
    pub action_type: ActionType,
    pub priority: Priority,
    pub description: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Executing,
    Success,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
/// Normalized outcome of one executed recovery action.
pub struct ExecutedAction {
    #[serde(rename = "type")]
    pub action_type: ActionType,
    pub status: ExecutionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
/// Structured diagnostic output. Produced exactly once per analysis by
/// either the reasoning service or the simulator, never both.
pub struct ChurnDossier {
    pub primary_cause: ChurnCause,
    pub confidence: f64,
    pub evidence: Vec<Evidence>,
    pub save_probability: f64,
    pub recommended_actions: Vec<RecommendedAction>,
    pub reasoning: String,
}

impl ChurnDossier {
    /// Clamps every unit-interval field into [0, 1].
    pub fn normalize(&mut self) {
        self.confidence = normalized_unit(self.confidence);
        self.save_probability = normalized_unit(self.save_probability);
        for evidence in &mut self.evidence {
            evidence.relevance = normalized_unit(evidence.relevance);
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
/// Triage stage output: whether the event warrants the deep tier.
pub struct TriageVerdict {
    pub worth_deep_analysis: bool,
    pub reason: String,
    pub urgency: Priority,
    pub estimated_save_probability: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
/// Per-run observability captured alongside the terminal result.
pub struct PipelineMetadata {
    pub triage_result: TriageVerdict,
    pub diagnosis_model: ModelTier,
    pub triage_duration_ms: u64,
    pub diagnosis_duration_ms: u64,
    pub actions_duration_ms: u64,
    pub pipeline_source: PipelineSource,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStatus {
    Pending,
    Analyzing,
    Complete,
    Failed,
}

impl AnalysisStatus {
    /// Status only ever moves forward through
    /// pending -> analyzing -> complete | failed. Re-applying the current
    /// status is allowed so merge updates stay idempotent.
    pub fn can_advance_to(self, next: AnalysisStatus) -> bool {
        use AnalysisStatus::*;
        match (self, next) {
            (current, candidate) if current == candidate => true,
            (Pending, Analyzing | Complete | Failed) => true,
            (Analyzing, Complete | Failed) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
/// Transient progress marker tracked separately from the record so a
/// long-running stage never blocks readers. Safe to be stale or absent.
pub enum PipelineStep {
    Triaging,
    Diagnosing,
    ExecutingActions,
    Complete,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
/// Aggregate root held by the event store.
pub struct AnalysisRecord {
    pub id: String,
    pub event: ChurnEvent,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dossier: Option<ChurnDossier>,
    pub status: AnalysisStatus,
    pub executed_actions: Vec<ExecutedAction>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_time_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pipeline_metadata: Option<PipelineMetadata>,
}

impl AnalysisRecord {
    pub fn new(event: ChurnEvent) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            event,
            dossier: None,
            status: AnalysisStatus::Pending,
            executed_actions: Vec::new(),
            created_at: Utc::now(),
            completed_at: None,
            processing_time_ms: None,
            pipeline_metadata: None,
        }
    }
}

/// Clamps a score into the unit interval; NaN collapses to 0.
pub fn normalized_unit(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 1.0)
}
