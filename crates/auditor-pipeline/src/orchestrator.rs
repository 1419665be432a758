use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::{sleep, Instant};

use auditor_ai::ReasoningClient;
use auditor_core::{
    AnalysisRecord, AnalysisStatus, ChurnDossier, ChurnEvent, ExecutedAction, ModelTier,
    PipelineMetadata, PipelineSource, PipelineStep,
};
use auditor_store::{AnalysisStore, AnalysisUpdate, ProgressTracker};

use crate::simulator::{run_simulated, SimulatorConfig};
use crate::stages::{execute_actions, run_diagnosis, run_triage, PipelineError};

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
/// Progress frames emitted to an optional subscriber. The terminal
/// store state is identical whether or not anyone listens.
pub enum PipelineEvent {
    #[serde(rename_all = "camelCase")]
    Status {
        analysis_id: String,
        status: AnalysisStatus,
    },
    #[serde(rename_all = "camelCase")]
    Result {
        analysis_id: String,
        analysis: AnalysisRecord,
    },
    Error { message: String },
    #[serde(rename_all = "camelCase")]
    Done { analysis_id: String },
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Wall-clock budget the live pipeline gets before the run falls
    /// back to the simulator.
    pub timeout: Duration,
    pub simulator: SimulatorConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(25),
            simulator: SimulatorConfig::default(),
        }
    }
}

/// Drives one analysis from `pending` to a terminal state. Holds the
/// store, the progress tracker, and an optional reasoning client; with
/// no client configured every run is simulated.
pub struct Orchestrator {
    store: Arc<AnalysisStore>,
    tracker: Arc<ProgressTracker>,
    reasoning: Option<Arc<dyn ReasoningClient>>,
    config: PipelineConfig,
}

type PipelineOutcome = (ChurnDossier, Vec<ExecutedAction>, PipelineMetadata);

impl Orchestrator {
    pub fn new(
        store: Arc<AnalysisStore>,
        tracker: Arc<ProgressTracker>,
        reasoning: Option<Arc<dyn ReasoningClient>>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            store,
            tracker,
            reasoning,
            config,
        }
    }

    pub fn store(&self) -> &Arc<AnalysisStore> {
        &self.store
    }

    pub fn tracker(&self) -> &Arc<ProgressTracker> {
        &self.tracker
    }

    /// Runs the pipeline for an already-created record. Every exit path
    /// leaves the record in `complete` or `failed`, never `analyzing`.
    pub async fn run(
        &self,
        analysis_id: &str,
        event: ChurnEvent,
        events: Option<UnboundedSender<PipelineEvent>>,
    ) {
        let started = Instant::now();

        if let Err(error) = self
            .store
            .merge(analysis_id, AnalysisUpdate::status(AnalysisStatus::Analyzing))
        {
            tracing::error!(analysis_id, %error, "could not start analysis");
            emit(
                &events,
                PipelineEvent::Error {
                    message: error.to_string(),
                },
            );
            emit(
                &events,
                PipelineEvent::Done {
                    analysis_id: analysis_id.to_string(),
                },
            );
            return;
        }
        emit(
            &events,
            PipelineEvent::Status {
                analysis_id: analysis_id.to_string(),
                status: AnalysisStatus::Analyzing,
            },
        );

        let outcome = match self.reasoning.clone() {
            None => {
                run_simulated(analysis_id, &event, &self.tracker, &self.config.simulator).await
            }
            Some(client) => {
                self.race_live_pipeline(client, analysis_id, &event).await
            }
        };

        let (dossier, executed_actions, metadata) = outcome;
        let update = AnalysisUpdate {
            status: Some(AnalysisStatus::Complete),
            dossier: Some(dossier),
            executed_actions: Some(executed_actions),
            completed_at: Some(chrono::Utc::now()),
            processing_time_ms: Some(started.elapsed().as_millis() as u64),
            pipeline_metadata: Some(metadata),
        };

        match self.store.merge(analysis_id, update) {
            Ok(record) => {
                emit(
                    &events,
                    PipelineEvent::Result {
                        analysis_id: analysis_id.to_string(),
                        analysis: record,
                    },
                );
            }
            Err(error) => {
                tracing::error!(analysis_id, %error, "terminal merge failed");
                if let Err(error) = self
                    .store
                    .merge(analysis_id, AnalysisUpdate::status(AnalysisStatus::Failed))
                {
                    tracing::error!(analysis_id, %error, "could not mark analysis failed");
                }
                emit(
                    &events,
                    PipelineEvent::Error {
                        message: error.to_string(),
                    },
                );
            }
        }
        emit(
            &events,
            PipelineEvent::Done {
                analysis_id: analysis_id.to_string(),
            },
        );
    }

    /// Races the live pipeline against the timeout. A timeout or any
    /// stage error abandons the live result entirely and reruns the
    /// simulator for the same record; in-flight tool calls of an
    /// abandoned run finish on their detached task but can no longer
    /// write anything.
    async fn race_live_pipeline(
        &self,
        client: Arc<dyn ReasoningClient>,
        analysis_id: &str,
        event: &ChurnEvent,
    ) -> PipelineOutcome {
        let live = tokio::spawn(run_live(
            client,
            analysis_id.to_string(),
            event.clone(),
            Arc::clone(&self.tracker),
        ));

        tokio::select! {
            joined = live => match joined {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(error)) => {
                    tracing::warn!(analysis_id, %error, "live pipeline failed, using simulated analysis");
                    run_simulated(analysis_id, event, &self.tracker, &self.config.simulator).await
                }
                Err(join_error) => {
                    tracing::warn!(analysis_id, %join_error, "live pipeline panicked, using simulated analysis");
                    run_simulated(analysis_id, event, &self.tracker, &self.config.simulator).await
                }
            },
            _ = sleep(self.config.timeout) => {
                tracing::warn!(
                    analysis_id,
                    timeout_ms = self.config.timeout.as_millis() as u64,
                    "live pipeline timed out, using simulated analysis",
                );
                run_simulated(analysis_id, event, &self.tracker, &self.config.simulator).await
            }
        }
    }
}

/// The live pipeline: triage on the fast tier, tier selection,
/// diagnosis, then action execution. Returns its outcome instead of
/// writing the store so an abandoned run has no terminal effect.
async fn run_live(
    client: Arc<dyn ReasoningClient>,
    analysis_id: String,
    event: ChurnEvent,
    tracker: Arc<ProgressTracker>,
) -> Result<PipelineOutcome, PipelineError> {
    tracker.set_step(&analysis_id, PipelineStep::Triaging);
    let triage_start = Instant::now();
    let verdict = run_triage(client.as_ref(), &event).await?;
    let triage_duration_ms = triage_start.elapsed().as_millis() as u64;

    let tier = if verdict.worth_deep_analysis {
        ModelTier::Deep
    } else {
        ModelTier::Fast
    };

    tracker.set_step(&analysis_id, PipelineStep::Diagnosing);
    let diagnosis_start = Instant::now();
    let dossier = run_diagnosis(client.as_ref(), &event, tier).await?;
    let diagnosis_duration_ms = diagnosis_start.elapsed().as_millis() as u64;

    tracker.set_step(&analysis_id, PipelineStep::ExecutingActions);
    let actions_start = Instant::now();
    let executed_actions = execute_actions(&event, &dossier).await;
    let actions_duration_ms = actions_start.elapsed().as_millis() as u64;

    tracker.set_step(&analysis_id, PipelineStep::Complete);

    let metadata = PipelineMetadata {
        triage_result: verdict,
        diagnosis_model: tier,
        triage_duration_ms,
        diagnosis_duration_ms,
        actions_duration_ms,
        pipeline_source: PipelineSource::Live,
    };
    Ok((dossier, executed_actions, metadata))
}

fn emit(events: &Option<UnboundedSender<PipelineEvent>>, event: PipelineEvent) {
    if let Some(sender) = events {
        // Subscriber may have disconnected; the run carries on.
        let _ = sender.send(event);
    }
}
