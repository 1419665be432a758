use thiserror::Error;

use auditor_ai::{ReasoningClient, ReasoningError, StructuredRequest};
use auditor_core::{
    ChurnDossier, ChurnEvent, ExecutedAction, ModelTier, TriageVerdict,
};
use auditor_store::StoreError;
use auditor_tools::{execute_tool, tool_invocation};

use crate::prompts::{
    build_diagnosis_prompt, build_triage_prompt, dossier_response_schema, triage_response_schema,
};

const TRIAGE_TEMPERATURE: f32 = 0.3;
const DIAGNOSIS_TEMPERATURE: f32 = 0.4;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("reasoning stage failed: {0}")]
    Reasoning(#[from] ReasoningError),
    #[error("store operation failed: {0}")]
    Store(#[from] StoreError),
    #[error("stage output could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Triage stage: always the fast tier. Decides whether the diagnosis
/// stage earns the deep model.
pub async fn run_triage(
    client: &dyn ReasoningClient,
    event: &ChurnEvent,
) -> Result<TriageVerdict, PipelineError> {
    let bundle = build_triage_prompt(event);
    let response = client
        .generate_structured(&StructuredRequest {
            tier: ModelTier::Fast,
            prompt: bundle.prompt,
            system_instruction: Some(bundle.system_instruction),
            temperature: Some(TRIAGE_TEMPERATURE),
            response_schema: triage_response_schema(),
        })
        .await?;
    let verdict: TriageVerdict = serde_json::from_value(response)?;
    Ok(verdict)
}

/// Diagnosis stage: tier chosen by the triage verdict. The dossier is
/// normalized before it is returned so downstream consumers never see
/// out-of-range scores.
pub async fn run_diagnosis(
    client: &dyn ReasoningClient,
    event: &ChurnEvent,
    tier: ModelTier,
) -> Result<ChurnDossier, PipelineError> {
    let bundle = build_diagnosis_prompt(event);
    let response = client
        .generate_structured(&StructuredRequest {
            tier,
            prompt: bundle.prompt,
            system_instruction: Some(bundle.system_instruction),
            temperature: Some(DIAGNOSIS_TEMPERATURE),
            response_schema: dossier_response_schema(),
        })
        .await?;
    let mut dossier: ChurnDossier = serde_json::from_value(response)?;
    dossier.normalize();
    Ok(dossier)
}

/// Runs every recommended action sequentially through the mock
/// integrations. A failed call is recorded and execution continues;
/// nothing here is retried.
pub async fn execute_actions(event: &ChurnEvent, dossier: &ChurnDossier) -> Vec<ExecutedAction> {
    let mut executed = Vec::with_capacity(dossier.recommended_actions.len());
    for action in &dossier.recommended_actions {
        let invocation = tool_invocation(action, event, dossier);
        let outcome = execute_tool(invocation.tool_name, &invocation.params).await;
        executed.push(ExecutedAction {
            action_type: outcome.action_type,
            status: outcome.status,
            result: Some(outcome.result),
            executed_at: Some(outcome.executed_at),
        });
    }
    executed
}
