//! The diagnostic pipeline: triage and diagnosis stages against the
//! reasoning service, the deterministic simulation fallback, and the
//! orchestrator that drives an analysis record to a terminal state.

mod context;
mod orchestrator;
mod prompts;
mod simulator;
mod stages;

pub use context::{customer_context, format_context_for_prompt, CustomerContext};
pub use orchestrator::{Orchestrator, PipelineConfig, PipelineEvent};
pub use prompts::{
    build_diagnosis_prompt, build_triage_prompt, dossier_response_schema, triage_response_schema,
    PromptBundle,
};
pub use simulator::{run_simulated, scenario_index, SimulatorConfig};
pub use stages::{execute_actions, run_diagnosis, run_triage, PipelineError};
