use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use auditor_core::ModelTier;

#[derive(Debug, Clone, PartialEq)]
/// One structured-generation request: tier, prompt, optional system
/// instruction, temperature, and the JSON schema the response must
/// satisfy.
pub struct StructuredRequest {
    pub tier: ModelTier,
    pub prompt: String,
    pub system_instruction: Option<String>,
    pub temperature: Option<f32>,
    pub response_schema: Value,
}

#[derive(Debug, Error)]
pub enum ReasoningError {
    #[error("missing API key")]
    MissingApiKey,
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("provider returned non-success status {status}: {body}")]
    HttpStatus { status: u16, body: String },
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("empty response body")]
    EmptyResponse,
    #[error("response violates the declared schema: {0}")]
    SchemaViolation(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Capability interface for structured generation. Any concrete
/// reasoning-service SDK can satisfy it; tests supply scripted
/// implementations.
#[async_trait]
pub trait ReasoningClient: Send + Sync {
    /// Returns a JSON value already validated against
    /// `request.response_schema`.
    async fn generate_structured(
        &self,
        request: &StructuredRequest,
    ) -> Result<Value, ReasoningError>;

    /// Plain-text generation for callers that do not need a schema.
    async fn generate(
        &self,
        tier: ModelTier,
        prompt: &str,
        system_instruction: Option<&str>,
        temperature: Option<f32>,
    ) -> Result<String, ReasoningError>;
}

/// Validates `instance` against `schema`, mapping the first violation
/// into a `ReasoningError`.
pub(crate) fn validate_against_schema(
    schema: &Value,
    instance: &Value,
) -> Result<(), ReasoningError> {
    let validator = jsonschema::validator_for(schema)
        .map_err(|error| ReasoningError::InvalidResponse(format!("invalid schema: {error}")))?;
    let mut errors = validator.iter_errors(instance);
    if let Some(first) = errors.next() {
        return Err(ReasoningError::SchemaViolation(first.to_string()));
    }
    Ok(())
}
