use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use auditor_core::ModelTier;

use crate::types::{validate_against_schema, ReasoningClient, ReasoningError, StructuredRequest};

fn model_id(tier: ModelTier) -> &'static str {
    match tier {
        ModelTier::Fast => "gemini-2.0-flash",
        ModelTier::Deep => "gemini-2.5-pro",
    }
}

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_base: String,
    pub api_key: String,
    pub request_timeout_ms: u64,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_base: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            api_key: String::new(),
            request_timeout_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone)]
/// Thin `generateContent` client. One attempt per call: stage failures
/// are absorbed by the orchestrator's fallback, so there is no retry
/// loop here.
pub struct GeminiClient {
    client: reqwest::Client,
    config: GeminiConfig,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Result<Self, ReasoningError> {
        if config.api_key.trim().is_empty() {
            return Err(ReasoningError::MissingApiKey);
        }

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(
                config.request_timeout_ms.max(1),
            ))
            .build()?;

        Ok(Self { client, config })
    }

    fn generate_content_url(&self, model: &str) -> String {
        let base = self.config.api_base.trim_end_matches('/');
        if base.contains(":generateContent") {
            return base.replace("{model}", model);
        }
        format!("{base}/models/{model}:generateContent")
    }

    async fn post_generate_content(
        &self,
        tier: ModelTier,
        body: Value,
    ) -> Result<String, ReasoningError> {
        let url = self.generate_content_url(model_id(tier));
        let response = self
            .client
            .post(&url)
            .query(&[("key", self.config.api_key.as_str())])
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let raw = response.text().await?;
        if !status.is_success() {
            return Err(ReasoningError::HttpStatus {
                status: status.as_u16(),
                body: raw,
            });
        }

        let text = extract_candidate_text(&raw)?;
        if text.trim().is_empty() {
            return Err(ReasoningError::EmptyResponse);
        }
        Ok(text)
    }
}

#[async_trait]
impl ReasoningClient for GeminiClient {
    async fn generate_structured(
        &self,
        request: &StructuredRequest,
    ) -> Result<Value, ReasoningError> {
        let body = build_generate_content_body(
            &request.prompt,
            request.system_instruction.as_deref(),
            request.temperature,
            Some(&request.response_schema),
        );
        let text = self.post_generate_content(request.tier, body).await?;
        let parsed: Value = serde_json::from_str(&text)?;
        validate_against_schema(&request.response_schema, &parsed)?;
        Ok(parsed)
    }

    async fn generate(
        &self,
        tier: ModelTier,
        prompt: &str,
        system_instruction: Option<&str>,
        temperature: Option<f32>,
    ) -> Result<String, ReasoningError> {
        let body = build_generate_content_body(prompt, system_instruction, temperature, None);
        self.post_generate_content(tier, body).await
    }
}

fn build_generate_content_body(
    prompt: &str,
    system_instruction: Option<&str>,
    temperature: Option<f32>,
    response_schema: Option<&Value>,
) -> Value {
    let mut body = json!({
        "contents": [{
            "role": "user",
            "parts": [{ "text": prompt }],
        }],
    });

    if let Some(system) = system_instruction.filter(|text| !text.trim().is_empty()) {
        body["systemInstruction"] = json!({
            "parts": [{ "text": system }],
        });
    }

    if temperature.is_some() || response_schema.is_some() {
        let mut generation_config = json!({});
        if let Some(temperature) = temperature {
            generation_config["temperature"] = json!(temperature);
        }
        if let Some(schema) = response_schema {
            generation_config["responseMimeType"] = json!("application/json");
            generation_config["responseSchema"] = schema.clone();
        }
        body["generationConfig"] = generation_config;
    }

    body
}

fn extract_candidate_text(raw: &str) -> Result<String, ReasoningError> {
    let parsed: GenerateContentResponse = serde_json::from_str(raw)?;
    let candidate = parsed
        .candidates
        .and_then(|mut candidates| candidates.drain(..).next())
        .ok_or_else(|| {
            ReasoningError::InvalidResponse("response contained no candidates".to_string())
        })?;

    let parts = candidate
        .content
        .and_then(|content| content.parts)
        .unwrap_or_default();

    let text = parts
        .into_iter()
        .filter_map(|part| part.text)
        .filter(|text| !text.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n");
    Ok(text)
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    candidates: Option<Vec<GenerateContentCandidate>>,
}

#[derive(Debug, Deserialize)]
struct GenerateContentCandidate {
    content: Option<GenerateContentContent>,
}

#[derive(Debug, Deserialize)]
struct GenerateContentContent {
    parts: Option<Vec<GenerateContentPart>>,
}

#[derive(Debug, Deserialize)]
struct GenerateContentPart {
    text: Option<String>,
}
