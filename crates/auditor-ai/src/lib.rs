//! Reasoning-service boundary: a structured-output generation client
//! parameterized by model tier and a strict JSON response schema.

mod gemini;
mod types;

pub use gemini::{GeminiClient, GeminiConfig};
pub use types::{ReasoningClient, ReasoningError, StructuredRequest};
