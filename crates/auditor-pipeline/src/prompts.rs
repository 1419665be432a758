use serde_json::{json, Value};

use auditor_core::ChurnEvent;

use crate::context::{customer_context, format_context_for_prompt};

const TRIAGE_SYSTEM: &str = "You are a churn-risk triage analyst. Given a cancellation event and customer context, quickly assess whether this churn warrants deep AI analysis.

Respond in JSON with:
- worthDeepAnalysis (boolean): true if the customer is high-value, the churn is preventable, or the signals are complex
- reason (string): 1-2 sentence justification
- urgency (\"urgent\" | \"high\" | \"medium\" | \"low\"): how quickly should we act
- estimatedSaveProbability (number 0-1): rough chance we can win them back";

const DIAGNOSIS_SYSTEM: &str = "You are ChurnAuditor, an expert SaaS retention analyst. Given a cancellation event and rich customer context, produce a comprehensive churn diagnosis.

Your analysis must be evidence-based. Cite specific support tickets, usage patterns, and survey responses. Identify the PRIMARY root cause even when multiple factors exist.

Focus on actionable insights. Each recommended action should be specific and immediately executable.";

#[derive(Debug, Clone, PartialEq)]
/// System instruction plus the user prompt for one stage.
pub struct PromptBundle {
    pub system_instruction: String,
    pub prompt: String,
}

pub fn build_triage_prompt(event: &ChurnEvent) -> PromptBundle {
    let context = customer_context(&event.customer_id);
    let context_block = format_context_for_prompt(&context);
    let reason = event.reason.as_deref().unwrap_or("None provided");

    let prompt = format!(
        "## CANCELLATION EVENT\nCustomer: {} ({})\nMRR: ${}/mo\nPlan: {}\nCanceled: {}\nStated reason: {}\n\n{}\n\nAssess whether this churn warrants deep analysis.",
        event.customer_name,
        event.customer_email,
        event.mrr,
        event.plan,
        event.canceled_at.to_rfc3339(),
        reason,
        context_block,
    );

    PromptBundle {
        system_instruction: TRIAGE_SYSTEM.to_string(),
        prompt,
    }
}

pub fn build_diagnosis_prompt(event: &ChurnEvent) -> PromptBundle {
    let context = customer_context(&event.customer_id);
    let context_block = format_context_for_prompt(&context);
    let reason = event.reason.as_deref().unwrap_or("None provided");

    let prompt = format!(
        "## CANCELLATION EVENT\nCustomer: {} ({})\nCustomer ID: {}\nMRR: ${}/mo\nPlan: {}\nSubscription: {}\nCanceled: {}\nStated reason: {}\n\n{}\n\nProduce a full churn diagnosis. Identify the primary cause, gather evidence with relevance scores, estimate save probability, and recommend specific actions.\n\nFor recommendedActions, use these types:\n- \"linear_ticket\": Create a bug ticket for engineering to fix the issue\n- \"winback_email\": Send a personalized win-back email with an offer\n- \"slack_alert\": Alert the CS team in Slack for immediate outreach\n- \"manual_review\": Flag for human review by account management",
        event.customer_name,
        event.customer_email,
        event.customer_id,
        event.mrr,
        event.plan,
        event.subscription_id,
        event.canceled_at.to_rfc3339(),
        reason,
        context_block,
    );

    PromptBundle {
        system_instruction: DIAGNOSIS_SYSTEM.to_string(),
        prompt,
    }
}

/// Strict response schema for the triage stage.
pub fn triage_response_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "worthDeepAnalysis": { "type": "boolean" },
            "reason": { "type": "string" },
            "urgency": {
                "type": "string",
                "enum": ["urgent", "high", "medium", "low"]
            },
            "estimatedSaveProbability": { "type": "number" }
        },
        "required": [
            "worthDeepAnalysis",
            "reason",
            "urgency",
            "estimatedSaveProbability"
        ]
    })
}

/// Strict response schema for the diagnosis stage: the full dossier shape.
pub fn dossier_response_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "primaryCause": {
                "type": "string",
                "enum": [
                    "pricing",
                    "bugs",
                    "support",
                    "competition",
                    "features",
                    "onboarding",
                    "other"
                ]
            },
            "confidence": { "type": "number" },
            "evidence": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "source": {
                            "type": "string",
                            "enum": ["support_ticket", "usage_data", "exit_survey"]
                        },
                        "quote": { "type": "string" },
                        "relevance": { "type": "number" }
                    },
                    "required": ["source", "quote", "relevance"]
                }
            },
            "saveProbability": { "type": "number" },
            "recommendedActions": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "type": {
                            "type": "string",
                            "enum": [
                                "linear_ticket",
                                "winback_email",
                                "slack_alert",
                                "manual_review"
                            ]
                        },
                        "priority": {
                            "type": "string",
                            "enum": ["urgent", "high", "medium", "low"]
                        },
                        "description": { "type": "string" }
                    },
                    "required": ["type", "priority", "description"]
                }
            },
            "reasoning": { "type": "string" }
        },
        "required": [
            "primaryCause",
            "confidence",
            "evidence",
            "saveProbability",
            "recommendedActions",
            "reasoning"
        ]
    })
}
