use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Serialize;
use serde_json::Value;
use tokio::time::sleep;

use auditor_core::{ActionType, ExecutionStatus};

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
/// Normalized outcome of one tool call.
pub struct ToolOutcome {
    pub action_type: ActionType,
    pub status: ExecutionStatus,
    pub result: String,
    pub executed_at: DateTime<Utc>,
}

impl ToolOutcome {
    fn success(action_type: ActionType, result: String) -> Self {
        Self {
            action_type,
            status: ExecutionStatus::Success,
            result,
            executed_at: Utc::now(),
        }
    }

    fn failed(action_type: ActionType, result: String) -> Self {
        Self {
            action_type,
            status: ExecutionStatus::Failed,
            result,
            executed_at: Utc::now(),
        }
    }
}

fn param_str<'a>(params: &'a Value, key: &str) -> &'a str {
    params.get(key).and_then(Value::as_str).unwrap_or("")
}

fn reference_id() -> u32 {
    rand::thread_rng().gen_range(1_000..10_000)
}

async fn create_linear_ticket(params: &Value) -> String {
    sleep(Duration::from_millis(300)).await;
    format!(
        "Created Linear ticket LIN-{}: \"{}\" (priority: {})",
        reference_id(),
        param_str(params, "title"),
        param_str(params, "priority"),
    )
}

async fn send_winback_email(params: &Value) -> String {
    sleep(Duration::from_millis(400)).await;
    let offer = params
        .get("offerCode")
        .and_then(Value::as_str)
        .map(|code| format!(" (offer: {code})"))
        .unwrap_or_default();
    format!(
        "Win-back email sent to {} with subject \"{}\"{}",
        param_str(params, "to"),
        param_str(params, "subject"),
        offer,
    )
}

async fn send_slack_alert(params: &Value) -> String {
    sleep(Duration::from_millis(200)).await;
    let message = param_str(params, "message");
    let preview: String = message.chars().take(80).collect();
    format!(
        "Slack alert posted to {}: \"{}...\"",
        param_str(params, "channel"),
        preview,
    )
}

async fn flag_for_manual_review(params: &Value) -> String {
    sleep(Duration::from_millis(250)).await;
    let assignee = params
        .get("assignee")
        .and_then(Value::as_str)
        .unwrap_or("auto (round-robin)");
    format!(
        "Flagged for manual review, assigned to {} (priority: {})",
        assignee,
        param_str(params, "priority"),
    )
}

/// Invokes the named tool with a flat parameter bag. Each mocked
/// integration simulates its own latency and returns a human-readable
/// result; an unknown tool name becomes a failed manual-review outcome
/// instead of an error.
pub async fn execute_tool(name: &str, params: &Value) -> ToolOutcome {
    let outcome = match name {
        "create_linear_ticket" => {
            ToolOutcome::success(ActionType::LinearTicket, create_linear_ticket(params).await)
        }
        "send_winback_email" => {
            ToolOutcome::success(ActionType::WinbackEmail, send_winback_email(params).await)
        }
        "send_slack_alert" => {
            ToolOutcome::success(ActionType::SlackAlert, send_slack_alert(params).await)
        }
        "flag_for_manual_review" => ToolOutcome::success(
            ActionType::ManualReview,
            flag_for_manual_review(params).await,
        ),
        unknown => ToolOutcome::failed(
            ActionType::ManualReview,
            format!("Unknown tool: {unknown}"),
        ),
    };
    tracing::debug!(
        tool = name,
        status = ?outcome.status,
        "tool call finished"
    );
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test(start_paused = true)]
    async fn executes_each_known_tool_successfully() {
        let cases = [
            (
                "create_linear_ticket",
                json!({ "title": "Fix export", "priority": "urgent" }),
                ActionType::LinearTicket,
            ),
            (
                "send_winback_email",
                json!({ "to": "ada@example.com", "subject": "Come back" }),
                ActionType::WinbackEmail,
            ),
            (
                "send_slack_alert",
                json!({ "channel": "#cs-alerts", "message": "churn", "urgency": "high" }),
                ActionType::SlackAlert,
            ),
            (
                "flag_for_manual_review",
                json!({ "reason": "competitive loss", "priority": "medium" }),
                ActionType::ManualReview,
            ),
        ];
        for (name, params, expected_type) in cases {
            let outcome = execute_tool(name, &params).await;
            assert_eq!(outcome.action_type, expected_type);
            assert_eq!(outcome.status, ExecutionStatus::Success);
            assert!(!outcome.result.is_empty());
        }
    }

    #[tokio::test]
    async fn unknown_tool_maps_to_failed_manual_review() {
        let outcome = execute_tool("launch_fireworks", &json!({})).await;
        assert_eq!(outcome.action_type, ActionType::ManualReview);
        assert_eq!(outcome.status, ExecutionStatus::Failed);
        assert!(outcome.result.contains("Unknown tool"));
    }

    #[tokio::test(start_paused = true)]
    async fn winback_email_mentions_offer_code_when_present() {
        let outcome = execute_tool(
            "send_winback_email",
            &json!({ "to": "ada@example.com", "subject": "Hi", "offerCode": "WINBACK20" }),
        )
        .await;
        assert!(outcome.result.contains("WINBACK20"));
    }
}
