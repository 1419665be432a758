use serde_json::{json, Value};

use auditor_core::{ChurnDossier, ChurnEvent, RecommendedAction};

#[derive(Debug, Clone, PartialEq)]
/// A named tool call plus its parameter bag, ready for `execute_tool`.
pub struct ToolInvocation {
    pub tool_name: &'static str,
    pub params: Value,
}

/// Builds the tool call for a recommended action.
pub fn tool_invocation(
    action: &RecommendedAction,
    event: &ChurnEvent,
    dossier: &ChurnDossier,
) -> ToolInvocation {
    let wire_name = serde_json::to_value(action.action_type)
        .ok()
        .and_then(|value| value.as_str().map(str::to_string))
        .unwrap_or_default();
    invocation_for(&wire_name, action, event, dossier)
}

/// String-keyed variant with the manual-review default arm: an
/// unrecognized action type is flagged for review rather than raised.
pub fn invocation_for(
    action_type: &str,
    action: &RecommendedAction,
    event: &ChurnEvent,
    dossier: &ChurnDossier,
) -> ToolInvocation {
    let cause = serde_json::to_value(dossier.primary_cause)
        .ok()
        .and_then(|value| value.as_str().map(str::to_string))
        .unwrap_or_else(|| "other".to_string());

    match action_type {
        "linear_ticket" => {
            let title_excerpt: String = action.description.chars().take(80).collect();
            ToolInvocation {
                tool_name: "create_linear_ticket",
                params: json!({
                    "title": format!("[Churn] {title_excerpt}"),
                    "description": format!(
                        "Customer: {} ({})\nMRR: ${}\nCause: {}\n\n{}",
                        event.customer_name,
                        event.customer_email,
                        event.mrr,
                        cause,
                        action.description,
                    ),
                    "priority": action.priority.as_str(),
                    "labels": ["churn-related", cause],
                }),
            }
        }
        "winback_email" => {
            let mut params = json!({
                "to": event.customer_email,
                "subject": format!("We'd love to win you back, {}", event.customer_name),
                "body": action.description,
            });
            if dossier.save_probability > 0.5 {
                params["offerCode"] = json!("WINBACK20");
            }
            ToolInvocation {
                tool_name: "send_winback_email",
                params,
            }
        }
        "slack_alert" => ToolInvocation {
            tool_name: "send_slack_alert",
            params: json!({
                "channel": "#cs-alerts",
                "message": format!(
                    "Churn Alert: {} (${}/mo) - {}. {}",
                    event.customer_name, event.mrr, cause, action.description,
                ),
                "urgency": action.priority.as_str(),
            }),
        },
        "manual_review" => ToolInvocation {
            tool_name: "flag_for_manual_review",
            params: json!({
                "assignee": "auto",
                "reason": action.description,
                "priority": action.priority.as_str(),
            }),
        },
        unknown => ToolInvocation {
            tool_name: "flag_for_manual_review",
            params: json!({
                "reason": format!("Unknown action type: {unknown}. {}", action.description),
                "priority": "medium",
            }),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use auditor_core::{ActionType, ChurnCause, Priority};
    use chrono::Utc;

    fn sample_event() -> ChurnEvent {
        ChurnEvent {
            id: "evt_1".to_string(),
            customer_id: "cus_1".to_string(),
            customer_email: "james.wright@startupxyz.com".to_string(),
            customer_name: "James Wright".to_string(),
            mrr: 499.0,
            plan: "Enterprise $499/mo".to_string(),
            canceled_at: Utc::now(),
            reason: Some("product_issues".to_string()),
            subscription_id: "sub_1".to_string(),
        }
    }

    fn dossier_with_save_probability(save_probability: f64) -> ChurnDossier {
        ChurnDossier {
            primary_cause: ChurnCause::Bugs,
            confidence: 0.9,
            evidence: Vec::new(),
            save_probability,
            recommended_actions: Vec::new(),
            reasoning: "reliability issues".to_string(),
        }
    }

    fn action(action_type: ActionType, priority: Priority) -> RecommendedAction {
        RecommendedAction {
            action_type,
            priority,
            description: "Fix dashboard crash on large datasets".to_string(),
        }
    }

    #[test]
    fn ticket_invocation_carries_customer_context_and_cause_label() {
        let invocation = tool_invocation(
            &action(ActionType::LinearTicket, Priority::Urgent),
            &sample_event(),
            &dossier_with_save_probability(0.45),
        );
        assert_eq!(invocation.tool_name, "create_linear_ticket");
        assert!(invocation.params["title"]
            .as_str()
            .expect("title")
            .starts_with("[Churn]"));
        assert!(invocation.params["description"]
            .as_str()
            .expect("description")
            .contains("James Wright"));
        assert_eq!(invocation.params["labels"][1], "bugs");
        assert_eq!(invocation.params["priority"], "urgent");
    }

    #[test]
    fn winback_offer_code_requires_save_probability_above_half() {
        let event = sample_event();
        let with_offer = tool_invocation(
            &action(ActionType::WinbackEmail, Priority::High),
            &event,
            &dossier_with_save_probability(0.72),
        );
        assert_eq!(with_offer.params["offerCode"], "WINBACK20");

        let without_offer = tool_invocation(
            &action(ActionType::WinbackEmail, Priority::High),
            &event,
            &dossier_with_save_probability(0.45),
        );
        assert!(without_offer.params.get("offerCode").is_none());
        assert_eq!(without_offer.params["to"], "james.wright@startupxyz.com");
    }

    #[test]
    fn slack_invocation_targets_cs_alerts() {
        let invocation = tool_invocation(
            &action(ActionType::SlackAlert, Priority::Urgent),
            &sample_event(),
            &dossier_with_save_probability(0.45),
        );
        assert_eq!(invocation.tool_name, "send_slack_alert");
        assert_eq!(invocation.params["channel"], "#cs-alerts");
        assert!(invocation.params["message"]
            .as_str()
            .expect("message")
            .contains("Churn Alert"));
    }

    #[test]
    fn unrecognized_action_type_falls_back_to_manual_review() {
        let invocation = invocation_for(
            "carrier_pigeon",
            &action(ActionType::ManualReview, Priority::Medium),
            &sample_event(),
            &dossier_with_save_probability(0.3),
        );
        assert_eq!(invocation.tool_name, "flag_for_manual_review");
        assert!(invocation.params["reason"]
            .as_str()
            .expect("reason")
            .contains("Unknown action type: carrier_pigeon"));
    }
}
