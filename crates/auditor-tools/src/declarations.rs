use serde_json::{json, Value};

/// JSON function declarations for the four recovery tools, in the shape
/// the reasoning service accepts for function calling.
pub fn tool_declarations() -> Vec<Value> {
    vec![
        json!({
            "name": "create_linear_ticket",
            "description": "Creates a bug ticket in Linear for the engineering team to investigate and fix a product issue that contributed to churn.",
            "parameters": {
                "type": "object",
                "properties": {
                    "title": {
                        "type": "string",
                        "description": "Ticket title describing the bug or issue"
                    },
                    "description": {
                        "type": "string",
                        "description": "Detailed description including customer impact and reproduction steps"
                    },
                    "priority": {
                        "type": "string",
                        "enum": ["urgent", "high", "medium", "low"],
                        "description": "Ticket priority level"
                    },
                    "labels": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "Labels to apply (e.g. 'churn-related', 'performance')"
                    }
                },
                "required": ["title", "description", "priority"]
            }
        }),
        json!({
            "name": "send_winback_email",
            "description": "Sends a personalized win-back email to the churned customer with a tailored offer or message.",
            "parameters": {
                "type": "object",
                "properties": {
                    "to": { "type": "string", "description": "Recipient email address" },
                    "subject": { "type": "string", "description": "Email subject line" },
                    "body": { "type": "string", "description": "Email body (plain text)" },
                    "offerCode": {
                        "type": "string",
                        "description": "Optional discount or offer code to include"
                    }
                },
                "required": ["to", "subject", "body"]
            }
        }),
        json!({
            "name": "send_slack_alert",
            "description": "Posts an alert to a Slack channel to notify the customer success team about a churn event requiring attention.",
            "parameters": {
                "type": "object",
                "properties": {
                    "channel": {
                        "type": "string",
                        "description": "Slack channel name (e.g. '#cs-alerts')"
                    },
                    "message": { "type": "string", "description": "Alert message content" },
                    "urgency": {
                        "type": "string",
                        "enum": ["urgent", "high", "medium", "low"],
                        "description": "Urgency level for the alert"
                    }
                },
                "required": ["channel", "message", "urgency"]
            }
        }),
        json!({
            "name": "flag_for_manual_review",
            "description": "Flags this churn case for manual review by an account manager, adding it to their review queue.",
            "parameters": {
                "type": "object",
                "properties": {
                    "assignee": {
                        "type": "string",
                        "description": "Account manager to assign (or 'auto' for round-robin)"
                    },
                    "reason": { "type": "string", "description": "Why this needs manual review" },
                    "priority": {
                        "type": "string",
                        "enum": ["urgent", "high", "medium", "low"],
                        "description": "Review priority"
                    }
                },
                "required": ["reason", "priority"]
            }
        }),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declares_all_four_tools_with_valid_parameter_schemas() {
        let declarations = tool_declarations();
        assert_eq!(declarations.len(), 4);
        let names: Vec<&str> = declarations
            .iter()
            .map(|tool| tool["name"].as_str().expect("name"))
            .collect();
        assert_eq!(
            names,
            vec![
                "create_linear_ticket",
                "send_winback_email",
                "send_slack_alert",
                "flag_for_manual_review"
            ]
        );
        for tool in &declarations {
            assert_eq!(tool["parameters"]["type"], "object");
            assert!(tool["parameters"]["required"].is_array());
        }
    }
}
