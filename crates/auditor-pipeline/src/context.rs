//! Static customer-context lookup embedded in stage prompts. A real
//! deployment would query the support desk, product analytics, and the
//! survey tool; this collaborator is mocked with one representative
//! context per unknown customer.

#[derive(Debug, Clone)]
pub struct CustomerContext {
    pub support_tickets: Vec<SupportTicket>,
    pub usage: UsageSnapshot,
    pub exit_survey: Option<ExitSurvey>,
}

#[derive(Debug, Clone)]
pub struct SupportTicket {
    pub id: &'static str,
    pub subject: &'static str,
    pub body: &'static str,
    pub status: &'static str,
    pub created_at: &'static str,
    pub sentiment: &'static str,
}

#[derive(Debug, Clone)]
pub struct UsageSnapshot {
    pub logins_last_30_days: u32,
    pub logins_previous_30_days: u32,
    pub feature_adoption: Vec<(&'static str, f64)>,
    pub last_active_at: &'static str,
    pub api_calls_last_30_days: u64,
    pub api_calls_previous_30_days: u64,
}

#[derive(Debug, Clone)]
pub struct ExitSurvey {
    pub submitted_at: &'static str,
    pub overall_satisfaction: u8,
    pub reason_category: &'static str,
    pub verbatim: &'static str,
}

/// Context lookup keyed by customer identifier. Every customer currently
/// resolves to the default context.
pub fn customer_context(_customer_id: &str) -> CustomerContext {
    CustomerContext {
        support_tickets: vec![
            SupportTicket {
                id: "TKT-4821",
                subject: "Dashboard loading extremely slow",
                body: "Our team dashboard takes 15+ seconds to load since last week's update. This is blocking our morning standup workflow. We've tried clearing cache and different browsers.",
                status: "escalated",
                created_at: "2025-01-28T09:15:00Z",
                sentiment: "frustrated",
            },
            SupportTicket {
                id: "TKT-4856",
                subject: "Export CSV broken for large datasets",
                body: "When exporting more than 10k rows the CSV export times out. We need this for our monthly reporting. This used to work fine.",
                status: "open",
                created_at: "2025-02-01T14:30:00Z",
                sentiment: "negative",
            },
            SupportTicket {
                id: "TKT-4790",
                subject: "Billing question about annual plan",
                body: "Can you clarify what happens to our data if we switch from annual to monthly? Also, are there any discounts for nonprofits?",
                status: "closed",
                created_at: "2025-01-20T11:00:00Z",
                sentiment: "neutral",
            },
        ],
        usage: UsageSnapshot {
            logins_last_30_days: 3,
            logins_previous_30_days: 22,
            feature_adoption: vec![
                ("dashboard", 0.85),
                ("reports", 0.60),
                ("api", 0.45),
                ("integrations", 0.10),
                ("automations", 0.0),
            ],
            last_active_at: "2025-02-03T08:22:00Z",
            api_calls_last_30_days: 142,
            api_calls_previous_30_days: 2_380,
        },
        exit_survey: Some(ExitSurvey {
            submitted_at: "2025-02-05T16:45:00Z",
            overall_satisfaction: 3,
            reason_category: "product_quality",
            verbatim: "Love the concept but the recent bugs have been killing our productivity. We found a competitor that just works. Might come back if things stabilize.",
        }),
    }
}

/// Renders the context as the markdown block the stage prompts embed.
pub fn format_context_for_prompt(context: &CustomerContext) -> String {
    let tickets = context
        .support_tickets
        .iter()
        .map(|ticket| {
            format!(
                "[{}] ({}) {}\n  \"{}\"\n  Status: {} | Created: {}",
                ticket.id,
                ticket.sentiment,
                ticket.subject,
                ticket.body,
                ticket.status,
                ticket.created_at,
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    let adoption = context
        .usage
        .feature_adoption
        .iter()
        .map(|(feature, share)| format!("{feature}: {}%", (share * 100.0).round() as i64))
        .collect::<Vec<_>>()
        .join(", ");
    let usage = format!(
        "Logins: {} (last 30d) vs {} (prev 30d)\nAPI calls: {} (last 30d) vs {} (prev 30d)\nLast active: {}\nFeature adoption: {}",
        context.usage.logins_last_30_days,
        context.usage.logins_previous_30_days,
        context.usage.api_calls_last_30_days,
        context.usage.api_calls_previous_30_days,
        context.usage.last_active_at,
        adoption,
    );

    let survey = match &context.exit_survey {
        Some(survey) => format!(
            "Satisfaction: {}/5\nReason: {}\nVerbatim: \"{}\"",
            survey.overall_satisfaction, survey.reason_category, survey.verbatim,
        ),
        None => "No exit survey submitted.".to_string(),
    };

    format!("## SUPPORT TICKETS\n{tickets}\n\n## USAGE DATA\n{usage}\n\n## EXIT SURVEY\n{survey}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formatted_context_contains_all_three_sections() {
        let context = customer_context("cus_any");
        let block = format_context_for_prompt(&context);
        assert!(block.contains("## SUPPORT TICKETS"));
        assert!(block.contains("## USAGE DATA"));
        assert!(block.contains("## EXIT SURVEY"));
        assert!(block.contains("TKT-4821"));
        assert!(block.contains("dashboard: 85%"));
        assert!(block.contains("Satisfaction: 3/5"));
    }

    #[test]
    fn missing_survey_renders_placeholder() {
        let mut context = customer_context("cus_any");
        context.exit_survey = None;
        let block = format_context_for_prompt(&context);
        assert!(block.contains("No exit survey submitted."));
    }
}
