//! Canned demo analyses for the seed route: three completed records
//! spanning a pricing, a bugs, and a competition diagnosis.

use chrono::{Duration, Utc};
use uuid::Uuid;

use auditor_core::{
    ActionType, AnalysisRecord, AnalysisStatus, ChurnCause, ChurnDossier, ChurnEvent, Evidence,
    EvidenceSource, ExecutedAction, ExecutionStatus, Priority, RecommendedAction,
};
use auditor_store::{AnalysisStore, SeedOutcome, StoreError};

struct SeedAnalysis {
    event: ChurnEvent,
    dossier: ChurnDossier,
    executed_actions: Vec<ExecutedAction>,
    processing_time_ms: u64,
    age_hours: i64,
}

fn seed_analyses() -> Vec<SeedAnalysis> {
    let now = Utc::now();
    vec![
        SeedAnalysis {
            event: ChurnEvent {
                id: Uuid::new_v4().to_string(),
                customer_id: "cus_pricing_01".to_string(),
                customer_email: "sarah.chen@acmecorp.io".to_string(),
                customer_name: "Sarah Chen".to_string(),
                mrr: 149.0,
                plan: "Growth $149/mo".to_string(),
                canceled_at: now - Duration::hours(2),
                reason: Some("too_expensive".to_string()),
                subscription_id: "sub_seed_001".to_string(),
            },
            dossier: ChurnDossier {
                primary_cause: ChurnCause::Pricing,
                confidence: 0.88,
                evidence: vec![
                    Evidence {
                        source: EvidenceSource::ExitSurvey,
                        quote: "Love the product but our budget was cut this quarter.".to_string(),
                        relevance: 0.95,
                    },
                    Evidence {
                        source: EvidenceSource::SupportTicket,
                        quote: "Is there a smaller plan available? We don't use half the features.".to_string(),
                        relevance: 0.82,
                    },
                ],
                save_probability: 0.72,
                recommended_actions: vec![
                    RecommendedAction {
                        action_type: ActionType::WinbackEmail,
                        priority: Priority::High,
                        description: "Offer 30% discount for 3 months to retain".to_string(),
                    },
                    RecommendedAction {
                        action_type: ActionType::SlackAlert,
                        priority: Priority::Medium,
                        description: "Notify CS team about high-value save opportunity".to_string(),
                    },
                ],
                reasoning: "Customer explicitly cited budget constraints. High usage metrics and positive support interactions suggest strong product-market fit. A targeted discount could retain this account.".to_string(),
            },
            executed_actions: vec![ExecutedAction {
                action_type: ActionType::WinbackEmail,
                status: ExecutionStatus::Success,
                result: Some("Win-back email sent to sarah.chen@acmecorp.io".to_string()),
                executed_at: Some(now - Duration::hours(1)),
            }],
            processing_time_ms: 8_400,
            age_hours: 2,
        },
        SeedAnalysis {
            event: ChurnEvent {
                id: Uuid::new_v4().to_string(),
                customer_id: "cus_bugs_02".to_string(),
                customer_email: "james.wright@startupxyz.com".to_string(),
                customer_name: "James Wright".to_string(),
                mrr: 499.0,
                plan: "Enterprise $499/mo".to_string(),
                canceled_at: now - Duration::hours(5),
                reason: Some("product_issues".to_string()),
                subscription_id: "sub_seed_002".to_string(),
            },
            dossier: ChurnDossier {
                primary_cause: ChurnCause::Bugs,
                confidence: 0.93,
                evidence: vec![
                    Evidence {
                        source: EvidenceSource::SupportTicket,
                        quote: "Dashboard keeps crashing when loading reports with >10k rows. Filed 3 tickets, no fix.".to_string(),
                        relevance: 0.97,
                    },
                    Evidence {
                        source: EvidenceSource::UsageData,
                        quote: "Login frequency dropped from daily to weekly over last 30 days.".to_string(),
                        relevance: 0.78,
                    },
                    Evidence {
                        source: EvidenceSource::ExitSurvey,
                        quote: "Reliability issues made it impossible to depend on for client reporting.".to_string(),
                        relevance: 0.91,
                    },
                ],
                save_probability: 0.45,
                recommended_actions: vec![
                    RecommendedAction {
                        action_type: ActionType::LinearTicket,
                        priority: Priority::Urgent,
                        description: "Fix dashboard crash on large datasets - blocking enterprise customers".to_string(),
                    },
                    RecommendedAction {
                        action_type: ActionType::WinbackEmail,
                        priority: Priority::High,
                        description: "Apologize and offer extended trial once fix is deployed".to_string(),
                    },
                    RecommendedAction {
                        action_type: ActionType::SlackAlert,
                        priority: Priority::Urgent,
                        description: "Escalate: Enterprise churn due to unresolved P1 bug".to_string(),
                    },
                ],
                reasoning: "Multiple support tickets about the same dashboard crash went unresolved. This is a high-MRR enterprise customer lost to a known bug. Immediate engineering fix needed before win-back is viable.".to_string(),
            },
            executed_actions: vec![
                ExecutedAction {
                    action_type: ActionType::LinearTicket,
                    status: ExecutionStatus::Success,
                    result: Some(
                        "Created Linear ticket LIN-4821: \"Fix dashboard crash on large datasets\"".to_string(),
                    ),
                    executed_at: Some(now - Duration::hours(5) + Duration::milliseconds(6_200)),
                },
                ExecutedAction {
                    action_type: ActionType::SlackAlert,
                    status: ExecutionStatus::Success,
                    result: Some("Slack alert posted to #cs-alerts".to_string()),
                    executed_at: Some(now - Duration::hours(5) + Duration::milliseconds(6_800)),
                },
            ],
            processing_time_ms: 7_200,
            age_hours: 5,
        },
        SeedAnalysis {
            event: ChurnEvent {
                id: Uuid::new_v4().to_string(),
                customer_id: "cus_comp_03".to_string(),
                customer_email: "maria.gonzalez@retailflow.co".to_string(),
                customer_name: "Maria Gonzalez".to_string(),
                mrr: 79.0,
                plan: "Starter $79/mo".to_string(),
                canceled_at: now - Duration::hours(12),
                reason: Some("switched_to_competitor".to_string()),
                subscription_id: "sub_seed_003".to_string(),
            },
            dossier: ChurnDossier {
                primary_cause: ChurnCause::Competition,
                confidence: 0.76,
                evidence: vec![
                    Evidence {
                        source: EvidenceSource::ExitSurvey,
                        quote: "Found a tool that integrates better with Shopify out of the box.".to_string(),
                        relevance: 0.89,
                    },
                    Evidence {
                        source: EvidenceSource::UsageData,
                        quote: "Feature usage concentrated on integrations page; never adopted analytics module.".to_string(),
                        relevance: 0.7,
                    },
                ],
                save_probability: 0.28,
                recommended_actions: vec![
                    RecommendedAction {
                        action_type: ActionType::ManualReview,
                        priority: Priority::Medium,
                        description: "Review Shopify integration gaps vs competitor".to_string(),
                    },
                    RecommendedAction {
                        action_type: ActionType::WinbackEmail,
                        priority: Priority::Low,
                        description: "Send product update when Shopify integration ships".to_string(),
                    },
                ],
                reasoning: "Customer needed deeper Shopify integration which we currently lack. Low save probability until the integration gap is addressed. Worth flagging for product roadmap discussion.".to_string(),
            },
            executed_actions: vec![ExecutedAction {
                action_type: ActionType::ManualReview,
                status: ExecutionStatus::Success,
                result: Some("Flagged for manual review, assigned to auto (round-robin)".to_string()),
                executed_at: Some(now - Duration::hours(12) + Duration::milliseconds(5_500)),
            }],
            processing_time_ms: 5_900,
            age_hours: 12,
        },
    ]
}

/// Seeds the three demo analyses as completed records. The emptiness
/// check and the inserts happen under one store lock, so concurrent
/// seed calls cannot double-populate.
pub fn seed_store(store: &AnalysisStore) -> Result<SeedOutcome, StoreError> {
    let records = seed_analyses()
        .into_iter()
        .map(|seed| {
            let mut record = AnalysisRecord::new(seed.event);
            record.status = AnalysisStatus::Complete;
            record.dossier = Some(seed.dossier);
            record.executed_actions = seed.executed_actions;
            record.created_at = Utc::now() - Duration::hours(seed.age_hours);
            record.completed_at = Some(
                record.created_at + Duration::milliseconds(seed.processing_time_ms as i64),
            );
            record.processing_time_ms = Some(seed.processing_time_ms);
            record
        })
        .collect();
    store.insert_if_empty(records)
}
