//! Route handlers for the churn-auditor gateway.

use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use uuid::Uuid;

use auditor_core::{
    current_unix_timestamp, AnalysisRecord, ChurnDossier, ChurnEvent, ExecutedAction,
    ExecutionStatus, PipelineStep, RecommendedAction,
};
use auditor_pipeline::PipelineEvent;
use auditor_store::{AnalysisUpdate, SeedOutcome};
use auditor_tools::{execute_tool, tool_declarations, tool_invocation};

use crate::error::ApiError;
use crate::rate_limit::{apply_rate_limit_headers, enforce_rate_limit, RateLimitDecision, RouteKey};
use crate::seed::seed_store;
use crate::webhook::verify_stripe_signature;
use crate::GatewayState;

/// A stored record joined with its transient pipeline step for readers.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AnalysisView {
    #[serde(flatten)]
    record: AnalysisRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    pipeline_step: Option<PipelineStep>,
}

#[derive(Debug, Deserialize)]
struct AnalyzeRequest {
    event: ChurnEvent,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExecuteActionRequest {
    analysis_id: String,
    action: RecommendedAction,
    context: ActionContext,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ActionContext {
    customer_name: String,
    customer_email: String,
    dossier: ChurnDossier,
}

fn parse_json_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, ApiError> {
    serde_json::from_slice(body)
        .map_err(|error| ApiError::bad_request("malformed_json", format!("Invalid JSON: {error}")))
}

fn quota_response(mut response: Response, decision: &RateLimitDecision) -> Response {
    apply_rate_limit_headers(response.headers_mut(), decision, None);
    response
}

/// Spawns the orchestrator for an already-created record. Ingestion
/// never waits on it; the record settles out-of-band.
fn spawn_pipeline(
    state: &Arc<GatewayState>,
    analysis_id: String,
    event: ChurnEvent,
    events: Option<mpsc::UnboundedSender<PipelineEvent>>,
) {
    let orchestrator = Arc::clone(&state.orchestrator);
    tokio::spawn(async move {
        orchestrator.run(&analysis_id, event, events).await;
    });
}

/// `POST /api/analyze`: validate, create a pending record, run the
/// pipeline out-of-band. Callers that accept `text/event-stream` get
/// the incremental frames instead of the immediate 201.
pub(crate) async fn handle_analyze_post(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let decision = match enforce_rate_limit(&state.rate_limiter, &headers, RouteKey::AnalyzePost) {
        Ok(decision) => decision,
        Err(rejected) => return rejected,
    };

    let request = match parse_json_body::<AnalyzeRequest>(&body) {
        Ok(request) => request,
        Err(error) => return quota_response(error.into_response(), &decision),
    };
    if let Err(error) = request.event.validate() {
        return quota_response(
            ApiError::bad_request("invalid_event", error.to_string()).into_response(),
            &decision,
        );
    }

    let record = match state.orchestrator.store().create(request.event.clone()) {
        Ok(record) => record,
        Err(error) => return quota_response(ApiError::internal(error.to_string()).into_response(), &decision),
    };
    tracing::info!(analysis_id = %record.id, customer_id = %request.event.customer_id, "analysis accepted");

    let wants_stream = headers
        .get("accept")
        .and_then(|value| value.to_str().ok())
        .is_some_and(|accept| accept.contains("text/event-stream"));
    if wants_stream {
        return quota_response(stream_analysis(&state, record.id, request.event), &decision);
    }

    let response = (
        StatusCode::CREATED,
        Json(json!({ "analysisId": record.id, "status": record.status })),
    )
        .into_response();
    spawn_pipeline(&state, record.id, request.event, None);
    quota_response(response, &decision)
}

/// Streaming mode: the same orchestrator run, with its frames forwarded
/// as SSE data events until `done`.
fn stream_analysis(state: &Arc<GatewayState>, analysis_id: String, event: ChurnEvent) -> Response {
    let (tx, rx) = mpsc::unbounded_channel::<PipelineEvent>();
    spawn_pipeline(state, analysis_id, event, Some(tx));

    let stream = UnboundedReceiverStream::new(rx).map(|frame| {
        let payload = serde_json::to_string(&frame).unwrap_or_else(|_| "{}".to_string());
        Ok::<Event, Infallible>(Event::default().data(payload))
    });
    Sse::new(stream)
        .keep_alive(KeepAlive::default())
        .into_response()
}

/// `GET /api/analyze`: every record newest-first, joined with its
/// current pipeline step.
pub(crate) async fn handle_analyze_list(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
) -> Response {
    let decision = match enforce_rate_limit(&state.rate_limiter, &headers, RouteKey::AnalyzeGet) {
        Ok(decision) => decision,
        Err(rejected) => return rejected,
    };

    let records = match state.orchestrator.store().list_newest_first() {
        Ok(records) => records,
        Err(error) => return quota_response(ApiError::internal(error.to_string()).into_response(), &decision),
    };
    let tracker = state.orchestrator.tracker();
    let views: Vec<AnalysisView> = records
        .into_iter()
        .map(|record| AnalysisView {
            pipeline_step: tracker.step(&record.id),
            record,
        })
        .collect();
    quota_response(Json(views).into_response(), &decision)
}

/// `GET /api/analyze/{id}`: point lookup joined with the step.
pub(crate) async fn handle_analyze_get(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    let decision = match enforce_rate_limit(&state.rate_limiter, &headers, RouteKey::AnalyzeGetById)
    {
        Ok(decision) => decision,
        Err(rejected) => return rejected,
    };

    let record = match state.orchestrator.store().get(&id) {
        Ok(record) => record,
        Err(error) => return quota_response(ApiError::internal(error.to_string()).into_response(), &decision),
    };
    let response = match record {
        Some(record) => Json(AnalysisView {
            pipeline_step: state.orchestrator.tracker().step(&record.id),
            record,
        })
        .into_response(),
        None => ApiError::not_found("analysis_not_found", "Analysis not found").into_response(),
    };
    quota_response(response, &decision)
}

const CUSTOMER_POOL: &[(&str, &str, &str, f64, &[&str])] = &[
    (
        "Alex Rivera",
        "alex.rivera@neonlabs.io",
        "Growth $149/mo",
        149.0,
        &["too_expensive", "missing_features"],
    ),
    (
        "Priya Sharma",
        "priya@cloudmatrix.dev",
        "Enterprise $499/mo",
        499.0,
        &["product_issues", "poor_support"],
    ),
    (
        "Tom Eriksson",
        "tom.eriksson@nordicretail.se",
        "Starter $79/mo",
        79.0,
        &["switched_to_competitor", "not_enough_value"],
    ),
    (
        "Lena Park",
        "lena.park@finflow.co",
        "Growth $149/mo",
        149.0,
        &["too_expensive", "switched_to_competitor"],
    ),
    (
        "David Okonkwo",
        "david@scaleops.com",
        "Enterprise $499/mo",
        499.0,
        &["product_issues", "missing_features", "poor_support"],
    ),
    (
        "Emily Watson",
        "emily.watson@brightpath.edu",
        "Starter $79/mo",
        79.0,
        &["budget_cut", "not_enough_value"],
    ),
];

fn sim_suffix() -> String {
    const CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();
    (0..8)
        .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
        .collect()
}

fn generate_simulated_event() -> ChurnEvent {
    let mut rng = rand::thread_rng();
    let (name, email, plan, mrr, reasons) = CUSTOMER_POOL
        .choose(&mut rng)
        .copied()
        .unwrap_or(CUSTOMER_POOL[0]);
    let reason = reasons.choose(&mut rng).copied().unwrap_or("not_enough_value");
    ChurnEvent {
        id: Uuid::new_v4().to_string(),
        customer_id: format!("cus_sim_{}", sim_suffix()),
        customer_email: email.to_string(),
        customer_name: name.to_string(),
        mrr,
        plan: plan.to_string(),
        canceled_at: Utc::now(),
        reason: Some(reason.to_string()),
        subscription_id: format!("sub_sim_{}", sim_suffix()),
    }
}

/// `POST /api/simulate`: synthesize a cancellation from the demo
/// customer pool and run the normal intake path.
pub(crate) async fn handle_simulate(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
) -> Response {
    let decision = match enforce_rate_limit(&state.rate_limiter, &headers, RouteKey::Simulate) {
        Ok(decision) => decision,
        Err(rejected) => return rejected,
    };

    let event = generate_simulated_event();
    let record = match state.orchestrator.store().create(event.clone()) {
        Ok(record) => record,
        Err(error) => return quota_response(ApiError::internal(error.to_string()).into_response(), &decision),
    };
    tracing::info!(analysis_id = %record.id, customer_id = %event.customer_id, "simulated cancellation accepted");

    let response = (
        StatusCode::CREATED,
        Json(json!({ "analysisId": record.id, "event": event, "status": "analyzing" })),
    )
        .into_response();
    spawn_pipeline(&state, record.id, event, None);
    quota_response(response, &decision)
}

/// `POST /api/seed`: seeds the canned analyses into an empty store.
/// The emptiness check and the inserts share one lock, so concurrent
/// seed calls cannot double-populate.
pub(crate) async fn handle_seed(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
) -> Response {
    let decision = match enforce_rate_limit(&state.rate_limiter, &headers, RouteKey::Seed) {
        Ok(decision) => decision,
        Err(rejected) => return rejected,
    };

    let response = match seed_store(state.orchestrator.store()) {
        Ok(SeedOutcome::Seeded(ids)) => (
            StatusCode::CREATED,
            Json(json!({ "message": "Seeded demo data", "analysisIds": ids })),
        )
            .into_response(),
        Ok(SeedOutcome::AlreadyPopulated(count)) => Json(json!({
            "message": "Store already has data",
            "count": count,
        }))
        .into_response(),
        Err(error) => ApiError::internal(error.to_string()).into_response(),
    };
    quota_response(response, &decision)
}

/// `POST /api/actions`: replay one recommended action against an
/// existing analysis and record the outcome.
pub(crate) async fn handle_execute_action(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let decision = match enforce_rate_limit(&state.rate_limiter, &headers, RouteKey::Actions) {
        Ok(decision) => decision,
        Err(rejected) => return rejected,
    };

    let request = match parse_json_body::<ExecuteActionRequest>(&body) {
        Ok(request) => request,
        Err(error) => return quota_response(error.into_response(), &decision),
    };

    let store = state.orchestrator.store();
    let record = match store.get(&request.analysis_id) {
        Ok(Some(record)) => record,
        Ok(None) => {
            return quota_response(
                ApiError::not_found("analysis_not_found", "Analysis not found").into_response(),
                &decision,
            )
        }
        Err(error) => return quota_response(ApiError::internal(error.to_string()).into_response(), &decision),
    };

    // Replays run with the caller-supplied customer context, which may
    // be fresher than the stored event.
    let mut event = record.event.clone();
    event.customer_name = request.context.customer_name;
    event.customer_email = request.context.customer_email;

    let invocation = tool_invocation(&request.action, &event, &request.context.dossier);
    let outcome = execute_tool(invocation.tool_name, &invocation.params).await;

    if outcome.status != ExecutionStatus::Success {
        tracing::warn!(
            analysis_id = %request.analysis_id,
            tool = invocation.tool_name,
            "action replay failed",
        );
        let response = (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({
                "success": false,
                "actionType": request.action.action_type,
                "result": outcome.result,
            })),
        )
            .into_response();
        return quota_response(response, &decision);
    }

    let mut executed_actions = record.executed_actions;
    executed_actions.push(ExecutedAction {
        action_type: outcome.action_type,
        status: outcome.status,
        result: Some(outcome.result.clone()),
        executed_at: Some(outcome.executed_at),
    });
    if let Err(error) = store.merge(
        &request.analysis_id,
        AnalysisUpdate {
            executed_actions: Some(executed_actions),
            ..AnalysisUpdate::default()
        },
    ) {
        return quota_response(ApiError::internal(error.to_string()).into_response(), &decision);
    }

    let response = Json(json!({
        "success": true,
        "actionType": request.action.action_type,
        "result": outcome.result,
    }))
    .into_response();
    quota_response(response, &decision)
}

/// `POST /api/webhooks/stripe`: verified when a secret is configured,
/// demo-permissive otherwise. Only subscription deletions are acted on.
pub(crate) async fn handle_stripe_webhook(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let decision = match enforce_rate_limit(&state.rate_limiter, &headers, RouteKey::StripeWebhook)
    {
        Ok(decision) => decision,
        Err(rejected) => return rejected,
    };

    if let Some(secret) = state.webhook_secret.as_deref() {
        let Some(signature) = headers
            .get("stripe-signature")
            .and_then(|value| value.to_str().ok())
        else {
            return quota_response(
                ApiError::bad_request("missing_signature", "Missing stripe-signature header")
                    .into_response(),
                &decision,
            );
        };
        if let Err(error) =
            verify_stripe_signature(&body, signature, secret, current_unix_timestamp())
        {
            tracing::warn!(%error, "stripe webhook signature rejected");
            return quota_response(
                ApiError::bad_request("invalid_signature", "Invalid signature").into_response(),
                &decision,
            );
        }
    }

    let payload = match parse_json_body::<Value>(&body) {
        Ok(payload) => payload,
        Err(error) => return quota_response(error.into_response(), &decision),
    };

    if payload["type"] != "customer.subscription.deleted" {
        return quota_response(
            Json(json!({ "received": true, "ignored": true })).into_response(),
            &decision,
        );
    }

    let event = extract_churn_event(&payload);
    if let Err(error) = event.validate() {
        return quota_response(
            ApiError::bad_request("invalid_event", error.to_string()).into_response(),
            &decision,
        );
    }

    let record = match state.orchestrator.store().create(event.clone()) {
        Ok(record) => record,
        Err(error) => return quota_response(ApiError::internal(error.to_string()).into_response(), &decision),
    };
    tracing::info!(analysis_id = %record.id, customer_id = %event.customer_id, "webhook cancellation accepted");

    let response = (
        StatusCode::CREATED,
        Json(json!({ "received": true, "analysisId": record.id })),
    )
        .into_response();
    spawn_pipeline(&state, record.id, event, None);
    quota_response(response, &decision)
}

/// Maps a `customer.subscription.deleted` payload onto a ChurnEvent,
/// with the same metadata fallbacks the dashboard relies on.
fn extract_churn_event(payload: &Value) -> ChurnEvent {
    let subscription = &payload["data"]["object"];
    let customer_id = subscription["customer"].as_str().unwrap_or_default().to_string();
    let metadata = &subscription["metadata"];
    let price = &subscription["items"]["data"][0]["price"];

    let customer_email = metadata["email"]
        .as_str()
        .map(str::to_string)
        .unwrap_or_else(|| format!("{customer_id}@example.com"));
    let tail_start = customer_id.len().saturating_sub(6);
    let customer_name = metadata["name"]
        .as_str()
        .map(str::to_string)
        .unwrap_or_else(|| {
            let tail = customer_id.get(tail_start..).unwrap_or(customer_id.as_str());
            format!("Customer {tail}")
        });
    let canceled_at = subscription["canceled_at"]
        .as_i64()
        .and_then(|seconds| DateTime::<Utc>::from_timestamp(seconds, 0))
        .unwrap_or_else(Utc::now);

    ChurnEvent {
        id: Uuid::new_v4().to_string(),
        customer_id,
        customer_email,
        customer_name,
        mrr: price["unit_amount"].as_f64().unwrap_or(0.0) / 100.0,
        plan: price["lookup_key"].as_str().unwrap_or("unknown").to_string(),
        canceled_at,
        reason: subscription["cancellation_details"]["reason"]
            .as_str()
            .map(str::to_string),
        subscription_id: subscription["id"].as_str().unwrap_or_default().to_string(),
    }
}

/// `GET /api/tools`: the recovery-tool declarations.
pub(crate) async fn handle_tools_list(State(_state): State<Arc<GatewayState>>) -> Response {
    Json(json!({ "tools": tool_declarations() })).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_extract_churn_event_maps_subscription_fields() {
        let payload = json!({
            "type": "customer.subscription.deleted",
            "data": { "object": {
                "id": "sub_123",
                "customer": "cus_webhook_01",
                "canceled_at": 1_700_000_000,
                "metadata": { "email": "kai@example.com", "name": "Kai Tanaka" },
                "cancellation_details": { "reason": "cancellation_requested" },
                "items": { "data": [ { "price": {
                    "unit_amount": 14_900,
                    "lookup_key": "growth_monthly"
                } } ] }
            } }
        });
        let event = extract_churn_event(&payload);
        assert_eq!(event.customer_id, "cus_webhook_01");
        assert_eq!(event.customer_email, "kai@example.com");
        assert_eq!(event.customer_name, "Kai Tanaka");
        assert_eq!(event.mrr, 149.0);
        assert_eq!(event.plan, "growth_monthly");
        assert_eq!(event.subscription_id, "sub_123");
        assert_eq!(event.reason.as_deref(), Some("cancellation_requested"));
        assert_eq!(event.validate(), Ok(()));
    }

    #[test]
    fn unit_extract_churn_event_fills_missing_metadata() {
        let payload = json!({
            "type": "customer.subscription.deleted",
            "data": { "object": {
                "id": "sub_456",
                "customer": "cus_no_meta_99",
                "items": { "data": [ { "price": { "unit_amount": 7_900 } } ] }
            } }
        });
        let event = extract_churn_event(&payload);
        assert_eq!(event.customer_email, "cus_no_meta_99@example.com");
        assert_eq!(event.customer_name, "Customer eta_99");
        assert_eq!(event.plan, "unknown");
        assert_eq!(event.mrr, 79.0);
        assert!(event.reason.is_none());
    }

    #[test]
    fn unit_simulated_events_come_from_the_pool_and_validate() {
        for _ in 0..16 {
            let event = generate_simulated_event();
            assert!(event.customer_id.starts_with("cus_sim_"));
            assert!(event.subscription_id.starts_with("sub_sim_"));
            assert_eq!(event.validate(), Ok(()));
            assert!(CUSTOMER_POOL
                .iter()
                .any(|(name, email, _, mrr, _)| *name == event.customer_name
                    && *email == event.customer_email
                    && *mrr == event.mrr));
        }
    }

    #[test]
    fn unit_analysis_view_flattens_record_and_joins_step() {
        let event = generate_simulated_event();
        let record = AnalysisRecord::new(event);
        let view = AnalysisView {
            pipeline_step: Some(PipelineStep::Diagnosing),
            record: record.clone(),
        };
        let value = serde_json::to_value(&view).expect("serialize");
        assert_eq!(value["id"], record.id.as_str());
        assert_eq!(value["pipelineStep"], "diagnosing");
        assert_eq!(value["status"], "pending");
    }
}
