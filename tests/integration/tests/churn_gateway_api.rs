//! End-to-end tests driving a bound gateway server over HTTP.
//!
//! Every test spins up its own server on an ephemeral port with an
//! instant simulator, so analyses settle quickly and rate-limit state
//! never leaks between tests. No reasoning credential is configured, so
//! every pipeline run takes the deterministic simulated path.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use serde_json::{json, Value};

use auditor_gateway::{build_router, GatewayServerConfig, GatewayState};
use auditor_pipeline::{PipelineConfig, SimulatorConfig};

async fn spawn_gateway() -> String {
    let config = GatewayServerConfig {
        pipeline: PipelineConfig {
            timeout: Duration::from_secs(5),
            simulator: SimulatorConfig::instant(),
        },
        ..GatewayServerConfig::default()
    };
    let state = Arc::new(GatewayState::new(&config).expect("gateway state"));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, build_router(state))
            .await
            .expect("serve gateway");
    });
    format!("http://{addr}")
}

fn bugs_event() -> Value {
    json!({
        "id": "evt_it_001",
        "customerId": "cus_bugs_02",
        "customerEmail": "james.wright@startupxyz.com",
        "customerName": "James Wright",
        "mrr": 499,
        "plan": "Enterprise $499/mo",
        "canceledAt": "2026-08-27T10:00:00Z",
        "reason": "product_issues",
        "subscriptionId": "sub_seed_002"
    })
}

/// Polls the record until it leaves `pending`/`analyzing` and returns
/// the terminal view. The bound is far above the configured pipeline
/// timeout, so a stuck record fails the test rather than hanging it.
async fn poll_until_terminal(client: &reqwest::Client, base: &str, id: &str) -> Value {
    for _ in 0..100 {
        let record: Value = client
            .get(format!("{base}/api/analyze/{id}"))
            .send()
            .await
            .expect("get analysis")
            .json()
            .await
            .expect("analysis json");
        let status = record["status"].as_str().unwrap_or_default().to_string();
        if status == "complete" || status == "failed" {
            return record;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("analysis {id} never reached a terminal status");
}

#[tokio::test(flavor = "multi_thread")]
async fn functional_analyze_without_credential_runs_deterministic_simulation() {
    let base = spawn_gateway().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{base}/api/analyze"))
        .json(&json!({ "event": bugs_event() }))
        .send()
        .await
        .expect("post analyze");
    assert_eq!(response.status(), 201);
    assert!(response.headers().contains_key("x-ratelimit-remaining"));
    let body: Value = response.json().await.expect("analyze body");
    assert_eq!(body["status"], "pending");
    let id = body["analysisId"].as_str().expect("analysisId").to_string();

    let record = poll_until_terminal(&client, &base, &id).await;
    assert_eq!(record["status"], "complete");
    assert_eq!(record["dossier"]["primaryCause"], "bugs");
    assert_eq!(record["dossier"]["confidence"], 0.93);
    assert_eq!(record["dossier"]["saveProbability"], 0.45);
    assert_eq!(record["dossier"]["recommendedActions"].as_array().expect("actions").len(), 3);
    let executed = record["executedActions"].as_array().expect("executed");
    assert_eq!(executed.len(), 3);
    assert!(executed.iter().all(|action| action["status"] == "success"));
    assert_eq!(record["pipelineMetadata"]["pipelineSource"], "simulated");
    assert!(record["completedAt"].is_string());
    assert!(record["processingTimeMs"].is_number());
}

#[tokio::test(flavor = "multi_thread")]
async fn functional_simulate_creates_and_settles_an_analysis() {
    let base = spawn_gateway().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{base}/api/simulate"))
        .send()
        .await
        .expect("post simulate");
    assert_eq!(response.status(), 201);
    let body: Value = response.json().await.expect("simulate body");
    assert_eq!(body["status"], "analyzing");
    assert!(body["event"]["customerId"]
        .as_str()
        .expect("customerId")
        .starts_with("cus_sim_"));
    let id = body["analysisId"].as_str().expect("analysisId").to_string();

    let record = poll_until_terminal(&client, &base, &id).await;
    assert_eq!(record["status"], "complete");
    let recommended = record["dossier"]["recommendedActions"].as_array().expect("recommended");
    let executed = record["executedActions"].as_array().expect("executed");
    assert_eq!(executed.len(), recommended.len());
}

#[tokio::test(flavor = "multi_thread")]
async fn functional_analyze_list_joins_pipeline_step_and_orders_newest_first() {
    let base = spawn_gateway().await;
    let client = reqwest::Client::new();

    for _ in 0..2 {
        client
            .post(format!("{base}/api/simulate"))
            .send()
            .await
            .expect("post simulate");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let listed: Value = client
        .get(format!("{base}/api/analyze"))
        .send()
        .await
        .expect("get analyses")
        .json()
        .await
        .expect("analyses json");
    let records = listed.as_array().expect("array");
    assert_eq!(records.len(), 2);
    let first = records[0]["createdAt"].as_str().expect("createdAt");
    let second = records[1]["createdAt"].as_str().expect("createdAt");
    assert!(first >= second, "listing must be newest-first");
}

#[tokio::test(flavor = "multi_thread")]
async fn functional_streaming_mode_emits_status_result_done_frames() {
    let base = spawn_gateway().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{base}/api/analyze"))
        .header("accept", "text/event-stream")
        .json(&json!({ "event": bugs_event() }))
        .send()
        .await
        .expect("post analyze stream");
    assert_eq!(response.status(), 200);
    assert!(response
        .headers()
        .get("content-type")
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("text/event-stream")));

    let mut stream = response.bytes_stream();
    let mut raw = String::new();
    while let Some(chunk) = stream.next().await {
        raw.push_str(&String::from_utf8_lossy(&chunk.expect("stream chunk")));
        if raw.contains("\"type\":\"done\"") {
            break;
        }
    }
    assert!(raw.contains("\"type\":\"status\""));
    assert!(raw.contains("\"status\":\"analyzing\""));
    assert!(raw.contains("\"type\":\"result\""));
    assert!(raw.contains("\"primaryCause\":\"bugs\""));
}

#[tokio::test(flavor = "multi_thread")]
async fn functional_write_route_admission_rejects_the_sixth_call() {
    let base = spawn_gateway().await;
    let client = reqwest::Client::new();

    for call in 0..5 {
        let response = client
            .post(format!("{base}/api/analyze"))
            .json(&json!({ "event": bugs_event() }))
            .send()
            .await
            .expect("post analyze");
        assert_eq!(response.status(), 201, "call {call} should be admitted");
    }

    let rejected = client
        .post(format!("{base}/api/analyze"))
        .json(&json!({ "event": bugs_event() }))
        .send()
        .await
        .expect("post analyze");
    assert_eq!(rejected.status(), 429);
    assert_eq!(
        rejected
            .headers()
            .get("x-ratelimit-remaining")
            .and_then(|value| value.to_str().ok()),
        Some("0"),
    );
    assert!(rejected.headers().contains_key("retry-after"));
    let body: Value = rejected.json().await.expect("429 body");
    assert_eq!(body["error"], "Too many requests");
    assert!(body["retryAfter"].as_u64().expect("retryAfter") >= 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn functional_seed_is_idempotent() {
    let base = spawn_gateway().await;
    let client = reqwest::Client::new();

    let first = client
        .post(format!("{base}/api/seed"))
        .send()
        .await
        .expect("post seed");
    assert_eq!(first.status(), 201);
    let body: Value = first.json().await.expect("seed body");
    assert_eq!(body["analysisIds"].as_array().expect("ids").len(), 3);

    let second = client
        .post(format!("{base}/api/seed"))
        .send()
        .await
        .expect("post seed again");
    assert_eq!(second.status(), 200);
    let body: Value = second.json().await.expect("seed body");
    assert_eq!(body["message"], "Store already has data");
    assert_eq!(body["count"], 3);
}

#[tokio::test(flavor = "multi_thread")]
async fn functional_webhook_intake_accepts_deletions_and_ignores_other_types() {
    let base = spawn_gateway().await;
    let client = reqwest::Client::new();

    let ignored: Value = client
        .post(format!("{base}/api/webhooks/stripe"))
        .json(&json!({ "type": "invoice.paid" }))
        .send()
        .await
        .expect("post webhook")
        .json()
        .await
        .expect("webhook body");
    assert_eq!(ignored["received"], true);
    assert_eq!(ignored["ignored"], true);

    let response = client
        .post(format!("{base}/api/webhooks/stripe"))
        .json(&json!({
            "type": "customer.subscription.deleted",
            "data": { "object": {
                "id": "sub_webhook_01",
                "customer": "cus_bugs_02",
                "canceled_at": 1_700_000_000,
                "metadata": { "email": "james.wright@startupxyz.com", "name": "James Wright" },
                "cancellation_details": { "reason": "cancellation_requested" },
                "items": { "data": [ { "price": {
                    "unit_amount": 49_900,
                    "lookup_key": "enterprise_monthly"
                } } ] }
            } }
        }))
        .send()
        .await
        .expect("post webhook deletion");
    assert_eq!(response.status(), 201);
    let body: Value = response.json().await.expect("webhook body");
    assert_eq!(body["received"], true);
    let id = body["analysisId"].as_str().expect("analysisId").to_string();

    let record = poll_until_terminal(&client, &base, &id).await;
    assert_eq!(record["status"], "complete");
    assert_eq!(record["event"]["mrr"], 499.0);
}

#[tokio::test(flavor = "multi_thread")]
async fn functional_action_replay_appends_to_the_record() {
    let base = spawn_gateway().await;
    let client = reqwest::Client::new();

    let created: Value = client
        .post(format!("{base}/api/analyze"))
        .json(&json!({ "event": bugs_event() }))
        .send()
        .await
        .expect("post analyze")
        .json()
        .await
        .expect("analyze body");
    let id = created["analysisId"].as_str().expect("analysisId").to_string();
    let record = poll_until_terminal(&client, &base, &id).await;
    let executed_before = record["executedActions"].as_array().expect("executed").len();

    let response = client
        .post(format!("{base}/api/actions"))
        .json(&json!({
            "analysisId": id,
            "action": {
                "type": "slack_alert",
                "priority": "urgent",
                "description": "Escalate again after the fix shipped"
            },
            "context": {
                "customerName": "James Wright",
                "customerEmail": "james.wright@startupxyz.com",
                "dossier": record["dossier"],
            }
        }))
        .send()
        .await
        .expect("post action replay");
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.expect("replay body");
    assert_eq!(body["success"], true);
    assert_eq!(body["actionType"], "slack_alert");
    assert!(body["result"].as_str().expect("result").contains("#cs-alerts"));

    let refreshed: Value = client
        .get(format!("{base}/api/analyze/{id}"))
        .send()
        .await
        .expect("get analysis")
        .json()
        .await
        .expect("analysis json");
    assert_eq!(
        refreshed["executedActions"].as_array().expect("executed").len(),
        executed_before + 1,
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn regression_validation_and_lookup_failures_are_structured() {
    let base = spawn_gateway().await;
    let client = reqwest::Client::new();

    let mut invalid = bugs_event();
    invalid["mrr"] = json!(0);
    let rejected = client
        .post(format!("{base}/api/analyze"))
        .json(&json!({ "event": invalid }))
        .send()
        .await
        .expect("post invalid analyze");
    assert_eq!(rejected.status(), 400);
    let body: Value = rejected.json().await.expect("400 body");
    assert_eq!(body["error"]["code"], "invalid_event");

    let missing = client
        .get(format!("{base}/api/analyze/does-not-exist"))
        .send()
        .await
        .expect("get missing analysis");
    assert_eq!(missing.status(), 404);

    let listing = client
        .get(format!("{base}/api/analyze"))
        .send()
        .await
        .expect("get analyses");
    let records: Value = listing.json().await.expect("analyses json");
    assert!(
        records.as_array().expect("array").is_empty(),
        "rejected events must never create records",
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn functional_tools_listing_exposes_the_four_declarations() {
    let base = spawn_gateway().await;
    let client = reqwest::Client::new();

    let body: Value = client
        .get(format!("{base}/api/tools"))
        .send()
        .await
        .expect("get tools")
        .json()
        .await
        .expect("tools json");
    let tools = body["tools"].as_array().expect("tools array");
    assert_eq!(tools.len(), 4);
    assert!(tools.iter().any(|tool| tool["name"] == "create_linear_ticket"));
    assert!(tools.iter().any(|tool| tool["name"] == "flag_for_manual_review"));
}
