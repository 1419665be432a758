//! HTTP surface of the churn auditor: event intake (direct, simulated,
//! webhook), read endpoints the dashboard polls, single-action replay,
//! and the sliding-window admission layer in front of all of them.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;

use auditor_ai::{GeminiClient, GeminiConfig, ReasoningClient};
use auditor_pipeline::{Orchestrator, PipelineConfig};
use auditor_store::{AnalysisStore, ProgressTracker};

mod error;
mod handlers;
mod rate_limit;
mod seed;
mod webhook;

pub use error::ApiError;
pub use rate_limit::{RateLimitConfig, RateLimitDecision, RateLimiter, RouteKey};
pub use seed::seed_store;
pub use webhook::{verify_stripe_signature, WebhookSignatureError};

#[derive(Debug, Clone, Default)]
pub struct GatewayServerConfig {
    pub bind: String,
    pub pipeline: PipelineConfig,
    /// Absent key means every analysis runs simulated.
    pub gemini_api_key: Option<String>,
    /// Override for tests pointing the client at a mock server.
    pub gemini_api_base: Option<String>,
    pub stripe_webhook_secret: Option<String>,
}

/// Shared server state: the orchestrator (owning the store and the
/// progress tracker), the admission controller, and webhook settings.
pub struct GatewayState {
    pub(crate) orchestrator: Arc<Orchestrator>,
    pub(crate) rate_limiter: RateLimiter,
    pub(crate) webhook_secret: Option<String>,
}

impl GatewayState {
    pub fn new(config: &GatewayServerConfig) -> Result<Self> {
        let reasoning = build_reasoning_client(config)?;
        if reasoning.is_none() {
            tracing::warn!("no reasoning-service credential configured; analyses run simulated");
        }
        let orchestrator = Orchestrator::new(
            Arc::new(AnalysisStore::new()),
            Arc::new(ProgressTracker::new()),
            reasoning,
            config.pipeline.clone(),
        );
        Ok(Self {
            orchestrator: Arc::new(orchestrator),
            rate_limiter: RateLimiter::new(),
            webhook_secret: config.stripe_webhook_secret.clone(),
        })
    }
}

fn build_reasoning_client(
    config: &GatewayServerConfig,
) -> Result<Option<Arc<dyn ReasoningClient>>> {
    let Some(api_key) = config
        .gemini_api_key
        .as_deref()
        .map(str::trim)
        .filter(|key| !key.is_empty())
    else {
        return Ok(None);
    };

    let mut gemini = GeminiConfig {
        api_key: api_key.to_string(),
        ..GeminiConfig::default()
    };
    if let Some(api_base) = config.gemini_api_base.as_deref() {
        gemini.api_base = api_base.to_string();
    }
    let client = GeminiClient::new(gemini).context("failed to build reasoning client")?;
    Ok(Some(Arc::new(client)))
}

pub fn build_router(state: Arc<GatewayState>) -> Router {
    Router::new()
        .route(
            "/api/analyze",
            post(handlers::handle_analyze_post).get(handlers::handle_analyze_list),
        )
        .route("/api/analyze/{id}", get(handlers::handle_analyze_get))
        .route("/api/simulate", post(handlers::handle_simulate))
        .route("/api/seed", post(handlers::handle_seed))
        .route("/api/actions", post(handlers::handle_execute_action))
        .route("/api/webhooks/stripe", post(handlers::handle_stripe_webhook))
        .route("/api/tools", get(handlers::handle_tools_list))
        .with_state(state)
}

/// Binds and serves the gateway until ctrl-c.
pub async fn run_gateway_server(config: GatewayServerConfig) -> Result<()> {
    let bind_addr = config
        .bind
        .parse::<SocketAddr>()
        .with_context(|| format!("invalid --bind '{}'", config.bind))?;
    let listener = TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind gateway server on {bind_addr}"))?;
    let local_addr = listener
        .local_addr()
        .context("failed to resolve bound gateway address")?;
    tracing::info!(%local_addr, "churn auditor gateway listening");

    let state = Arc::new(GatewayState::new(&config)?);
    let app = build_router(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("gateway server exited unexpectedly")
}
