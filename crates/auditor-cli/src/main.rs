//! `auditor` binary: churn-analysis gateway server.

use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use auditor_gateway::{run_gateway_server, GatewayServerConfig};
use auditor_pipeline::{PipelineConfig, SimulatorConfig};

fn parse_positive_u64(value: &str) -> Result<u64, String> {
    let parsed = value
        .parse::<u64>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

#[derive(Debug, Parser)]
#[command(
    name = "auditor",
    about = "Churn-analysis diagnostic pipeline server",
    version
)]
struct Args {
    /// Address the gateway listens on.
    #[arg(long, default_value = "127.0.0.1:8787")]
    bind: String,

    /// Wall-clock budget for the live pipeline before falling back to
    /// the simulator.
    #[arg(long, default_value_t = 25_000, value_parser = parse_positive_u64)]
    pipeline_timeout_ms: u64,

    /// Reasoning-service credential; without it every analysis runs
    /// simulated.
    #[arg(long, env = "GEMINI_API_KEY")]
    gemini_api_key: Option<String>,

    /// Reasoning-service base URL override.
    #[arg(long, env = "GEMINI_API_BASE")]
    gemini_api_base: Option<String>,

    /// Stripe webhook signing secret; without it webhook intake is
    /// demo-permissive.
    #[arg(long, env = "STRIPE_WEBHOOK_SECRET")]
    stripe_webhook_secret: Option<String>,
}

fn init_tracing() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    let config = GatewayServerConfig {
        bind: args.bind,
        pipeline: PipelineConfig {
            timeout: Duration::from_millis(args.pipeline_timeout_ms),
            simulator: SimulatorConfig::default(),
        },
        gemini_api_key: args.gemini_api_key,
        gemini_api_base: args.gemini_api_base,
        stripe_webhook_secret: args.stripe_webhook_secret,
    };
    run_gateway_server(config).await
}
