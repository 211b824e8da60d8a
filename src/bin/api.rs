use gst_query_orchestrator::{
    api::start_server,
    bootstrap::{build_orchestrator, init_tracing},
    config::AppConfig,
};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration (.env included) before the filter reads RUST_LOG
    let config = AppConfig::from_env()?;
    init_tracing("info");

    info!("🚀 GST Query Orchestrator - API Server");
    info!("📍 Port: {}", config.api_port);

    let orchestrator = Arc::new(build_orchestrator(&config)?);

    info!("✅ Orchestrator initialized");
    info!("📡 Starting API server...");

    start_server(orchestrator, config.api_port).await?;

    Ok(())
}
