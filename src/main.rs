//! Rail chatbot backend — process entry point.
//!
//! Startup order matters: tracing first, then configuration (fatal on
//! missing credentials), then the dependency-injected service graph, then
//! the listener. The tool-server session is released on shutdown.

use std::sync::Arc;

use anyhow::Context;

use railchat::config::Settings;
use railchat::llm::LlmClient;
use railchat::mcp_client::McpClient;
use railchat::orchestrator::ChatOrchestrator;
use railchat::server::{router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    railchat::init_tracing();

    let settings = Settings::from_env().context("configuration error")?;

    let llm = LlmClient::new(
        &settings.openai_base_url,
        &settings.openai_api_key,
        &settings.openai_model,
    )
    .context("failed to build LLM client")?;

    let mcp = McpClient::new(
        &settings.mcp_server_url,
        &settings.rapidapi_host,
        &settings.rapidapi_key,
    )
    .context("failed to build MCP client")?;

    let orchestrator = Arc::new(ChatOrchestrator::new(Arc::new(llm), Arc::new(mcp)));
    let state = Arc::new(AppState {
        orchestrator: orchestrator.clone(),
    });

    let addr = settings.listen_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    tracing::info!(addr = %addr, model = %settings.openai_model, "backend listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    orchestrator.tool_server().disconnect().await;
    tracing::info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
