pub mod config;
pub mod llm;
pub mod mcp_client;
pub mod orchestrator;
pub mod server;

/// Initialize the tracing subscriber — structured logs to stdout.
///
/// Filter defaults to `railchat=info,warn` and is overridable via
/// `RUST_LOG`. Logs a startup banner so deployments are easy to spot in
/// aggregated output.
pub fn init_tracing() {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("railchat=info,warn"));

    fmt::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .init();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = std::process::id(),
        "=== railchat starting ==="
    );
}
