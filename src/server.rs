//! HTTP surface — axum routes for chat streaming and diagnostics.
//!
//! - `POST /api/chat`: runs one orchestration and streams its events as SSE
//! - `GET /api/tools`: read-only tool catalogue for diagnostics
//! - `GET /health`: liveness probe

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use futures::stream::Stream;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tower_http::cors::CorsLayer;

use crate::mcp_client::McpError;
use crate::orchestrator::{ChatMessage, ChatOrchestrator};

/// Capacity of the per-run event channel. The producer suspends when the
/// consumer falls this far behind.
const EVENT_CHANNEL_CAPACITY: usize = 32;

/// Shared application state — the orchestrator constructed at startup.
pub struct AppState {
    pub orchestrator: Arc<ChatOrchestrator>,
}

/// Request body for `POST /api/chat`.
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    /// Prior turns, owned and replayed by the caller.
    #[serde(default)]
    pub history: Vec<ChatMessage>,
}

/// Build the application router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/chat", post(chat_handler))
        .route("/api/tools", get(tools_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// GET /health — liveness probe.
async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({"status": "healthy", "service": "railchat"}))
}

/// POST /api/chat — process a chat message, streaming events via SSE.
///
/// Each orchestrator event becomes one `data:` frame. The stream ends when
/// the run reaches its terminal event and the sender side closes.
async fn chat_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChatRequest>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let orchestrator = state.orchestrator.clone();
    let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

    tokio::spawn(async move {
        orchestrator
            .process(&request.message, request.history, &tx)
            .await;
    });

    let stream = ReceiverStream::new(rx).map(|event| {
        Ok(Event::default().data(serde_json::to_string(&event).unwrap_or_default()))
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}

/// GET /api/tools — list the tool catalogue (name + description only).
async fn tools_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let tools = state.orchestrator.tool_server();
    tools.initialize().await.map_err(internal_error)?;
    let catalogue = tools.list_tools().await.map_err(internal_error)?;

    Ok(Json(json!({
        "count": catalogue.len(),
        "tools": catalogue
            .iter()
            .map(|t| json!({"name": t.name, "description": t.description}))
            .collect::<Vec<_>>(),
    })))
}

fn internal_error(e: McpError) -> (StatusCode, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

// ─── Tests ───────────────────────────────────────────────────────────────────
