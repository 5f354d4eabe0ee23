//! HTTP transport for the chat widget
//!
//! `POST /defects/response` answers a question; failures are reported inside
//! the same envelope as text results, so the endpoint always returns 200 for
//! well-formed requests. `GET /health` reports whether the index is ready.

use crate::compose::AnalysisResult;
use crate::config::ServerConfig;
use crate::error::{BugbusterError, Result};
use crate::pipeline::DefectAssistant;
use crate::retrieval::Query;
use axum::{
    extract::State,
    http::{HeaderValue, Method},
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

/// Request body of `POST /defects/response`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub prompt: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
}

/// Response envelope of `POST /defects/response`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: AnalysisResult,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub index_ready: bool,
    pub records: usize,
}

/// Application state shared by all handlers
#[derive(Clone)]
struct AppState {
    assistant: Arc<DefectAssistant>,
}

/// Build the router with CORS configured from `config`
pub fn router(assistant: Arc<DefectAssistant>, config: &ServerConfig) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/defects/response", post(respond))
        .layer(cors_layer(&config.cors_origins))
        .with_state(AppState { assistant })
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::permissive();
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin {}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(allowed)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let snapshot = state.assistant.index().snapshot().ok();
    Json(HealthResponse {
        ok: true,
        index_ready: snapshot.is_some(),
        records: snapshot.map(|s| s.corpus.len()).unwrap_or(0),
    })
}

async fn respond(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Json<ChatResponse> {
    let query = Query {
        text: request.prompt,
        conversation_id: request.conversation_id.filter(|id| !id.trim().is_empty()),
    };
    let response = state.assistant.respond(query).await;
    Json(ChatResponse { response })
}

/// Bind and serve until ctrl-c
pub async fn serve(assistant: Arc<DefectAssistant>, config: &ServerConfig) -> Result<()> {
    let app = router(assistant, config);
    let listener = tokio::net::TcpListener::bind(&config.bind)
        .await
        .map_err(|e| BugbusterError::Io {
            source: e,
            context: format!("Failed to bind {}", config.bind),
        })?;

    tracing::info!("Listening on {}", config.bind);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| BugbusterError::Io {
            source: e,
            context: "HTTP server failed".to_string(),
        })?;
    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
