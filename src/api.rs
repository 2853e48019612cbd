//! REST API server for the question-answering orchestrator
//!
//! Exposes sessions, chat history and the audit trail over HTTP.
//! `POST /chat` answers with `{answer, session_id, loop_step, retrievals}`;
//! every failure answers with an `{error, error_kind?}` body.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use uuid::Uuid;

use crate::agent::Orchestrator;
use crate::error::{ErrorKind, OrchestrationError};
use crate::history::HistoryStore;
use crate::models::{AbortReason, ChatRole, SessionOutcome, SessionRequest};

/// =============================
/// Request Models
/// =============================

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ChatRequest {
    #[serde(default)]
    pub query: String,
    pub max_retries: Option<u32>,
}

/// =============================
/// Response Models
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub answer: String,
    pub session_id: Uuid,
    pub loop_step: u32,
    pub retrievals: u32,
}

/// Session ended without an answer
#[derive(Debug, Serialize, Deserialize)]
pub struct NoAnswerResponse {
    pub outcome: String,
    pub reason: AbortReason,
    pub error: String,
    pub session_id: Uuid,
    pub loop_step: u32,
    pub retrievals: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            error_kind: None,
        }
    }

    pub fn from_error(error: &OrchestrationError) -> Self {
        Self {
            error: error.to_string(),
            error_kind: Some(error.kind().as_str().to_string()),
        }
    }
}

fn error_response(status: StatusCode, body: ErrorResponse) -> Response {
    (status, Json(body)).into_response()
}

fn failure(error: &OrchestrationError) -> Response {
    error_response(status_for(error), ErrorResponse::from_error(error))
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: Arc<Orchestrator>,
    pub history: Arc<dyn HistoryStore>,
}

fn status_for(error: &OrchestrationError) -> StatusCode {
    if let OrchestrationError::InvalidRequest(_) = error {
        return StatusCode::BAD_REQUEST;
    }

    match error.kind() {
        ErrorKind::Capability => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Schema => StatusCode::BAD_GATEWAY,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

async fn record_turn(history: &dyn HistoryStore, role: ChatRole, content: &str) {
    if let Err(e) = history.append(role, content).await {
        warn!(%role, error = %e, "Failed to persist chat history");
    }
}

/// =============================
/// Health Endpoint
/// =============================

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// =============================
/// Chat Endpoint
/// =============================

async fn chat_handler(
    State(state): State<ApiState>,
    payload: std::result::Result<Json<ChatRequest>, JsonRejection>,
) -> Response {
    let req = match payload {
        Ok(Json(req)) => req,
        Err(rejection) => {
            warn!(error = %rejection.body_text(), "Rejected malformed chat request");
            return error_response(
                StatusCode::BAD_REQUEST,
                ErrorResponse::new(format!("Invalid request body: {}", rejection.body_text())),
            );
        }
    };

    let query = req.query.trim();
    if query.is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            ErrorResponse::new("Query cannot be empty"),
        );
    }

    info!(query = %query, "Received chat request");

    let mut request = SessionRequest::new(query);
    request.max_retries = req.max_retries;

    let report = match state.orchestrator.run(request).await {
        Ok(report) => report,
        Err(e @ OrchestrationError::InvalidRequest(_)) => return failure(&e),
        Err(e) => {
            record_turn(state.history.as_ref(), ChatRole::User, query).await;
            return failure(&e);
        }
    };

    record_turn(state.history.as_ref(), ChatRole::User, query).await;

    match report.outcome {
        SessionOutcome::Answered { answer } => {
            record_turn(state.history.as_ref(), ChatRole::System, &answer).await;
            let body = ChatResponse {
                answer,
                session_id: report.session_id,
                loop_step: report.loop_step,
                retrievals: report.retrievals,
            };
            (StatusCode::OK, Json(body)).into_response()
        }
        SessionOutcome::NoAnswer { reason } => {
            let body = NoAnswerResponse {
                outcome: "no_answer".to_string(),
                reason,
                error: reason.to_string(),
                session_id: report.session_id,
                loop_step: report.loop_step,
                retrievals: report.retrievals,
            };
            (StatusCode::UNPROCESSABLE_ENTITY, Json(body)).into_response()
        }
    }
}

/// =============================
/// History Endpoint
/// =============================

async fn history_handler(State(state): State<ApiState>) -> Response {
    match state.history.list().await {
        Ok(records) => (StatusCode::OK, Json(records)).into_response(),
        Err(e) => failure(&e),
    }
}

/// =============================
/// Session Audit Endpoint
/// =============================

async fn session_handler(
    State(state): State<ApiState>,
    Path(session_id): Path<String>,
) -> Response {
    let Ok(session_id) = Uuid::parse_str(&session_id) else {
        return error_response(
            StatusCode::BAD_REQUEST,
            ErrorResponse::new(format!("Invalid session id: {}", session_id)),
        );
    };

    match state.orchestrator.audit_log().get(session_id).await {
        Ok(Some(record)) => (StatusCode::OK, Json(record)).into_response(),
        Ok(None) => error_response(
            StatusCode::NOT_FOUND,
            ErrorResponse::new(format!("Session {} not found", session_id)),
        ),
        Err(e) => failure(&e),
    }
}

/// =============================
/// Router
/// =============================

pub fn create_router(orchestrator: Arc<Orchestrator>, history: Arc<dyn HistoryStore>) -> Router {
    let state = ApiState {
        orchestrator,
        history,
    };

    Router::new()
        .route("/health", get(health))
        .route("/chat", post(chat_handler))
        .route("/history", get(history_handler))
        .route("/sessions/:session_id", get(session_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    orchestrator: Arc<Orchestrator>,
    history: Arc<dyn HistoryStore>,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(orchestrator, history);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);
    info!("Local: http://127.0.0.1:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}
