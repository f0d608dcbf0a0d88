//! HTTP surface for ExamForge.
//!
//! - `POST /api/questions`: run the question pipeline for one request
//! - `GET /health`: liveness plus the enabled backends in priority order

use std::sync::Arc;

use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use examforge_core::{QuestionPipeline, SilentProgress};
use examforge_shared::{ExamForgeError, GenerationRequest, Question};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<QuestionPipeline>,
}

impl AppState {
    pub fn new(pipeline: Arc<QuestionPipeline>) -> Self {
        Self { pipeline }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

/// A failure rendered as `{ "error": "..." }` with a matching status.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl From<ExamForgeError> for ApiError {
    fn from(err: ExamForgeError) -> Self {
        match err {
            ExamForgeError::Validation { message } => Self::new(StatusCode::BAD_REQUEST, message),
            ExamForgeError::ContentUnavailable => {
                Self::new(StatusCode::SERVICE_UNAVAILABLE, err.to_string())
            }
            other => {
                error!(error = %other, "unexpected pipeline failure");
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::new(StatusCode::BAD_REQUEST, rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody {
                error: self.message,
            }),
        )
            .into_response()
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn generate_questions(
    State(state): State<AppState>,
    body: Result<Json<GenerationRequest>, JsonRejection>,
) -> Result<Json<Vec<Question>>, ApiError> {
    let Json(request) = body?;
    let output = state.pipeline.run(&request, &SilentProgress).await?;
    // The cache write keeps running after the handle is dropped.
    drop(output.persist);
    Ok(Json(output.questions))
}

#[derive(Debug, Serialize)]
struct Health {
    status: &'static str,
    backends: Vec<String>,
}

async fn health(State(state): State<AppState>) -> Json<Health> {
    Json(Health {
        status: "ok",
        backends: state.pipeline.backend_names(),
    })
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/questions", post(generate_questions))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind `addr` and serve until Ctrl-C.
pub async fn serve(addr: &str, state: AppState) -> examforge_shared::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ExamForgeError::config(format!("failed to bind {addr}: {e}")))?;
    let local = listener
        .local_addr()
        .map_err(|e| ExamForgeError::config(format!("failed to read bound address: {e}")))?;

    info!(addr = %local, backends = ?state.pipeline.backend_names(), "listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| ExamForgeError::config(format!("server error: {e}")))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}
