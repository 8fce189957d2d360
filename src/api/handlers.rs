//! HTTP request handlers

use super::types::{ErrorResponse, HealthResponse};
use super::AppState;
use crate::telegram::types::TgUpdate;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower_http::trace::TraceLayer;

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/webhook/:secret", post(receive_update))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ============================================================
// Webhook
// ============================================================

async fn receive_update(
    State(state): State<AppState>,
    Path(secret): Path<String>,
    Json(raw): Json<TgUpdate>,
) -> Result<StatusCode, AppError> {
    if secret.as_str() != &*state.secret {
        tracing::warn!("Webhook call with wrong secret");
        return Err(AppError::NotFound);
    }

    let update_id = raw.update_id;
    let Some(update) = raw.into_update() else {
        tracing::debug!(update_id, "Skipping unsupported update");
        return Ok(StatusCode::OK);
    };

    state
        .updates
        .send(update)
        .await
        .map_err(|_| AppError::Unavailable("shutting down".to_string()))?;
    Ok(StatusCode::OK)
}

// ============================================================
// Health
// ============================================================

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        active_sessions: state.registry.active_count().await,
    })
}

// ============================================================
// Error Handling
// ============================================================

enum AppError {
    NotFound,
    Unavailable(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::NotFound => (StatusCode::NOT_FOUND, "not found".to_string()),
            AppError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
        };

        let body = Json(ErrorResponse::new(message));
        (status, body).into_response()
    }
}
