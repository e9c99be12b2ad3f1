use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use base64::{engine::general_purpose, Engine as _};
use serde_json::json;
use std::future::Future;
use std::sync::Arc;

use crate::error::AppError;
use crate::metrics;
use crate::services::AppState;

/// HTTP face of `AppError`. Body: `{"message": ..., "details"?: [...]}`.
#[derive(Debug)]
pub struct ApiError(pub AppError);

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        ApiError(err)
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError(AppError::Internal(err))
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(err: validator::ValidationErrors) -> Self {
        ApiError(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self.0 {
            AppError::Validation(_) | AppError::UnknownTier(_) | AppError::EmptyBucket { .. } => {
                (StatusCode::BAD_REQUEST, json!({ "message": self.0.to_string() }))
            }
            AppError::Infeasible(details) => (
                StatusCode::BAD_REQUEST,
                json!({
                    "message": self.0.to_string(),
                    "details": details,
                }),
            ),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, json!({ "message": self.0.to_string() })),
            AppError::Conflict(_) => (StatusCode::CONFLICT, json!({ "message": self.0.to_string() })),
            AppError::Internal(e) => {
                tracing::error!(error = ?e, "Request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "message": "Internal server error" }),
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let mut status = "healthy";
    let mut dependencies = serde_json::Map::new();
    let mut all_healthy = true;

    let mongo_health = probe(
        state.questions.ping(),
        "MongoDB connection successful",
        "MongoDB",
    )
    .await;
    dependencies.insert("mongodb".to_string(), json!(mongo_health));
    if mongo_health.get("status").and_then(|v| v.as_str()) != Some("healthy") {
        all_healthy = false;
        status = "degraded";
    }

    if state.lock.is_enabled() {
        let redis_health = probe(state.lock.ping(), "Redis connection successful", "Redis").await;
        dependencies.insert("redis".to_string(), json!(redis_health));
        if redis_health.get("status").and_then(|v| v.as_str()) != Some("healthy") {
            all_healthy = false;
            status = "degraded";
        }
    } else {
        dependencies.insert(
            "redis".to_string(),
            json!({ "status": "disabled", "message": "Generation locking disabled" }),
        );
    }

    let status_code = if all_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status_code,
        Json(json!({
            "status": status,
            "service": "papergen-api",
            "version": env!("CARGO_PKG_VERSION"),
            "dependencies": dependencies
        })),
    )
}

// Store pings carry their own timeouts.
async fn probe(
    ping: impl Future<Output = anyhow::Result<()>>,
    ok_message: &str,
    name: &str,
) -> serde_json::Map<String, serde_json::Value> {
    let mut result = serde_json::Map::new();
    match ping.await {
        Ok(()) => {
            result.insert("status".to_string(), json!("healthy"));
            result.insert("message".to_string(), json!(ok_message));
        }
        Err(e) => {
            result.insert("status".to_string(), json!("unhealthy"));
            result.insert("error".to_string(), json!(format!("{} error: {}", name, e)));
        }
    }
    result
}

pub async fn metrics_handler() -> impl IntoResponse {
    match metrics::render_metrics() {
        Ok(metrics_text) => (StatusCode::OK, metrics_text),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to render metrics: {}", e),
        ),
    }
}

/// Protects /metrics with HTTP Basic Auth (`METRICS_AUTH`, username:password)
pub async fn metrics_auth_middleware(
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let auth_header = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let encoded = auth_header
        .strip_prefix("Basic ")
        .ok_or(StatusCode::UNAUTHORIZED)?;
    let decoded = general_purpose::STANDARD
        .decode(encoded)
        .map_err(|_| StatusCode::UNAUTHORIZED)?;
    let credentials = String::from_utf8(decoded).map_err(|_| StatusCode::UNAUTHORIZED)?;

    let expected = std::env::var("METRICS_AUTH").unwrap_or_else(|_| "admin:changeme".to_string());
    if credentials != expected {
        return Err(StatusCode::UNAUTHORIZED);
    }

    Ok(next.run(request).await)
}

pub mod blueprints;
pub mod papers;
pub mod questions;
