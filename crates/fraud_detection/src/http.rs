// Rust guideline compliant 2026-10-18

//! HTTP query API over the fraud sink, plus health and metrics.

use std::sync::Arc;

use axum::extract::{Path, Request, State};
use axum::http::{StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{SecondsFormat, Utc};
use consumer::PipelineMetrics;
use domain::{FraudSink, FraudVerdict, SinkError};
use serde::Serialize;
use serde_json::json;

/// Shared state for every route.
#[derive(Debug)]
pub struct AppState<S> {
    pub sink: S,
    pub metrics: Arc<PipelineMetrics>,
}

impl<S: Clone> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self { sink: self.sink.clone(), metrics: Arc::clone(&self.metrics) }
    }
}

/// One failed request-parameter check.
#[derive(Debug, Serialize)]
struct FieldError {
    #[serde(rename = "type")]
    kind: &'static str,
    msg: &'static str,
    path: &'static str,
    location: &'static str,
}

#[derive(Debug)]
enum ApiError {
    Invalid(Vec<FieldError>),
    NotFound,
    Sink(SinkError),
    Metrics(prometheus::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::Invalid(errors) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "errors": errors }))).into_response()
            }
            Self::NotFound => (
                StatusCode::NOT_FOUND,
                Json(json!({ "message": "No frauds found for this user" })),
            )
                .into_response(),
            Self::Sink(e) => {
                tracing::error!(error = %e, "http.sink.failed");
                internal_error()
            }
            Self::Metrics(e) => {
                tracing::error!(error = %e, "http.metrics.failed");
                internal_error()
            }
        }
    }
}

fn internal_error() -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": "Internal server error" })))
        .into_response()
}

/// Build the router.
pub fn router<S>(state: AppState<S>) -> Router
where
    S: FraudSink + Clone + 'static,
{
    Router::new()
        .route("/frauds", get(list_frauds::<S>))
        .route("/frauds/:user_id", get(frauds_by_user::<S>))
        .route("/health", get(health))
        .route("/metrics", get(metrics::<S>))
        .layer(middleware::from_fn(log_request))
        .with_state(state)
}

async fn log_request(request: Request, next: Next) -> Response {
    tracing::info!(method = %request.method(), path = %request.uri().path(), "http.request");
    next.run(request).await
}

async fn list_frauds<S: FraudSink>(
    State(state): State<AppState<S>>,
) -> Result<Json<Vec<FraudVerdict>>, ApiError> {
    state.sink.list_all().await.map(Json).map_err(ApiError::Sink)
}

async fn frauds_by_user<S: FraudSink>(
    State(state): State<AppState<S>>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<FraudVerdict>>, ApiError> {
    if user_id.trim().is_empty() {
        return Err(ApiError::Invalid(vec![FieldError {
            kind: "field",
            msg: "User ID is required",
            path: "userId",
            location: "params",
        }]));
    }
    let frauds = state.sink.list_by_user(&user_id).await.map_err(ApiError::Sink)?;
    if frauds.is_empty() {
        return Err(ApiError::NotFound);
    }
    Ok(Json(frauds))
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    }))
}

async fn metrics<S>(State(state): State<AppState<S>>) -> Result<Response, ApiError> {
    let body = state.metrics.render().map_err(ApiError::Metrics)?;
    Ok(([(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)], body).into_response())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
