//! Read-only HTTP surface for the dashboard.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::CorsLayer;

use crate::error::StoreError;
use crate::model::{HistoryPoint, Snapshot, Source, SourceStatus, TimeRange};
use crate::store::SnapshotStore;

#[derive(Clone)]
pub struct ApiState {
    pub store: Arc<SnapshotStore>,
}

/// Build the router; `/metrics` is mounted only when a recorder handle is given.
pub fn router(state: ApiState, metrics: Option<PrometheusHandle>) -> Router {
    let mut app = Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/status", get(status))
        .route("/api/sources/{source}/latest", get(latest))
        .route("/api/sources/{source}/history", get(history));
    if let Some(handle) = metrics {
        app = app.merge(crate::metrics::router(handle));
    }
    app.layer(CorsLayer::very_permissive()).with_state(state)
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Store(StoreError),
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        ApiError::Store(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (code, msg) = match self {
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m),
            ApiError::Store(e) => {
                tracing::warn!(error = %e, "store read failed");
                let code = match e {
                    StoreError::Timeout(_) => StatusCode::SERVICE_UNAVAILABLE,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (code, e.to_string())
            }
        };
        (code, Json(json!({ "error": msg }))).into_response()
    }
}

fn parse_source(raw: &str) -> Result<Source, ApiError> {
    raw.parse::<Source>()
        .map_err(|e| ApiError::BadRequest(e.to_string()))
}

async fn status(State(state): State<ApiState>) -> Result<Json<Vec<SourceStatus>>, ApiError> {
    Ok(Json(state.store.status().await?))
}

async fn latest(
    State(state): State<ApiState>,
    Path(source): Path<String>,
) -> Result<Json<Snapshot>, ApiError> {
    let source = parse_source(&source)?;
    state
        .store
        .latest(source)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("no snapshot stored for {source}")))
}

#[derive(Debug, Deserialize)]
struct HistoryParams {
    key: String,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
}

async fn history(
    State(state): State<ApiState>,
    Path(source): Path<String>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<Vec<HistoryPoint>>, ApiError> {
    let source = parse_source(&source)?;
    let range = TimeRange::new(
        params.from.unwrap_or(DateTime::UNIX_EPOCH),
        params.to.unwrap_or_else(Utc::now),
    );
    let points = state.store.history(source, &params.key, range).collect().await?;
    Ok(Json(points))
}
