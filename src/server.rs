//! Web server module for the tracker.
//!
//! Provides the ingest endpoint, health probes and JSON read-back endpoints.

use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, TraceLayer},
};

use crate::ingest;
use crate::storage::{SortOrder, StorageError, TrackQuery, TrackReader, TrackWriter};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub writer: TrackWriter,
    pub reader: TrackReader,
}

/// Health check response.
#[derive(Serialize)]
struct HealthResponse {
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    db: Option<String>,
}

/// Ingest response.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TrackResponse {
    /// Elements queued for storage.
    pub accepted: usize,
    /// Elements dropped by validation.
    pub dropped: usize,
}

/// Query parameters for the tracks API.
#[derive(Debug, Deserialize)]
pub struct TracksQueryParams {
    pub event: Option<String>,
    pub limit: Option<u32>,
    pub order: Option<String>,
    pub range: Option<String>,
}

/// Query parameters for the stats API.
#[derive(Debug, Deserialize)]
pub struct StatsQueryParams {
    pub range: Option<String>,
}

/// Parse sort order from string.
fn parse_sort_order(s: Option<String>) -> Option<SortOrder> {
    s.and_then(|order| order.to_lowercase().parse().ok())
}

/// Parse filtered time range from string.
/// Supports: 1h, 6h, 12h, 24h, 7d, 30d.
fn parse_range(range: Option<String>) -> Option<chrono::DateTime<chrono::Utc>> {
    let range = range?;
    let now = chrono::Utc::now();
    match range.as_str() {
        "1h" => Some(now - chrono::Duration::hours(1)),
        "6h" => Some(now - chrono::Duration::hours(6)),
        "12h" => Some(now - chrono::Duration::hours(12)),
        "24h" => Some(now - chrono::Duration::hours(24)),
        "7d" => Some(now - chrono::Duration::days(7)),
        "30d" => Some(now - chrono::Duration::days(30)),
        _ => None,
    }
}

/// Create the Axum router with all routes.
pub fn create_router(state: AppState) -> Router {
    let app_state = Arc::new(state);

    Router::new()
        .route("/track", post(track_handler))
        .route("/healthz", get(healthz_handler))
        .route("/readyz", get(readyz_handler))
        .route("/api/tracks", get(tracks_handler))
        .route("/api/tracks/stats", get(tracks_stats_handler))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default().include_headers(true)),
        )
        .layer(CorsLayer::permissive())
        .with_state(app_state)
}

/// Ingest endpoint.
///
/// Accepts a JSON array as `application/json` or `text/plain`. Invalid
/// elements are dropped and the rest are queued; the response is 200 even
/// when nothing survived. A refused batch answers 503 so the client retries.
async fn track_handler(State(state): State<Arc<AppState>>, body: String) -> Response {
    let values = ingest::parse_batch(&body);
    let tracks = ingest::validate_batch(&values);
    let accepted = tracks.len();
    let dropped = values.len() - accepted;

    match state.writer.insert_tracks(tracks) {
        Ok(()) => {
            tracing::debug!(accepted, dropped, "Batch ingested");
            Json(TrackResponse { accepted, dropped }).into_response()
        }
        Err(StorageError::ChannelSend) => {
            tracing::warn!(accepted, "Storage writer refused batch");
            StatusCode::SERVICE_UNAVAILABLE.into_response()
        }
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, format!("Error: {}", e)).into_response(),
    }
}

/// Liveness probe.
async fn healthz_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        db: None,
    })
}

/// Readiness probe that checks database availability.
async fn readyz_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.reader.ping().await {
        Ok(()) => Json(HealthResponse {
            status: "ok".to_string(),
            db: Some("ready".to_string()),
        })
        .into_response(),
        Err(err) => {
            tracing::error!(error = %err, "Readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "not_ready".to_string(),
                    db: Some(err.to_string()),
                }),
            )
                .into_response()
        }
    }
}

/// Tracks API endpoint - returns stored tracks as JSON.
async fn tracks_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<TracksQueryParams>,
) -> Response {
    let query = TrackQuery {
        event: params.event.filter(|s| !s.is_empty()),
        start: parse_range(params.range),
        end: None,
        limit: params.limit,
        order: parse_sort_order(params.order),
    };

    match state.reader.query(query).await {
        Ok(tracks) => Json(tracks).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, format!("Error: {}", e)).into_response(),
    }
}

/// Tracks stats API endpoint - returns per-event counts as JSON.
async fn tracks_stats_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<StatsQueryParams>,
) -> Response {
    let start = parse_range(params.range);
    match state.reader.stats(start, None).await {
        Ok(stats) => Json(stats).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, format!("Error: {}", e)).into_response(),
    }
}
