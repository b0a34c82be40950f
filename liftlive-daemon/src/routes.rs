//! REST surface served next to the live gateway

use axum::{
    extract::{Query, State},
    http::{HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use thiserror::Error;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

use liftlive_gateway::LiveGateway;
use liftlive_metrics::{
    coaching_tip, HistoryAggregate, HistoryQuery, HistoryStore, SetSummary, StoredSet, TipInputs,
    NO_REPS_TIP,
};

use crate::shorts::ShortsCurator;

/// Tip returned when the client sends no recent sets
pub const DEFAULT_COACH_TIP: &str = "Focus on maintaining consistent bar speed throughout the set.";

const DEFAULT_QUEUE_COUNT: i64 = 10;
const DEFAULT_HISTORY_LIMIT: usize = 20;
const MAX_HISTORY_LIMIT: usize = 200;

/// Shared state for REST handlers
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<LiveGateway>,
    pub history: Arc<HistoryStore>,
    pub shorts: Arc<ShortsCurator>,
}

/// Handler failure rendered as `{"error": msg}`
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(e) => {
                error!("Request failed: {:#}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

/// All REST routes with tracing and CORS applied
pub fn api_router(state: AppState, frontend_origin: Option<&str>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/shorts/queue", get(shorts_queue))
        .route("/api/history/sets", get(recent_sets))
        .route("/api/history/aggregate", post(aggregate_history))
        .route("/api/ai/coach", post(coach))
        .route("/api/ai/plan", post(plan))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(frontend_origin))
}

/// Exact origin when configured, any origin otherwise
pub fn cors_layer(frontend_origin: Option<&str>) -> CorsLayer {
    let allow_origin = match frontend_origin.map(HeaderValue::from_str) {
        Some(Ok(origin)) => AllowOrigin::exact(origin),
        Some(Err(_)) => {
            warn!("Ignoring unparseable frontend origin; allowing any origin");
            AllowOrigin::any()
        }
        None => AllowOrigin::any(),
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([axum::http::header::CONTENT_TYPE])
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    timestamp: i64,
    clients: usize,
    set_state: String,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: Utc::now().timestamp_millis(),
        clients: state.gateway.client_count().await,
        set_state: state.gateway.state().await.to_string(),
    })
}

#[derive(Debug, Deserialize)]
struct QueueParams {
    count: Option<String>,
}

#[derive(Debug, Serialize)]
struct QueueResponse {
    queue: Vec<String>,
}

/// Unparseable or zero counts fall back to the default
fn queue_count(raw: Option<&str>) -> usize {
    let count = raw
        .and_then(|s| s.trim().parse::<i64>().ok())
        .filter(|n| *n != 0)
        .unwrap_or(DEFAULT_QUEUE_COUNT);
    count.clamp(1, crate::shorts::MAX_QUEUE_SIZE as i64) as usize
}

async fn shorts_queue(
    State(state): State<AppState>,
    Query(params): Query<QueueParams>,
) -> ApiResult<QueueResponse> {
    let count = queue_count(params.count.as_deref());
    let queue = state.shorts.queue(count).await?;
    Ok(Json(QueueResponse { queue }))
}

#[derive(Debug, Deserialize)]
struct HistoryParams {
    limit: Option<String>,
}

async fn recent_sets(
    State(state): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> ApiResult<Vec<StoredSet>> {
    let limit = match params.limit.as_deref() {
        None => DEFAULT_HISTORY_LIMIT,
        Some(raw) => raw
            .trim()
            .parse::<usize>()
            .map_err(|_| ApiError::BadRequest(format!("invalid limit '{}'", raw)))?,
    };
    let sets = state
        .history
        .recent_sets(limit.clamp(1, MAX_HISTORY_LIMIT))?;
    Ok(Json(sets))
}

async fn aggregate_history(
    State(state): State<AppState>,
    Json(query): Json<HistoryQuery>,
) -> ApiResult<HistoryAggregate> {
    if let (Some(start), Some(end)) = (query.start_date, query.end_date) {
        if start > end {
            return Err(ApiError::BadRequest(
                "startDate must not be after endDate".to_string(),
            ));
        }
    }
    Ok(Json(state.history.aggregate(&query)?))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CoachRequest {
    #[serde(default)]
    recent_sets: Vec<SetSummary>,
}

#[derive(Debug, Serialize)]
struct CoachResponse {
    tip: String,
}

/// Tip for the most recent set in the request.
///
/// Works from the rounded fields of a stored or client-held `SetSummary`,
/// so near a rule threshold it can differ from the tip `summarize` picked
/// from the unrounded values (VL 9.96 is stored as 10.0).
fn coach_tip(recent_sets: &[SetSummary]) -> String {
    match recent_sets.last() {
        None => DEFAULT_COACH_TIP.to_string(),
        Some(summary) if summary.reps == 0 => NO_REPS_TIP.to_string(),
        Some(summary) => coaching_tip(&TipInputs {
            reps: summary.reps,
            vl: summary.vl,
            rom_hit_rate: summary.rom_hit_rate,
            avg_speed: summary.avg_speed,
        }),
    }
}

async fn coach(body: Option<Json<CoachRequest>>) -> Json<CoachResponse> {
    let request = body.map(|Json(request)| request).unwrap_or_default();
    Json(CoachResponse {
        tip: coach_tip(&request.recent_sets),
    })
}

async fn plan() -> Json<Value> {
    Json(json!({ "plan": [] }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_count_defaults_and_clamps() {
        assert_eq!(queue_count(None), 10);
        assert_eq!(queue_count(Some("abc")), 10);
        assert_eq!(queue_count(Some("0")), 10);
        assert_eq!(queue_count(Some("3")), 3);
        assert_eq!(queue_count(Some("-4")), 1);
        assert_eq!(queue_count(Some("999")), 50);
    }

    #[test]
    fn test_coach_tip_uses_latest_set() {
        assert_eq!(coach_tip(&[]), DEFAULT_COACH_TIP);

        let fast = SetSummary {
            reps: 5,
            tut: 12.0,
            avg_speed: 0.7,
            vl: 35.0,
            rom_hit_rate: 100.0,
            rom_variability: 2.0,
        };
        let empty = SetSummary::empty();

        assert_eq!(coach_tip(&[fast.clone(), empty]), NO_REPS_TIP);
        assert!(coach_tip(&[fast]).starts_with("High velocity loss"));
    }

    #[test]
    fn test_coach_tip_reads_rounded_vl() {
        // 9.96% VL is stored as 10.0, past the low-VL rule
        let summary = SetSummary {
            reps: 6,
            tut: 15.0,
            avg_speed: 0.45,
            vl: 10.0,
            rom_hit_rate: 90.0,
            rom_variability: 2.0,
        };
        assert_eq!(
            coach_tip(&[summary]),
            "Solid set! VL at 10% with 90% ROM hits. Stay consistent."
        );
    }
}
