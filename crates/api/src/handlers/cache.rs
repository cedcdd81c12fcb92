//! Handlers for the `/cache` resource: occupancy, clearing, and warming.

use std::str::FromStr;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::Datelike;
use sculpt_core::key::{CacheNamespace, MAX_SEASON, MIN_SEASON};
use sculpt_core::session::SessionCode;
use sculpt_core::warming::{WarmingReport, WarmingTarget};
use sculpt_pipeline::WarmingRequest;
use sculpt_store::CacheStats;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Stats / clear
// ---------------------------------------------------------------------------

/// GET /api/v1/cache/stats
pub async fn cache_stats(State(state): State<AppState>) -> AppResult<Json<DataResponse<CacheStats>>> {
    let stats = state.service.cache_stats().await?;
    Ok(Json(DataResponse { data: stats }))
}

#[derive(Debug, Serialize)]
pub struct ClearResponse {
    pub namespace: String,
    pub removed: u64,
}

/// DELETE /api/v1/cache/{namespace}
///
/// `namespace` is `sculpture`, `comparison`, `session`, or `all`.
pub async fn clear_cache(
    State(state): State<AppState>,
    Path(namespace): Path<String>,
) -> AppResult<Json<DataResponse<ClearResponse>>> {
    let selected = if namespace.eq_ignore_ascii_case("all") {
        None
    } else {
        Some(CacheNamespace::from_str(&namespace)?)
    };

    let removed = state.service.clear_cache(selected).await?;

    Ok(Json(DataResponse {
        data: ClearResponse { namespace, removed },
    }))
}

// ---------------------------------------------------------------------------
// Warming
// ---------------------------------------------------------------------------

/// Optional body of a warming trigger. Without `round` the configured
/// strategy runs; with it only that event is warmed.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct WarmRequest {
    #[validate(range(min = MIN_SEASON, max = MAX_SEASON))]
    pub season: Option<i32>,
    #[validate(range(min = 1))]
    pub round: Option<u32>,
    /// Defaults to Q and R.
    #[serde(default)]
    pub sessions: Vec<String>,
    /// Defaults to every participant of the session.
    pub participants: Option<Vec<String>>,
}

impl WarmRequest {
    fn into_request(self) -> AppResult<WarmingRequest> {
        let Some(event_round) = self.round else {
            return Ok(WarmingRequest::Strategy {
                season: self.season,
            });
        };
        let sessions = self
            .sessions
            .iter()
            .map(|code| SessionCode::from_str(code))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(WarmingRequest::Target(WarmingTarget {
            season: self.season.unwrap_or_else(|| chrono::Utc::now().year()),
            event_round,
            sessions,
            participants: self.participants,
        }))
    }
}

#[derive(Debug, Serialize)]
pub struct WarmResponse {
    pub run_id: String,
}

/// POST /api/v1/cache/warm
///
/// Starts a run in the background. 409 while another run is active.
pub async fn trigger_warming(
    State(state): State<AppState>,
    body: Option<Json<WarmRequest>>,
) -> AppResult<impl IntoResponse> {
    let input = body.map(|Json(input)| input).unwrap_or_default();
    input.validate()?;

    let run_id = state.warming.trigger(input.into_request()?)?;
    tracing::info!(run_id = %run_id, "Warming triggered");

    Ok((
        StatusCode::ACCEPTED,
        Json(DataResponse {
            data: WarmResponse { run_id },
        }),
    ))
}

#[derive(Debug, Serialize)]
pub struct WarmingStatusResponse {
    /// Whether the periodic loop is enabled.
    pub enabled: bool,
    pub interval_secs: u64,
    pub running: Option<WarmingReport>,
    pub last_report: Option<WarmingReport>,
}

/// GET /api/v1/cache/warm
pub async fn warming_status(State(state): State<AppState>) -> Json<DataResponse<WarmingStatusResponse>> {
    let snapshot = state.warming.snapshot();
    Json(DataResponse {
        data: WarmingStatusResponse {
            enabled: state.config.warming_enabled,
            interval_secs: state.warming.config().interval.as_secs(),
            running: snapshot.running,
            last_report: snapshot.last_report,
        },
    })
}
