//! Handlers for the `/sculptures` resource.
//!
//! Submission is cache-first: a hit answers `200` with the `cached`
//! sentinel and the client reads the artifact directly; a miss answers
//! `202` with the id of the task building it.

use std::str::FromStr;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use sculpt_core::error::CoreError;
use sculpt_core::key::{ArtifactKey, MAX_SEASON, MIN_SEASON};
use sculpt_core::session::SessionCode;
use sculpt_core::task::TaskResult;
use sculpt_pipeline::Submission;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// Task id returned when the result is already cached.
pub const CACHED_SENTINEL: &str = "cached";

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Validate)]
pub struct SubmitSculpture {
    #[validate(range(min = MIN_SEASON, max = MAX_SEASON))]
    pub season: i32,
    #[validate(range(min = 1))]
    pub round: u32,
    pub session: String,
    pub participant: String,
}

/// Two to five participants; the count is enforced when the key is built.
#[derive(Debug, Deserialize, Validate)]
pub struct SubmitComparison {
    #[validate(range(min = MIN_SEASON, max = MAX_SEASON))]
    pub season: i32,
    #[validate(range(min = 1))]
    pub round: u32,
    pub session: String,
    pub participants: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct SubmissionResponse {
    pub task_id: String,
}

// ---------------------------------------------------------------------------
// Submit
// ---------------------------------------------------------------------------

/// POST /api/v1/sculptures
pub async fn submit_sculpture(
    State(state): State<AppState>,
    payload: Result<Json<SubmitSculpture>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let Json(input) = payload?;
    input.validate()?;
    let session = SessionCode::from_str(&input.session)?;

    let submission = state
        .service
        .submit_single(input.season, input.round, session, &input.participant)
        .await?;
    Ok(submission_response(submission))
}

/// POST /api/v1/sculptures/compare
pub async fn submit_comparison(
    State(state): State<AppState>,
    payload: Result<Json<SubmitComparison>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let Json(input) = payload?;
    input.validate()?;
    let session = SessionCode::from_str(&input.session)?;

    let submission = state
        .service
        .submit_comparison(input.season, input.round, session, &input.participants)
        .await?;
    Ok(submission_response(submission))
}

fn submission_response(submission: Submission) -> (StatusCode, Json<DataResponse<SubmissionResponse>>) {
    let (status, task_id) = match submission {
        Submission::Cached(_) => (StatusCode::OK, CACHED_SENTINEL.to_string()),
        Submission::Enqueued(task_id) | Submission::Joined(task_id) => {
            (StatusCode::ACCEPTED, task_id)
        }
    };
    (
        status,
        Json(DataResponse {
            data: SubmissionResponse { task_id },
        }),
    )
}

// ---------------------------------------------------------------------------
// Cached read
// ---------------------------------------------------------------------------

/// GET /api/v1/sculptures/{season}/{round}/{session}/{participant}
pub async fn get_sculpture(
    State(state): State<AppState>,
    Path((season, round, session, participant)): Path<(i32, u32, String, String)>,
) -> AppResult<Json<DataResponse<TaskResult>>> {
    let session = SessionCode::from_str(&session)?;
    let key = ArtifactKey::single(season, round, session, &participant)?;

    let result = state.service.cached(&key).await.ok_or_else(|| {
        AppError::Core(CoreError::NotFound {
            entity: "Sculpture",
            id: key.to_string(),
        })
    })?;
    Ok(Json(DataResponse { data: result }))
}
