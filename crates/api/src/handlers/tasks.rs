//! Handlers for the `/tasks` resource.

use axum::extract::{Path, State};
use axum::Json;
use sculpt_core::error::CoreError;
use sculpt_core::task::{TaskRecord, TaskResult, TaskState};
use serde::Serialize;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub task_id: String,
    /// `false` when the task had already finished.
    pub cancelled: bool,
}

#[derive(Debug, Serialize)]
pub struct DiscardResponse {
    pub task_id: String,
    pub removed: bool,
}

/// GET /api/v1/tasks/{id}
pub async fn get_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> AppResult<Json<DataResponse<TaskRecord>>> {
    let record = state.service.poll(&task_id).await?;
    Ok(Json(DataResponse { data: record }))
}

/// GET /api/v1/tasks/{id}/result
///
/// The payload of a SUCCESS task; 404 until then.
pub async fn get_task_result(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> AppResult<Json<DataResponse<TaskResult>>> {
    let record = state.service.poll(&task_id).await?;
    match (record.state, record.result) {
        (TaskState::Success, Some(result)) => Ok(Json(DataResponse { data: result })),
        (TaskState::Success, None) => Err(AppError::InternalError(format!(
            "Task {task_id} succeeded without a result"
        ))),
        _ => Err(AppError::Core(CoreError::NotFound {
            entity: "Task result",
            id: task_id,
        })),
    }
}

/// POST /api/v1/tasks/{id}/cancel
pub async fn cancel_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> AppResult<Json<DataResponse<CancelResponse>>> {
    let cancelled = state.service.cancel(&task_id).await?;
    Ok(Json(DataResponse {
        data: CancelResponse { task_id, cancelled },
    }))
}

/// DELETE /api/v1/tasks/{id}
///
/// Cancels a live task and removes its record; 404 for unknown ids.
pub async fn discard_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> AppResult<Json<DataResponse<DiscardResponse>>> {
    if !state.service.discard(&task_id).await? {
        return Err(AppError::Core(CoreError::NotFound {
            entity: "Task",
            id: task_id,
        }));
    }
    Ok(Json(DataResponse {
        data: DiscardResponse {
            task_id,
            removed: true,
        },
    }))
}
