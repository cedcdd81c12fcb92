use axum::routing::{get, post};
use axum::Router;

use crate::handlers::tasks;
use crate::state::AppState;
use crate::ws;

/// Routes mounted at `/tasks`.
///
/// ```text
/// GET    /{id}            -> get_task
/// DELETE /{id}            -> discard_task
/// GET    /{id}/result     -> get_task_result
/// POST   /{id}/cancel     -> cancel_task
/// GET    /{id}/ws         -> task_ws_handler (WebSocket)
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{id}", get(tasks::get_task).delete(tasks::discard_task))
        .route("/{id}/result", get(tasks::get_task_result))
        .route("/{id}/cancel", post(tasks::cancel_task))
        .route("/{id}/ws", get(ws::task_ws_handler))
}
