pub mod cache;
pub mod health;
pub mod sculptures;
pub mod tasks;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /sculptures   submit, compare, cached read
/// /tasks        poll, result, cancel, push channel
/// /cache        stats, clear, warming
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/sculptures", sculptures::router())
        .nest("/tasks", tasks::router())
        .nest("/cache", cache::router())
}
