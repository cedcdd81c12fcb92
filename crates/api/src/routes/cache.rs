use axum::routing::{delete, get};
use axum::Router;

use crate::handlers::cache;
use crate::state::AppState;

/// Routes mounted at `/cache`.
///
/// ```text
/// GET    /stats           -> cache_stats
/// GET    /warm            -> warming_status
/// POST   /warm            -> trigger_warming
/// DELETE /{namespace}     -> clear_cache
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/stats", get(cache::cache_stats))
        .route("/warm", get(cache::warming_status).post(cache::trigger_warming))
        .route("/{namespace}", delete(cache::clear_cache))
}
