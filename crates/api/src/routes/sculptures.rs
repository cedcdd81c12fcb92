use axum::routing::{get, post};
use axum::Router;

use crate::handlers::sculptures;
use crate::state::AppState;

/// Routes mounted at `/sculptures`.
///
/// ```text
/// POST   /                                        -> submit_sculpture
/// POST   /compare                                 -> submit_comparison
/// GET    /{season}/{round}/{session}/{participant} -> get_sculpture
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(sculptures::submit_sculpture))
        .route("/compare", post(sculptures::submit_comparison))
        .route(
            "/{season}/{round}/{session}/{participant}",
            get(sculptures::get_sculpture),
        )
}
