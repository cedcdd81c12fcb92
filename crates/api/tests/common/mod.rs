#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use http_body_util::BodyExt;
use sculpt_core::clock::{Clock, SystemClock};
use sculpt_core::warming::WarmingStrategy;
use sculpt_pipeline::{PipelineConfig, WarmingConfig};
use sculpt_store::{CacheTtls, MemoryBackend};
use sculpt_upstream::fixture::StaticGateway;
use tower::ServiceExt;

use sculpt_api::config::ServerConfig;
use sculpt_api::router::build_app_router;
use sculpt_api::state::AppState;

/// Build a test `ServerConfig` with safe defaults and the fixture upstream.
pub fn test_config() -> ServerConfig {
    let strategy = WarmingStrategy {
        participants: vec!["VER".to_string(), "HAM".to_string()],
        recent_rounds: 1,
        ..WarmingStrategy::for_season(2024)
    };
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 5,
        database_url: None,
        cache_key_prefix: "f1".to_string(),
        cache_ttls: CacheTtls::default(),
        task_ttl: Duration::from_secs(3600),
        pipeline: PipelineConfig::default(),
        upstream_url: "fixture:2024".to_string(),
        upstream_timeout: Duration::from_secs(5),
        warming_enabled: false,
        warming: WarmingConfig::new(strategy),
    }
}

/// State over an in-memory store and `upstream`.
pub fn test_state(upstream: StaticGateway) -> AppState {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    AppState::new(
        test_config(),
        Arc::new(MemoryBackend::new()),
        Arc::new(upstream),
        clock,
    )
}

/// Build the full application router over the 2024 fixture season.
///
/// The state is returned as well so tests can inspect the service
/// directly.
pub fn build_test_app() -> (Router, AppState) {
    let state = test_state(StaticGateway::season_2024());
    (build_app_router(state.clone()), state)
}

pub async fn send(app: Router, method: Method, uri: &str, body: Option<serde_json::Value>) -> Response {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string())),
        None => builder.body(Body::empty()),
    }
    .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn get(app: Router, uri: &str) -> Response {
    send(app, Method::GET, uri, None).await
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response {
    send(app, Method::POST, uri, Some(body)).await
}

pub async fn post_empty(app: Router, uri: &str) -> Response {
    send(app, Method::POST, uri, None).await
}

pub async fn delete(app: Router, uri: &str) -> Response {
    send(app, Method::DELETE, uri, None).await
}

pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Poll `GET /api/v1/tasks/{id}` until the task is terminal.
pub async fn wait_for_task(app: &Router, task_id: &str) -> serde_json::Value {
    let uri = format!("/api/v1/tasks/{task_id}");
    for _ in 0..500 {
        let response = get(app.clone(), &uri).await;
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        let state = json["data"]["state"].as_str().unwrap_or_default().to_string();
        if matches!(state.as_str(), "SUCCESS" | "FAILURE" | "CANCELLED") {
            return json["data"].clone();
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("task {task_id} did not finish");
}
