use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use sculpt_core::clock::{Clock, SystemClock};
use sculpt_store::{KvBackend, MemoryBackend, PgBackend};
use sculpt_upstream::fixture::StaticGateway;
use sculpt_upstream::{HttpGateway, UpstreamGateway};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sculpt_api::background::store_purge;
use sculpt_api::config::ServerConfig;
use sculpt_api::router::build_app_router;
use sculpt_api::state::AppState;
use sculpt_api::ws;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "sculpt_api=debug,sculpt_pipeline=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Store ---
    let backend: Arc<dyn KvBackend> = match &config.database_url {
        Some(database_url) => {
            let pool = sculpt_store::create_pool(database_url)
                .await
                .expect("Failed to connect to database");
            tracing::info!("Database connection pool created");

            sculpt_store::health_check(&pool)
                .await
                .expect("Database health check failed");

            sculpt_store::run_migrations(&pool)
                .await
                .expect("Failed to run database migrations");
            tracing::info!("Database migrations applied");

            Arc::new(PgBackend::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory store");
            Arc::new(MemoryBackend::new())
        }
    };

    // --- Upstream ---
    let upstream: Arc<dyn UpstreamGateway> = if config.uses_fixture_upstream() {
        tracing::warn!("Serving the built-in 2024 fixture season");
        Arc::new(StaticGateway::season_2024())
    } else {
        let gateway = HttpGateway::new(config.upstream_url.clone(), config.upstream_timeout)
            .expect("Failed to build upstream HTTP client");
        tracing::info!(url = %config.upstream_url, "Upstream telemetry provider configured");
        Arc::new(gateway)
    };

    // --- App state ---
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let state = AppState::new(config.clone(), Arc::clone(&backend), upstream, clock);

    // --- Background tasks ---
    let background_cancel = CancellationToken::new();

    let heartbeat_handle =
        ws::start_heartbeat(Arc::clone(&state.ws_manager), background_cancel.clone());

    let purge_handle = tokio::spawn(store_purge::run(
        Arc::clone(&backend),
        store_purge::PURGE_INTERVAL,
        background_cancel.clone(),
    ));

    let warming_handle = if config.warming_enabled {
        let warming = state.warming.clone();
        let cancel = background_cancel.clone();
        Some(tokio::spawn(async move { warming.run(cancel).await }))
    } else {
        tracing::info!("Periodic cache warming disabled");
        None
    };

    let service = state.service.clone();
    let ws_manager = Arc::clone(&state.ws_manager);

    // --- Router ---
    let app = build_app_router(state);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");
    let drain = Duration::from_secs(config.shutdown_timeout_secs);

    background_cancel.cancel();
    if let Some(handle) = warming_handle {
        let _ = tokio::time::timeout(drain, handle).await;
        tracing::info!("Warming scheduler stopped");
    }
    let _ = tokio::time::timeout(drain, purge_handle).await;
    let _ = tokio::time::timeout(drain, heartbeat_handle).await;

    let active = service.active_jobs();
    tracing::info!(active, "Cancelling outstanding jobs");
    service.shutdown();

    let ws_count = ws_manager.connection_count().await;
    tracing::info!(ws_count, "Closing remaining WebSocket connections");
    ws_manager.shutdown_all().await;

    tracing::info!("Graceful shutdown complete");
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
