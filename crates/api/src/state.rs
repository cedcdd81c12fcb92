use std::sync::Arc;

use sculpt_core::clock::Clock;
use sculpt_events::ProgressBroadcaster;
use sculpt_pipeline::{SculptureService, WarmingScheduler};
use sculpt_store::{KvBackend, ResultCache, TaskStore};
use sculpt_upstream::{CachingGateway, UpstreamGateway};

use crate::config::ServerConfig;
use crate::ws::WsManager;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    /// Submission, polling, cancellation, and cache administration.
    pub service: SculptureService,
    pub warming: WarmingScheduler,
    /// Backend shared by the result cache and the task store.
    pub backend: Arc<dyn KvBackend>,
    /// Open push-channel connections.
    pub ws_manager: Arc<WsManager>,
}

impl AppState {
    /// Wire the cache, task store, and pipeline over `backend`, with
    /// session metadata cached in front of `upstream`.
    pub fn new(
        config: ServerConfig,
        backend: Arc<dyn KvBackend>,
        upstream: Arc<dyn UpstreamGateway>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let cache = ResultCache::new(
            backend.clone(),
            config.cache_key_prefix.clone(),
            config.cache_ttls,
        );
        let store = TaskStore::with_clock(backend.clone(), config.task_ttl, clock.clone());
        let gateway: Arc<dyn UpstreamGateway> =
            Arc::new(CachingGateway::new(upstream, cache.clone()));

        let service = SculptureService::new(
            gateway.clone(),
            cache,
            store,
            ProgressBroadcaster::new(),
            clock.clone(),
            config.pipeline.clone(),
        );
        let warming = WarmingScheduler::new(service.clone(), gateway, config.warming.clone(), clock);

        Self {
            config: Arc::new(config),
            service,
            warming,
            backend,
            ws_manager: Arc::new(WsManager::new()),
        }
    }
}
