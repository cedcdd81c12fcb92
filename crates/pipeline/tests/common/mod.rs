#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sculpt_core::clock::{Clock, ManualClock};
use sculpt_core::task::TaskRecord;
use sculpt_events::ProgressBroadcaster;
use sculpt_pipeline::{PipelineConfig, SculptureService};
use sculpt_store::{
    CacheTtls, KeyStat, KvBackend, MemoryBackend, ResultCache, StoreError, TaskStore,
};
use sculpt_upstream::fixture::StaticGateway;
use sculpt_upstream::{CachingGateway, UpstreamGateway};
use tokio::sync::Notify;

pub const PREFIX: &str = "f1";

/// Everything a pipeline test needs to inspect after the fact.
pub struct Harness {
    pub upstream: Arc<StaticGateway>,
    pub gateway: Arc<dyn UpstreamGateway>,
    pub cache: ResultCache,
    pub store: TaskStore,
    pub clock: Arc<ManualClock>,
    pub service: SculptureService,
}

/// Service over the 2024 fixture season with in-memory storage.
pub fn harness() -> Harness {
    build(
        StaticGateway::season_2024(),
        Arc::new(MemoryBackend::new()),
        PipelineConfig::default(),
    )
}

/// Service with `cache_backend` for the result cache and a separate
/// in-memory backend for task records.
pub fn build(
    upstream: StaticGateway,
    cache_backend: Arc<dyn KvBackend>,
    config: PipelineConfig,
) -> Harness {
    build_with_task_backend(upstream, cache_backend, |clock| {
        Arc::new(MemoryBackend::with_clock(clock))
    }, config)
}

/// Like [`build`], with the task-record backend made from the harness
/// clock by `task_backend`.
pub fn build_with_task_backend(
    upstream: StaticGateway,
    cache_backend: Arc<dyn KvBackend>,
    task_backend: impl FnOnce(Arc<dyn Clock>) -> Arc<dyn KvBackend>,
    config: PipelineConfig,
) -> Harness {
    let clock = Arc::new(ManualClock::default());
    let dyn_clock: Arc<dyn Clock> = clock.clone();

    let upstream = Arc::new(upstream);
    let cache = ResultCache::new(cache_backend, PREFIX, CacheTtls::default());
    let store = TaskStore::with_clock(
        task_backend(dyn_clock.clone()),
        Duration::from_secs(3600),
        dyn_clock.clone(),
    );
    let gateway: Arc<dyn UpstreamGateway> =
        Arc::new(CachingGateway::new(upstream.clone(), cache.clone()));

    let service = SculptureService::new(
        gateway.clone(),
        cache.clone(),
        store.clone(),
        ProgressBroadcaster::new(),
        dyn_clock,
        config,
    );

    Harness {
        upstream,
        gateway,
        cache,
        store,
        clock,
        service,
    }
}

/// Poll until the task reaches a terminal state.
pub async fn wait_terminal(service: &SculptureService, task_id: &str) -> TaskRecord {
    for _ in 0..500 {
        let record = service.poll(task_id).await.expect("task record");
        if record.is_terminal() {
            return record;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("task {task_id} did not finish");
}

/// Every record a watcher receives, snapshot first, until the task ends.
pub async fn follow(service: &SculptureService, task_id: &str) -> Vec<TaskRecord> {
    let mut watch = service.watch(task_id).await.expect("task record");
    let mut seen = vec![watch.current().clone()];
    let rest = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(record) = watch.next().await {
            seen.push(record);
        }
    })
    .await;
    assert!(rest.is_ok(), "task {task_id} did not finish");
    seen
}

pub fn assert_progress_never_decreases(records: &[TaskRecord]) {
    for pair in records.windows(2) {
        assert!(
            pair[0].progress <= pair[1].progress,
            "progress went from {} to {}",
            pair[0].progress,
            pair[1].progress
        );
    }
}

/// [`MemoryBackend`] whose next `get` after [`hold_next_get`] waits
/// for [`release`].
///
/// [`hold_next_get`]: GatedBackend::hold_next_get
/// [`release`]: GatedBackend::release
pub struct GatedBackend {
    inner: MemoryBackend,
    armed: AtomicBool,
    held: Notify,
    released: Notify,
}

impl GatedBackend {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: MemoryBackend::with_clock(clock),
            armed: AtomicBool::new(false),
            held: Notify::new(),
            released: Notify::new(),
        }
    }

    pub fn hold_next_get(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }

    /// Resolves once a held `get` is waiting.
    pub async fn wait_held(&self) {
        self.held.notified().await;
    }

    pub fn release(&self) {
        self.released.notify_one();
    }
}

#[async_trait]
impl KvBackend for GatedBackend {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        if self.armed.swap(false, Ordering::SeqCst) {
            self.held.notify_one();
            self.released.notified().await;
        }
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), StoreError> {
        self.inner.set(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        self.inner.delete(key).await
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<u64, StoreError> {
        self.inner.delete_prefix(prefix).await
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<KeyStat>, StoreError> {
        self.inner.scan_prefix(prefix).await
    }

    async fn purge_expired(&self) -> Result<u64, StoreError> {
        self.inner.purge_expired().await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.inner.ping().await
    }
}

/// Reads succeed and find nothing; every write fails.
#[derive(Debug, Default)]
pub struct ReadOnlyBackend;

#[async_trait]
impl KvBackend for ReadOnlyBackend {
    async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: String, _ttl: Duration) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("read-only".to_string()))
    }

    async fn delete(&self, _key: &str) -> Result<bool, StoreError> {
        Err(StoreError::Unavailable("read-only".to_string()))
    }

    async fn delete_prefix(&self, _prefix: &str) -> Result<u64, StoreError> {
        Err(StoreError::Unavailable("read-only".to_string()))
    }

    async fn scan_prefix(&self, _prefix: &str) -> Result<Vec<KeyStat>, StoreError> {
        Ok(Vec::new())
    }

    async fn purge_expired(&self) -> Result<u64, StoreError> {
        Ok(0)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
