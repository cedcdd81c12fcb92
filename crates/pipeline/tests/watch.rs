//! What push observers see while a task is running.

mod common;

use std::sync::Arc;
use std::time::Duration;

use sculpt_core::artifact;
use sculpt_core::clock::Clock;
use sculpt_core::key::ArtifactKey;
use sculpt_core::session::SessionCode;
use sculpt_core::task::{Checkpoint, TaskKind, TaskResult, TaskState, TaskUpdate};
use sculpt_pipeline::{new_task_id, PipelineConfig, TaskReporter};
use sculpt_store::{KvBackend, MemoryBackend};
use sculpt_upstream::fixture::{synthetic_trace, StaticGateway};

use common::{
    assert_progress_never_decreases, build, build_with_task_backend, follow, GatedBackend,
};

#[tokio::test]
async fn updates_queued_behind_a_slow_snapshot_are_not_replayed() {
    let mut gate: Option<Arc<GatedBackend>> = None;
    let h = build_with_task_backend(
        StaticGateway::season_2024(),
        Arc::new(MemoryBackend::new()),
        |clock| {
            let backend = Arc::new(GatedBackend::new(clock));
            gate = Some(Arc::clone(&backend));
            backend as Arc<dyn KvBackend>
        },
        PipelineConfig::default(),
    );
    let gate = gate.unwrap();

    let task_id = new_task_id();
    let record = h.store.create(&task_id, TaskKind::Single).await.unwrap();
    let clock: Arc<dyn Clock> = h.clock.clone();
    let mut reporter = TaskReporter::new(
        record,
        h.store.clone(),
        h.service.broadcaster().clone(),
        clock,
    );

    // The watcher subscribes, then stalls reading the snapshot.
    gate.hold_next_get();
    let watcher = {
        let service = h.service.clone();
        let task_id = task_id.clone();
        tokio::spawn(async move { follow(&service, &task_id).await })
    };
    gate.wait_held().await;

    for checkpoint in &Checkpoint::ALL[..4] {
        reporter
            .emit(TaskUpdate::checkpoint(*checkpoint, "step"))
            .await
            .unwrap();
    }
    gate.release();

    for checkpoint in &Checkpoint::ALL[4..7] {
        reporter
            .emit(TaskUpdate::checkpoint(*checkpoint, "step"))
            .await
            .unwrap();
    }
    let artifact = artifact::build(&synthetic_trace("VER", 50)).unwrap();
    reporter
        .emit(TaskUpdate::success(TaskResult::Single(artifact), "done"))
        .await
        .unwrap();

    let seen = watcher.await.unwrap();
    assert!(seen[0].progress >= 40, "snapshot taken at {}", seen[0].progress);
    for pair in seen.windows(2) {
        assert!(pair[0].progress < pair[1].progress);
    }
    assert_eq!(seen.last().unwrap().state, TaskState::Success);
}

#[tokio::test]
async fn watching_a_finished_task_yields_only_the_snapshot() {
    let h = build(
        StaticGateway::season_2024(),
        Arc::new(MemoryBackend::new()),
        PipelineConfig::default(),
    );
    let key = ArtifactKey::single(2024, 1, SessionCode::Q, "VER").unwrap();
    let enqueued = h.service.enqueue(new_task_id(), key, None).await.unwrap();
    enqueued.handle.await.unwrap();

    let seen = follow(&h.service, &enqueued.task_id).await;
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].state, TaskState::Success);
}

#[tokio::test]
async fn live_comparison_progress_is_ordered_for_watchers() {
    let h = build(
        StaticGateway::season_2024().with_latency(Duration::from_millis(5)),
        Arc::new(MemoryBackend::new()),
        PipelineConfig::default(),
    );
    let key =
        ArtifactKey::comparison(2024, 1, SessionCode::Q, &["VER", "HAM", "LEC"]).unwrap();
    let enqueued = h.service.enqueue(new_task_id(), key, None).await.unwrap();

    let seen = follow(&h.service, &enqueued.task_id).await;

    assert_progress_never_decreases(&seen);
    let last = seen.last().unwrap();
    assert_eq!(last.state, TaskState::Success);
    assert_eq!(last.progress, 100);
}
