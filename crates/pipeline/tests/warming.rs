//! Warming runs over the fixture season.

mod common;

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use sculpt_core::clock::Clock;
use sculpt_core::key::ArtifactKey;
use sculpt_core::session::SessionCode;
use sculpt_core::warming::{WarmingStatus, WarmingStrategy, WarmingTarget};
use sculpt_pipeline::{
    new_task_id, PipelineConfig, WarmingConfig, WarmingError, WarmingRequest, WarmingScheduler,
};
use sculpt_store::MemoryBackend;
use sculpt_upstream::fixture::StaticGateway;
use tokio_util::sync::CancellationToken;

use common::{build, harness, Harness};

fn strategy(participants: &[&str], max_concurrent: usize) -> WarmingStrategy {
    WarmingStrategy {
        season: 2024,
        recent_rounds: 2,
        sessions: vec![SessionCode::Q],
        participants: participants.iter().map(|c| c.to_string()).collect(),
        max_concurrent,
    }
}

fn scheduler(h: &Harness, strategy: WarmingStrategy) -> WarmingScheduler {
    let clock: Arc<dyn Clock> = h.clock.clone();
    WarmingScheduler::new(
        h.service.clone(),
        h.gateway.clone(),
        WarmingConfig::new(strategy),
        clock,
    )
}

fn season_2024() -> WarmingRequest {
    WarmingRequest::Strategy { season: Some(2024) }
}

#[tokio::test]
async fn strategy_run_warms_recent_rounds() {
    let h = harness();
    let warming = scheduler(&h, strategy(&["VER", "HAM", "ZZZ"], 2));

    let report = warming.run_once(season_2024()).await.unwrap();

    assert_eq!(report.status, WarmingStatus::Completed);
    assert_eq!(report.rounds_processed, 2);
    assert_eq!(report.warmed, 4);
    assert_eq!(report.not_in_session, 2);
    assert_eq!(report.failed, 0);
    assert!(report.finished_at.is_some());

    // The two latest fixture rounds are 5 and 4.
    let key = ArtifactKey::single(2024, 5, SessionCode::Q, "HAM").unwrap();
    assert!(h.cache.contains_artifact(&key).await.unwrap());
    let key = ArtifactKey::single(2024, 3, SessionCode::Q, "HAM").unwrap();
    assert!(!h.cache.contains_artifact(&key).await.unwrap());
}

#[tokio::test]
async fn second_run_touches_nothing_upstream() {
    let h = harness();
    let warming = scheduler(&h, strategy(&["VER", "HAM"], 2));

    warming.run_once(season_2024()).await.unwrap();
    let calls = h.upstream.total_calls();

    let report = warming.run_once(season_2024()).await.unwrap();

    assert_eq!(report.warmed, 0);
    assert_eq!(report.already_warm, 4);
    assert_eq!(h.upstream.total_calls(), calls);
}

#[tokio::test]
async fn warming_respects_concurrency_ceiling() {
    let h = build(
        StaticGateway::season_2024().with_latency(Duration::from_millis(10)),
        Arc::new(MemoryBackend::new()),
        PipelineConfig {
            max_concurrent_jobs: 8,
            ..PipelineConfig::default()
        },
    );
    let warming = scheduler(&h, strategy(&["VER", "HAM", "LEC", "NOR", "PIA", "SAI"], 2));

    let report = warming.run_once(season_2024()).await.unwrap();

    assert_eq!(report.warmed, 12);
    assert!(h.upstream.peak_concurrency() <= 2);
}

#[tokio::test]
async fn overlapping_trigger_is_refused() {
    let h = build(
        StaticGateway::season_2024().with_latency(Duration::from_millis(50)),
        Arc::new(MemoryBackend::new()),
        PipelineConfig::default(),
    );
    let warming = scheduler(&h, strategy(&["VER"], 1));

    let run_id = warming.trigger(season_2024()).unwrap();
    let err = warming.trigger(season_2024()).unwrap_err();
    assert_matches!(err, WarmingError::AlreadyRunning { run_id: ref running } if *running == run_id);
    assert_eq!(
        warming.snapshot().running.map(|r| r.run_id),
        Some(run_id.clone())
    );

    for _ in 0..500 {
        if warming.snapshot().running.is_none() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let last = warming.snapshot().last_report.unwrap();
    assert_eq!(last.run_id, run_id);
    assert_eq!(last.status, WarmingStatus::Completed);
}

#[tokio::test]
async fn season_without_completed_events_reports_no_events() {
    let h = harness();
    let warming = scheduler(&h, strategy(&["VER"], 1));

    let report = warming
        .run_once(WarmingRequest::Strategy { season: Some(2031) })
        .await
        .unwrap();

    assert_eq!(report.status, WarmingStatus::NoEvents);
    assert_eq!(report.rounds_processed, 0);
}

#[tokio::test]
async fn unreachable_schedule_fails_the_run() {
    let h = harness();
    h.upstream.set_unavailable(true);
    let warming = scheduler(&h, strategy(&["VER"], 1));

    let report = warming.run_once(season_2024()).await.unwrap();

    assert_eq!(report.status, WarmingStatus::Failed);
    assert!(report.error.is_some());
    assert_eq!(warming.snapshot().last_report, Some(report));
}

#[tokio::test]
async fn targeted_run_defaults_to_every_participant_of_q_and_r() {
    let h = harness();
    let warming = scheduler(&h, strategy(&["VER"], 4));

    let report = warming
        .run_once(WarmingRequest::Target(WarmingTarget {
            season: 2024,
            event_round: 1,
            sessions: Vec::new(),
            participants: None,
        }))
        .await
        .unwrap();

    assert_eq!(report.status, WarmingStatus::Completed);
    assert_eq!(report.rounds_processed, 1);
    assert_eq!(report.warmed, 40);
    let stats = h.service.cache_stats().await.unwrap();
    assert_eq!(stats.sculpture_keys, 40);
}

#[tokio::test]
async fn targeted_run_rejects_bad_codes() {
    let h = harness();
    let warming = scheduler(&h, strategy(&["VER"], 1));

    let err = warming
        .run_once(WarmingRequest::Target(WarmingTarget {
            season: 2024,
            event_round: 1,
            sessions: vec![SessionCode::Q],
            participants: Some(vec!["V".to_string()]),
        }))
        .await
        .unwrap_err();

    assert_matches!(err, WarmingError::Invalid(_));
    assert!(warming.snapshot().running.is_none());
}

#[tokio::test]
async fn key_being_built_elsewhere_counts_as_in_flight() {
    let h = harness();
    let warming = scheduler(&h, strategy(&["VER"], 1));
    let key = ArtifactKey::single(2024, 1, SessionCode::Q, "VER").unwrap();
    let _lease = h
        .service
        .leases()
        .try_acquire(&h.cache.fingerprint(&key), &new_task_id())
        .unwrap();

    let report = warming
        .run_once(WarmingRequest::Target(WarmingTarget {
            season: 2024,
            event_round: 1,
            sessions: vec![SessionCode::Q],
            participants: Some(vec!["ver".to_string()]),
        }))
        .await
        .unwrap();

    assert_eq!(report.in_flight, 1);
    assert_eq!(report.warmed, 0);
}

#[tokio::test]
async fn missing_session_counts_as_not_in_session() {
    let h = harness();
    let warming = scheduler(&h, strategy(&["VER", "HAM"], 1));

    let report = warming
        .run_once(WarmingRequest::Target(WarmingTarget {
            season: 2024,
            event_round: 1,
            sessions: vec![SessionCode::S],
            participants: Some(vec!["VER".to_string(), "HAM".to_string()]),
        }))
        .await
        .unwrap();

    assert_eq!(report.not_in_session, 2);
    assert_eq!(report.warmed, 0);
}

#[tokio::test]
async fn periodic_loop_stops_on_cancel() {
    let h = harness();
    let warming = scheduler(&h, strategy(&["VER"], 1));
    let cancel = CancellationToken::new();

    let task = tokio::spawn({
        let warming = warming.clone();
        let cancel = cancel.clone();
        async move { warming.run(cancel).await }
    });
    cancel.cancel();

    tokio::time::timeout(Duration::from_secs(1), task)
        .await
        .unwrap()
        .unwrap();
    // The first tick is one interval out, so nothing ran.
    assert!(warming.snapshot().last_report.is_none());
}
