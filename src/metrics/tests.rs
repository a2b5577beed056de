//! Tests for the aggregation actor and its persistence.

use super::*;
use crate::heal::{StageName, StageSet};
use crate::prompt::PromptVariant;
use crate::sandbox::ValidationScores;
use proptest::prelude::*;
use std::collections::HashMap;
use std::time::Duration;
use tempfile::TempDir;

fn key(variant: PromptVariant, stages: &str) -> ArmKey {
    ArmKey {
        variant,
        stages: StageSet::parse(stages).unwrap(),
    }
}

fn success(id: &str, key: ArmKey, repairs: u32) -> GenerationAttempt {
    let mut attempt = GenerationAttempt::new(id, "add", key.to_string(), key);
    attempt.repair_count = Some(repairs);
    attempt.succeed(ValidationScores::new(Some(true), true));
    attempt.finish(Duration::from_millis(20))
}

fn unrecoverable(id: &str, key: ArmKey) -> GenerationAttempt {
    let mut attempt = GenerationAttempt::new(id, "add", key.to_string(), key);
    attempt.mark_unrecoverable(format!("{}: still unparsable", StageName::StructuralRepair));
    attempt.finish(Duration::from_millis(20))
}

#[tokio::test]
async fn test_recording_is_idempotent_per_attempt_id() {
    let recorder = MetricsRecorder::spawn("run", None);
    let handle = recorder.handle();
    let arm = key(PromptVariant::Bare, "all");

    assert!(handle.record(success("a", arm, 1)).await.unwrap());
    assert!(!handle.record(success("a", arm, 1)).await.unwrap());

    let snapshot = recorder.shutdown().await.unwrap();
    assert_eq!(snapshot.records.len(), 1);
    assert_eq!(snapshot.records[0].attempts, 1);
}

#[tokio::test]
async fn test_unrecoverable_attempt_moves_attempts_only() {
    let temp = TempDir::new().unwrap();
    let store = MetricsStore::create(temp.path(), "run").unwrap();
    let recorder = MetricsRecorder::spawn("run", Some(store.clone()));
    let handle = recorder.handle();
    let arm = key(PromptVariant::ContractAnnotated, "all");

    handle.record(success("ok-1", arm, 2)).await.unwrap();
    let before = handle.snapshot().await.unwrap().records[0].clone();

    handle.record(unrecoverable("bad-1", arm)).await.unwrap();
    drop(handle);
    let after = recorder.shutdown().await.unwrap().records[0].clone();

    assert_eq!(after.attempts, before.attempts + 1);
    assert_eq!(after.successes, before.successes);
    assert_eq!(after.unrecoverable, 1);
    assert_eq!(after.mean_repair_count, before.mean_repair_count);

    let persisted = store.load_snapshot().unwrap();
    assert_eq!(persisted.records[0].attempts, 2);
    let attempts = store.load_attempts().unwrap();
    assert_eq!(attempts.len(), 2);
    assert_eq!(attempts[1].status, AttemptStatus::Unrecoverable);
}

#[tokio::test]
async fn test_concurrent_workers_lose_no_updates() {
    let recorder = MetricsRecorder::spawn("run", None);
    let arms = [
        key(PromptVariant::Bare, "none"),
        key(PromptVariant::ContractAnnotated, "1-3"),
    ];

    let mut tasks = Vec::new();
    for i in 0..100 {
        let handle = recorder.handle();
        let arm = arms[i % 2];
        tasks.push(tokio::spawn(async move {
            handle.record(success(&format!("attempt-{}", i), arm, 1)).await.unwrap()
        }));
    }
    for task in tasks {
        assert!(task.await.unwrap());
    }

    let snapshot = recorder.shutdown().await.unwrap();
    assert_eq!(snapshot.total_attempts(), 100);
    for record in &snapshot.records {
        assert_eq!(record.attempts, 50);
    }
}

#[tokio::test]
async fn test_records_after_shutdown_are_rejected() {
    let recorder = MetricsRecorder::spawn("run", None);
    let handle = recorder.handle();
    let arm = key(PromptVariant::Bare, "all");
    handle.record(success("a", arm, 0)).await.unwrap();

    let snapshot = recorder.shutdown().await.unwrap();
    assert_eq!(snapshot.total_attempts(), 1);

    let err = handle.record(success("b", arm, 0)).await.unwrap_err();
    assert_eq!(err, MetricsError::Closed);
    assert_eq!(handle.snapshot().await.unwrap_err(), MetricsError::Closed);
}

#[tokio::test]
async fn test_persist_failure_is_reported_and_not_counted() {
    let temp = TempDir::new().unwrap();
    let store = MetricsStore::create(temp.path(), "run").unwrap();
    // A directory where the attempts file should be makes appends fail.
    std::fs::create_dir(store.attempts_path()).unwrap();

    let recorder = MetricsRecorder::spawn("run", Some(store));
    let handle = recorder.handle();
    let err = handle
        .record(success("a", key(PromptVariant::Bare, "all"), 0))
        .await
        .unwrap_err();
    assert!(matches!(err, MetricsError::Persist { .. }));

    drop(handle);
    assert!(recorder.shutdown().await.unwrap().records.is_empty());
}

fn variant() -> impl Strategy<Value = PromptVariant> {
    prop::sample::select(PromptVariant::ALL.to_vec())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_attempt_counts_match_dispatch(
        dispatched in prop::collection::vec((variant(), any::<bool>(), any::<bool>()), 0..40)
    ) {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .unwrap();

        let snapshot = runtime.block_on(async {
            let recorder = MetricsRecorder::spawn("prop", None);
            let mut tasks = Vec::new();
            for (i, (variant, healed, resend)) in dispatched.iter().copied().enumerate() {
                let handle = recorder.handle();
                let arm = key(variant, "all");
                tasks.push(tokio::spawn(async move {
                    let id = format!("attempt-{}", i);
                    let attempt = if healed { success(&id, arm, 1) } else { unrecoverable(&id, arm) };
                    if resend {
                        handle.record(attempt.clone()).await.unwrap();
                    }
                    handle.record(attempt).await.unwrap();
                }));
            }
            for task in tasks {
                task.await.unwrap();
            }
            recorder.shutdown().await.unwrap()
        });

        let mut expected: HashMap<PromptVariant, u64> = HashMap::new();
        for (variant, _, _) in &dispatched {
            *expected.entry(*variant).or_default() += 1;
        }
        for record in &snapshot.records {
            prop_assert_eq!(Some(&record.attempts), expected.get(&record.key.variant));
        }
        prop_assert_eq!(snapshot.total_attempts(), dispatched.len() as u64);
    }
}
