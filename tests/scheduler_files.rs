//! End-to-end coordination flow over a shared filesystem: distribute a
//! manifest into shards, walk a shard's cursor, run episodes, and
//! observe completed tasks disappear from the pending pool.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tempfile::TempDir;

use arena_harness::env::{EnvironmentSession, NullBackend, SessionConfig};
use arena_harness::eval::TaskConfig;
use arena_harness::retry::RetryPolicy;
use arena_harness::runner::{run_episode, JsonlRecorder, RunnerConfig, ScriptedPolicy};
use arena_harness::scheduler::{
    advance, cursor_path, partition, shard_path, CursorOutcome, Manifest, PartitionOutcome,
};

struct Fixture {
    _dir: TempDir,
    results_root: std::path::PathBuf,
    scheduling_dir: std::path::PathBuf,
    cache_root: std::path::PathBuf,
}

fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let results_root = dir.path().join("results");
    let scheduling_dir = dir.path().join("scheduling");
    let cache_root = dir.path().join("cache");
    std::fs::create_dir_all(&results_root).unwrap();
    Fixture {
        results_root,
        scheduling_dir,
        cache_root,
        _dir: dir,
    }
}

fn manifest() -> Manifest {
    Manifest::from_value(&json!({
        "chrome": ["t1", "t2"],
        "word": ["t3"]
    }))
    .unwrap()
}

fn task_config(id: &str, passes: bool) -> TaskConfig {
    let expected = if passes { "open" } else { "closed" };
    TaskConfig::from_value(&json!({
        "id": id,
        "instruction": "verify the document state",
        "config": [],
        "evaluator": {
            "func": "exact_match",
            "result": {"type": "rule", "value": "open"},
            "expected": {"type": "rule", "value": expected}
        }
    }))
    .unwrap()
}

fn session(cache_root: &Path) -> EnvironmentSession {
    let config = SessionConfig::new()
        .with_backend("scripted")
        .with_resolution(64, 48)
        .with_cache_root(cache_root.to_path_buf())
        .with_step_pause(Duration::ZERO)
        .with_settle_delays(Duration::ZERO, Duration::ZERO)
        .with_retries(RetryPolicy::once(), RetryPolicy::once(), RetryPolicy::once());
    EnvironmentSession::new(config, Arc::new(NullBackend::new((64, 48)))).unwrap()
}

#[test]
fn distribute_then_stage_covers_every_task() {
    let fx = fixture();
    let outcome = partition(&manifest(), 2, &fx.results_root, &fx.scheduling_dir).unwrap();
    assert!(matches!(
        outcome,
        PartitionOutcome::Distributed { shards: 2, tasks: 3 }
    ));
    assert!(shard_path(&fx.scheduling_dir, 1).exists());
    assert!(cursor_path(&fx.scheduling_dir, 2).exists());

    // Walking both shards visits all three tasks exactly once.
    let mut seen = Vec::new();
    for shard in 1..=2 {
        loop {
            match advance(shard, &fx.scheduling_dir, &fx.results_root).unwrap() {
                CursorOutcome::ShardComplete => break,
                CursorOutcome::Staged(task) => {
                    seen.push(task.to_string());
                    // Mark it done so the next advance moves on.
                    std::fs::create_dir_all(task.result_dir(&fx.results_root)).unwrap();
                }
            }
        }
    }
    seen.sort();
    assert_eq!(seen, vec!["chrome/t1", "chrome/t2", "word/t3"]);
}

#[test]
fn completed_tasks_are_never_redistributed() {
    let fx = fixture();
    std::fs::create_dir_all(fx.results_root.join("chrome/t1")).unwrap();
    std::fs::create_dir_all(fx.results_root.join("chrome/t2")).unwrap();
    std::fs::create_dir_all(fx.results_root.join("word/t3")).unwrap();

    let outcome = partition(&manifest(), 2, &fx.results_root, &fx.scheduling_dir).unwrap();
    assert!(matches!(outcome, PartitionOutcome::NothingToDistribute));
    assert!(!fx.scheduling_dir.join("shard_1.json").exists());
}

#[tokio::test]
async fn shard_worker_runs_staged_tasks_to_completion() {
    let fx = fixture();
    partition(&manifest(), 1, &fx.results_root, &fx.scheduling_dir).unwrap();

    let mut session = session(&fx.cache_root);
    session.connect().await.unwrap();
    let runner_config = RunnerConfig::default().with_max_steps(5);

    let mut finished = 0;
    loop {
        let task_ref = match advance(1, &fx.scheduling_dir, &fx.results_root).unwrap() {
            CursorOutcome::ShardComplete => break,
            CursorOutcome::Staged(task) => task,
        };

        let result_dir = task_ref.result_dir(&fx.results_root);
        std::fs::create_dir_all(&result_dir).unwrap();
        let mut recorder = JsonlRecorder::create(&result_dir).unwrap();
        let mut policy = ScriptedPolicy::new(vec![vec![
            arena_harness::env::Action::Scripted("click(10, 10)".into()),
            arena_harness::env::Action::Done,
        ]]);

        run_episode(
            &mut policy,
            &mut session,
            None,
            task_config(&task_ref.id, task_ref.category == "chrome"),
            &task_ref.category,
            &result_dir,
            &mut recorder,
            &runner_config,
        )
        .await
        .unwrap();

        assert!(result_dir.join("result.txt").exists());
        assert!(result_dir.join("traj.jsonl").exists());
        finished += 1;
    }

    assert_eq!(finished, 3);

    // Every task now has a result, so a fresh distribution is a no-op.
    let outcome = partition(&manifest(), 1, &fx.results_root, &fx.scheduling_dir).unwrap();
    assert!(matches!(outcome, PartitionOutcome::NothingToDistribute));

    // Scores reflect the per-task evaluator specs.
    let chrome = std::fs::read_to_string(fx.results_root.join("chrome/t1/result.txt")).unwrap();
    assert_eq!(chrome.trim(), "1");
    let word = std::fs::read_to_string(fx.results_root.join("word/t3/result.txt")).unwrap();
    assert_eq!(word.trim(), "0");
}

#[tokio::test]
async fn interrupted_worker_resumes_from_cursor() {
    let fx = fixture();
    partition(&manifest(), 1, &fx.results_root, &fx.scheduling_dir).unwrap();

    // First claim stages chrome/t1.
    let first = advance(1, &fx.scheduling_dir, &fx.results_root).unwrap();
    let CursorOutcome::Staged(task) = first else {
        panic!("expected a staged task");
    };
    assert_eq!(task.to_string(), "chrome/t1");

    // The worker dies without finishing. A restarted worker re-reads
    // the cursor and, since no result exists, gets the next pending
    // task after the crashed one.
    let second = advance(1, &fx.scheduling_dir, &fx.results_root).unwrap();
    let CursorOutcome::Staged(task) = second else {
        panic!("expected a staged task");
    };
    assert_eq!(task.to_string(), "chrome/t2");
}
