//! Shard partitioning: splits the global manifest across workers.
//!
//! Remaining tasks (those without a result directory) are cut into W
//! contiguous slices in manifest order. Contiguous rather than
//! round-robin: a worker's shard stays within neighboring categories,
//! which keeps failures easy to localize, at the cost of at most one
//! task's imbalance between shards.
//!
//! Partitioning is destructive: it wipes every shard-assignment and
//! cursor file in the scheduling directory. Invoking it while workers
//! hold live cursors discards their progress pointers, so callers must
//! only partition before a run starts.

use std::path::Path;

use tracing::{info, warn};

use crate::error::SchedulerError;

use super::manifest::{Manifest, TaskRef};
use super::{cursor_path, shard_path};

/// Result of a partition call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartitionOutcome {
    /// Every manifest task already has a result directory (or the
    /// manifest is empty). No filesystem changes were made.
    NothingToDistribute,
    /// Fresh shard and cursor files were written.
    Distributed { shards: usize, tasks: usize },
}

/// Partitions the manifest's unfinished tasks into `workers` shards.
///
/// Writes `workers` assignment files (possibly empty) and `workers`
/// empty cursor files under `scheduling_dir`, deleting whatever shard
/// and cursor files were there before.
pub fn partition(
    manifest: &Manifest,
    workers: usize,
    results_root: &Path,
    scheduling_dir: &Path,
) -> Result<PartitionOutcome, SchedulerError> {
    if workers == 0 {
        return Err(SchedulerError::NoWorkers);
    }

    let remaining: Vec<TaskRef> = manifest
        .tasks()
        .into_iter()
        .filter(|task| !task.is_completed(results_root))
        .collect();

    if remaining.is_empty() {
        info!("no unfinished tasks, nothing to distribute");
        return Ok(PartitionOutcome::NothingToDistribute);
    }

    std::fs::create_dir_all(scheduling_dir)?;
    clear_scheduling_files(scheduling_dir)?;

    // ceil(total / workers); later slices may be smaller or empty.
    let per_shard = remaining.len().div_ceil(workers);

    for shard in 1..=workers {
        let start = ((shard - 1) * per_shard).min(remaining.len());
        let end = (shard * per_shard).min(remaining.len());

        Manifest::from_tasks(&remaining[start..end]).write(&shard_path(scheduling_dir, shard))?;
        std::fs::write(cursor_path(scheduling_dir, shard), "")?;
    }

    info!(
        tasks = remaining.len(),
        shards = workers,
        scheduling_dir = %scheduling_dir.display(),
        "distributed tasks across shards"
    );

    Ok(PartitionOutcome::Distributed {
        shards: workers,
        tasks: remaining.len(),
    })
}

/// Deletes all regular files (and symlinks) in the scheduling directory.
fn clear_scheduling_files(scheduling_dir: &Path) -> Result<(), SchedulerError> {
    for entry in std::fs::read_dir(scheduling_dir)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        if file_type.is_file() || file_type.is_symlink() {
            if let Err(e) = std::fs::remove_file(entry.path()) {
                warn!(path = %entry.path().display(), error = %e, "failed to remove stale scheduling file");
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::path::PathBuf;

    use serde_json::json;

    use super::*;

    fn fixture() -> (tempfile::TempDir, PathBuf, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let results = dir.path().join("results");
        let sched = dir.path().join("scheduling");
        std::fs::create_dir_all(&results).unwrap();
        (dir, results, sched)
    }

    fn manifest() -> Manifest {
        Manifest::from_value(&json!({
            "chrome": ["t1", "t2"],
            "word": ["t3"],
            "edge": ["t4", "t5"],
        }))
        .unwrap()
    }

    fn read_shard(sched: &Path, idx: usize) -> Manifest {
        Manifest::load(&shard_path(sched, idx)).unwrap()
    }

    #[test]
    fn contiguous_split_matches_manifest_order() {
        let (_dir, results, sched) = fixture();
        let manifest = Manifest::from_value(&json!({"chrome": ["t1", "t2"], "word": ["t3"]})).unwrap();

        let outcome = partition(&manifest, 2, &results, &sched).unwrap();
        assert_eq!(outcome, PartitionOutcome::Distributed { shards: 2, tasks: 3 });

        assert_eq!(read_shard(&sched, 1).to_json(), json!({"chrome": ["t1", "t2"]}));
        assert_eq!(read_shard(&sched, 2).to_json(), json!({"word": ["t3"]}));

        // Cursor files are created empty.
        assert_eq!(std::fs::read_to_string(cursor_path(&sched, 1)).unwrap(), "");
        assert_eq!(std::fs::read_to_string(cursor_path(&sched, 2)).unwrap(), "");
    }

    #[test]
    fn coverage_without_duplicates_for_worker_grid() {
        for workers in [1usize, 2, 5] {
            let (_dir, results, sched) = fixture();
            let manifest = manifest();

            // t3 is already done and must be excluded from every shard.
            std::fs::create_dir_all(results.join("word").join("t3")).unwrap();

            partition(&manifest, workers, &results, &sched).unwrap();

            let mut seen = HashSet::new();
            let mut count = 0usize;
            for shard in 1..=workers {
                for task in read_shard(&sched, shard).tasks() {
                    assert!(seen.insert(task.clone()), "duplicate task {task}");
                    count += 1;
                }
            }
            assert_eq!(count, 4, "workers={workers}");
            assert!(!seen.contains(&TaskRef::new("word", "t3")));
        }
    }

    #[test]
    fn partitioning_is_idempotent() {
        let (_dir, results, sched) = fixture();
        let manifest = manifest();

        partition(&manifest, 2, &results, &sched).unwrap();
        let first: Vec<String> = (1..=2)
            .map(|i| std::fs::read_to_string(shard_path(&sched, i)).unwrap())
            .collect();

        partition(&manifest, 2, &results, &sched).unwrap();
        let second: Vec<String> = (1..=2)
            .map(|i| std::fs::read_to_string(shard_path(&sched, i)).unwrap())
            .collect();

        assert_eq!(first, second);
    }

    #[test]
    fn all_tasks_done_makes_no_changes() {
        let (_dir, results, sched) = fixture();
        let manifest = manifest();
        for task in manifest.tasks() {
            std::fs::create_dir_all(task.result_dir(&results)).unwrap();
        }

        let outcome = partition(&manifest, 2, &results, &sched).unwrap();
        assert_eq!(outcome, PartitionOutcome::NothingToDistribute);
        assert!(!sched.exists());
    }

    #[test]
    fn stale_files_are_wiped() {
        let (_dir, results, sched) = fixture();
        std::fs::create_dir_all(&sched).unwrap();
        std::fs::write(sched.join("shard_9.json"), "{}").unwrap();
        std::fs::write(sched.join("cursor_9.json"), "junk").unwrap();

        partition(&manifest(), 1, &results, &sched).unwrap();

        assert!(!sched.join("shard_9.json").exists());
        assert!(!sched.join("cursor_9.json").exists());
        assert!(shard_path(&sched, 1).exists());
    }

    #[test]
    fn zero_workers_is_an_error() {
        let (_dir, results, sched) = fixture();
        assert!(matches!(
            partition(&manifest(), 0, &results, &sched),
            Err(SchedulerError::NoWorkers)
        ));
    }

    #[test]
    fn more_workers_than_tasks_yields_empty_shards() {
        let (_dir, results, sched) = fixture();
        let manifest = Manifest::from_value(&json!({"chrome": ["t1"]})).unwrap();

        partition(&manifest, 3, &results, &sched).unwrap();

        assert_eq!(read_shard(&sched, 1).len(), 1);
        assert!(read_shard(&sched, 2).is_empty());
        assert!(read_shard(&sched, 3).is_empty());
    }
}
