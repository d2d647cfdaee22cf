//! File-coordinated distributed task scheduling.
//!
//! Workers never share memory or a lock service: all scheduling state
//! lives in per-shard JSON files under a scheduling directory, plus the
//! results root whose per-task directory existence is the "task done"
//! marker. [`partition`](partition::partition) splits the global manifest
//! into contiguous per-worker shards before a run; [`advance`](cursor::advance)
//! stages the next unattempted task for one shard, once per attempt.
//!
//! Correctness requires the caller to assign each shard index to exactly
//! one live worker for the run's duration; there is no exclusive-lock
//! discipline against two workers racing the same shard.

pub mod cursor;
pub mod manifest;
pub mod partition;

use std::path::{Path, PathBuf};

pub use cursor::{advance, CursorOutcome};
pub use manifest::{Manifest, TaskRef};
pub use partition::{partition, PartitionOutcome};

/// Path of the shard assignment file for a 1-based shard index.
pub fn shard_path(scheduling_dir: &Path, shard_index: usize) -> PathBuf {
    scheduling_dir.join(format!("shard_{shard_index}.json"))
}

/// Path of the cursor file for a 1-based shard index.
pub fn cursor_path(scheduling_dir: &Path, shard_index: usize) -> PathBuf {
    scheduling_dir.join(format!("cursor_{shard_index}.json"))
}
