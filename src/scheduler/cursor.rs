//! Per-shard resumable cursor over the shard's task list.
//!
//! The cursor file holds the single task a worker is (or was last)
//! attempting. One call to [`advance`] per task attempt: it loads the
//! shard assignment, finds the entry after the persisted cursor, skips
//! tasks whose result directory already exists (crash recovery), and
//! rewrites the cursor file with the staged task. A missing or malformed
//! cursor file means "start of shard", never an error.

use std::path::Path;

use serde_json::Value;
use tracing::{info, warn};

use crate::error::SchedulerError;

use super::manifest::{Manifest, TaskRef};
use super::{cursor_path, shard_path};

/// Result of advancing a shard's cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CursorOutcome {
    /// Every task in the shard has been attempted or completed. The
    /// cursor file is left untouched.
    ShardComplete,
    /// The next unfinished task, now persisted as the shard's cursor.
    Staged(TaskRef),
}

/// Advances the cursor of the 1-based `shard_index` shard.
///
/// All cross-invocation state lives in the shard's two files; this call
/// holds nothing in memory between attempts.
pub fn advance(
    shard_index: usize,
    scheduling_dir: &Path,
    results_root: &Path,
) -> Result<CursorOutcome, SchedulerError> {
    let assignment = Manifest::load(&shard_path(scheduling_dir, shard_index))?;
    let tasks = assignment.tasks();
    if tasks.is_empty() {
        return Ok(CursorOutcome::ShardComplete);
    }

    let cursor_file = cursor_path(scheduling_dir, shard_index);
    let mut candidate = match read_cursor(&cursor_file) {
        None => 0,
        Some(cursor) => {
            let position = tasks.iter().position(|t| *t == cursor).ok_or_else(|| {
                SchedulerError::InvariantViolation {
                    shard: shard_index,
                    category: cursor.category.clone(),
                    id: cursor.id.clone(),
                }
            })?;
            if position == tasks.len() - 1 {
                info!(shard = shard_index, "cursor at last task, shard complete");
                return Ok(CursorOutcome::ShardComplete);
            }
            position + 1
        }
    };

    // Crash-recovery skip: a completed task's result directory already
    // exists even though our cursor never pointed at it.
    while tasks[candidate].is_completed(results_root) {
        candidate += 1;
        if candidate == tasks.len() {
            info!(shard = shard_index, "all remaining tasks completed, shard complete");
            return Ok(CursorOutcome::ShardComplete);
        }
    }

    let staged = tasks[candidate].clone();
    write_cursor(&cursor_file, &staged)?;
    info!(shard = shard_index, task = %staged, "staged next task");
    Ok(CursorOutcome::Staged(staged))
}

/// Reads the persisted cursor task, if any.
///
/// Unreadable or malformed content (including anything other than a
/// single category with a single id) is treated as "no cursor yet".
pub fn read_cursor(path: &Path) -> Option<TaskRef> {
    let text = std::fs::read_to_string(path).ok()?;
    let value: Value = match serde_json::from_str(&text) {
        Ok(value) => value,
        Err(_) => {
            if !text.trim().is_empty() {
                warn!(path = %path.display(), "malformed cursor file, starting from shard beginning");
            }
            return None;
        }
    };

    let manifest = Manifest::from_value(&value)?;
    let tasks = manifest.tasks();
    match tasks.as_slice() {
        [task] => Some(task.clone()),
        [] => None,
        _ => {
            warn!(path = %path.display(), count = tasks.len(), "cursor file holds more than one task, ignoring");
            None
        }
    }
}

fn write_cursor(path: &Path, task: &TaskRef) -> Result<(), SchedulerError> {
    Manifest::from_tasks(std::slice::from_ref(task))
        .write(path)
        .map_err(Into::into)
}
