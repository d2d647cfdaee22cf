//! Task manifest: ordered categories, ordered task ids.
//!
//! The manifest is a JSON object mapping category names to arrays of
//! task-id strings. Iteration order is the total order over tasks:
//! category in file order, then id within its category. Shard assignment
//! files use the same shape restricted to one worker's tasks.

use std::path::Path;

use serde_json::Value;
use tracing::debug;

use crate::error::SchedulerError;

/// Key of a single task: `(category, id)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskRef {
    pub category: String,
    pub id: String,
}

impl TaskRef {
    pub fn new(category: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            id: id.into(),
        }
    }

    /// The task's result directory under a results root.
    pub fn result_dir(&self, results_root: &Path) -> std::path::PathBuf {
        results_root.join(&self.category).join(&self.id)
    }

    /// Whether the task is already done. Directory existence is the sole
    /// cross-worker completion marker, regardless of content.
    pub fn is_completed(&self, results_root: &Path) -> bool {
        self.result_dir(results_root).exists()
    }
}

impl std::fmt::Display for TaskRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.category, self.id)
    }
}

/// Ordered category -> ordered task-id list. Loaded once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    entries: Vec<(String, Vec<String>)>,
}

impl Manifest {
    /// Loads a manifest from a JSON file.
    pub fn load(path: &Path) -> Result<Self, SchedulerError> {
        let text = std::fs::read_to_string(path)?;
        let value: Value = serde_json::from_str(&text)?;
        Self::from_value(&value).ok_or_else(|| SchedulerError::MalformedManifest {
            path: path.to_path_buf(),
        })
    }

    /// Builds a manifest from an in-memory JSON value.
    ///
    /// Returns `None` unless the value is an object of string arrays.
    /// Category order follows the object's key order.
    pub fn from_value(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        let mut entries = Vec::with_capacity(object.len());
        for (category, ids) in object {
            let ids = ids
                .as_array()?
                .iter()
                .map(|id| id.as_str().map(str::to_string))
                .collect::<Option<Vec<_>>>()?;
            entries.push((category.clone(), ids));
        }
        Some(Self { entries })
    }

    /// Groups a flat task list back into category -> ids form, preserving
    /// first-seen category order.
    pub fn from_tasks(tasks: &[TaskRef]) -> Self {
        let mut entries: Vec<(String, Vec<String>)> = Vec::new();
        for task in tasks {
            match entries.iter_mut().find(|(c, _)| c == &task.category) {
                Some((_, ids)) => ids.push(task.id.clone()),
                None => entries.push((task.category.clone(), vec![task.id.clone()])),
            }
        }
        Self { entries }
    }

    /// All tasks in manifest order.
    pub fn tasks(&self) -> Vec<TaskRef> {
        self.entries
            .iter()
            .flat_map(|(category, ids)| {
                ids.iter().map(move |id| TaskRef::new(category.clone(), id.clone()))
            })
            .collect()
    }

    /// Total number of tasks.
    pub fn len(&self) -> usize {
        self.entries.iter().map(|(_, ids)| ids.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Serializes to the on-disk JSON object shape.
    pub fn to_json(&self) -> Value {
        let mut object = serde_json::Map::new();
        for (category, ids) in &self.entries {
            object.insert(
                category.clone(),
                Value::Array(ids.iter().map(|id| Value::String(id.clone())).collect()),
            );
        }
        Value::Object(object)
    }

    /// Writes the manifest to a file as pretty JSON. Output is
    /// deterministic so repeated partitioning yields byte-identical files.
    pub fn write(&self, path: &Path) -> Result<(), SchedulerError> {
        let text = serde_json::to_string_pretty(&self.to_json())?;
        std::fs::write(path, text)?;
        debug!(path = %path.display(), tasks = self.len(), "wrote shard assignment");
        Ok(())
    }
}
