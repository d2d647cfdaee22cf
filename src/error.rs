//! Error types for harness operations.
//!
//! Defines error types for the major subsystems:
//! - Task scheduling (shard partitioning and cursor advancement)
//! - Environment sessions and action dispatch
//! - Backend communication
//! - Evaluator composition and scoring
//! - Episode running and external collaborators

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while partitioning tasks or advancing a shard cursor.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The cursor file names a task that is not present in its shard
    /// assignment. The two files were generated from different manifests;
    /// the worker must abort rather than guess.
    #[error("cursor task '{category}/{id}' not found in shard {shard} assignment")]
    InvariantViolation {
        shard: usize,
        category: String,
        id: String,
    },

    #[error("manifest '{path}' is not a JSON object of category -> task-id arrays")]
    MalformedManifest { path: PathBuf },

    #[error("worker count must be at least 1")]
    NoWorkers,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised by a VM automation backend.
///
/// Concrete backends live out of tree; this is the error surface the
/// harness requires of them.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("action execution failed: {0}")]
    Execution(String),

    #[error("capture failed: {0}")]
    Capture(String),

    #[error("setup step failed: {0}")]
    Setup(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur inside an environment session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Unknown backend name at session construction. Never raised at
    /// call time: the backend is fixed for the session's lifetime.
    #[error("unknown action backend '{0}': expected 'structured', 'scripted' or 'code_block'")]
    UnknownBackend(String),

    #[error("invalid session transition from '{from}' to '{to}'")]
    InvalidTransition { from: String, to: String },

    /// The dispatched action payload does not match the session's backend.
    #[error("action '{action}' is not executable on the '{backend}' backend")]
    ActionNotSupported { backend: String, action: String },

    #[error("no task loaded in session")]
    NoTask,

    #[error("invalid frame: {0}")]
    BadFrame(String),

    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("evaluation error: {0}")]
    Eval(#[from] EvalError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur while parsing or applying an evaluator spec.
#[derive(Debug, Error)]
pub enum EvalError {
    #[error("unknown metric '{0}'")]
    UnknownMetric(String),

    #[error("unknown getter type '{0}'")]
    UnknownGetter(String),

    /// Structural defect in the evaluator spec, e.g. list forms whose
    /// func/result/expected/options lengths disagree.
    #[error("malformed evaluator spec: {0}")]
    SpecShape(String),

    /// An artifact the getter needs does not exist. Recoverable: the
    /// engine scores the affected metric 0 instead of crashing.
    #[error("resource missing: {0}")]
    ResourceMissing(String),

    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised by a policy collaborator.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// Flaky upstream call (model endpoint, transport). Retried a fixed
    /// small number of times before escalating.
    #[error("upstream policy call failed: {0}")]
    Upstream(String),

    #[error("failed to parse policy response: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors that can occur while driving a full episode.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// Environment setup failed or the setup inspector flagged the first
    /// frame. The task's result directory has been deleted; the CLI maps
    /// this to a reserved exit status so an orchestrator can retry the
    /// task cleanly.
    #[error("environment setup failed: {0}")]
    Setup(String),

    /// Observation degraded to null mid-episode; the policy cannot act.
    #[error("observation unavailable after bounded retries")]
    ObservationLost,

    #[error("setup inspector error: {0}")]
    Inspector(String),

    #[error("policy error: {0}")]
    Policy(#[from] PolicyError),

    #[error("session error: {0}")]
    Session(#[from] SessionError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
