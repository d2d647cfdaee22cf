//! arena-harness: a distributed benchmark execution harness for
//! desktop agent tasks.
//!
//! Workers coordinate through a shared filesystem: `scheduler` splits
//! the pending task pool into shard files and walks per-shard cursors,
//! `env` drives one virtual desktop session through a typed state
//! machine, `eval` scores finished episodes from composable getter and
//! metric specs, and `runner` wires a policy, a session, and the
//! recorders into one episode loop.

pub mod cli;
pub mod env;
pub mod error;
pub mod eval;
pub mod retry;
pub mod runner;
pub mod scheduler;

pub use error::{
    BackendError, EvalError, PolicyError, RunnerError, SchedulerError, SessionError,
};
