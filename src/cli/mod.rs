//! Command-line interface for arena-harness.
//!
//! Provides commands for task distribution, shard cursor advancement,
//! episode execution, and results reporting.

mod commands;

pub use commands::{parse_cli, run, run_with_cli};
