//! CLI command definitions for arena-harness.
//!
//! Four commands cover the worker lifecycle: `distribute` splits the
//! pending task pool into shards, `next-task` advances one shard's
//! cursor, `run` drives episodes for a shard until it is exhausted,
//! and `report` aggregates scores from the results tree.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};
use walkdir::WalkDir;

use crate::env::backend::NullBackend;
use crate::env::session::{EnvironmentSession, SessionConfig};
use crate::error::RunnerError;
use crate::eval::TaskConfig;
use crate::runner::{run_episode, JsonlRecorder, RunnerConfig, ScriptedPolicy};
use crate::scheduler::{advance, partition, CursorOutcome, Manifest, PartitionOutcome};

/// Process exit status for an environment setup failure, so an outer
/// orchestrator can distinguish "retry this task" from a crash.
const SETUP_FAILURE_EXIT: i32 = 3;

/// Distributed benchmark execution harness for desktop agent tasks.
#[derive(Parser)]
#[command(name = "arena-harness")]
#[command(about = "Distribute, execute, and score desktop benchmark tasks")]
#[command(version)]
#[command(
    long_about = "arena-harness coordinates a fleet of workers over a shared filesystem.\n\n`distribute` splits the pending tasks into per-worker shard files, `next-task` stages one task on a shard's cursor, `run` executes a shard's episodes, and `report` aggregates scores.\n\nExample usage:\n  arena-harness distribute --manifest tasks.json --workers 4\n  arena-harness run --shard-index 1"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Split the pending task pool into per-worker shard files.
    ///
    /// Prints "1" when every task already has a result directory and
    /// nothing was written, "0" after shard and cursor files were laid
    /// out.
    #[command(alias = "dist")]
    Distribute(DistributeArgs),

    /// Advance one shard's cursor to its next pending task.
    ///
    /// Prints "1" when the shard is exhausted, "0" when a task was
    /// staged on the cursor.
    #[command(name = "next-task")]
    NextTask(NextTaskArgs),

    /// Execute episodes for one shard until it is exhausted.
    Run(RunArgs),

    /// Aggregate scores from the results tree.
    Report(ReportArgs),
}

/// Arguments for `arena-harness distribute`.
#[derive(Parser, Debug)]
pub struct DistributeArgs {
    /// Path to the full task manifest (categories to task id lists).
    #[arg(short, long)]
    pub manifest: PathBuf,

    /// Number of workers to split the pending pool across.
    #[arg(short, long, env = "ARENA_WORKERS")]
    pub workers: usize,

    /// Root of the results tree used to detect completed tasks.
    #[arg(long, default_value = "./results")]
    pub results_root: PathBuf,

    /// Directory receiving shard_{i}.json and cursor_{i}.json files.
    #[arg(long, default_value = "./scheduling")]
    pub scheduling_dir: PathBuf,
}

/// Arguments for `arena-harness next-task`.
#[derive(Parser, Debug)]
pub struct NextTaskArgs {
    /// 1-based shard index of this worker.
    #[arg(short, long, env = "ARENA_SHARD")]
    pub shard_index: usize,

    /// Root of the results tree used to detect completed tasks.
    #[arg(long, default_value = "./results")]
    pub results_root: PathBuf,

    /// Directory holding shard_{i}.json and cursor_{i}.json files.
    #[arg(long, default_value = "./scheduling")]
    pub scheduling_dir: PathBuf,
}

/// Arguments for `arena-harness run`.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// 1-based shard index of this worker.
    #[arg(short, long, env = "ARENA_SHARD")]
    pub shard_index: usize,

    /// Root of the results tree.
    #[arg(long, default_value = "./results")]
    pub results_root: PathBuf,

    /// Directory holding shard_{i}.json and cursor_{i}.json files.
    #[arg(long, default_value = "./scheduling")]
    pub scheduling_dir: PathBuf,

    /// Root of the task configuration tree (tasks_root/category/id.json).
    #[arg(long, default_value = "./tasks")]
    pub tasks_root: PathBuf,

    /// Action backend for the session (structured, scripted, code_block).
    #[arg(long, default_value = "scripted")]
    pub backend: String,

    /// Observation width the policy expects.
    #[arg(long, default_value = "1920")]
    pub screen_width: u32,

    /// Observation height the policy expects.
    #[arg(long, default_value = "1080")]
    pub screen_height: u32,

    /// Step budget per episode.
    #[arg(long, default_value = "20")]
    pub max_steps: u64,

    /// Check the first frame of each episode for a broken initial state.
    #[arg(long)]
    pub check_setup: bool,

    /// Give the environment extra time to settle after setup.
    #[arg(long)]
    pub slow_boot: bool,

    /// JSON file of scripted action batches to replay instead of a live
    /// policy (an array of arrays of actions).
    #[arg(long)]
    pub script: Option<PathBuf>,

    /// Directory for per-task evaluator caches.
    #[arg(long, default_value = "./cache")]
    pub cache_root: PathBuf,
}

/// Arguments for `arena-harness report`.
#[derive(Parser, Debug)]
pub struct ReportArgs {
    /// Root of the results tree to aggregate.
    #[arg(long, default_value = "./results")]
    pub results_root: PathBuf,
}

/// Parse CLI arguments without running the command.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Distribute(args) => {
            run_distribute_command(args)?;
        }
        Commands::NextTask(args) => {
            run_next_task_command(args)?;
        }
        Commands::Run(args) => {
            run_run_command(args).await?;
        }
        Commands::Report(args) => {
            run_report_command(args)?;
        }
    }
    Ok(())
}

fn run_distribute_command(args: DistributeArgs) -> anyhow::Result<()> {
    let manifest = Manifest::load(&args.manifest)?;
    info!(
        manifest = %args.manifest.display(),
        workers = args.workers,
        tasks = manifest.len(),
        "distributing tasks"
    );

    match partition(&manifest, args.workers, &args.results_root, &args.scheduling_dir)? {
        PartitionOutcome::NothingToDistribute => {
            info!("all tasks already have results, nothing to distribute");
            println!("1");
        }
        PartitionOutcome::Distributed { shards, tasks } => {
            info!(shards, tasks, "shard files written");
            println!("0");
        }
    }
    Ok(())
}

fn run_next_task_command(args: NextTaskArgs) -> anyhow::Result<()> {
    match advance(args.shard_index, &args.scheduling_dir, &args.results_root)? {
        CursorOutcome::ShardComplete => {
            info!(shard = args.shard_index, "shard exhausted");
            println!("1");
        }
        CursorOutcome::Staged(task) => {
            info!(shard = args.shard_index, task = %task, "task staged");
            println!("0");
        }
    }
    Ok(())
}

async fn run_run_command(args: RunArgs) -> anyhow::Result<()> {
    let config = SessionConfig::new()
        .with_backend(&args.backend)
        .with_resolution(args.screen_width, args.screen_height)
        .with_cache_root(&args.cache_root)
        .with_slow_boot(args.slow_boot);
    let backend = Arc::new(NullBackend::new((args.screen_width, args.screen_height)));
    let mut session = EnvironmentSession::new(config, backend)?;
    session.connect().await?;

    let mut policy = match &args.script {
        Some(path) => ScriptedPolicy::from_file(path)?,
        None => ScriptedPolicy::new(Vec::new()),
    };
    let runner_config = RunnerConfig::new()
        .with_max_steps(args.max_steps)
        .with_check_setup(args.check_setup);

    loop {
        let task_ref = match advance(args.shard_index, &args.scheduling_dir, &args.results_root)? {
            CursorOutcome::ShardComplete => break,
            CursorOutcome::Staged(task) => task,
        };

        let config_path = args
            .tasks_root
            .join(&task_ref.category)
            .join(format!("{}.json", task_ref.id));
        let task = TaskConfig::load(&config_path)?;

        let result_dir = task_ref.result_dir(&args.results_root);
        std::fs::create_dir_all(&result_dir)?;
        let mut recorder = JsonlRecorder::create(&result_dir)?;

        let report = run_episode(
            &mut policy,
            &mut session,
            None,
            task,
            &task_ref.category,
            &result_dir,
            &mut recorder,
            &runner_config,
        )
        .await;

        match report {
            Ok(report) => {
                info!(task = %task_ref, score = report.score, steps = report.steps, "task finished");
            }
            Err(RunnerError::Setup(reason)) => {
                error!(task = %task_ref, %reason, "setup failed, exiting for retry");
                session.close().await;
                std::process::exit(SETUP_FAILURE_EXIT);
            }
            Err(source) => {
                session.close().await;
                return Err(source.into());
            }
        }
    }

    session.close().await;
    info!(shard = args.shard_index, "shard complete");
    Ok(())
}

fn run_report_command(args: ReportArgs) -> anyhow::Result<()> {
    let mut by_category: BTreeMap<String, Vec<f64>> = BTreeMap::new();

    for entry in WalkDir::new(&args.results_root)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if entry.file_type().is_file() && entry.file_name() == "result.txt" {
            match read_score(entry.path()) {
                Some((category, score)) => {
                    by_category.entry(category).or_default().push(score);
                }
                None => {
                    warn!(path = %entry.path().display(), "skipping unreadable result file");
                }
            }
        }
    }

    if by_category.is_empty() {
        println!("no results under {}", args.results_root.display());
        return Ok(());
    }

    let mut total = 0usize;
    let mut total_score = 0.0;
    for (category, scores) in &by_category {
        let sum: f64 = scores.iter().sum();
        let mean = sum / scores.len() as f64;
        println!("{category}: {}/{} passed, mean {mean:.4}", count_passed(scores), scores.len());
        total += scores.len();
        total_score += sum;
    }
    println!("overall: {total} tasks, mean {:.4}", total_score / total as f64);
    Ok(())
}

fn count_passed(scores: &[f64]) -> usize {
    scores.iter().filter(|s| **s >= 1.0).count()
}

/// Reads one `result.txt` and derives its category from the layout
/// `results_root/category/task_id/result.txt`.
fn read_score(path: &Path) -> Option<(String, f64)> {
    let score: f64 = std::fs::read_to_string(path).ok()?.trim().parse().ok()?;
    let category = path
        .parent()?
        .parent()?
        .file_name()?
        .to_string_lossy()
        .into_owned();
    Some((category, score))
}
