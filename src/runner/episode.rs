//! The episode loop: reset, predict, act, evaluate, persist.

use std::path::Path;

use async_trait::async_trait;
use chrono::Local;
use tracing::{error, info, warn};

use crate::env::backend::BackendError;
use crate::env::observation::{Frame, Observation};
use crate::env::session::EnvironmentSession;
use crate::error::{PolicyError, RunnerError, SessionError};
use crate::eval::TaskConfig;
use crate::runner::config::RunnerConfig;
use crate::runner::policy::Policy;
use crate::runner::recorder::{write_score_artifacts, TrajectoryRecorder};

/// Judges whether the first frame of an episode shows a broken initial
/// state (error dialog, missing document, wrong desktop). The concrete
/// implementation lives out of tree.
#[async_trait]
pub trait SetupInspector: Send + Sync {
    async fn has_error(&self, category: &str, frame: &Frame) -> Result<bool, RunnerError>;
}

/// Outcome of one finished episode.
#[derive(Debug, Clone)]
pub struct EpisodeReport {
    pub score: f64,
    pub steps: u64,
    pub scores: Vec<(u64, f64)>,
}

fn action_timestamp() -> String {
    Local::now().format("%Y%m%d@%H%M%S").to_string()
}

/// Tears down a half-built episode so the task stays unclaimed. The
/// result directory must not survive, or every worker would treat the
/// task as done.
fn abandon(result_dir: &Path, reason: String) -> RunnerError {
    if let Err(source) = std::fs::remove_dir_all(result_dir) {
        warn!(
            result_dir = %result_dir.display(),
            %source,
            "failed to remove result directory after setup failure"
        );
    }
    RunnerError::Setup(reason)
}

async fn predict_with_retry(
    policy: &mut dyn Policy,
    instruction: &str,
    observation: &Observation,
    config: &RunnerConfig,
) -> Result<crate::runner::policy::PolicyDecision, PolicyError> {
    let attempts = config.upstream_retry.attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match policy.predict(instruction, observation).await {
            Ok(decision) => return Ok(decision),
            Err(source) if attempt < attempts => {
                warn!(attempt, %source, "policy prediction failed, retrying");
                tokio::time::sleep(config.upstream_retry.delay).await;
            }
            Err(source) => return Err(source),
        }
    }
}

async fn inspect_with_retry(
    inspector: &dyn SetupInspector,
    category: &str,
    frame: &Frame,
    config: &RunnerConfig,
) -> Result<bool, RunnerError> {
    let attempts = config.upstream_retry.attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match inspector.has_error(category, frame).await {
            Ok(flagged) => return Ok(flagged),
            Err(source) if attempt < attempts => {
                warn!(attempt, %source, "setup inspection failed, retrying");
                tokio::time::sleep(config.upstream_retry.delay).await;
            }
            Err(source) => return Err(source),
        }
    }
}

/// Runs one task to completion: resets the session, drives the policy
/// until it signals DONE/FAIL or the step budget runs out, evaluates,
/// and writes the trajectory and score artifacts into `result_dir`.
///
/// A setup failure (a backend setup error, any reset error under
/// `check_setup`, or the inspector flagging the first frame) deletes
/// `result_dir` and returns [`RunnerError::Setup`] so the caller can
/// exit with the reserved status.
pub async fn run_episode(
    policy: &mut dyn Policy,
    session: &mut EnvironmentSession,
    inspector: Option<&dyn SetupInspector>,
    task: TaskConfig,
    category: &str,
    result_dir: &Path,
    recorder: &mut dyn TrajectoryRecorder,
    config: &RunnerConfig,
) -> Result<EpisodeReport, RunnerError> {
    let task_id = task.id.clone();
    let instruction = task.instruction.clone();
    info!(task_id = %task_id, category, "starting episode");

    policy.reset().await?;

    let mut observation = match session.reset(task).await {
        Ok(observation) => observation,
        Err(source) => {
            error!(task_id = %task_id, %source, "environment reset failed");
            // A surviving result directory would mark the task done for
            // every worker, so a failed setup must take it down. With
            // check_setup on, any reset error counts as a setup failure.
            let is_setup = matches!(source, SessionError::Backend(BackendError::Setup(_)));
            if is_setup || config.check_setup {
                return Err(abandon(result_dir, source.to_string()));
            }
            return Err(source.into());
        }
    };

    if config.check_setup
        && !config.setup_check_skip.iter().any(|c| c == category)
    {
        if let (Some(inspector), Some(obs)) = (inspector, observation.as_ref()) {
            if inspect_with_retry(inspector, category, &obs.frame, config).await? {
                error!(task_id = %task_id, category, "setup inspector flagged first frame");
                return Err(abandon(
                    result_dir,
                    format!("initial state check failed for {category}/{task_id}"),
                ));
            }
        }
    }

    // One step per prediction, however many actions the batch carries.
    let mut step: u64 = 0;
    let mut done = false;
    while !done && step < config.max_steps {
        let current = observation.take().ok_or(RunnerError::ObservationLost)?;
        let decision = predict_with_retry(policy, &instruction, &current, config).await?;
        observation = Some(current);

        for action in decision.actions {
            let timestamp = action_timestamp();
            info!(task_id = %task_id, step, %action, "executing action");
            recorder.record_step(
                step,
                &timestamp,
                &action,
                observation.as_ref(),
                &decision.response,
            )?;

            let outcome = session.step(action).await?;
            observation = outcome.observation;
            if outcome.done {
                done = true;
                break;
            }
        }
        step += 1;
    }

    let score = session.evaluate().await?;
    let scores = vec![(step, score)];
    write_score_artifacts(result_dir, score, &scores)?;
    recorder.record_end(&scores, step, &action_timestamp())?;
    info!(task_id = %task_id, score, steps = step, "episode finished");

    Ok(EpisodeReport { score, steps: step, scores })
}
