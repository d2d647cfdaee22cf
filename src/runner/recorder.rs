//! Trajectory and score artifacts written under a task's result
//! directory.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::env::action::Action;
use crate::env::observation::Observation;
use crate::error::RunnerError;

/// Sink for per-step episode records.
pub trait TrajectoryRecorder: Send {
    fn record_step(
        &mut self,
        step: u64,
        timestamp: &str,
        action: &Action,
        observation: Option<&Observation>,
        response: &str,
    ) -> Result<(), RunnerError>;

    fn record_end(
        &mut self,
        scores: &[(u64, f64)],
        final_step: u64,
        timestamp: &str,
    ) -> Result<(), RunnerError>;
}

#[derive(Serialize)]
struct StepRecord<'a> {
    step_num: u64,
    action_timestamp: &'a str,
    action: &'a Action,
    response: &'a str,
    screen_size: Option<(u32, u32)>,
    window: Option<Value>,
}

#[derive(Serialize)]
struct EndRecord<'a> {
    step_num: u64,
    action_timestamp: &'a str,
    scores: &'a [(u64, f64)],
}

/// Appends one JSON object per line to `traj.jsonl`.
pub struct JsonlRecorder {
    writer: BufWriter<File>,
}

impl JsonlRecorder {
    pub fn create(result_dir: &Path) -> Result<Self, RunnerError> {
        let file = File::create(result_dir.join("traj.jsonl"))?;
        Ok(Self {
            writer: BufWriter::new(file),
        })
    }

    fn write_line<T: Serialize>(&mut self, record: &T) -> Result<(), RunnerError> {
        serde_json::to_writer(&mut self.writer, record)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}

impl TrajectoryRecorder for JsonlRecorder {
    fn record_step(
        &mut self,
        step: u64,
        timestamp: &str,
        action: &Action,
        observation: Option<&Observation>,
        response: &str,
    ) -> Result<(), RunnerError> {
        let record = StepRecord {
            step_num: step,
            action_timestamp: timestamp,
            action,
            response,
            screen_size: observation.map(|o| o.frame.resolution()),
            window: observation
                .and_then(|o| o.window.as_ref())
                .and_then(|w| serde_json::to_value(w).ok()),
        };
        self.write_line(&record)
    }

    fn record_end(
        &mut self,
        scores: &[(u64, f64)],
        final_step: u64,
        timestamp: &str,
    ) -> Result<(), RunnerError> {
        let record = EndRecord {
            step_num: final_step,
            action_timestamp: timestamp,
            scores,
        };
        self.write_line(&record)
    }
}

/// Writes `result.txt` (the final score on one line) and
/// `results.json` (the `[step, score]` history) into the result
/// directory. Their presence marks the task completed for every
/// worker watching the results tree.
pub fn write_score_artifacts(
    result_dir: &Path,
    score: f64,
    scores: &[(u64, f64)],
) -> Result<(), RunnerError> {
    std::fs::write(result_dir.join("result.txt"), format!("{score}\n"))?;
    let history = serde_json::to_string(scores)?;
    std::fs::write(result_dir.join("results.json"), history)?;
    debug!(result_dir = %result_dir.display(), score, "score artifacts written");
    Ok(())
}
