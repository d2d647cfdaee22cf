//! Episode running: drives one policy against one session for one task,
//! records the trajectory and persists the score artifacts.

pub mod config;
pub mod episode;
pub mod policy;
pub mod recorder;

pub use config::RunnerConfig;
pub use episode::{run_episode, EpisodeReport, SetupInspector};
pub use policy::{Policy, PolicyDecision, ScriptedPolicy};
pub use recorder::{write_score_artifacts, JsonlRecorder, TrajectoryRecorder};
