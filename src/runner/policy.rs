//! The policy boundary: turning an observation into actions.
//!
//! The real policy (visual-language-model prompting and response
//! parsing) lives out of tree behind [`Policy`]. [`ScriptedPolicy`]
//! replays pre-recorded action batches for dry runs and tests.

use std::collections::VecDeque;
use std::path::Path;

use async_trait::async_trait;

use crate::env::action::Action;
use crate::env::observation::Observation;
use crate::error::PolicyError;

/// One prediction: the policy's raw response plus the ordered actions
/// parsed from it.
#[derive(Debug, Clone)]
pub struct PolicyDecision {
    pub response: String,
    pub actions: Vec<Action>,
}

/// An automated policy driving the episode.
#[async_trait]
pub trait Policy: Send {
    /// Clears per-episode policy state.
    async fn reset(&mut self) -> Result<(), PolicyError>;

    /// Produces the next batch of actions for the current observation.
    async fn predict(
        &mut self,
        instruction: &str,
        observation: &Observation,
    ) -> Result<PolicyDecision, PolicyError>;
}

/// Replays fixed action batches in order; emits DONE once exhausted.
pub struct ScriptedPolicy {
    batches: VecDeque<Vec<Action>>,
}

impl ScriptedPolicy {
    pub fn new(batches: Vec<Vec<Action>>) -> Self {
        Self {
            batches: batches.into(),
        }
    }

    /// Loads batches from a JSON file: an array of arrays of actions.
    pub fn from_file(path: &Path) -> Result<Self, PolicyError> {
        let text = std::fs::read_to_string(path)?;
        let batches: Vec<Vec<Action>> = serde_json::from_str(&text)?;
        Ok(Self::new(batches))
    }
}

#[async_trait]
impl Policy for ScriptedPolicy {
    async fn reset(&mut self) -> Result<(), PolicyError> {
        Ok(())
    }

    async fn predict(
        &mut self,
        _instruction: &str,
        _observation: &Observation,
    ) -> Result<PolicyDecision, PolicyError> {
        let actions = self.batches.pop_front().unwrap_or_else(|| vec![Action::Done]);
        Ok(PolicyDecision {
            response: String::new(),
            actions,
        })
    }
}
