//! The per-episode environment session state machine.
//!
//! `Uninitialized → Ready → Configuring → Stabilizing → Observing →
//! Running → Evaluating → Closed`. One session serves one worker; within
//! an episode everything is strictly sequential: capture, dispatch and
//! scoring never overlap. All blocking points are bounded polls with a
//! fixed delay; a stalled backend stalls only this worker, up to its
//! attempt budget, after which the session proceeds degraded rather than
//! hanging.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::SessionError;
use crate::eval::{self, EvalContext, TaskConfig};
use crate::retry::{poll_until, RetryPolicy};

use super::action::Action;
use super::backend::VmBackend;
use super::dispatcher::{ActionDispatcher, BackendKind};
use super::observation::Observation;

/// Session lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Ready,
    Configuring,
    Stabilizing,
    Observing,
    Running,
    Evaluating,
    Closed,
}

impl SessionState {
    fn name(&self) -> &'static str {
        match self {
            SessionState::Uninitialized => "uninitialized",
            SessionState::Ready => "ready",
            SessionState::Configuring => "configuring",
            SessionState::Stabilizing => "stabilizing",
            SessionState::Observing => "observing",
            SessionState::Running => "running",
            SessionState::Evaluating => "evaluating",
            SessionState::Closed => "closed",
        }
    }
}

/// Configuration for an environment session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Action backend name: "structured", "scripted" or "code_block".
    pub backend: String,
    /// Resolution the policy observes and expresses coordinates in.
    pub resolution: (u32, u32),
    /// Root under which per-task cache directories are created.
    pub cache_root: PathBuf,
    /// Settle delay after task setup.
    pub settle_delay: Duration,
    /// Settle delay under the slow-boot execution mode.
    pub slow_settle_delay: Duration,
    /// Whether this run uses the slow-boot settle delay.
    pub slow_boot: bool,
    /// Pause after each action (and the WAIT sentinel's sleep).
    pub step_pause: Duration,
    /// VM readiness poll.
    pub readiness: RetryPolicy,
    /// Screenshot capture poll inside a single observation attempt.
    pub screenshot_retry: RetryPolicy,
    /// Whole-observation poll at reset and after every step.
    pub observation_retry: RetryPolicy,
    /// Capture the accessibility tree with each observation.
    pub require_a11y_tree: bool,
    /// Capture terminal output with each observation.
    pub require_terminal: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            backend: "structured".to_string(),
            resolution: (1280, 720),
            cache_root: PathBuf::from("cache"),
            settle_delay: Duration::from_secs(60),
            slow_settle_delay: Duration::from_secs(360),
            slow_boot: false,
            step_pause: Duration::from_millis(500),
            readiness: RetryPolicy::new(20, Duration::from_secs(5)),
            screenshot_retry: RetryPolicy::new(20, Duration::from_secs(1)),
            observation_retry: RetryPolicy::new(30, Duration::from_secs(15)),
            require_a11y_tree: true,
            require_terminal: false,
        }
    }
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_backend(mut self, backend: impl Into<String>) -> Self {
        self.backend = backend.into();
        self
    }

    pub fn with_resolution(mut self, width: u32, height: u32) -> Self {
        self.resolution = (width, height);
        self
    }

    pub fn with_cache_root(mut self, cache_root: impl Into<PathBuf>) -> Self {
        self.cache_root = cache_root.into();
        self
    }

    pub fn with_slow_boot(mut self, slow_boot: bool) -> Self {
        self.slow_boot = slow_boot;
        self
    }

    pub fn with_step_pause(mut self, pause: Duration) -> Self {
        self.step_pause = pause;
        self
    }

    pub fn with_settle_delays(mut self, normal: Duration, slow: Duration) -> Self {
        self.settle_delay = normal;
        self.slow_settle_delay = slow;
        self
    }

    pub fn with_retries(
        mut self,
        readiness: RetryPolicy,
        screenshot: RetryPolicy,
        observation: RetryPolicy,
    ) -> Self {
        self.readiness = readiness;
        self.screenshot_retry = screenshot;
        self.observation_retry = observation;
        self
    }
}

/// Result of one `step` call.
#[derive(Debug, Clone)]
pub struct StepOutcome {
    /// The fresh observation, or `None` when capture degraded.
    pub observation: Option<Observation>,
    /// Whether the episode terminated (FAIL or DONE sentinel).
    pub done: bool,
    /// Distinguishes FAIL (`true`) from DONE (`false`) terminations.
    pub failed: bool,
}

/// Episode state machine over one VM backend.
pub struct EnvironmentSession {
    config: SessionConfig,
    backend: Arc<dyn VmBackend>,
    dispatcher: ActionDispatcher,
    state: SessionState,
    native: (u32, u32),
    episode: u64,
    step_no: u64,
    history: Vec<Action>,
    task: Option<TaskConfig>,
    cache_dir: PathBuf,
}

impl std::fmt::Debug for EnvironmentSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvironmentSession")
            .field("config", &self.config)
            .field("state", &self.state)
            .field("native", &self.native)
            .field("episode", &self.episode)
            .field("step_no", &self.step_no)
            .field("history", &self.history)
            .field("task", &self.task)
            .field("cache_dir", &self.cache_dir)
            .finish_non_exhaustive()
    }
}

impl EnvironmentSession {
    /// Creates a session over a backend.
    ///
    /// The backend *kind* (action vocabulary) is parsed here; an unknown
    /// name fails construction and is never retried.
    pub fn new(config: SessionConfig, backend: Arc<dyn VmBackend>) -> Result<Self, SessionError> {
        let kind: BackendKind = config.backend.parse()?;
        let dispatcher = ActionDispatcher::new(kind, Arc::clone(&backend));
        let cache_dir = config.cache_root.clone();
        Ok(Self {
            config,
            backend,
            dispatcher,
            state: SessionState::Uninitialized,
            native: (0, 0),
            episode: 0,
            step_no: 0,
            history: Vec::new(),
            task: None,
            cache_dir,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.dispatcher.kind()
    }

    pub fn episode_index(&self) -> u64 {
        self.episode
    }

    pub fn step_index(&self) -> u64 {
        self.step_no
    }

    pub fn history(&self) -> &[Action] {
        &self.history
    }

    pub fn task(&self) -> Option<&TaskConfig> {
        self.task.as_ref()
    }

    pub fn cache_dir(&self) -> &std::path::Path {
        &self.cache_dir
    }

    fn expect_state(&self, allowed: &[SessionState], to: SessionState) -> Result<(), SessionError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(SessionError::InvalidTransition {
                from: self.state.name().to_string(),
                to: to.name().to_string(),
            })
        }
    }

    /// Connects to the backend and caches its native resolution.
    pub async fn connect(&mut self) -> Result<(), SessionError> {
        self.expect_state(&[SessionState::Uninitialized], SessionState::Ready)?;

        let ready = poll_until(self.config.readiness, || async {
            self.backend.probe().await.then_some(())
        })
        .await;
        if ready.is_none() {
            // Degraded, not fatal: the next capture poll decides.
            warn!("VM did not report ready within the readiness budget, proceeding");
        }

        self.native = self.backend.native_resolution().await?;
        self.state = SessionState::Ready;
        info!(
            native_width = self.native.0,
            native_height = self.native.1,
            backend = %self.dispatcher.kind(),
            "session connected"
        );
        Ok(())
    }

    /// Starts a new episode for `task` and returns the first observation.
    pub async fn reset(&mut self, task: TaskConfig) -> Result<Option<Observation>, SessionError> {
        self.expect_state(
            &[SessionState::Ready, SessionState::Running, SessionState::Evaluating],
            SessionState::Configuring,
        )?;
        self.state = SessionState::Configuring;

        self.episode += 1;
        self.step_no = 0;
        self.history.clear();
        info!(episode = self.episode, task_id = %task.id, "resetting environment");

        // The VM may still be settling from the previous episode.
        let ready = poll_until(self.config.readiness, || async {
            self.backend.probe().await.then_some(())
        })
        .await;
        if ready.is_none() {
            warn!("VM not ready before setup, proceeding");
        }

        self.cache_dir = self.config.cache_root.join(&task.id);
        if self.cache_dir.exists() {
            tokio::fs::remove_dir_all(&self.cache_dir).await?;
        }
        tokio::fs::create_dir_all(&self.cache_dir).await?;

        self.backend.apply_setup(&task.config).await?;
        self.task = Some(task);

        self.state = SessionState::Stabilizing;
        let settle = if self.config.slow_boot {
            self.config.slow_settle_delay
        } else {
            self.config.settle_delay
        };
        debug!(settle_secs = settle.as_secs(), "letting the VM settle");
        tokio::time::sleep(settle).await;

        self.state = SessionState::Observing;
        let observation = self.observe().await;
        if observation.is_none() {
            warn!("initial observation degraded to null");
        }

        self.state = SessionState::Running;
        Ok(observation)
    }

    /// Executes one action and returns the post-action observation.
    pub async fn step(&mut self, action: Action) -> Result<StepOutcome, SessionError> {
        self.expect_state(&[SessionState::Running], SessionState::Running)?;

        self.step_no += 1;
        self.history.push(action.clone());
        debug!(step = self.step_no, action = %action, "executing step");

        let mut done = false;
        let mut failed = false;
        match &action {
            Action::Wait => tokio::time::sleep(self.config.step_pause).await,
            Action::Fail => {
                done = true;
                failed = true;
            }
            Action::Done => done = true,
            other => {
                self.dispatcher
                    .dispatch(other, self.config.resolution, self.native)
                    .await?
            }
        }

        // Give the VM a moment before capturing the next observation.
        tokio::time::sleep(self.config.step_pause).await;

        self.state = SessionState::Observing;
        let observation = self.observe().await;
        self.state = SessionState::Running;

        Ok(StepOutcome {
            observation,
            done,
            failed,
        })
    }

    /// Scores the finished episode with the task's evaluator.
    pub async fn evaluate(&mut self) -> Result<f64, SessionError> {
        self.expect_state(&[SessionState::Running], SessionState::Evaluating)?;
        let task = self.task.as_ref().ok_or(SessionError::NoTask)?;
        self.state = SessionState::Evaluating;

        let ctx = EvalContext {
            backend: &self.backend,
            cache_dir: &self.cache_dir,
            history: &self.history,
        };
        let score = eval::evaluate(&task.evaluator, &ctx).await?;
        info!(episode = self.episode, score, "episode evaluated");
        Ok(score)
    }

    /// Closes the session. Terminal: no further transitions.
    pub async fn close(&mut self) {
        info!(episodes = self.episode, "closing session");
        self.state = SessionState::Closed;
    }

    /// Bounded-retry observation capture.
    ///
    /// A null frame triggers a fixed-interval retry up to the attempt
    /// cap; exhaustion yields `None` rather than an error; the caller
    /// decides whether a degraded observation aborts the episode.
    async fn observe(&self) -> Option<Observation> {
        poll_until(self.config.observation_retry, || self.capture_once()).await
    }

    /// One observation attempt: mandatory frame, optional aux signals.
    async fn capture_once(&self) -> Option<Observation> {
        let frame = poll_until(self.config.screenshot_retry, || async {
            match self.backend.capture_screenshot().await {
                Ok(frame) => frame,
                Err(e) => {
                    debug!(error = %e, "screenshot capture failed");
                    None
                }
            }
        })
        .await?;
        let frame = frame.resize(self.config.resolution.0, self.config.resolution.1);

        // Auxiliary signals are independently optional: failure to
        // capture one does not invalidate the observation.
        let accessibility_tree = if self.config.require_a11y_tree {
            self.backend
                .capture_accessibility_tree()
                .await
                .unwrap_or_else(|e| {
                    debug!(error = %e, "accessibility tree capture failed");
                    None
                })
        } else {
            None
        };
        let terminal = if self.config.require_terminal {
            self.backend.capture_terminal().await.unwrap_or_else(|e| {
                debug!(error = %e, "terminal capture failed");
                None
            })
        } else {
            None
        };
        let window = self.backend.capture_window_state().await.unwrap_or_else(|e| {
            debug!(error = %e, "window state capture failed");
            None
        });

        Some(Observation {
            frame,
            accessibility_tree,
            terminal,
            window,
        })
    }
}
