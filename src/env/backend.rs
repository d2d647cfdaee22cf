//! Capability surface required from the VM automation backend.
//!
//! Concrete backends (HTTP automation servers, hypervisor bridges) live
//! out of tree. The harness only depends on this trait; [`NullBackend`]
//! is the in-tree stand-in for dry runs and tests.

use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use crate::error::BackendError;

use super::action::StructuredAction;
use super::observation::{Frame, WindowState};

/// One declarative setup step applied to the VM before an episode (or,
/// as `postconfig`, before evaluation). Interpreted by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetupStep {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub parameters: serde_json::Value,
}

/// Asynchronous VM automation capabilities.
///
/// Capture methods return `Ok(None)` when the signal is currently
/// unavailable; the session's bounded-retry observation protocol decides
/// how long to keep asking.
#[async_trait]
pub trait VmBackend: Send + Sync {
    /// Health check. `true` once the VM accepts automation calls.
    async fn probe(&self) -> bool;

    /// The VM's native screen resolution.
    async fn native_resolution(&self) -> Result<(u32, u32), BackendError>;

    /// Captures a native-resolution screenshot.
    async fn capture_screenshot(&self) -> Result<Option<Frame>, BackendError>;

    /// Captures the UI accessibility tree, serialized.
    async fn capture_accessibility_tree(&self) -> Result<Option<String>, BackendError>;

    /// Captures recent terminal output.
    async fn capture_terminal(&self) -> Result<Option<String>, BackendError>;

    /// Captures foreground-window metadata, clipboard and pending human
    /// input in one call.
    async fn capture_window_state(&self) -> Result<Option<WindowState>, BackendError>;

    /// Executes one semantic action.
    async fn execute_structured(&self, action: &StructuredAction) -> Result<(), BackendError>;

    /// Executes a backend-native scripted command string.
    async fn execute_scripted(&self, command: &str) -> Result<(), BackendError>;

    /// Executes an opaque multi-line command, returning its stdout.
    async fn execute_code_block(&self, command: &str) -> Result<String, BackendError>;

    /// Applies a list of declarative setup steps.
    async fn apply_setup(&self, steps: &[SetupStep]) -> Result<(), BackendError>;
}

/// Record of a call the null backend received. Tests assert on these.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    Structured(StructuredAction),
    Scripted(String),
    CodeBlock(String),
    Setup(Vec<SetupStep>),
}

/// No-op backend producing synthetic frames at a fixed native
/// resolution.
///
/// Lets the harness be exercised end to end without a VM: `run --backend
/// scripted` dry runs, and every session/evaluator test. Executed calls
/// are recorded for inspection.
pub struct NullBackend {
    native: (u32, u32),
    /// Screenshot captures to fail (return `None`) before succeeding.
    flaky_captures: Mutex<u32>,
    code_block_output: String,
    setup_failure: Option<SetupFailure>,
    calls: Mutex<Vec<BackendCall>>,
}

enum SetupFailure {
    Step(String),
    Unavailable(String),
}

impl NullBackend {
    pub fn new(native: (u32, u32)) -> Self {
        Self {
            native,
            flaky_captures: Mutex::new(0),
            code_block_output: String::new(),
            setup_failure: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Makes the first `count` screenshot captures return `None`.
    pub fn with_flaky_captures(self, count: u32) -> Self {
        *self.flaky_captures.lock().expect("flaky counter poisoned") = count;
        self
    }

    /// Fixes the stdout of every code-block execution.
    pub fn with_code_block_output(mut self, output: impl Into<String>) -> Self {
        self.code_block_output = output.into();
        self
    }

    /// Makes every `apply_setup` call fail with a setup-step error.
    pub fn with_setup_error(mut self, message: impl Into<String>) -> Self {
        self.setup_failure = Some(SetupFailure::Step(message.into()));
        self
    }

    /// Makes every `apply_setup` call fail as if the VM were unreachable.
    pub fn with_setup_unavailable(mut self, message: impl Into<String>) -> Self {
        self.setup_failure = Some(SetupFailure::Unavailable(message.into()));
        self
    }

    /// All recorded non-sentinel calls, in order.
    pub fn calls(&self) -> Vec<BackendCall> {
        self.calls.lock().expect("call log poisoned").clone()
    }

    fn record(&self, call: BackendCall) {
        self.calls.lock().expect("call log poisoned").push(call);
    }
}

#[async_trait]
impl VmBackend for NullBackend {
    async fn probe(&self) -> bool {
        true
    }

    async fn native_resolution(&self) -> Result<(u32, u32), BackendError> {
        Ok(self.native)
    }

    async fn capture_screenshot(&self) -> Result<Option<Frame>, BackendError> {
        let mut flaky = self.flaky_captures.lock().expect("flaky counter poisoned");
        if *flaky > 0 {
            *flaky -= 1;
            return Ok(None);
        }
        Ok(Some(Frame::solid(self.native.0, self.native.1, [32, 32, 32])))
    }

    async fn capture_accessibility_tree(&self) -> Result<Option<String>, BackendError> {
        Ok(Some("<root/>".to_string()))
    }

    async fn capture_terminal(&self) -> Result<Option<String>, BackendError> {
        Ok(None)
    }

    async fn capture_window_state(&self) -> Result<Option<WindowState>, BackendError> {
        Ok(Some(WindowState {
            title: "Desktop".to_string(),
            rect: (0, 0, self.native.0 as i32, self.native.1 as i32),
            window_names: "Desktop".to_string(),
            clipboard: Some(String::new()),
            human_input: None,
        }))
    }

    async fn execute_structured(&self, action: &StructuredAction) -> Result<(), BackendError> {
        self.record(BackendCall::Structured(action.clone()));
        Ok(())
    }

    async fn execute_scripted(&self, command: &str) -> Result<(), BackendError> {
        self.record(BackendCall::Scripted(command.to_string()));
        Ok(())
    }

    async fn execute_code_block(&self, command: &str) -> Result<String, BackendError> {
        self.record(BackendCall::CodeBlock(command.to_string()));
        Ok(self.code_block_output.clone())
    }

    async fn apply_setup(&self, steps: &[SetupStep]) -> Result<(), BackendError> {
        match &self.setup_failure {
            Some(SetupFailure::Step(message)) => {
                return Err(BackendError::Setup(message.clone()));
            }
            Some(SetupFailure::Unavailable(message)) => {
                return Err(BackendError::Unavailable(message.clone()));
            }
            None => {}
        }
        self.record(BackendCall::Setup(steps.to_vec()));
        Ok(())
    }
}
