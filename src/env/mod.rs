//! Environment interaction: VM backends, observations, actions and the
//! per-episode session state machine.

pub mod action;
pub mod backend;
pub mod dispatcher;
pub mod observation;
pub mod session;

pub use action::{Action, MouseButton, StructuredAction};
pub use backend::{BackendError, NullBackend, SetupStep, VmBackend};
pub use dispatcher::{ActionDispatcher, BackendKind};
pub use observation::{Frame, Observation, WindowState};
pub use session::{EnvironmentSession, SessionConfig, SessionState, StepOutcome};
