//! Actions a policy can take against the environment.
//!
//! Three sentinels (WAIT, FAIL, DONE) never touch the backend; everything
//! else is a payload for exactly one of the three backend kinds.

use serde::{Deserialize, Serialize};

/// A single policy action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum Action {
    /// Sleep the fixed step pause, then observe. No backend call.
    Wait,
    /// Declare the task infeasible and end the episode. No backend call.
    Fail,
    /// Declare the task finished and end the episode. No backend call.
    Done,
    /// Semantic action for the structured backend.
    Structured(StructuredAction),
    /// Free-text backend-native command for the scripted backend. May
    /// carry literal `x,y` coordinates in configured-resolution space.
    Scripted(String),
    /// Opaque multi-line command forwarded verbatim to the code-block
    /// executor. No rescale, no validation.
    CodeBlock(String),
}

impl Action {
    /// Whether the action bypasses the backend entirely.
    pub fn is_sentinel(&self) -> bool {
        matches!(self, Action::Wait | Action::Fail | Action::Done)
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::Wait => write!(f, "WAIT"),
            Action::Fail => write!(f, "FAIL"),
            Action::Done => write!(f, "DONE"),
            Action::Structured(a) => write!(f, "structured:{a:?}"),
            Action::Scripted(cmd) => write!(f, "scripted:{cmd}"),
            Action::CodeBlock(_) => write!(f, "code_block:<...>"),
        }
    }
}

/// Mouse button for click actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MouseButton {
    #[default]
    Left,
    Middle,
    Right,
}

/// Closed vocabulary of semantic actions for the structured backend.
///
/// Coordinates are expressed against the session's configured resolution;
/// the structured backend resolves them upstream, so no text rewriting is
/// needed on dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum StructuredAction {
    Click {
        x: f64,
        y: f64,
        #[serde(default)]
        button: MouseButton,
    },
    DoubleClick {
        x: f64,
        y: f64,
    },
    Drag {
        start_x: f64,
        start_y: f64,
        end_x: f64,
        end_y: f64,
    },
    Scroll {
        x: f64,
        y: f64,
        delta: i32,
    },
    TypeText {
        text: String,
    },
    Key {
        key: String,
    },
    Hotkey {
        keys: Vec<String>,
    },
}
