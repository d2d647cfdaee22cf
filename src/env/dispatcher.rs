//! Action dispatch against one of three interchangeable backends.
//!
//! The backend is selected once at session construction and fixed for
//! the session's lifetime; an unrecognized name fails there, never at
//! call time. Only the scripted backend rewrites coordinates: its
//! free-text payloads carry literal `x,y` pairs in configured-resolution
//! space, while the backend expects native-resolution coordinates.

use std::str::FromStr;
use std::sync::{Arc, OnceLock};

use regex::{Captures, Regex};
use tracing::debug;

use crate::error::SessionError;

use super::action::Action;
use super::backend::VmBackend;

/// The three action backend kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Closed vocabulary of semantic actions; no text parsing.
    Structured,
    /// Free-text backend-native command strings; coordinates rescaled.
    Scripted,
    /// Opaque multi-line commands forwarded verbatim.
    CodeBlock,
}

impl BackendKind {
    pub fn name(&self) -> &'static str {
        match self {
            BackendKind::Structured => "structured",
            BackendKind::Scripted => "scripted",
            BackendKind::CodeBlock => "code_block",
        }
    }
}

impl FromStr for BackendKind {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "structured" => Ok(BackendKind::Structured),
            "scripted" => Ok(BackendKind::Scripted),
            "code_block" => Ok(BackendKind::CodeBlock),
            other => Err(SessionError::UnknownBackend(other.to_string())),
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Executes single actions against the session's backend.
pub struct ActionDispatcher {
    kind: BackendKind,
    backend: Arc<dyn VmBackend>,
}

impl ActionDispatcher {
    pub fn new(kind: BackendKind, backend: Arc<dyn VmBackend>) -> Self {
        Self { kind, backend }
    }

    pub fn kind(&self) -> BackendKind {
        self.kind
    }

    /// Executes one non-sentinel action.
    ///
    /// `configured` and `native` are the session and VM resolutions used
    /// for the scripted rescale; the rescale is a no-op when they match.
    pub async fn dispatch(
        &self,
        action: &Action,
        configured: (u32, u32),
        native: (u32, u32),
    ) -> Result<(), SessionError> {
        match (self.kind, action) {
            (_, sentinel) if sentinel.is_sentinel() => {
                // Sentinels are handled by the session; reaching the
                // dispatcher is a harmless no-op.
                debug!(action = %sentinel, "sentinel reached dispatcher, ignoring");
                Ok(())
            }
            (BackendKind::Structured, Action::Structured(a)) => {
                self.backend.execute_structured(a).await.map_err(Into::into)
            }
            (BackendKind::Scripted, Action::Scripted(command)) => {
                let command = if configured != native {
                    let scale_x = native.0 as f64 / configured.0 as f64;
                    let scale_y = native.1 as f64 / configured.1 as f64;
                    rescale_coordinates(command, scale_x, scale_y)
                } else {
                    command.clone()
                };
                self.backend.execute_scripted(&command).await.map_err(Into::into)
            }
            (BackendKind::CodeBlock, Action::CodeBlock(command)) => {
                self.backend.execute_code_block(command).await?;
                Ok(())
            }
            (kind, action) => Err(SessionError::ActionNotSupported {
                backend: kind.name().to_string(),
                action: action.to_string(),
            }),
        }
    }
}

/// Matches literal coordinate pairs like `100,200` or `10.5, 20.3`,
/// with or without surrounding parentheses.
fn coordinate_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(\d+\.?\d*)\s*,\s*(\d+\.?\d*)").expect("coordinate pattern is valid")
    })
}

/// Scales every literal `x,y` pair in a scripted payload per axis.
pub fn rescale_coordinates(command: &str, scale_x: f64, scale_y: f64) -> String {
    coordinate_pattern()
        .replace_all(command, |caps: &Captures<'_>| {
            let x: f64 = caps[1].parse().unwrap_or(0.0);
            let y: f64 = caps[2].parse().unwrap_or(0.0);
            format!("{}, {}", x * scale_x, y * scale_y)
        })
        .into_owned()
}
