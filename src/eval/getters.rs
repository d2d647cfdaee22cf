//! Getter registry: named extraction of comparable state for scoring.
//!
//! Getters are a closed compile-time enumeration; the type tag in a task
//! config resolves against it at parse time. At evaluation time a getter
//! turns the VM or the task's cached artifacts into a JSON value the
//! metric can compare. An absent underlying resource is a recoverable
//! [`EvalError::ResourceMissing`], not a crash.

use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::env::action::Action;
use crate::env::backend::VmBackend;
use crate::error::EvalError;

use super::spec::GetterSpec;

/// Closed registry of getter kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GetterKind {
    /// Literal value embedded in the getter config. Backs expected-state
    /// declarations that need no VM access.
    Rule,
    /// A file under the episode's cache directory.
    CacheFile,
    /// Stdout of a code-block command executed on the VM.
    VmCommand,
    /// Recent terminal output.
    Terminal,
    /// Clipboard contents from the window-state capture.
    Clipboard,
}

impl FromStr for GetterKind {
    type Err = EvalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rule" => Ok(GetterKind::Rule),
            "cache_file" => Ok(GetterKind::CacheFile),
            "vm_command" => Ok(GetterKind::VmCommand),
            "terminal" => Ok(GetterKind::Terminal),
            "clipboard" => Ok(GetterKind::Clipboard),
            other => Err(EvalError::UnknownGetter(other.to_string())),
        }
    }
}

/// Everything a getter may consult: the backend, the episode's cache
/// directory and the recorded action history.
pub struct EvalContext<'a> {
    pub backend: &'a Arc<dyn VmBackend>,
    pub cache_dir: &'a Path,
    pub history: &'a [Action],
}

/// Runs one getter against the context.
pub async fn fetch(spec: &GetterSpec, ctx: &EvalContext<'_>) -> Result<Value, EvalError> {
    match spec.kind {
        GetterKind::Rule => Ok(spec.config.get("value").cloned().unwrap_or(Value::Null)),
        GetterKind::CacheFile => fetch_cache_file(&spec.config, ctx).await,
        GetterKind::VmCommand => fetch_vm_command(&spec.config, ctx).await,
        GetterKind::Terminal => match ctx.backend.capture_terminal().await? {
            Some(text) => Ok(Value::String(text)),
            None => Err(EvalError::ResourceMissing("terminal output".to_string())),
        },
        GetterKind::Clipboard => match ctx.backend.capture_window_state().await? {
            Some(state) => match state.clipboard {
                Some(text) => Ok(Value::String(text)),
                None => Err(EvalError::ResourceMissing("clipboard".to_string())),
            },
            None => Err(EvalError::ResourceMissing("window state".to_string())),
        },
    }
}

async fn fetch_cache_file(
    config: &Map<String, Value>,
    ctx: &EvalContext<'_>,
) -> Result<Value, EvalError> {
    let relative = config
        .get("path")
        .and_then(Value::as_str)
        .ok_or_else(|| EvalError::SpecShape("cache_file getter missing 'path'".to_string()))?;
    let path = ctx.cache_dir.join(relative);

    match tokio::fs::read_to_string(&path).await {
        Ok(contents) => Ok(Value::String(contents)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(EvalError::ResourceMissing(path.display().to_string()))
        }
        Err(e) => Err(e.into()),
    }
}

async fn fetch_vm_command(
    config: &Map<String, Value>,
    ctx: &EvalContext<'_>,
) -> Result<Value, EvalError> {
    let command = config
        .get("command")
        .and_then(Value::as_str)
        .ok_or_else(|| EvalError::SpecShape("vm_command getter missing 'command'".to_string()))?;
    let stdout = ctx.backend.execute_code_block(command).await?;
    Ok(Value::String(stdout))
}
