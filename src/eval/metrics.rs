//! Metric registry: named scoring functions.
//!
//! Metrics are a closed compile-time enumeration resolved at parse time.
//! A metric scores a result state against an optional expected state and
//! returns a JSON value; the engine accepts numbers and booleans and
//! downgrades anything else to 0 as a scoring defect.

use std::str::FromStr;

use serde_json::{Map, Value};
use tracing::warn;

use crate::error::EvalError;

/// Closed registry of metric kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    /// Special marker: the task is impossible on purpose. Scored by the
    /// engine from the action history alone; never invoked as a function.
    Infeasible,
    /// Strict equality of the textual forms.
    ExactMatch,
    /// Equality after lowercasing and whitespace normalization.
    FuzzyMatch,
    /// Expected text contained in the result text.
    Include,
}

impl FromStr for MetricKind {
    type Err = EvalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "infeasible" => Ok(MetricKind::Infeasible),
            "exact_match" => Ok(MetricKind::ExactMatch),
            "fuzzy_match" => Ok(MetricKind::FuzzyMatch),
            "include" => Ok(MetricKind::Include),
            other => Err(EvalError::UnknownMetric(other.to_string())),
        }
    }
}

/// Applies a metric to `(result, expected, options)`.
///
/// With no declared expected state the metric falls back to the
/// `expected` key of its options, mirroring the `(result, options)`
/// calling convention.
pub fn apply(
    kind: MetricKind,
    result: &Value,
    expected: Option<&Value>,
    options: &Map<String, Value>,
) -> Value {
    let fallback = options.get("expected");
    let expected = expected.or(fallback);

    match kind {
        MetricKind::Infeasible => {
            // Engine handles this marker before metrics run.
            warn!("infeasible marker invoked as a metric, scoring 0");
            Value::from(0.0)
        }
        MetricKind::ExactMatch => {
            let strip = options.get("strip").and_then(Value::as_bool).unwrap_or(false);
            let result = text_of(result, strip);
            let expected = expected.map(|v| text_of(v, strip));
            Value::Bool(expected.is_some_and(|e| result == e))
        }
        MetricKind::FuzzyMatch => {
            let result = normalize(&text_of(result, true));
            let expected = expected.map(|v| normalize(&text_of(v, true)));
            Value::from(if expected.is_some_and(|e| result == e) { 1.0 } else { 0.0 })
        }
        MetricKind::Include => {
            let result = text_of(result, false);
            let expected = expected.map(|v| text_of(v, false));
            Value::Bool(expected.is_some_and(|e| !e.is_empty() && result.contains(&e)))
        }
    }
}

/// Textual form of a JSON value: strings as-is, everything else as its
/// compact JSON rendering.
fn text_of(value: &Value, strip: bool) -> String {
    let text = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    if strip {
        text.trim().to_string()
    } else {
        text
    }
}

/// Lowercase with runs of whitespace collapsed to single spaces.
fn normalize(text: &str) -> String {
    text.to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ")
}
