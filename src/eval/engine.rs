//! Evaluator composition: combines sub-scores under and/or semantics.
//!
//! Scoring rules, in order:
//! - the `postconfig` setup steps always run first so scoring observes
//!   settled state;
//! - the `infeasible` marker scores 1 iff the last recorded action was
//!   FAIL, with no getters run;
//! - otherwise a trailing FAIL unconditionally scores 0; an agent that
//!   gives up on a feasible task never earns credit;
//! - `and` short-circuits to 0 on an exactly-zero sub-score (or a
//!   missing resource) and otherwise averages; `or` short-circuits to 1
//!   on an exactly-one sub-score and otherwise takes the maximum, with a
//!   missing resource counting as a 0 sub-score.

use serde_json::Value;
use tracing::{info, warn};

use crate::env::action::Action;
use crate::error::EvalError;

use super::getters::{fetch, EvalContext};
use super::metrics::{self, MetricKind};
use super::spec::{Conjunction, EvaluatorKind, EvaluatorSpec, MetricEntry};

/// Scores a completed episode.
pub async fn evaluate(spec: &EvaluatorSpec, ctx: &EvalContext<'_>) -> Result<f64, EvalError> {
    ctx.backend.apply_setup(&spec.postconfig).await?;

    let gave_up = matches!(ctx.history.last(), Some(Action::Fail));

    if let EvaluatorKind::Scalar(entry) = &spec.kind {
        if entry.metric == MetricKind::Infeasible {
            let score = if gave_up { 1.0 } else { 0.0 };
            info!(score, "infeasible task scored from action history");
            return Ok(score);
        }
    }

    if gave_up {
        info!("feasible task ended with FAIL, scoring 0");
        return Ok(0.0);
    }

    match &spec.kind {
        EvaluatorKind::Scalar(entry) => match sub_score(entry, ctx).await {
            Ok(Some(score)) => Ok(score),
            Ok(None) => {
                warn!("result resource missing, scoring 0");
                Ok(0.0)
            }
            Err(e) => {
                // The scalar path treats any getter failure as a zero
                // score for the task rather than a crash.
                warn!(error = %e, "getter failed, scoring 0");
                Ok(0.0)
            }
        },
        EvaluatorKind::List { conj, entries } => combine(*conj, entries, ctx).await,
    }
}

async fn combine(
    conj: Conjunction,
    entries: &[MetricEntry],
    ctx: &EvalContext<'_>,
) -> Result<f64, EvalError> {
    let mut scores = Vec::with_capacity(entries.len());

    for (index, entry) in entries.iter().enumerate() {
        let score = match sub_score(entry, ctx).await? {
            Some(score) => score,
            None => {
                warn!(index, "sub-metric resource missing");
                match conj {
                    // Missing resource fails the conjunction outright.
                    Conjunction::And => return Ok(0.0),
                    // Counted as a zero sub-score under disjunction.
                    Conjunction::Or => 0.0,
                }
            }
        };

        // Exact-value short circuits, not truthiness checks.
        match conj {
            Conjunction::And if score == 0.0 => return Ok(0.0),
            Conjunction::Or if score == 1.0 => return Ok(1.0),
            _ => scores.push(score),
        }
    }

    Ok(match conj {
        Conjunction::And => scores.iter().sum::<f64>() / scores.len() as f64,
        Conjunction::Or => scores.iter().copied().fold(0.0, f64::max),
    })
}

/// Computes one entry's sub-score.
///
/// `Ok(None)` means a getter's underlying resource was absent; the
/// caller decides what that does to the composition. Other errors are
/// genuine failures.
async fn sub_score(entry: &MetricEntry, ctx: &EvalContext<'_>) -> Result<Option<f64>, EvalError> {
    let result = match &entry.result {
        Some(getter) => match fetch(getter, ctx).await {
            Ok(value) => value,
            Err(EvalError::ResourceMissing(resource)) => {
                warn!(resource, "result getter found nothing");
                return Ok(None);
            }
            Err(e) => return Err(e),
        },
        None => Value::Null,
    };

    let expected = match &entry.expected {
        Some(getter) => match fetch(getter, ctx).await {
            Ok(value) => Some(value),
            Err(EvalError::ResourceMissing(resource)) => {
                warn!(resource, "expected getter found nothing");
                return Ok(None);
            }
            Err(e) => return Err(e),
        },
        None => None,
    };

    let value = metrics::apply(entry.metric, &result, expected.as_ref(), &entry.options);
    Ok(Some(score_of(&value)))
}

/// Coerces a metric's return value to a score. Numbers and booleans are
/// accepted; anything else is a scoring defect downgraded to 0.
fn score_of(value: &Value) -> f64 {
    match value {
        Value::Bool(true) => 1.0,
        Value::Bool(false) => 0.0,
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        other => {
            warn!(value = %other, "metric value is neither numeric nor boolean, scoring 0");
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::Arc;

    use serde_json::{json, Map, Value};

    use crate::env::backend::{BackendCall, NullBackend, VmBackend};

    use super::*;

    fn ctx<'a>(backend: &'a Arc<dyn VmBackend>, cache: &'a Path, history: &'a [Action]) -> EvalContext<'a> {
        EvalContext {
            backend,
            cache_dir: cache,
            history,
        }
    }

    /// Entry whose metric scores 1 when `value == expected`.
    fn rule_entry(value: &str, expected: &str) -> MetricEntry {
        let getter = |v: &str| super::super::spec::GetterSpec {
            kind: super::super::getters::GetterKind::Rule,
            config: json!({"type": "rule", "value": v}).as_object().cloned().unwrap(),
        };
        MetricEntry {
            metric: MetricKind::ExactMatch,
            result: Some(getter(value)),
            expected: Some(getter(expected)),
            options: Map::new(),
        }
    }

    fn missing_file_entry() -> MetricEntry {
        MetricEntry {
            metric: MetricKind::ExactMatch,
            result: Some(super::super::spec::GetterSpec {
                kind: super::super::getters::GetterKind::CacheFile,
                config: json!({"type": "cache_file", "path": "absent.txt"})
                    .as_object()
                    .cloned()
                    .unwrap(),
            }),
            expected: None,
            options: Map::new(),
        }
    }

    fn list_spec(conj: Conjunction, entries: Vec<MetricEntry>) -> EvaluatorSpec {
        EvaluatorSpec {
            kind: EvaluatorKind::List { conj, entries },
            postconfig: Vec::new(),
        }
    }

    fn scalar_spec(entry: MetricEntry) -> EvaluatorSpec {
        EvaluatorSpec {
            kind: EvaluatorKind::Scalar(entry),
            postconfig: Vec::new(),
        }
    }

    #[tokio::test]
    async fn conjunction_all_ones_yields_one() {
        let backend: Arc<dyn VmBackend> = Arc::new(NullBackend::new((64, 48)));
        let dir = tempfile::tempdir().unwrap();
        let spec = list_spec(
            Conjunction::And,
            vec![rule_entry("a", "a"), rule_entry("b", "b"), rule_entry("c", "c")],
        );

        let score = evaluate(&spec, &ctx(&backend, dir.path(), &[])).await.unwrap();
        assert_eq!(score, 1.0);
    }

    #[tokio::test]
    async fn conjunction_any_zero_yields_zero() {
        let backend: Arc<dyn VmBackend> = Arc::new(NullBackend::new((64, 48)));
        let dir = tempfile::tempdir().unwrap();
        let spec = list_spec(
            Conjunction::And,
            vec![rule_entry("a", "a"), rule_entry("b", "nope"), rule_entry("c", "c")],
        );

        let score = evaluate(&spec, &ctx(&backend, dir.path(), &[])).await.unwrap();
        assert_eq!(score, 0.0);
    }

    #[tokio::test]
    async fn disjunction_all_zero_yields_zero() {
        let backend: Arc<dyn VmBackend> = Arc::new(NullBackend::new((64, 48)));
        let dir = tempfile::tempdir().unwrap();
        let spec = list_spec(
            Conjunction::Or,
            vec![rule_entry("a", "x"), rule_entry("b", "y")],
        );

        let score = evaluate(&spec, &ctx(&backend, dir.path(), &[])).await.unwrap();
        assert_eq!(score, 0.0);
    }

    #[tokio::test]
    async fn disjunction_any_one_yields_one() {
        let backend: Arc<dyn VmBackend> = Arc::new(NullBackend::new((64, 48)));
        let dir = tempfile::tempdir().unwrap();
        let spec = list_spec(
            Conjunction::Or,
            vec![rule_entry("a", "x"), rule_entry("b", "b")],
        );

        let score = evaluate(&spec, &ctx(&backend, dir.path(), &[])).await.unwrap();
        assert_eq!(score, 1.0);
    }

    #[tokio::test]
    async fn missing_resource_fails_conjunction() {
        let backend: Arc<dyn VmBackend> = Arc::new(NullBackend::new((64, 48)));
        let dir = tempfile::tempdir().unwrap();
        let spec = list_spec(
            Conjunction::And,
            vec![rule_entry("a", "a"), missing_file_entry()],
        );

        let score = evaluate(&spec, &ctx(&backend, dir.path(), &[])).await.unwrap();
        assert_eq!(score, 0.0);
    }

    #[tokio::test]
    async fn missing_resource_counts_zero_under_disjunction() {
        let backend: Arc<dyn VmBackend> = Arc::new(NullBackend::new((64, 48)));
        let dir = tempfile::tempdir().unwrap();
        let spec = list_spec(
            Conjunction::Or,
            vec![missing_file_entry(), rule_entry("b", "b")],
        );

        // The missing first sub-metric does not abort; the second wins.
        let score = evaluate(&spec, &ctx(&backend, dir.path(), &[])).await.unwrap();
        assert_eq!(score, 1.0);
    }

    #[tokio::test]
    async fn infeasible_scores_from_history() {
        let backend: Arc<dyn VmBackend> = Arc::new(NullBackend::new((64, 48)));
        let dir = tempfile::tempdir().unwrap();
        let spec = scalar_spec(MetricEntry {
            metric: MetricKind::Infeasible,
            result: None,
            expected: None,
            options: Map::new(),
        });

        let failed = [Action::Wait, Action::Fail];
        assert_eq!(evaluate(&spec, &ctx(&backend, dir.path(), &failed)).await.unwrap(), 1.0);

        let done = [Action::Wait, Action::Done];
        assert_eq!(evaluate(&spec, &ctx(&backend, dir.path(), &done)).await.unwrap(), 0.0);
    }

    #[tokio::test]
    async fn feasible_task_with_trailing_fail_skips_getters() {
        let backend = Arc::new(NullBackend::new((64, 48)));
        let dyn_backend: Arc<dyn VmBackend> = backend.clone();
        let dir = tempfile::tempdir().unwrap();
        let spec = scalar_spec(MetricEntry {
            metric: MetricKind::ExactMatch,
            result: Some(super::super::spec::GetterSpec {
                kind: super::super::getters::GetterKind::VmCommand,
                config: json!({"type": "vm_command", "command": "probe"})
                    .as_object()
                    .cloned()
                    .unwrap(),
            }),
            expected: None,
            options: Map::new(),
        });

        let history = [Action::Fail];
        let score = evaluate(&spec, &ctx(&dyn_backend, dir.path(), &history)).await.unwrap();

        assert_eq!(score, 0.0);
        // The getter's code-block command never ran.
        assert!(!backend
            .calls()
            .iter()
            .any(|call| matches!(call, BackendCall::CodeBlock(_))));
    }

    #[tokio::test]
    async fn conjunction_averages_fractional_scores() {
        let backend: Arc<dyn VmBackend> = Arc::new(NullBackend::new((64, 48)));
        let dir = tempfile::tempdir().unwrap();

        // fuzzy_match yields 1.0 here and exact_match yields 1.0: mean 1.
        // Mix in a fractional metric by scoring through options-expected.
        let fuzzy = MetricEntry {
            metric: MetricKind::FuzzyMatch,
            result: Some(super::super::spec::GetterSpec {
                kind: super::super::getters::GetterKind::Rule,
                config: json!({"type": "rule", "value": "Hello  World"})
                    .as_object()
                    .cloned()
                    .unwrap(),
            }),
            expected: None,
            options: json!({"expected": "hello world"}).as_object().cloned().unwrap(),
        };
        let spec = list_spec(Conjunction::And, vec![fuzzy, rule_entry("a", "a")]);

        let score = evaluate(&spec, &ctx(&backend, dir.path(), &[])).await.unwrap();
        assert_eq!(score, 1.0);
    }

    #[tokio::test]
    async fn postconfig_runs_before_scoring() {
        let backend = Arc::new(NullBackend::new((64, 48)));
        let dyn_backend: Arc<dyn VmBackend> = backend.clone();
        let dir = tempfile::tempdir().unwrap();

        let mut spec = scalar_spec(rule_entry("a", "a"));
        spec.postconfig = vec![crate::env::backend::SetupStep {
            kind: "sleep".to_string(),
            parameters: json!({"seconds": 0}),
        }];

        evaluate(&spec, &ctx(&dyn_backend, dir.path(), &[])).await.unwrap();

        assert!(matches!(backend.calls().first(), Some(BackendCall::Setup(steps)) if steps.len() == 1));
    }
}
