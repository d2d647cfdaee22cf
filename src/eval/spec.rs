//! Task configuration and evaluator spec parsing.
//!
//! The evaluator section of a task config is either one metric (scalar
//! form) or N parallel metrics (list form). In list form the
//! func/result/expected/options lists must all have length N; even a
//! metric that needs no expected state or options occupies its slot with
//! null. Every name is resolved against the closed getter/metric
//! registries at parse time, so an unknown kind fails immediately rather
//! than mid-evaluation.

use std::path::Path;
use std::str::FromStr;

use serde_json::{Map, Value};

use crate::env::backend::SetupStep;
use crate::error::EvalError;

use super::getters::GetterKind;
use super::metrics::MetricKind;

/// How multiple sub-scores are combined in list form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Conjunction {
    #[default]
    And,
    Or,
}

impl FromStr for Conjunction {
    type Err = EvalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "and" => Ok(Conjunction::And),
            "or" => Ok(Conjunction::Or),
            other => Err(EvalError::SpecShape(format!(
                "conj must be 'and' or 'or', got '{other}'"
            ))),
        }
    }
}

/// A resolved getter: its registry kind plus the raw config object the
/// getter reads its parameters from.
#[derive(Debug, Clone, PartialEq)]
pub struct GetterSpec {
    pub kind: GetterKind,
    pub config: Map<String, Value>,
}

impl GetterSpec {
    fn parse(value: &Value) -> Result<Self, EvalError> {
        let config = value
            .as_object()
            .ok_or_else(|| EvalError::SpecShape("getter config must be an object".to_string()))?;
        let tag = config
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| EvalError::SpecShape("getter config missing 'type'".to_string()))?;
        Ok(Self {
            kind: tag.parse()?,
            config: config.clone(),
        })
    }
}

/// One metric with its getters and options.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricEntry {
    pub metric: MetricKind,
    pub result: Option<GetterSpec>,
    pub expected: Option<GetterSpec>,
    pub options: Map<String, Value>,
}

/// Scalar or list evaluator.
#[derive(Debug, Clone, PartialEq)]
pub enum EvaluatorKind {
    Scalar(MetricEntry),
    List {
        conj: Conjunction,
        entries: Vec<MetricEntry>,
    },
}

/// Fully resolved evaluator spec for one task.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluatorSpec {
    pub kind: EvaluatorKind,
    /// Idempotent setup steps run before any scoring, so scoring
    /// observes settled state.
    pub postconfig: Vec<SetupStep>,
}

impl EvaluatorSpec {
    /// Parses and validates the `evaluator` object of a task config.
    pub fn parse(value: &Value) -> Result<Self, EvalError> {
        let object = value
            .as_object()
            .ok_or_else(|| EvalError::SpecShape("evaluator must be an object".to_string()))?;

        let postconfig = match object.get("postconfig") {
            None | Some(Value::Null) => Vec::new(),
            Some(steps) => serde_json::from_value(steps.clone())?,
        };

        let func = object
            .get("func")
            .ok_or_else(|| EvalError::SpecShape("evaluator missing 'func'".to_string()))?;

        let kind = match func {
            Value::String(name) => EvaluatorKind::Scalar(Self::parse_scalar_entry(name, object)?),
            Value::Array(names) => {
                let conj = match object.get("conj").and_then(Value::as_str) {
                    Some(conj) => conj.parse()?,
                    None => Conjunction::default(),
                };
                EvaluatorKind::List {
                    conj,
                    entries: Self::parse_list_entries(names, object)?,
                }
            }
            _ => {
                return Err(EvalError::SpecShape(
                    "'func' must be a metric name or a list of metric names".to_string(),
                ))
            }
        };

        Ok(Self { kind, postconfig })
    }

    fn parse_scalar_entry(name: &str, object: &Map<String, Value>) -> Result<MetricEntry, EvalError> {
        let metric: MetricKind = name.parse()?;
        let result = match object.get("result") {
            None | Some(Value::Null) => None,
            Some(cfg) => Some(GetterSpec::parse(cfg)?),
        };
        let expected = match object.get("expected") {
            None | Some(Value::Null) => None,
            Some(cfg) => Some(GetterSpec::parse(cfg)?),
        };
        let options = match object.get("options") {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(opts)) => opts.clone(),
            Some(_) => {
                return Err(EvalError::SpecShape(
                    "scalar 'options' must be an object".to_string(),
                ))
            }
        };
        Ok(MetricEntry {
            metric,
            result,
            expected,
            options,
        })
    }

    fn parse_list_entries(
        names: &[Value],
        object: &Map<String, Value>,
    ) -> Result<Vec<MetricEntry>, EvalError> {
        if names.is_empty() {
            return Err(EvalError::SpecShape("'func' list must not be empty".to_string()));
        }
        let n = names.len();

        let results = parallel_list(object, "result", n)?;
        let expecteds = parallel_list(object, "expected", n)?;
        let options = parallel_list(object, "options", n)?;

        let mut entries = Vec::with_capacity(n);
        for i in 0..n {
            let name = names[i].as_str().ok_or_else(|| {
                EvalError::SpecShape("'func' list entries must be strings".to_string())
            })?;
            let metric: MetricKind = name.parse()?;

            let result = match results.as_ref().map(|list| &list[i]) {
                None | Some(Value::Null) => None,
                Some(cfg) => Some(GetterSpec::parse(cfg)?),
            };
            let expected = match expecteds.as_ref().map(|list| &list[i]) {
                None | Some(Value::Null) => None,
                Some(cfg) => Some(GetterSpec::parse(cfg)?),
            };
            let options = match options.as_ref().map(|list| &list[i]) {
                None | Some(Value::Null) => Map::new(),
                Some(Value::Object(opts)) => opts.clone(),
                Some(_) => {
                    return Err(EvalError::SpecShape(format!(
                        "'options[{i}]' must be an object or null"
                    )))
                }
            };
            entries.push(MetricEntry {
                metric,
                result,
                expected,
                options,
            });
        }
        Ok(entries)
    }
}

/// Reads one of the parallel lists, enforcing its length against N.
fn parallel_list<'a>(
    object: &'a Map<String, Value>,
    key: &str,
    n: usize,
) -> Result<Option<&'a Vec<Value>>, EvalError> {
    match object.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Array(list)) => {
            if list.len() != n {
                return Err(EvalError::SpecShape(format!(
                    "'{key}' has {} entries but 'func' has {n}",
                    list.len()
                )));
            }
            Ok(Some(list))
        }
        Some(_) => Err(EvalError::SpecShape(format!(
            "'{key}' must be a list in list-form evaluators"
        ))),
    }
}

/// A single benchmark task: what to do and how to score it.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskConfig {
    pub id: String,
    pub instruction: String,
    /// Setup steps applied to the VM during reset.
    pub config: Vec<SetupStep>,
    pub evaluator: EvaluatorSpec,
}

impl TaskConfig {
    /// Parses a task config from its JSON value, resolving the
    /// evaluator's names against the registries.
    pub fn from_value(value: &Value) -> Result<Self, EvalError> {
        let object = value
            .as_object()
            .ok_or_else(|| EvalError::SpecShape("task config must be an object".to_string()))?;

        let id = object
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| EvalError::SpecShape("task config missing 'id'".to_string()))?
            .to_string();
        let instruction = object
            .get("instruction")
            .and_then(Value::as_str)
            .ok_or_else(|| EvalError::SpecShape("task config missing 'instruction'".to_string()))?
            .to_string();
        let config = match object.get("config") {
            None | Some(Value::Null) => Vec::new(),
            Some(steps) => serde_json::from_value(steps.clone())?,
        };
        let evaluator = EvaluatorSpec::parse(
            object
                .get("evaluator")
                .ok_or_else(|| EvalError::SpecShape("task config missing 'evaluator'".to_string()))?,
        )?;

        Ok(Self {
            id,
            instruction,
            config,
            evaluator,
        })
    }

    /// Loads a task config from a JSON file.
    pub fn load(path: &Path) -> Result<Self, EvalError> {
        let text = std::fs::read_to_string(path)?;
        let value: Value = serde_json::from_str(&text)?;
        Self::from_value(&value)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn parses_scalar_evaluator() {
        let task = TaskConfig::from_value(&json!({
            "id": "t1",
            "instruction": "open the settings page",
            "config": [{"type": "launch", "parameters": {"command": "chrome.exe"}}],
            "evaluator": {
                "func": "exact_match",
                "result": {"type": "cache_file", "path": "out.txt"},
                "expected": {"type": "rule", "value": "done"},
            },
        }))
        .unwrap();

        assert_eq!(task.id, "t1");
        assert_eq!(task.config.len(), 1);
        match &task.evaluator.kind {
            EvaluatorKind::Scalar(entry) => {
                assert_eq!(entry.metric, MetricKind::ExactMatch);
                assert_eq!(entry.result.as_ref().unwrap().kind, GetterKind::CacheFile);
                assert_eq!(entry.expected.as_ref().unwrap().kind, GetterKind::Rule);
            }
            other => panic!("expected scalar evaluator, got {other:?}"),
        }
    }

    #[test]
    fn parses_list_evaluator_with_null_slots() {
        let spec = EvaluatorSpec::parse(&json!({
            "func": ["exact_match", "include"],
            "conj": "or",
            "result": [
                {"type": "rule", "value": "a"},
                {"type": "terminal"},
            ],
            "expected": [{"type": "rule", "value": "a"}, null],
            "options": [null, {"strip": true}],
        }))
        .unwrap();

        match spec.kind {
            EvaluatorKind::List { conj, entries } => {
                assert_eq!(conj, Conjunction::Or);
                assert_eq!(entries.len(), 2);
                assert!(entries[0].expected.is_some());
                assert!(entries[1].expected.is_none());
                assert_eq!(entries[1].options["strip"], json!(true));
            }
            other => panic!("expected list evaluator, got {other:?}"),
        }
    }

    #[test]
    fn list_length_mismatch_is_fatal() {
        let err = EvaluatorSpec::parse(&json!({
            "func": ["exact_match", "include"],
            "result": [{"type": "rule", "value": "a"}],
        }))
        .unwrap_err();
        assert!(matches!(err, EvalError::SpecShape(_)));
    }

    #[test]
    fn unknown_metric_name_is_fatal() {
        let err = EvaluatorSpec::parse(&json!({"func": "levenshtein_42"})).unwrap_err();
        assert!(matches!(err, EvalError::UnknownMetric(name) if name == "levenshtein_42"));
    }

    #[test]
    fn unknown_getter_type_is_fatal() {
        let err = EvaluatorSpec::parse(&json!({
            "func": "exact_match",
            "result": {"type": "registry_key"},
        }))
        .unwrap_err();
        assert!(matches!(err, EvalError::UnknownGetter(name) if name == "registry_key"));
    }

    #[test]
    fn infeasible_marker_parses_without_getters() {
        let spec = EvaluatorSpec::parse(&json!({"func": "infeasible"})).unwrap();
        match spec.kind {
            EvaluatorKind::Scalar(entry) => assert_eq!(entry.metric, MetricKind::Infeasible),
            other => panic!("expected scalar evaluator, got {other:?}"),
        }
    }

    #[test]
    fn conj_defaults_to_and() {
        let spec = EvaluatorSpec::parse(&json!({
            "func": ["include", "include"],
            "result": [{"type": "terminal"}, {"type": "terminal"}],
        }))
        .unwrap();
        assert!(matches!(
            spec.kind,
            EvaluatorKind::List { conj: Conjunction::And, .. }
        ));
    }
}
