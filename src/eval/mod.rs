//! Post-episode scoring: evaluator specs, getter/metric registries and
//! the composition engine.

pub mod engine;
pub mod getters;
pub mod metrics;
pub mod spec;

pub use engine::evaluate;
pub use getters::{EvalContext, GetterKind};
pub use metrics::MetricKind;
pub use spec::{Conjunction, EvaluatorKind, EvaluatorSpec, GetterSpec, MetricEntry, TaskConfig};
