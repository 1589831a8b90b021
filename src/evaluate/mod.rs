//! Metric Evaluator contract and promotion gate rules (PRM-002)
//!
//! The evaluator itself is an external collaborator: anything that can
//! score a model against a dataset and hand back a structured report. This
//! module fixes the contract (deterministic, never silently defaulting a
//! failed metric) and hosts the gate rules the promotion controller applies
//! to those reports.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Metrics requested from an evaluation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricSpec {
    /// Names of the metrics to compute
    pub metrics: Vec<String>,
}

impl MetricSpec {
    /// Spec requesting the given metric names
    pub fn of<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { metrics: names.into_iter().map(Into::into).collect() }
    }
}

/// Structured output of one evaluation run.
///
/// Immutable; re-evaluation produces a new report rather than editing an
/// old one. Multiple reports per version are expected (held-out slice,
/// shadow traffic, canary).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    /// Version the model was evaluated as
    pub model_version_id: String,
    /// Metric name to computed value
    pub metrics: HashMap<String, f64>,
    /// Dataset slice the metrics were computed on
    pub dataset_id: String,
    /// When the evaluation completed
    pub evaluated_at: DateTime<Utc>,
}

impl EvaluationReport {
    /// Build a report from metric pairs
    pub fn new<I, S>(model_version_id: impl Into<String>, dataset_id: impl Into<String>, metrics: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        Self {
            model_version_id: model_version_id.into(),
            dataset_id: dataset_id.into(),
            metrics: metrics.into_iter().map(|(k, v)| (k.into(), v)).collect(),
            evaluated_at: Utc::now(),
        }
    }
}

/// Evaluator failure modes.
///
/// All are surfaced to the caller; a missing metric is never substituted
/// with a passing default.
#[derive(Debug, Error)]
pub enum EvalError {
    #[error("dataset unavailable: {0}")]
    DatasetUnavailable(String),

    #[error("model load failure: {0}")]
    ModelLoadFailure(String),

    #[error("metric computation error: {metric} on {dataset}: {reason}")]
    MetricComputationError { metric: String, dataset: String, reason: String },
}

/// Result type for evaluator operations
pub type Result<T> = std::result::Result<T, EvalError>;

/// Pure evaluation contract.
///
/// Implementations must be deterministic: identical (model, dataset, spec)
/// inputs produce identical reports. The test suite verifies this for the
/// in-process fixture.
pub trait Evaluator: Send + Sync {
    /// Score a model against a dataset for the requested metrics
    fn evaluate(&self, model_ref: &str, dataset_ref: &str, spec: &MetricSpec) -> Result<EvaluationReport>;
}

/// Inclusive bound on a gated metric.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricBound {
    /// Minimum acceptable value (inclusive)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    /// Maximum acceptable value (inclusive)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

impl MetricBound {
    /// Bound requiring `value >= min`
    pub fn at_least(min: f64) -> Self {
        Self { min: Some(min), max: None }
    }

    /// Bound requiring `value <= max`
    pub fn at_most(max: f64) -> Self {
        Self { min: None, max: Some(max) }
    }

    /// Bound requiring `min <= value <= max`
    pub fn between(min: f64, max: f64) -> Self {
        Self { min: Some(min), max: Some(max) }
    }

    /// Whether a value satisfies the bound (both ends inclusive)
    pub fn contains(&self, value: f64) -> bool {
        if let Some(min) = self.min {
            if value < min {
                return false;
            }
        }
        if let Some(max) = self.max {
            if value > max {
                return false;
            }
        }
        true
    }
}

impl fmt::Display for MetricBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.min, self.max) {
            (Some(min), Some(max)) => write!(f, "[{min}, {max}]"),
            (Some(min), None) => write!(f, ">= {min}"),
            (None, Some(max)) => write!(f, "<= {max}"),
            (None, None) => write!(f, "unbounded"),
        }
    }
}

/// Why a gated metric failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GateFailure {
    /// Required metric absent from the report
    Missing { metric: String },
    /// Metric present but outside its bound
    OutOfBounds { metric: String, value: f64, bound: MetricBound },
}

impl GateFailure {
    /// Name of the metric that failed
    pub fn metric(&self) -> &str {
        match self {
            GateFailure::Missing { metric } | GateFailure::OutOfBounds { metric, .. } => metric,
        }
    }
}

impl fmt::Display for GateFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GateFailure::Missing { metric } => write!(f, "missing required metric '{metric}'"),
            GateFailure::OutOfBounds { metric, value, bound } => {
                write!(f, "metric '{metric}' = {value} outside {bound}")
            }
        }
    }
}

/// Result of checking a report against a gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateOutcome {
    /// Whether every required metric passed
    pub passed: bool,
    /// Failures, empty when passed
    pub failures: Vec<GateFailure>,
}

impl GateOutcome {
    /// Names of the failing metrics, sorted
    pub fn failing_metrics(&self) -> Vec<String> {
        let mut names: Vec<String> = self.failures.iter().map(|f| f.metric().to_string()).collect();
        names.sort();
        names
    }
}

/// Gate: metric-name to inclusive bound mapping for one stage transition.
///
/// An empty report never passes a non-empty gate; a gate with no bounds
/// rejects empty reports too, since a transition must be backed by at least
/// one recorded metric.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GateConfig {
    /// Required metrics and their bounds
    #[serde(default)]
    pub bounds: BTreeMap<String, MetricBound>,
}

impl GateConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a bound for a metric
    pub fn with_bound(mut self, metric: impl Into<String>, bound: MetricBound) -> Self {
        self.bounds.insert(metric.into(), bound);
        self
    }

    /// Check a report against this gate.
    ///
    /// Every configured metric must be present and inside its bound. A
    /// report with no metrics at all fails regardless of configuration.
    pub fn check(&self, report: &EvaluationReport) -> GateOutcome {
        let mut failures = Vec::new();

        if report.metrics.is_empty() {
            for metric in self.bounds.keys() {
                failures.push(GateFailure::Missing { metric: metric.clone() });
            }
            return GateOutcome { passed: false, failures };
        }

        for (metric, bound) in &self.bounds {
            match report.metrics.get(metric) {
                None => failures.push(GateFailure::Missing { metric: metric.clone() }),
                Some(&value) if !bound.contains(value) => {
                    failures.push(GateFailure::OutOfBounds {
                        metric: metric.clone(),
                        value,
                        bound: *bound,
                    });
                }
                Some(_) => {}
            }
        }

        GateOutcome { passed: failures.is_empty(), failures }
    }
}

/// Metric-by-metric comparison of two evaluation reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportComparison {
    /// Version of the first report
    pub first: String,
    /// Version of the second report
    pub second: String,
    /// Metric name to (first value, second value, delta second - first);
    /// only metrics present in both reports appear
    pub deltas: BTreeMap<String, (f64, f64, f64)>,
    /// Metrics present in exactly one of the reports
    pub unshared: Vec<String>,
}

/// Compare two reports metric by metric.
///
/// Useful when deciding whether a staged challenger actually improves on
/// the incumbent's latest report.
pub fn compare_reports(first: &EvaluationReport, second: &EvaluationReport) -> ReportComparison {
    let mut deltas = BTreeMap::new();
    let mut unshared = Vec::new();

    for (metric, &a) in &first.metrics {
        match second.metrics.get(metric) {
            Some(&b) => {
                deltas.insert(metric.clone(), (a, b, b - a));
            }
            None => unshared.push(metric.clone()),
        }
    }
    for metric in second.metrics.keys() {
        if !first.metrics.contains_key(metric) {
            unshared.push(metric.clone());
        }
    }
    unshared.sort();

    ReportComparison {
        first: first.model_version_id.clone(),
        second: second.model_version_id.clone(),
        deltas,
        unshared,
    }
}

/// Deterministic in-process evaluator backed by fixture tables.
///
/// Maps (model, dataset) pairs to canned metric values. Used by the test
/// suite and by local dry runs; real deployments plug in an external
/// evaluator behind the same trait.
#[derive(Debug, Default)]
pub struct FixtureEvaluator {
    /// (model_ref, dataset_ref) -> metric table
    fixtures: HashMap<(String, String), HashMap<String, f64>>,
}

impl FixtureEvaluator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fixture row
    pub fn with_fixture<I, S>(mut self, model_ref: &str, dataset_ref: &str, metrics: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        self.fixtures.insert(
            (model_ref.to_string(), dataset_ref.to_string()),
            metrics.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        );
        self
    }

    fn known_model(&self, model_ref: &str) -> bool {
        self.fixtures.keys().any(|(m, _)| m == model_ref)
    }
}

impl Evaluator for FixtureEvaluator {
    fn evaluate(&self, model_ref: &str, dataset_ref: &str, spec: &MetricSpec) -> Result<EvaluationReport> {
        let key = (model_ref.to_string(), dataset_ref.to_string());
        let table = match self.fixtures.get(&key) {
            Some(t) => t,
            None if self.known_model(model_ref) => {
                return Err(EvalError::DatasetUnavailable(dataset_ref.to_string()));
            }
            None => return Err(EvalError::ModelLoadFailure(model_ref.to_string())),
        };

        let mut metrics = HashMap::new();
        for name in &spec.metrics {
            let value = table.get(name).ok_or_else(|| EvalError::MetricComputationError {
                metric: name.clone(),
                dataset: dataset_ref.to_string(),
                reason: "metric undefined for this dataset".to_string(),
            })?;
            metrics.insert(name.clone(), *value);
        }

        Ok(EvaluationReport {
            model_version_id: model_ref.to_string(),
            metrics,
            dataset_id: dataset_ref.to_string(),
            evaluated_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate() -> GateConfig {
        GateConfig::new().with_bound("accuracy", MetricBound::at_least(0.90))
    }

    #[test]
    fn test_bound_inclusive_at_min() {
        assert!(MetricBound::at_least(0.90).contains(0.90));
        assert!(!MetricBound::at_least(0.90).contains(0.8999));
    }

    #[test]
    fn test_bound_inclusive_at_max() {
        assert!(MetricBound::at_most(0.1).contains(0.1));
        assert!(!MetricBound::at_most(0.1).contains(0.1001));
    }

    #[test]
    fn test_bound_between() {
        let b = MetricBound::between(0.2, 0.8);
        assert!(b.contains(0.2));
        assert!(b.contains(0.8));
        assert!(!b.contains(0.81));
    }

    #[test]
    fn test_gate_passes_at_exact_bound() {
        let report = EvaluationReport::new("v1", "holdout", [("accuracy", 0.90)]);
        assert!(gate().check(&report).passed);
    }

    #[test]
    fn test_gate_fails_below_bound_naming_metric() {
        let report = EvaluationReport::new("v1", "holdout", [("accuracy", 0.89)]);
        let outcome = gate().check(&report);
        assert!(!outcome.passed);
        assert_eq!(outcome.failing_metrics(), vec!["accuracy".to_string()]);
    }

    #[test]
    fn test_gate_fails_missing_metric() {
        let report = EvaluationReport::new("v1", "holdout", [("f1", 0.95)]);
        let outcome = gate().check(&report);
        assert!(!outcome.passed);
        assert!(matches!(outcome.failures[0], GateFailure::Missing { .. }));
    }

    #[test]
    fn test_gate_rejects_empty_report() {
        let report = EvaluationReport::new("v1", "holdout", Vec::<(String, f64)>::new());
        assert!(!gate().check(&report).passed);
    }

    #[test]
    fn test_gate_collects_all_failures() {
        let g = GateConfig::new()
            .with_bound("accuracy", MetricBound::at_least(0.90))
            .with_bound("rmse", MetricBound::at_most(5.0));
        let report = EvaluationReport::new("v1", "holdout", [("accuracy", 0.5), ("rmse", 9.0)]);
        let outcome = g.check(&report);
        assert_eq!(outcome.failures.len(), 2);
        assert_eq!(outcome.failing_metrics(), vec!["accuracy".to_string(), "rmse".to_string()]);
    }

    #[test]
    fn test_compare_reports_deltas_and_unshared() {
        let incumbent =
            EvaluationReport::new("v1", "holdout", [("accuracy", 0.90), ("rmse", 5.0)]);
        let challenger =
            EvaluationReport::new("v2", "holdout", [("accuracy", 0.93), ("f1", 0.88)]);

        let cmp = compare_reports(&incumbent, &challenger);
        let (a, b, delta) = cmp.deltas["accuracy"];
        assert_eq!((a, b), (0.90, 0.93));
        assert!((delta - 0.03).abs() < 1e-12);
        assert_eq!(cmp.unshared, vec!["f1".to_string(), "rmse".to_string()]);
    }

    #[test]
    fn test_fixture_evaluator_deterministic() {
        let eval = FixtureEvaluator::new()
            .with_fixture("v1", "holdout", [("accuracy", 0.92), ("rmse", 4.1)]);
        let spec = MetricSpec::of(["accuracy", "rmse"]);

        let a = eval.evaluate("v1", "holdout", &spec).unwrap();
        let b = eval.evaluate("v1", "holdout", &spec).unwrap();
        assert_eq!(a.metrics, b.metrics);
        assert_eq!(a.dataset_id, b.dataset_id);
    }

    #[test]
    fn test_fixture_evaluator_dataset_unavailable() {
        let eval = FixtureEvaluator::new().with_fixture("v1", "holdout", [("accuracy", 0.92)]);
        let result = eval.evaluate("v1", "shadow", &MetricSpec::of(["accuracy"]));
        assert!(matches!(result, Err(EvalError::DatasetUnavailable(_))));
    }

    #[test]
    fn test_fixture_evaluator_model_load_failure() {
        let eval = FixtureEvaluator::new().with_fixture("v1", "holdout", [("accuracy", 0.92)]);
        let result = eval.evaluate("ghost", "holdout", &MetricSpec::of(["accuracy"]));
        assert!(matches!(result, Err(EvalError::ModelLoadFailure(_))));
    }

    #[test]
    fn test_fixture_evaluator_undefined_metric() {
        let eval = FixtureEvaluator::new().with_fixture("v1", "holdout", [("accuracy", 0.92)]);
        let result = eval.evaluate("v1", "holdout", &MetricSpec::of(["silhouette"]));
        assert!(matches!(result, Err(EvalError::MetricComputationError { .. })));
    }
}
