//! Drift Monitor (PRM-003)
//!
//! Quantifies distributional divergence between live traffic and the
//! baseline profile captured when a version entered Production. Numeric
//! features are scored with PSI or a KS-style CDF distance against the
//! baseline decile sketch; categorical features with a chi-square frequency
//! divergence. Per-feature scores are classified against warning/critical
//! thresholds and rolled up to an aggregate verdict; windows below the
//! configured minimum sample count produce an explicit `Insufficient`
//! outcome rather than a verdict.

pub mod profile;
pub mod score;
pub mod verdicts;


pub use profile::{BaselineProfile, FeatureSummary};
pub use score::NumericTest;
pub use verdicts::{InMemoryVerdicts, JsonFileVerdicts, VerdictStore};

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Aggregate drift severity for a verdict.
///
/// Ordered so the aggregate is simply the maximum over features.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DriftStatus {
    /// All features within warning thresholds
    Stable,
    /// At least one feature at or above its warning threshold
    Warning,
    /// At least one feature at or above its critical threshold
    Critical,
}

/// Warning/critical score thresholds for one feature.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DriftThresholds {
    /// Score at or above which the feature is flagged
    pub warning: f64,
    /// Score at or above which the feature is critical
    pub critical: f64,
}

impl DriftThresholds {
    /// Classify a score against these thresholds
    pub fn classify(&self, score: f64) -> DriftStatus {
        if score >= self.critical {
            DriftStatus::Critical
        } else if score >= self.warning {
            DriftStatus::Warning
        } else {
            DriftStatus::Stable
        }
    }
}

/// A bounded window of recent traffic, column-oriented by feature name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficWindow {
    /// Start of the window
    pub window_start: DateTime<Utc>,
    /// End of the window
    pub window_end: DateTime<Utc>,
    /// Numeric feature columns
    pub numeric: BTreeMap<String, Vec<f64>>,
    /// Categorical feature columns
    pub categorical: BTreeMap<String, Vec<String>>,
}

impl TrafficWindow {
    /// Empty window spanning the given interval
    pub fn over(window_start: DateTime<Utc>, window_end: DateTime<Utc>) -> Self {
        Self { window_start, window_end, numeric: BTreeMap::new(), categorical: BTreeMap::new() }
    }

    /// Add a numeric feature column
    pub fn with_numeric(mut self, name: impl Into<String>, values: Vec<f64>) -> Self {
        self.numeric.insert(name.into(), values);
        self
    }

    /// Add a categorical feature column
    pub fn with_categorical(mut self, name: impl Into<String>, values: Vec<String>) -> Self {
        self.categorical.insert(name.into(), values);
        self
    }

    /// Number of samples in the window (longest column).
    pub fn sample_count(&self) -> usize {
        let n = self.numeric.values().map(Vec::len).max().unwrap_or(0);
        let c = self.categorical.values().map(Vec::len).max().unwrap_or(0);
        n.max(c)
    }
}

/// Periodic comparison result for one window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftVerdict {
    /// Production version the window was compared for
    pub model_version_id: String,
    /// Window bounds
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    /// Per-feature drift score
    pub scores: BTreeMap<String, f64>,
    /// Maximum severity across features
    pub status: DriftStatus,
    /// Every feature at or above its warning threshold, sorted by name
    pub triggering_features: Vec<String>,
}

/// Outcome of a drift check.
///
/// `Insufficient` is deliberately not a verdict: a tiny window carries no
/// statistical weight and must not be read as `Stable`.
#[derive(Debug, Clone, PartialEq)]
pub enum DriftOutcome {
    /// A full verdict over the window
    Verdict(DriftVerdict),
    /// Too few samples to judge
    Insufficient { observed: usize, required: usize },
}

impl DriftOutcome {
    /// The verdict, if one was produced
    pub fn verdict(&self) -> Option<&DriftVerdict> {
        match self {
            DriftOutcome::Verdict(v) => Some(v),
            DriftOutcome::Insufficient { .. } => None,
        }
    }
}

/// Feature counts per severity across one verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriftSummary {
    pub total_features: usize,
    pub warnings: usize,
    pub critical: usize,
}

impl DriftSummary {
    /// Summarize a verdict against the thresholds that produced it
    pub fn of(verdict: &DriftVerdict, config: &MonitorConfig) -> Self {
        let mut warnings = 0;
        let mut critical = 0;
        for (feature, score) in &verdict.scores {
            match config.thresholds_for(feature).classify(*score) {
                DriftStatus::Critical => critical += 1,
                DriftStatus::Warning => warnings += 1,
                DriftStatus::Stable => {}
            }
        }
        Self { total_features: verdict.scores.len(), warnings, critical }
    }
}

/// Errors from drift monitoring
#[derive(Debug, Error)]
pub enum DriftError {
    /// No baseline captured for the version being checked
    #[error("no baseline profile for version {0}")]
    NoBaseline(String),

    /// Traffic source failed for a non-timeout reason
    #[error("traffic source error: {0}")]
    Source(String),
}

/// Result type for drift operations
pub type Result<T> = std::result::Result<T, DriftError>;

/// Failure modes when pulling a traffic window.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The bounded timeout elapsed; treated as insufficient data upstream
    #[error("traffic fetch timed out after {0:?}")]
    TimedOut(Duration),

    #[error("traffic source unavailable: {0}")]
    Unavailable(String),
}

/// Source of recent traffic samples for a deployment slot.
///
/// The fetch is the one suspending call in the drift path and must honor
/// the bounded timeout rather than blocking indefinitely.
pub trait TrafficSource: Send + Sync {
    /// Pull the most recent window for a slot
    fn fetch_window(&self, slot: &str, timeout: Duration) -> std::result::Result<TrafficWindow, FetchError>;
}

/// Drift monitor configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Which score to use for numeric features
    #[serde(default)]
    pub numeric_test: NumericTest,
    /// Minimum window sample count for a verdict
    pub min_samples: usize,
    /// Default thresholds for numeric feature scores
    pub numeric_thresholds: DriftThresholds,
    /// Default thresholds for categorical feature scores
    pub categorical_thresholds: DriftThresholds,
    /// Per-feature overrides, taking precedence over the defaults
    #[serde(default)]
    pub feature_overrides: BTreeMap<String, DriftThresholds>,
    /// Timeout for traffic window fetches
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,
}

fn default_fetch_timeout_ms() -> u64 {
    5_000
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            numeric_test: NumericTest::Psi,
            min_samples: 50,
            numeric_thresholds: DriftThresholds { warning: 0.10, critical: 0.25 },
            categorical_thresholds: DriftThresholds { warning: 0.15, critical: 0.35 },
            feature_overrides: BTreeMap::new(),
            fetch_timeout_ms: default_fetch_timeout_ms(),
        }
    }
}

impl MonitorConfig {
    /// Thresholds in effect for a feature (override, else the numeric
    /// default; the categorical default is applied by the caller that
    /// knows the feature type).
    fn thresholds_for(&self, feature: &str) -> DriftThresholds {
        self.feature_overrides.get(feature).copied().unwrap_or(self.numeric_thresholds)
    }

    fn thresholds_for_kind(&self, feature: &str, summary: &FeatureSummary) -> DriftThresholds {
        if let Some(t) = self.feature_overrides.get(feature) {
            return *t;
        }
        match summary {
            FeatureSummary::Numeric { .. } => self.numeric_thresholds,
            FeatureSummary::Categorical { .. } => self.categorical_thresholds,
        }
    }
}

/// The drift monitor.
///
/// Owns the baseline profiles (captured at promotion, refreshed only
/// explicitly) and compares traffic windows against them. Comparison is
/// read-only and deterministic: identical windows and baselines produce
/// bit-identical verdicts.
pub struct DriftMonitor {
    config: MonitorConfig,
    baselines: Mutex<HashMap<String, BaselineProfile>>,
}

impl DriftMonitor {
    /// Create a monitor with the given configuration
    pub fn new(config: MonitorConfig) -> Self {
        Self { config, baselines: Mutex::new(HashMap::new()) }
    }

    /// The active configuration
    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Capture (or explicitly refresh) the baseline for a version from a
    /// traffic window. Returns the stored profile.
    pub fn capture_baseline(
        &self,
        model_version_id: &str,
        window: &TrafficWindow,
    ) -> BaselineProfile {
        let profile = BaselineProfile::capture(model_version_id, window);
        if let Ok(mut baselines) = self.baselines.lock() {
            baselines.insert(model_version_id.to_string(), profile.clone());
        }
        profile
    }

    /// The stored baseline for a version, if captured
    pub fn baseline(&self, model_version_id: &str) -> Option<BaselineProfile> {
        self.baselines.lock().ok().and_then(|b| b.get(model_version_id).cloned())
    }

    /// Compare a window against an explicit baseline profile.
    ///
    /// Features present in the baseline but absent from the window are
    /// skipped; the window producer owns the schema.
    pub fn compare(&self, baseline: &BaselineProfile, window: &TrafficWindow) -> DriftOutcome {
        let observed = window.sample_count();
        if observed < self.config.min_samples {
            return DriftOutcome::Insufficient { observed, required: self.config.min_samples };
        }

        let mut scores = BTreeMap::new();
        let mut status = DriftStatus::Stable;
        let mut triggering = Vec::new();

        for (feature, summary) in &baseline.features {
            let score = match summary {
                FeatureSummary::Numeric { edges, counts, .. } => {
                    let Some(current) = window.numeric.get(feature) else { continue };
                    match self.config.numeric_test {
                        NumericTest::Psi => score::psi(counts, edges, current),
                        NumericTest::Ks => score::ks_distance(counts, edges, current),
                    }
                }
                FeatureSummary::Categorical { counts } => {
                    let Some(current) = window.categorical.get(feature) else { continue };
                    score::chi_square_divergence(counts, current)
                }
            };

            let severity = self.config.thresholds_for_kind(feature, summary).classify(score);
            status = status.max(severity);
            if severity >= DriftStatus::Warning {
                triggering.push(feature.clone());
            }
            scores.insert(feature.clone(), score);
        }

        DriftOutcome::Verdict(DriftVerdict {
            model_version_id: baseline.model_version_id.clone(),
            window_start: window.window_start,
            window_end: window.window_end,
            scores,
            status,
            triggering_features: triggering,
        })
    }

    /// Compare a window against the stored baseline for a version.
    pub fn check(&self, model_version_id: &str, window: &TrafficWindow) -> Result<DriftOutcome> {
        let baseline = self
            .baseline(model_version_id)
            .ok_or_else(|| DriftError::NoBaseline(model_version_id.to_string()))?;
        Ok(self.compare(&baseline, window))
    }

    /// One periodic scan: pull a window for the slot and compare it for the
    /// given production version. A fetch timeout is reported as
    /// `Insufficient`, never as a verdict.
    pub fn scan(
        &self,
        source: &dyn TrafficSource,
        slot: &str,
        model_version_id: &str,
    ) -> Result<DriftOutcome> {
        let timeout = Duration::from_millis(self.config.fetch_timeout_ms);
        match source.fetch_window(slot, timeout) {
            Ok(window) => self.check(model_version_id, &window),
            Err(FetchError::TimedOut(_)) => {
                Ok(DriftOutcome::Insufficient { observed: 0, required: self.config.min_samples })
            }
            Err(FetchError::Unavailable(reason)) => Err(DriftError::Source(reason)),
        }
    }
}
