//! Baseline statistical profiles
//!
//! A [`BaselineProfile`] is the snapshot of traffic taken when a version
//! enters Production: per-feature decile sketches for numeric features and
//! category counts for categorical ones. Read-only afterward except for an
//! explicit refresh.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::TrafficWindow;

/// Number of quantile bins in a numeric sketch (deciles).
pub const SKETCH_BINS: usize = 10;

/// Per-feature summary statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FeatureSummary {
    /// Numeric feature: decile bin edges (with infinite end caps), the
    /// baseline count per bin, and the baseline mean.
    Numeric { edges: Vec<f64>, counts: Vec<usize>, mean: f64 },
    /// Categorical feature: observation count per category.
    Categorical { counts: BTreeMap<String, usize> },
}

impl FeatureSummary {
    /// Build a numeric summary from raw baseline samples.
    ///
    /// Bin edges are the sample deciles, capped with ±infinity so every
    /// future observation lands in a bin.
    pub fn from_numeric(values: &[f64]) -> Self {
        let mut sorted: Vec<f64> = values.to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let mut edges = Vec::with_capacity(SKETCH_BINS + 1);
        edges.push(f64::NEG_INFINITY);
        if !sorted.is_empty() {
            for i in 1..SKETCH_BINS {
                let idx = (sorted.len() * i / SKETCH_BINS).min(sorted.len() - 1);
                edges.push(sorted[idx]);
            }
        } else {
            edges.extend(std::iter::repeat(0.0).take(SKETCH_BINS - 1));
        }
        edges.push(f64::INFINITY);

        let counts = bin_counts(values, &edges);
        let mean = if values.is_empty() {
            0.0
        } else {
            values.iter().sum::<f64>() / values.len() as f64
        };

        FeatureSummary::Numeric { edges, counts, mean }
    }

    /// Build a categorical summary from raw baseline samples.
    pub fn from_categorical(values: &[String]) -> Self {
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for v in values {
            *counts.entry(v.clone()).or_insert(0) += 1;
        }
        FeatureSummary::Categorical { counts }
    }
}

/// Count samples per bin for the given edges.
///
/// Edges are half-open on the left: a value lands in bin `i` when
/// `edges[i] < value <= edges[i + 1]`, with the -infinity cap catching the
/// minimum.
pub fn bin_counts(data: &[f64], edges: &[f64]) -> Vec<usize> {
    let mut counts = vec![0; edges.len().saturating_sub(1)];
    for &val in data {
        for i in 0..counts.len() {
            if val > edges[i] && val <= edges[i + 1] {
                counts[i] += 1;
                break;
            }
        }
    }
    counts
}

/// Statistical snapshot of traffic for one deployed model version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineProfile {
    /// Version the snapshot belongs to
    pub model_version_id: String,
    /// Feature name to summary
    pub features: BTreeMap<String, FeatureSummary>,
    /// When the snapshot was taken
    pub captured_at: DateTime<Utc>,
    /// Number of traffic samples the snapshot was built from
    pub sample_size: usize,
}

impl BaselineProfile {
    /// Capture a profile from a traffic window.
    pub fn capture(model_version_id: impl Into<String>, window: &TrafficWindow) -> Self {
        let mut features = BTreeMap::new();
        for (name, values) in &window.numeric {
            features.insert(name.clone(), FeatureSummary::from_numeric(values));
        }
        for (name, values) in &window.categorical {
            features.insert(name.clone(), FeatureSummary::from_categorical(values));
        }
        Self {
            model_version_id: model_version_id.into(),
            features,
            captured_at: Utc::now(),
            sample_size: window.sample_count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_sketch_shape() {
        let values: Vec<f64> = (0..100).map(f64::from).collect();
        let summary = FeatureSummary::from_numeric(&values);
        let FeatureSummary::Numeric { edges, counts, mean } = summary else {
            panic!("expected numeric summary");
        };
        assert_eq!(edges.len(), SKETCH_BINS + 1);
        assert_eq!(counts.len(), SKETCH_BINS);
        assert_eq!(edges[0], f64::NEG_INFINITY);
        assert_eq!(edges[SKETCH_BINS], f64::INFINITY);
        assert_eq!(counts.iter().sum::<usize>(), 100);
        assert!((mean - 49.5).abs() < 1e-9);
    }

    #[test]
    fn test_numeric_sketch_empty() {
        let summary = FeatureSummary::from_numeric(&[]);
        let FeatureSummary::Numeric { edges, counts, mean } = summary else {
            panic!("expected numeric summary");
        };
        assert_eq!(edges.len(), SKETCH_BINS + 1);
        assert!(counts.iter().all(|&c| c == 0));
        assert_eq!(mean, 0.0);
    }

    #[test]
    fn test_categorical_counts() {
        let values: Vec<String> =
            ["standard", "standard", "free_reduced"].iter().map(|s| s.to_string()).collect();
        let summary = FeatureSummary::from_categorical(&values);
        let FeatureSummary::Categorical { counts } = summary else {
            panic!("expected categorical summary");
        };
        assert_eq!(counts.get("standard"), Some(&2));
        assert_eq!(counts.get("free_reduced"), Some(&1));
    }

    #[test]
    fn test_bin_counts_cover_all_values() {
        let data = vec![0.5, 1.5, 2.5, 3.5];
        let edges = vec![f64::NEG_INFINITY, 1.0, 2.0, 3.0, f64::INFINITY];
        assert_eq!(bin_counts(&data, &edges), vec![1, 1, 1, 1]);
    }

    #[test]
    fn test_capture_records_sample_size() {
        let window = TrafficWindow::over(Utc::now(), Utc::now())
            .with_numeric("reading_score", (0..60).map(f64::from).collect())
            .with_categorical("lunch", vec!["standard".into(); 60]);
        let profile = BaselineProfile::capture("v1", &window);
        assert_eq!(profile.sample_size, 60);
        assert_eq!(profile.features.len(), 2);
    }
}
