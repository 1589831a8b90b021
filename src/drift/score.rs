//! Distributional distance scores
//!
//! Two-sample scores computed between a stored baseline sketch and a live
//! traffic window: PSI and a KS-style CDF distance for numeric features,
//! a per-sample chi-square divergence for categorical features. All three
//! are pure functions of their inputs so verdicts are bit-reproducible.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::profile::bin_counts;

/// Score selection for numeric features.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NumericTest {
    /// Population Stability Index against the baseline decile bins
    #[default]
    Psi,
    /// Maximum CDF distance over the baseline decile bins
    Ks,
}

/// Population Stability Index of `current` against baseline bin counts.
///
/// Smoothing constants keep empty bins from producing infinities and match
/// the usual industry formulation.
pub fn psi(baseline_counts: &[usize], edges: &[f64], current: &[f64]) -> f64 {
    let current_counts = bin_counts(current, edges);

    let total_baseline = baseline_counts.iter().sum::<usize>() as f64;
    let total_current = current.len() as f64;

    let mut score = 0.0;
    for (b, c) in baseline_counts.iter().zip(current_counts.iter()) {
        let b_pct = (*b as f64 + 0.0001) / (total_baseline + 0.001);
        let c_pct = (*c as f64 + 0.0001) / (total_current + 0.001);
        score += (c_pct - b_pct) * (c_pct / b_pct).ln();
    }
    score
}

/// Maximum empirical CDF distance between `current` and the baseline
/// sketch, evaluated at the sketch's bin edges.
pub fn ks_distance(baseline_counts: &[usize], edges: &[f64], current: &[f64]) -> f64 {
    let current_counts = bin_counts(current, edges);

    let total_baseline = baseline_counts.iter().sum::<usize>() as f64;
    let total_current = current.len() as f64;
    if total_baseline == 0.0 || total_current == 0.0 {
        return 0.0;
    }

    let mut cdf_b = 0.0;
    let mut cdf_c = 0.0;
    let mut d_max = 0.0f64;
    for (b, c) in baseline_counts.iter().zip(current_counts.iter()) {
        cdf_b += *b as f64 / total_baseline;
        cdf_c += *c as f64 / total_current;
        d_max = d_max.max((cdf_b - cdf_c).abs());
    }
    d_max
}

/// Per-sample chi-square divergence of current category frequencies against
/// baseline proportions.
///
/// The raw chi-square statistic grows linearly with the window size, so it
/// is normalized by the current sample count to keep thresholds independent
/// of window sizing. Categories unseen in the baseline contribute through
/// a one-observation floor on the expected count.
pub fn chi_square_divergence(
    baseline_counts: &BTreeMap<String, usize>,
    current: &[String],
) -> f64 {
    let total_baseline = baseline_counts.values().sum::<usize>() as f64;
    let total_current = current.len() as f64;
    if total_baseline == 0.0 || total_current == 0.0 {
        return 0.0;
    }

    let mut current_counts: BTreeMap<&str, usize> = BTreeMap::new();
    for v in current {
        *current_counts.entry(v.as_str()).or_insert(0) += 1;
    }

    let mut categories: Vec<&str> = baseline_counts.keys().map(String::as_str).collect();
    for cat in current_counts.keys() {
        if !baseline_counts.contains_key(*cat) {
            categories.push(cat);
        }
    }

    let mut chi_sq = 0.0;
    for cat in categories {
        let observed = *current_counts.get(cat).unwrap_or(&0) as f64;
        let baseline_pct = *baseline_counts.get(cat).unwrap_or(&0) as f64 / total_baseline;
        let expected = (baseline_pct * total_current).max(1.0);
        chi_sq += (observed - expected).powi(2) / expected;
    }

    chi_sq / total_current
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drift::profile::FeatureSummary;

    fn sketch(values: &[f64]) -> (Vec<usize>, Vec<f64>) {
        let FeatureSummary::Numeric { edges, counts, .. } = FeatureSummary::from_numeric(values)
        else {
            panic!("expected numeric summary");
        };
        (counts, edges)
    }

    #[test]
    fn test_psi_identical_near_zero() {
        let baseline: Vec<f64> = (0..100).map(f64::from).collect();
        let (counts, edges) = sketch(&baseline);
        assert!(psi(&counts, &edges, &baseline) < 0.01);
    }

    #[test]
    fn test_psi_shifted_distribution_high() {
        let baseline: Vec<f64> = (0..100).map(|i| f64::from(i % 10)).collect();
        let (counts, edges) = sketch(&baseline);
        let shifted: Vec<f64> = (0..100).map(|i| 90.0 + f64::from(i % 10)).collect();
        assert!(psi(&counts, &edges, &shifted) > 0.25);
    }

    #[test]
    fn test_ks_identical_zero() {
        let baseline: Vec<f64> = (0..100).map(f64::from).collect();
        let (counts, edges) = sketch(&baseline);
        assert!(ks_distance(&counts, &edges, &baseline) < 1e-9);
    }

    #[test]
    fn test_ks_disjoint_high() {
        let baseline: Vec<f64> = (0..100).map(f64::from).collect();
        let (counts, edges) = sketch(&baseline);
        let far: Vec<f64> = (1000..1100).map(f64::from).collect();
        assert!(ks_distance(&counts, &edges, &far) > 0.8);
    }

    #[test]
    fn test_ks_empty_current() {
        let baseline: Vec<f64> = (0..100).map(f64::from).collect();
        let (counts, edges) = sketch(&baseline);
        assert_eq!(ks_distance(&counts, &edges, &[]), 0.0);
    }

    #[test]
    fn test_chi_square_identical_near_zero() {
        let mut baseline = BTreeMap::new();
        baseline.insert("a".to_string(), 50usize);
        baseline.insert("b".to_string(), 50usize);
        let current: Vec<String> =
            (0..100).map(|i| if i % 2 == 0 { "a".into() } else { "b".into() }).collect();
        assert!(chi_square_divergence(&baseline, &current) < 0.05);
    }

    #[test]
    fn test_chi_square_collapsed_distribution_high() {
        let mut baseline = BTreeMap::new();
        for cat in ["a", "b", "c", "d", "e"] {
            baseline.insert(cat.to_string(), 20usize);
        }
        let current: Vec<String> = vec!["a".into(); 100];
        assert!(chi_square_divergence(&baseline, &current) > 1.0);
    }

    #[test]
    fn test_chi_square_unseen_category_scores() {
        let mut baseline = BTreeMap::new();
        baseline.insert("a".to_string(), 100usize);
        let current: Vec<String> = vec!["z".into(); 100];
        assert!(chi_square_divergence(&baseline, &current) > 0.5);
    }

    #[test]
    fn test_chi_square_empty_inputs_zero() {
        assert_eq!(chi_square_divergence(&BTreeMap::new(), &["a".to_string()]), 0.0);
        let mut baseline = BTreeMap::new();
        baseline.insert("a".to_string(), 10usize);
        assert_eq!(chi_square_divergence(&baseline, &[]), 0.0);
    }
}

#[cfg(test)]
mod property_tests {
    use super::*;
    use crate::drift::profile::FeatureSummary;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn prop_scores_deterministic(values in proptest::collection::vec(-100.0f64..100.0, 20..80)) {
            let FeatureSummary::Numeric { edges, counts, .. } =
                FeatureSummary::from_numeric(&values) else { unreachable!() };
            let p1 = psi(&counts, &edges, &values);
            let p2 = psi(&counts, &edges, &values);
            prop_assert_eq!(p1.to_bits(), p2.to_bits());
            let k1 = ks_distance(&counts, &edges, &values);
            let k2 = ks_distance(&counts, &edges, &values);
            prop_assert_eq!(k1.to_bits(), k2.to_bits());
        }

        #[test]
        fn prop_ks_bounded(
            baseline in proptest::collection::vec(-50.0f64..50.0, 20..60),
            current in proptest::collection::vec(-50.0f64..50.0, 20..60),
        ) {
            let FeatureSummary::Numeric { edges, counts, .. } =
                FeatureSummary::from_numeric(&baseline) else { unreachable!() };
            let d = ks_distance(&counts, &edges, &current);
            prop_assert!((0.0..=1.0).contains(&d));
        }
    }
}
