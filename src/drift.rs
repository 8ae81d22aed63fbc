//! Feature-wise distribution drift detection
//!
//! Compares each feature column of a new sample against a stored reference
//! sample with the two-sample Kolmogorov-Smirnov test. A feature drifts when
//! its p-value falls below the (multiple-comparisons corrected) significance
//! threshold. Useful as a cheap first line against wholesale dataset
//! substitution or distribution-level tampering.

use aprender::primitives::Matrix;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

/// Default significance level for the per-feature test.
const DEFAULT_P_VALUE_THRESHOLD: f64 = 0.05;

/// Term cap for the Kolmogorov tail series.
const KOLMOGOROV_SERIES_TERMS: usize = 100;

/// Errors for drift detection
#[derive(Error, Debug)]
pub enum DriftError {
    #[error("detector must be fit with reference data first")]
    NotFitted,

    #[error("feature dimension mismatch: reference has {reference}, new data has {new}")]
    DimensionMismatch { reference: usize, new: usize },
}

pub type Result<T> = std::result::Result<T, DriftError>;

/// Multiple hypothesis testing correction applied across feature columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum Correction {
    /// Divide the significance threshold by the number of features.
    #[default]
    Bonferroni,
    /// Test each feature at the raw threshold.
    None,
}

/// Outcome of a drift check.
#[derive(Debug, Clone, Serialize)]
pub struct DriftReport {
    /// True when any feature drifted.
    pub is_drift: bool,
    /// Column indices of drifted features.
    pub drift_features: Vec<usize>,
    /// Per-feature p-values, index-aligned with the columns.
    pub p_values: Vec<f64>,
    /// Effective per-feature threshold after correction.
    pub threshold: f64,
}

/// Two-sample Kolmogorov-Smirnov drift detector.
///
/// `fit` stores the reference sample; `predict` compares new data against it
/// feature by feature. The detector holds no other state and may be reused
/// across any number of `predict` calls.
#[derive(Debug)]
pub struct DriftDetector {
    p_value_threshold: f64,
    correction: Correction,
    reference: Option<Matrix<f32>>,
}

impl Default for DriftDetector {
    fn default() -> Self {
        Self::new(DEFAULT_P_VALUE_THRESHOLD, Correction::default())
    }
}

impl DriftDetector {
    /// Create a detector.
    ///
    /// # Arguments
    /// * `p_value_threshold` - Significance level for the test (default: 0.05)
    /// * `correction` - Multiple hypothesis testing correction
    pub fn new(p_value_threshold: f64, correction: Correction) -> Self {
        Self {
            p_value_threshold,
            correction,
            reference: None,
        }
    }

    /// Store the reference sample for later comparison.
    pub fn fit(&mut self, reference: Matrix<f32>) {
        self.reference = Some(reference);
    }

    /// Check new data for drift against the fitted reference.
    ///
    /// # Errors
    /// * `NotFitted` when `fit` was never called
    /// * `DimensionMismatch` when the column counts disagree
    pub fn predict(&self, new_data: &Matrix<f32>) -> Result<DriftReport> {
        let reference = self.reference.as_ref().ok_or(DriftError::NotFitted)?;

        let (n_ref, ref_cols) = reference.shape();
        let (n_new, new_cols) = new_data.shape();
        if ref_cols != new_cols {
            return Err(DriftError::DimensionMismatch {
                reference: ref_cols,
                new: new_cols,
            });
        }

        let threshold = match self.correction {
            Correction::Bonferroni => self.p_value_threshold / ref_cols as f64,
            Correction::None => self.p_value_threshold,
        };

        let mut p_values = Vec::with_capacity(ref_cols);
        let mut drift_features = Vec::new();

        for col in 0..ref_cols {
            let ref_feature: Vec<f32> = (0..n_ref).map(|i| reference.get(i, col)).collect();
            let new_feature: Vec<f32> = (0..n_new).map(|i| new_data.get(i, col)).collect();

            let statistic = ks_statistic(&ref_feature, &new_feature);
            let p_value = ks_p_value(statistic, n_ref, n_new);
            p_values.push(p_value);

            if p_value < threshold {
                drift_features.push(col);
            }
        }

        debug!(
            drifted = drift_features.len(),
            features = ref_cols,
            threshold,
            "drift check complete"
        );

        Ok(DriftReport {
            is_drift: !drift_features.is_empty(),
            drift_features,
            p_values,
            threshold,
        })
    }
}

/// Two-sample KS statistic: the supremum distance between the empirical
/// distribution functions of `a` and `b`.
fn ks_statistic(a: &[f32], b: &[f32]) -> f64 {
    let mut a = a.to_vec();
    let mut b = b.to_vec();
    a.sort_by(|x, y| x.partial_cmp(y).unwrap_or(std::cmp::Ordering::Equal));
    b.sort_by(|x, y| x.partial_cmp(y).unwrap_or(std::cmp::Ordering::Equal));

    let n = a.len();
    let m = b.len();
    if n == 0 || m == 0 {
        return 0.0;
    }

    let mut i = 0;
    let mut j = 0;
    let mut max_distance = 0.0f64;

    while i < n && j < m {
        // Advance both ECDFs past the smaller value, absorbing ties so both
        // step functions are evaluated at the same point.
        let x = a[i].min(b[j]);
        while i < n && a[i] <= x {
            i += 1;
        }
        while j < m && b[j] <= x {
            j += 1;
        }

        let f_a = i as f64 / n as f64;
        let f_b = j as f64 / m as f64;
        max_distance = max_distance.max((f_a - f_b).abs());
    }

    max_distance
}

/// Asymptotic two-sample KS p-value.
///
/// Evaluates the Kolmogorov tail series Q(lambda) = 2 sum (-1)^(k-1)
/// exp(-2 k^2 lambda^2) with the finite-sample effective-n correction.
/// Returns 1.0 when the series fails to converge within the term cap,
/// which only happens for vanishing statistics.
fn ks_p_value(statistic: f64, n: usize, m: usize) -> f64 {
    if statistic <= 0.0 {
        return 1.0;
    }

    let n_eff = (n as f64 * m as f64) / (n as f64 + m as f64);
    let sqrt_n = n_eff.sqrt();
    let lambda = (sqrt_n + 0.12 + 0.11 / sqrt_n) * statistic;
    let exponent = -2.0 * lambda * lambda;

    let mut sum = 0.0f64;
    let mut sign = 1.0f64;
    let mut previous_term = 0.0f64;

    for k in 1..=KOLMOGOROV_SERIES_TERMS {
        let k = k as f64;
        let term = (exponent * k * k).exp();
        sum += sign * term;

        if term <= 1e-12 || term <= 1e-6 * previous_term {
            return (2.0 * sum).clamp(0.0, 1.0);
        }
        previous_term = term;
        sign = -sign;
    }

    1.0
}
