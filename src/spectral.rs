//! Spectral signature analysis for poisoned-sample detection
//!
//! Scores each sample by the magnitude of its projection onto the dominant
//! singular direction of its class, after class-mean centering. Backdoor
//! poisoning concentrates variance in a low-rank subspace of the class
//! covariance, so poisoned samples sit far out along that direction while
//! clean samples stay near the bulk.
//!
//! # References
//!
//! Tran, B., Li, J., & Madry, A. (2018). Spectral signatures in backdoor
//! attacks. Advances in Neural Information Processing Systems 31.

use aprender::primitives::Matrix;
use std::collections::HashMap;
use thiserror::Error;
use tracing::debug;
use trueno::Vector;

/// Classes with fewer samples than this are excluded from scoring entirely.
const MIN_CLASS_SAMPLES: usize = 10;

/// Default number of standard deviations above the class mean projection
/// to treat as an outlier.
const DEFAULT_OUTLIER_THRESHOLD: f32 = 1.5;

/// Iteration cap for the dominant-direction power method.
const POWER_ITERATIONS: usize = 100;

/// Sign-invariant convergence tolerance for the power method.
const POWER_TOLERANCE: f64 = 1e-10;

/// Errors for spectral signature detection
#[derive(Error, Debug)]
pub enum SpectralError {
    #[error("feature/label count mismatch: {features} feature rows, {labels} labels")]
    ShapeMismatch { features: usize, labels: usize },

    #[error("non-finite feature value at row {row}, column {col}")]
    NonFiniteFeature { row: usize, col: usize },
}

pub type Result<T> = std::result::Result<T, SpectralError>;

/// Per-class statistical outlier scorer over learned feature representations.
///
/// Consumes a feature matrix (one row per sample, e.g. penultimate-layer
/// activations) and index-aligned class labels, and returns a sparse map
/// from sample index to outlier score for every sample whose projection
/// statistic exceeds its class threshold. Samples that are not flagged do
/// not appear in the map.
///
/// The detector holds no state besides the configured threshold multiplier;
/// `detect` is a pure function of its inputs.
#[derive(Debug, Clone)]
pub struct SpectralSignatureDetector {
    outlier_threshold: f32,
}

impl Default for SpectralSignatureDetector {
    fn default() -> Self {
        Self::new(DEFAULT_OUTLIER_THRESHOLD)
    }
}

impl SpectralSignatureDetector {
    /// Create a detector.
    ///
    /// # Arguments
    /// * `outlier_threshold` - Number of standard deviations above the class
    ///   mean projection to treat as an outlier (default: 1.5)
    pub fn new(outlier_threshold: f32) -> Self {
        Self { outlier_threshold }
    }

    /// Configured threshold multiplier.
    pub fn outlier_threshold(&self) -> f32 {
        self.outlier_threshold
    }

    /// Detect suspected poisoned samples.
    ///
    /// # Arguments
    /// * `features` - (N, D) feature matrix, one row per sample
    /// * `labels` - length-N class labels, index-aligned with `features`
    ///
    /// # Returns
    /// Map from original sample index to outlier score. Higher score means
    /// more likely to be poisoned. Only flagged samples appear; every key is
    /// a valid row index of `features`.
    ///
    /// # Errors
    /// * `ShapeMismatch` when the feature row count and label count disagree
    /// * `NonFiniteFeature` on any NaN or infinite feature value
    pub fn detect(&self, features: &Matrix<f32>, labels: &[i32]) -> Result<HashMap<usize, f32>> {
        let (n_samples, n_features) = features.shape();
        if n_samples != labels.len() {
            return Err(SpectralError::ShapeMismatch {
                features: n_samples,
                labels: labels.len(),
            });
        }

        for row in 0..n_samples {
            for col in 0..n_features {
                if !features.get(row, col).is_finite() {
                    return Err(SpectralError::NonFiniteFeature { row, col });
                }
            }
        }

        let mut flagged = HashMap::new();

        // Classes are independent; each contributes a disjoint set of keys
        // since every sample carries exactly one label.
        for (label, indices) in partition_by_class(labels) {
            if indices.len() < MIN_CLASS_SAMPLES {
                debug!(
                    label,
                    samples = indices.len(),
                    "class below minimum sample count, skipped"
                );
                continue;
            }
            self.score_class(features, &indices, label, &mut flagged);
        }

        Ok(flagged)
    }

    /// Score one class and record every sample above the class cutoff.
    fn score_class(
        &self,
        features: &Matrix<f32>,
        indices: &[usize],
        label: i32,
        flagged: &mut HashMap<usize, f32>,
    ) {
        let (_, n_features) = features.shape();
        let centered = center_rows(features, indices, n_features);

        let direction = match dominant_direction(&centered, n_features) {
            Some(direction) => direction,
            None => {
                // All samples identical: no direction of maximum variance
                // exists and no sample can be an outlier.
                debug!(label, "class has zero variance, skipped");
                return;
            }
        };

        // Magnitude of the projection onto the dominant direction. Taking
        // the absolute value neutralizes the sign ambiguity inherent to
        // singular vectors.
        let scores: Vec<f32> = centered
            .iter()
            .map(|row| dot(row, &direction).abs() as f32)
            .collect();

        let v = Vector::from_slice(&scores);
        let score_mean = v.mean().unwrap_or(0.0);
        let score_stddev = v.stddev().unwrap_or(0.0);
        let cutoff = score_mean + self.outlier_threshold * score_stddev;

        let mut class_flags = 0usize;
        for (&original_idx, &score) in indices.iter().zip(scores.iter()) {
            // Strict inequality: when the scores have zero variance the
            // cutoff degenerates to the mean and nothing is flagged.
            if score > cutoff {
                flagged.insert(original_idx, score);
                class_flags += 1;
            }
        }

        debug!(
            label,
            samples = indices.len(),
            flagged = class_flags,
            cutoff = f64::from(cutoff),
            "class scored"
        );
    }
}

/// Group sample indices by class label, preserving original order.
fn partition_by_class(labels: &[i32]) -> HashMap<i32, Vec<usize>> {
    let mut partition: HashMap<i32, Vec<usize>> = HashMap::new();
    for (idx, &label) in labels.iter().enumerate() {
        partition.entry(label).or_default().push(idx);
    }
    partition
}

/// Subtract the per-feature mean from every selected row.
fn center_rows(features: &Matrix<f32>, indices: &[usize], n_features: usize) -> Vec<Vec<f64>> {
    let count = indices.len() as f64;
    let mut mean = vec![0.0f64; n_features];
    for &i in indices {
        for (j, m) in mean.iter_mut().enumerate() {
            *m += f64::from(features.get(i, j));
        }
    }
    for m in &mut mean {
        *m /= count;
    }

    indices
        .iter()
        .map(|&i| {
            (0..n_features)
                .map(|j| f64::from(features.get(i, j)) - mean[j])
                .collect()
        })
        .collect()
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Top right singular vector of a centered matrix via power iteration.
///
/// Iterates `v <- normalize(Xᵀ(Xv))` without materializing the covariance.
/// The start vector is the coordinate axis with the largest column energy,
/// so repeated calls on identical input produce identical output. The
/// convergence test is sign-invariant because singular vectors are only
/// defined up to sign.
///
/// Returns `None` when the matrix is all-zero, in which case no direction
/// of maximum variance exists.
fn dominant_direction(rows: &[Vec<f64>], n_features: usize) -> Option<Vec<f64>> {
    let mut energy = vec![0.0f64; n_features];
    for row in rows {
        for (j, &x) in row.iter().enumerate() {
            energy[j] += x * x;
        }
    }

    let (start, max_energy) = energy
        .iter()
        .enumerate()
        .fold((0, 0.0), |best, (j, &e)| if e > best.1 { (j, e) } else { best });
    if max_energy <= 0.0 {
        return None;
    }

    let mut v = vec![0.0f64; n_features];
    v[start] = 1.0;

    for _ in 0..POWER_ITERATIONS {
        // w = Xᵀ(Xv), one pass over the rows
        let mut w = vec![0.0f64; n_features];
        for row in rows {
            let p = dot(row, &v);
            for (j, &x) in row.iter().enumerate() {
                w[j] += p * x;
            }
        }

        let norm = w.iter().map(|x| x * x).sum::<f64>().sqrt();
        if norm == 0.0 {
            break;
        }
        for value in &mut w {
            *value /= norm;
        }

        let drift = 1.0 - dot(&w, &v).abs();
        v = w;
        if drift < POWER_TOLERANCE {
            break;
        }
    }

    Some(v)
}
