//! Weighted kernel density estimation for range compression.
//!
//! The density-based range step models where good configurations cluster
//! along each parameter axis. Samples carry weights (performance rank times
//! task similarity), so the estimator here is a weighted Gaussian KDE with
//! Scott's-rule bandwidth computed from the effective sample size.

use crate::error::{Error, Result};

/// A weighted univariate Gaussian kernel density estimator.
#[derive(Clone, Debug)]
pub(crate) struct WeightedKde {
    samples: Vec<f64>,
    /// Normalized to sum to one.
    weights: Vec<f64>,
    bandwidth: f64,
}

impl WeightedKde {
    /// Creates an estimator with automatic bandwidth selection.
    ///
    /// Weights need not be normalized; non-positive weights are treated as
    /// zero. When all weights are zero the samples are weighted uniformly.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptySamples`] for an empty sample set and
    /// [`Error::WeightCountMismatch`] when the weight count differs from
    /// the sample count.
    #[allow(clippy::cast_precision_loss)]
    pub(crate) fn new(samples: Vec<f64>, weights: Vec<f64>) -> Result<Self> {
        if samples.is_empty() {
            return Err(Error::EmptySamples);
        }
        if weights.len() != samples.len() {
            return Err(Error::WeightCountMismatch {
                expected: samples.len(),
                got: weights.len(),
            });
        }

        let mut weights: Vec<f64> = weights
            .into_iter()
            .map(|w| if w.is_finite() && w > 0.0 { w } else { 0.0 })
            .collect();
        let total: f64 = weights.iter().sum();
        if total > 0.0 {
            for w in &mut weights {
                *w /= total;
            }
        } else {
            let uniform = 1.0 / samples.len() as f64;
            weights.fill(uniform);
        }

        let bandwidth = scotts_rule(&samples, &weights);
        Ok(Self {
            samples,
            weights,
            bandwidth,
        })
    }

    /// The selected kernel bandwidth.
    #[cfg(test)]
    pub(crate) fn bandwidth(&self) -> f64 {
        self.bandwidth
    }

    /// Probability density at `x`.
    pub(crate) fn pdf(&self, x: f64) -> f64 {
        let inv_bandwidth = 1.0 / self.bandwidth;
        let normalization = inv_bandwidth / (2.0 * core::f64::consts::PI).sqrt();
        self.samples
            .iter()
            .zip(&self.weights)
            .map(|(&s, &w)| {
                let z = (x - s) * inv_bandwidth;
                w * (-0.5 * z * z).exp()
            })
            .sum::<f64>()
            * normalization
    }
}

/// Scott's rule over the effective sample size `1 / sum(w_i^2)`.
fn scotts_rule(samples: &[f64], weights: &[f64]) -> f64 {
    let mean: f64 = samples.iter().zip(weights).map(|(&s, &w)| s * w).sum();
    let variance: f64 = samples
        .iter()
        .zip(weights)
        .map(|(&s, &w)| w * (s - mean).powi(2))
        .sum();
    let std_dev = variance.sqrt();
    // All samples identical: fall back to a small positive bandwidth.
    if std_dev < f64::EPSILON {
        return 1.0;
    }
    let n_eff = 1.0 / weights.iter().map(|w| w * w).sum::<f64>();
    n_eff.powf(-0.2) * std_dev
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_samples_rejected() {
        assert!(matches!(
            WeightedKde::new(vec![], vec![]),
            Err(Error::EmptySamples)
        ));
    }

    #[test]
    fn weight_count_must_match() {
        assert!(matches!(
            WeightedKde::new(vec![1.0, 2.0], vec![1.0]),
            Err(Error::WeightCountMismatch {
                expected: 2,
                got: 1
            })
        ));
    }

    #[test]
    fn density_peaks_near_heavy_samples() {
        let kde = WeightedKde::new(vec![0.0, 1.0], vec![10.0, 1.0]).unwrap();
        assert!(kde.pdf(0.0) > kde.pdf(1.0));
    }

    #[test]
    fn zero_weights_fall_back_to_uniform() {
        let kde = WeightedKde::new(vec![0.0, 2.0], vec![0.0, 0.0]).unwrap();
        // Symmetric samples under uniform weights give symmetric density.
        assert!((kde.pdf(0.0) - kde.pdf(2.0)).abs() < 1e-12);
    }

    #[test]
    fn identical_samples_use_fallback_bandwidth() {
        let kde = WeightedKde::new(vec![3.0; 5], vec![1.0; 5]).unwrap();
        assert!((kde.bandwidth() - 1.0).abs() < 1e-12);
        assert!(kde.pdf(3.0) > kde.pdf(5.0));
    }

    #[test]
    fn density_integrates_to_roughly_one() {
        let kde = WeightedKde::new(vec![0.2, 0.4, 0.5, 0.7], vec![1.0; 4]).unwrap();
        let step = 0.01;
        let integral: f64 = (-500..1000).map(|i| kde.pdf(f64::from(i) * step) * step).sum();
        assert!((integral - 1.0).abs() < 0.05, "integral = {integral}");
    }
}
