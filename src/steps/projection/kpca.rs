//! Forward-only kernel PCA projection.

use nalgebra::{DMatrix, DVector, SymmetricEigen};

use crate::error::{Error, Result};
use crate::history::{EvaluationHistory, TaskSimilarities};
use crate::param::{ParamValue, Point};
use crate::samples::extract_top_samples;
use crate::space::{ParamDef, ParameterSpace};
use crate::step::{CompressOutcome, CompressionStep, DegradedReason, StepKind, StepState};
use crate::types::Direction;

/// Nonlinear feature extraction via RBF kernel PCA over the best
/// observations.
///
/// This projection is forward-only: observed points map into the
/// component space for surrogate modeling, but there is no inverse, so
/// the embedded space is never sampled from and
/// [`needs_unproject`](CompressionStep::needs_unproject) stays false.
pub struct KpcaStep {
    state: StepState,
    n_components: usize,
    top_ratio: f64,
    gamma: Option<f64>,
    // Fitted per compression.
    fitted: Option<FittedKpca>,
    numeric_names: Vec<String>,
}

struct FittedKpca {
    /// Standardized training rows.
    train: DMatrix<f64>,
    /// Column means and standard deviations of the raw training rows.
    means: Vec<f64>,
    stds: Vec<f64>,
    /// Centered-kernel row means and grand mean, for centering new rows.
    kernel_row_means: DVector<f64>,
    kernel_grand_mean: f64,
    /// Eigenvectors scaled by inverse square-root eigenvalues.
    alphas: DMatrix<f64>,
    gamma: f64,
}

impl KpcaStep {
    /// Minimum usable observations before the kernel is fitted.
    pub const MIN_SAMPLES: usize = 5;

    /// Creates a projection onto `n_components` kernel principal
    /// components, fitted on the best `top_ratio` fraction of
    /// observations.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidLowDim`] when `n_components` is zero and
    /// [`Error::InvalidRatio`] when `top_ratio` is outside `(0, 1]`.
    pub fn new(n_components: usize, top_ratio: f64) -> Result<Self> {
        if n_components == 0 {
            return Err(Error::InvalidLowDim(n_components));
        }
        if !(top_ratio > 0.0 && top_ratio <= 1.0) {
            return Err(Error::InvalidRatio(top_ratio));
        }
        Ok(Self {
            state: StepState::default(),
            n_components,
            top_ratio,
            gamma: None,
            fitted: None,
            numeric_names: Vec::new(),
        })
    }

    /// Overrides the RBF kernel width; the default is
    /// `1 / n_features`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRatio`] when `gamma` is not positive.
    pub fn with_gamma(mut self, gamma: f64) -> Result<Self> {
        if gamma <= 0.0 {
            return Err(Error::InvalidRatio(gamma));
        }
        self.gamma = Some(gamma);
        Ok(self)
    }

    fn component_name(i: usize) -> String {
        format!("kpca_{i}")
    }

    #[allow(clippy::cast_precision_loss)]
    fn fit(&self, rows: &[Vec<f64>]) -> Option<FittedKpca> {
        let n = rows.len();
        let d = rows[0].len();
        let gamma = self.gamma.unwrap_or(1.0 / d as f64);

        // Standardize columns; constant columns keep unit scale.
        let mut means = vec![0.0; d];
        let mut stds = vec![0.0; d];
        for j in 0..d {
            let mean = rows.iter().map(|r| r[j]).sum::<f64>() / n as f64;
            let var = rows.iter().map(|r| (r[j] - mean).powi(2)).sum::<f64>() / n as f64;
            means[j] = mean;
            stds[j] = if var.sqrt() < f64::EPSILON {
                1.0
            } else {
                var.sqrt()
            };
        }
        let train = DMatrix::from_fn(n, d, |i, j| (rows[i][j] - means[j]) / stds[j]);

        // RBF kernel matrix with double centering.
        let kernel = DMatrix::from_fn(n, n, |i, j| {
            let dist2 = (train.row(i) - train.row(j)).norm_squared();
            (-gamma * dist2).exp()
        });
        let row_means = DVector::from_iterator(n, kernel.row_iter().map(|r| r.mean()));
        let grand_mean = kernel.mean();
        let centered = DMatrix::from_fn(n, n, |i, j| {
            kernel[(i, j)] - row_means[i] - row_means[j] + grand_mean
        });

        let eigen = SymmetricEigen::new(centered);
        // Eigenvalue order is unspecified; sort descending.
        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&a, &b| eigen.eigenvalues[b].total_cmp(&eigen.eigenvalues[a]));
        let usable: Vec<usize> = order
            .into_iter()
            .filter(|&i| eigen.eigenvalues[i] > 1e-10)
            .take(self.n_components)
            .collect();
        if usable.len() < self.n_components {
            return None;
        }
        let alphas = DMatrix::from_fn(n, self.n_components, |i, c| {
            let k = usable[c];
            eigen.eigenvectors[(i, k)] / eigen.eigenvalues[k].sqrt()
        });

        Some(FittedKpca {
            train,
            means,
            stds,
            kernel_row_means: row_means,
            kernel_grand_mean: grand_mean,
            alphas,
            gamma,
        })
    }
}

impl std::fmt::Debug for KpcaStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KpcaStep")
            .field("n_components", &self.n_components)
            .field("top_ratio", &self.top_ratio)
            .field("fitted", &self.fitted.is_some())
            .finish_non_exhaustive()
    }
}

impl CompressionStep for KpcaStep {
    fn name(&self) -> &str {
        "kpca"
    }

    fn kind(&self) -> StepKind {
        StepKind::Projection
    }

    fn state(&self) -> &StepState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut StepState {
        &mut self.state
    }

    #[allow(clippy::cast_precision_loss)]
    fn compress(
        &mut self,
        input: &ParameterSpace,
        histories: &[EvaluationHistory],
        _similarities: Option<&TaskSimilarities>,
        direction: Direction,
    ) -> CompressOutcome {
        self.fitted = None;
        self.numeric_names = input.numeric_names();
        let d = self.numeric_names.len();
        if d == 0 {
            let outcome =
                CompressOutcome::degraded(input.clone(), DegradedReason::NoNumericParameters);
            self.state.record(input, &outcome);
            return outcome;
        }
        if self.n_components >= d {
            let outcome = CompressOutcome::degraded(input.clone(), DegradedReason::EmptySelection);
            self.state.record(input, &outcome);
            return outcome;
        }
        let samples = extract_top_samples(
            histories,
            &self.numeric_names,
            input,
            self.top_ratio,
            direction,
            true,
        );
        if samples.len() < Self::MIN_SAMPLES.max(self.n_components + 2) {
            let reason = if histories.iter().all(EvaluationHistory::is_empty) {
                DegradedReason::NoHistory
            } else {
                DegradedReason::InsufficientSamples
            };
            let outcome = CompressOutcome::degraded(input.clone(), reason);
            self.state.record(input, &outcome);
            return outcome;
        }
        let Some(fitted) = self.fit(&samples.rows) else {
            let outcome = CompressOutcome::degraded(input.clone(), DegradedReason::FitFailed);
            self.state.record(input, &outcome);
            return outcome;
        };
        self.fitted = Some(fitted);

        let bound = (d as f64).sqrt();
        let mut params: Vec<ParamDef> = Vec::with_capacity(self.n_components);
        for i in 0..self.n_components {
            match ParamDef::float(Self::component_name(i), -bound, bound) {
                Ok(def) => params.push(def),
                Err(_) => {
                    let outcome =
                        CompressOutcome::degraded(input.clone(), DegradedReason::FitFailed);
                    self.state.record(input, &outcome);
                    return outcome;
                }
            }
        }
        trace_debug!(
            components = self.n_components,
            samples = samples.len(),
            "fitted kernel principal components"
        );
        let outcome = match ParameterSpace::new(params) {
            Ok(mut space) => {
                space.set_seed(input.seed());
                CompressOutcome::ok(space)
            }
            Err(_) => CompressOutcome::degraded(input.clone(), DegradedReason::FitFailed),
        };
        self.state.record(input, &outcome);
        outcome
    }

    /// Maps an original-space point onto the fitted components.
    #[allow(clippy::cast_precision_loss)]
    fn project_point(&self, point: &Point) -> Point {
        let (Some(fitted), Some(input), Some(output)) = (
            self.fitted.as_ref(),
            self.state.input_space.as_ref(),
            self.state.output_space.as_ref(),
        ) else {
            return point.clone();
        };
        let n = fitted.train.nrows();
        let d = self.numeric_names.len();
        let row = DVector::from_iterator(
            d,
            self.numeric_names.iter().enumerate().map(|(j, name)| {
                let unit = match (point.get(name), input.get(name)) {
                    (Some(value), Some(def)) => def.to_unit(value),
                    _ => 0.5,
                };
                (unit - fitted.means[j]) / fitted.stds[j]
            }),
        );
        let kernel_row = DVector::from_iterator(
            n,
            (0..n).map(|i| {
                let dist2 = (fitted.train.row(i).transpose() - &row).norm_squared();
                (-fitted.gamma * dist2).exp()
            }),
        );
        let row_mean = kernel_row.mean();
        let centered = DVector::from_fn(n, |i, _| {
            kernel_row[i] - fitted.kernel_row_means[i] - row_mean + fitted.kernel_grand_mean
        });
        let components = fitted.alphas.transpose() * centered;
        let mut out = Point::new();
        for (i, v) in components.iter().enumerate() {
            let name = Self::component_name(i);
            let value = output
                .get(&name)
                .map_or(ParamValue::Float(*v), |def| {
                    def.clamp_value(&ParamValue::Float(*v))
                });
            out.insert(name, value);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn space() -> ParameterSpace {
        ParameterSpace::new(vec![
            ParamDef::float("a", 0.0, 1.0).unwrap(),
            ParamDef::float("b", 0.0, 1.0).unwrap(),
            ParamDef::float("c", 0.0, 1.0).unwrap(),
            ParamDef::float("d", 0.0, 1.0).unwrap(),
        ])
        .unwrap()
    }

    fn history(n: usize) -> EvaluationHistory {
        let mut rng = fastrand::Rng::with_seed(6);
        let mut h = EvaluationHistory::new();
        for _ in 0..n {
            let mut p = Point::new();
            let mut total = 0.0;
            for name in ["a", "b", "c", "d"] {
                let v = rng.f64();
                total += v;
                p.insert(name.to_owned(), ParamValue::Float(v));
            }
            h.record(p, total);
        }
        h
    }

    #[test]
    fn invalid_configuration_rejected() {
        assert!(KpcaStep::new(0, 0.5).is_err());
        assert!(KpcaStep::new(2, 0.0).is_err());
        assert!(KpcaStep::new(2, 0.5).unwrap().with_gamma(-1.0).is_err());
    }

    #[test]
    fn produces_component_space() {
        let mut step = KpcaStep::new(2, 1.0).unwrap();
        let outcome = step.compress(&space(), &[history(40)], None, Direction::Minimize);
        assert!(outcome.degraded.is_none());
        assert_eq!(outcome.space.len(), 2);
        assert!(outcome.space.contains("kpca_0"));
        assert!(!step.needs_unproject());
        assert!(!step.affects_sampling_space());
    }

    #[test]
    fn projection_is_deterministic() {
        let mut step = KpcaStep::new(2, 1.0).unwrap();
        step.compress(&space(), &[history(40)], None, Direction::Minimize);
        let mut original = space();
        original.set_seed(44);
        let point = original.sample();
        assert_eq!(step.project_point(&point), step.project_point(&point));
    }

    #[test]
    fn distinct_points_map_to_distinct_components() {
        let mut step = KpcaStep::new(2, 1.0).unwrap();
        step.compress(&space(), &[history(40)], None, Direction::Minimize);
        let mut original = space();
        original.set_seed(45);
        let a = step.project_point(&original.sample());
        let b = step.project_point(&original.sample());
        assert_ne!(a, b);
    }

    #[test]
    fn too_few_samples_degrades() {
        let mut step = KpcaStep::new(2, 1.0).unwrap();
        let outcome = step.compress(&space(), &[history(3)], None, Direction::Minimize);
        assert_eq!(outcome.degraded, Some(DegradedReason::InsufficientSamples));
    }

    #[test]
    fn components_not_below_input_degrades() {
        let mut step = KpcaStep::new(4, 1.0).unwrap();
        let outcome = step.compress(&space(), &[history(40)], None, Direction::Minimize);
        assert_eq!(outcome.degraded, Some(DegradedReason::EmptySelection));
    }
}
