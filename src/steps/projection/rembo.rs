//! Random embedding (REMBO-style) projection.

use nalgebra::{DMatrix, DVector};

use crate::error::{Error, Result};
use crate::history::{EvaluationHistory, TaskSimilarities};
use crate::param::{ParamValue, Point};
use crate::rng_util;
use crate::space::{ParamDef, ParameterSpace};
use crate::step::{CompressOutcome, CompressionStep, DegradedReason, StepKind, StepState};
use crate::types::Direction;

use super::ProjectionCache;

/// Embeds the numeric parameters into a random `low_dim`-dimensional
/// subspace via a dense Gaussian matrix.
///
/// Sampling happens in the embedded space; evaluation requires mapping
/// each embedded point back through the matrix, which is exact and
/// memoized. Mapping an arbitrary original point into the embedding uses
/// the matrix pseudo-inverse and is only an approximation; it is logged
/// at warn level.
///
/// Categorical parameters cannot pass through the matrix and are carried
/// in the embedded space unchanged.
pub struct RemboStep {
    state: StepState,
    low_dim: usize,
    seed: u64,
    max_values: Option<u32>,
    // Fitted per compression.
    matrix: Option<DMatrix<f64>>,
    pseudo_inverse: Option<DMatrix<f64>>,
    numeric_names: Vec<String>,
    cache: ProjectionCache,
}

impl RemboStep {
    /// Creates an embedding into `low_dim` dimensions.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidLowDim`] when `low_dim` is zero.
    pub fn new(low_dim: usize, seed: u64) -> Result<Self> {
        if low_dim == 0 {
            return Err(Error::InvalidLowDim(low_dim));
        }
        Ok(Self {
            state: StepState::default(),
            low_dim,
            seed,
            max_values: None,
            matrix: None,
            pseudo_inverse: None,
            numeric_names: Vec::new(),
            cache: ProjectionCache::default(),
        })
    }

    /// Discretizes each embedded coordinate onto `max_values` levels.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidMaxValues`] when `max_values < 2`.
    pub fn with_max_values(mut self, max_values: u32) -> Result<Self> {
        if max_values < 2 {
            return Err(Error::InvalidMaxValues(max_values));
        }
        self.max_values = Some(max_values);
        Ok(self)
    }

    #[allow(clippy::cast_precision_loss)]
    fn box_bound(&self) -> f64 {
        (self.low_dim as f64).sqrt()
    }

    fn embedded_name(i: usize) -> String {
        format!("rembo_{i}")
    }

    /// Maps embedded coordinates to unit coordinates of the original
    /// numeric parameters.
    fn unit_from_embedded(&self, y: &DVector<f64>) -> Option<DVector<f64>> {
        let matrix = self.matrix.as_ref()?;
        let bound = self.box_bound();
        let mut x = matrix * y;
        for v in x.iter_mut() {
            *v = ((*v + bound) / (2.0 * bound)).clamp(0.0, 1.0);
        }
        Some(x)
    }
}

impl std::fmt::Debug for RemboStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemboStep")
            .field("low_dim", &self.low_dim)
            .field("seed", &self.seed)
            .field("fitted", &self.matrix.is_some())
            .finish_non_exhaustive()
    }
}

impl CompressionStep for RemboStep {
    fn name(&self) -> &str {
        "rembo"
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
        _histories: &[EvaluationHistory],
        _similarities: Option<&TaskSimilarities>,
        _direction: Direction,
    ) -> CompressOutcome {
        self.cache.clear();
        self.matrix = None;
        self.pseudo_inverse = None;
        self.numeric_names = input.numeric_names();
        let high_dim = self.numeric_names.len();
        if high_dim == 0 {
            let outcome =
                CompressOutcome::degraded(input.clone(), DegradedReason::NoNumericParameters);
            self.state.record(input, &outcome);
            return outcome;
        }
        if self.low_dim >= high_dim {
            // An embedding at least as wide as the input gains nothing.
            let outcome = CompressOutcome::degraded(input.clone(), DegradedReason::EmptySelection);
            self.state.record(input, &outcome);
            return outcome;
        }

        let mut rng = fastrand::Rng::with_seed(self.seed);
        let matrix = DMatrix::from_fn(high_dim, self.low_dim, |_, _| rng_util::normal(&mut rng));
        self.pseudo_inverse = matrix.clone().pseudo_inverse(1e-10).ok();
        self.matrix = Some(matrix);

        let bound = self.box_bound();
        let mut params: Vec<ParamDef> = Vec::with_capacity(self.low_dim);
        for i in 0..self.low_dim {
            // Bounds are finite and ordered; construction cannot fail.
            let Ok(mut def) = ParamDef::float(Self::embedded_name(i), -bound, bound) else {
                let outcome =
                    CompressOutcome::degraded(input.clone(), DegradedReason::FitFailed);
                self.state.record(input, &outcome);
                return outcome;
            };
            if let Some(levels) = self.max_values {
                def = def.float_step(2.0 * bound / f64::from(levels - 1));
            }
            params.push(def);
        }
        for def in input.params() {
            if !def.is_numeric() {
                params.push(def.clone());
            }
        }
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

    /// Maps an original-space point into the embedding.
    ///
    /// Exact for points previously produced by
    /// [`unproject_point`](CompressionStep::unproject_point); otherwise
    /// approximated through the pseudo-inverse.
    fn project_point(&self, point: &Point) -> Point {
        if let Some(hit) = self.cache.low_for(point) {
            return hit;
        }
        let (Some(input), Some(output), Some(pinv)) = (
            self.state.input_space.as_ref(),
            self.state.output_space.as_ref(),
            self.pseudo_inverse.as_ref(),
        ) else {
            return point.clone();
        };
        trace_warn!("projecting an unseen point through the pseudo-inverse approximation");
        let bound = self.box_bound();
        let x = DVector::from_iterator(
            self.numeric_names.len(),
            self.numeric_names.iter().map(|name| {
                let unit = match (point.get(name), input.get(name)) {
                    (Some(value), Some(def)) => def.to_unit(value),
                    _ => 0.5,
                };
                unit * 2.0 * bound - bound
            }),
        );
        let y = pinv * x;
        let mut out = Point::new();
        for (i, v) in y.iter().enumerate() {
            let name = Self::embedded_name(i);
            let value = output
                .get(&name)
                .map_or(ParamValue::Float(*v), |def| {
                    def.clamp_value(&ParamValue::Float(*v))
                });
            out.insert(name, value);
        }
        for def in input.params() {
            if !def.is_numeric()
                && let Some(value) = point.get(def.name())
            {
                out.insert(def.name().to_owned(), value.clone());
            }
        }
        out
    }

    /// Maps an embedded point back into the original space, exactly.
    fn unproject_point(&self, point: &Point) -> Point {
        if let Some(hit) = self.cache.high_for(point) {
            return hit;
        }
        let Some(input) = self.state.input_space.as_ref() else {
            return point.clone();
        };
        let y = DVector::from_iterator(
            self.low_dim,
            (0..self.low_dim).map(|i| {
                point
                    .get(&Self::embedded_name(i))
                    .map_or(0.0, ParamValue::as_f64)
            }),
        );
        let Some(units) = self.unit_from_embedded(&y) else {
            return point.clone();
        };
        let mut out = Point::new();
        for (name, &unit) in self.numeric_names.iter().zip(units.iter()) {
            if let Some(def) = input.get(name) {
                out.insert(name.clone(), def.from_unit(unit));
            }
        }
        for def in input.params() {
            if !def.is_numeric() {
                let value = point
                    .get(def.name())
                    .cloned()
                    .unwrap_or_else(|| def.default().clone());
                out.insert(def.name().to_owned(), value);
            }
        }
        self.cache.remember(point, &out);
        out
    }

    fn needs_unproject(&self) -> bool {
        true
    }

    fn affects_sampling_space(&self) -> bool {
        true
    }

    fn reset_cache(&self) {
        self.cache.clear();
    }
}
