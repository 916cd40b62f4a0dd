//! Hashing-based sparse embedding (HesBO-style) projection.

use crate::error::{Error, Result};
use crate::history::{EvaluationHistory, TaskSimilarities};
use crate::param::{ParamValue, Point};
use crate::space::{ParamDef, ParameterSpace};
use crate::step::{CompressOutcome, CompressionStep, DegradedReason, StepKind, StepState};
use crate::types::Direction;

use super::ProjectionCache;

/// Embeds the numeric parameters into `low_dim` dimensions via a random
/// hash and sign assignment.
///
/// Every original parameter `j` is tied to exactly one embedded
/// coordinate `h(j)` with sign `s(j)`, so unprojection is a sparse
/// lookup instead of a matrix product. Projecting an arbitrary original
/// point back averages the contributions per embedded coordinate, which
/// is approximate and logged at warn level.
pub struct HesboStep {
    state: StepState,
    low_dim: usize,
    seed: u64,
    max_values: Option<u32>,
    // Fitted per compression.
    hash: Vec<usize>,
    sign: Vec<f64>,
    numeric_names: Vec<String>,
    cache: ProjectionCache,
}

impl HesboStep {
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
            hash: Vec::new(),
            sign: Vec::new(),
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

    fn embedded_name(i: usize) -> String {
        format!("hesbo_{i}")
    }
}

impl std::fmt::Debug for HesboStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HesboStep")
            .field("low_dim", &self.low_dim)
            .field("seed", &self.seed)
            .field("fitted", &!self.hash.is_empty())
            .finish_non_exhaustive()
    }
}

impl CompressionStep for HesboStep {
    fn name(&self) -> &str {
        "hesbo"
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

    fn compress(
        &mut self,
        input: &ParameterSpace,
        _histories: &[EvaluationHistory],
        _similarities: Option<&TaskSimilarities>,
        _direction: Direction,
    ) -> CompressOutcome {
        self.cache.clear();
        self.numeric_names = input.numeric_names();
        let high_dim = self.numeric_names.len();
        if high_dim == 0 {
            let outcome =
                CompressOutcome::degraded(input.clone(), DegradedReason::NoNumericParameters);
            self.state.record(input, &outcome);
            return outcome;
        }
        if self.low_dim >= high_dim {
            let outcome = CompressOutcome::degraded(input.clone(), DegradedReason::EmptySelection);
            self.state.record(input, &outcome);
            return outcome;
        }

        let mut rng = fastrand::Rng::with_seed(self.seed);
        self.hash = (0..high_dim).map(|_| rng.usize(0..self.low_dim)).collect();
        self.sign = (0..high_dim)
            .map(|_| if rng.bool() { 1.0 } else { -1.0 })
            .collect();

        let mut params: Vec<ParamDef> = Vec::with_capacity(self.low_dim);
        for i in 0..self.low_dim {
            let Ok(mut def) = ParamDef::float(Self::embedded_name(i), -1.0, 1.0) else {
                let outcome =
                    CompressOutcome::degraded(input.clone(), DegradedReason::FitFailed);
                self.state.record(input, &outcome);
                return outcome;
            };
            if let Some(levels) = self.max_values {
                def = def.float_step(2.0 / f64::from(levels - 1));
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

    /// Maps an original-space point into the embedding by averaging each
    /// embedded coordinate's contributing parameters. Approximate for
    /// points that never went through unprojection.
    fn project_point(&self, point: &Point) -> Point {
        if let Some(hit) = self.cache.low_for(point) {
            return hit;
        }
        let (Some(input), Some(output)) = (
            self.state.input_space.as_ref(),
            self.state.output_space.as_ref(),
        ) else {
            return point.clone();
        };
        if self.hash.is_empty() {
            return point.clone();
        }
        trace_warn!("projecting an unseen point through the hash-average approximation");
        let mut sums = vec![0.0; self.low_dim];
        let mut counts = vec![0usize; self.low_dim];
        for (j, name) in self.numeric_names.iter().enumerate() {
            let unit = match (point.get(name), input.get(name)) {
                (Some(value), Some(def)) => def.to_unit(value),
                _ => 0.5,
            };
            // Invert y = s * v with v in [-1, 1].
            let v = unit.mul_add(2.0, -1.0);
            sums[self.hash[j]] += self.sign[j] * v;
            counts[self.hash[j]] += 1;
        }
        let mut out = Point::new();
        for i in 0..self.low_dim {
            #[allow(clippy::cast_precision_loss)]
            let raw = if counts[i] == 0 {
                0.0
            } else {
                (sums[i] / counts[i] as f64).clamp(-1.0, 1.0)
            };
            let name = Self::embedded_name(i);
            let value = output
                .get(&name)
                .map_or(ParamValue::Float(raw), |def| {
                    def.clamp_value(&ParamValue::Float(raw))
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
        if self.hash.is_empty() {
            return point.clone();
        }
        let coords: Vec<f64> = (0..self.low_dim)
            .map(|i| {
                point
                    .get(&Self::embedded_name(i))
                    .map_or(0.0, ParamValue::as_f64)
            })
            .collect();
        let mut out = Point::new();
        for (j, name) in self.numeric_names.iter().enumerate() {
            let Some(def) = input.get(name) else { continue };
            let v = (self.sign[j] * coords[self.hash[j]]).clamp(-1.0, 1.0);
            let unit = (v + 1.0) / 2.0;
            out.insert(name.clone(), def.from_unit(unit));
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

#[cfg(test)]
mod tests {
    use super::*;

    fn space(n: usize) -> ParameterSpace {
        let params = (0..n)
            .map(|i| ParamDef::float(format!("p{i}"), 0.0, 1.0).unwrap())
            .collect();
        ParameterSpace::new(params).unwrap()
    }

    #[test]
    fn zero_low_dim_rejected() {
        assert!(HesboStep::new(0, 1).is_err());
    }

    #[test]
    fn embedded_space_is_unit_box() {
        let mut step = HesboStep::new(3, 2).unwrap();
        let outcome = step.compress(&space(8), &[], None, Direction::Minimize);
        assert!(outcome.degraded.is_none());
        assert_eq!(outcome.space.len(), 3);
        for def in outcome.space.params() {
            assert_eq!(def.bounds(), Some((-1.0, 1.0)));
        }
    }

    #[test]
    fn unproject_covers_all_parameters() {
        let mut step = HesboStep::new(2, 5).unwrap();
        let outcome = step.compress(&space(7), &[], None, Direction::Minimize);
        let mut embedded = outcome.space.clone();
        embedded.set_seed(1);
        for _ in 0..20 {
            let low = embedded.sample();
            let high = step.unproject_point(&low);
            assert_eq!(high.len(), 7);
            for value in high.values() {
                let v = value.as_f64();
                assert!((0.0..=1.0).contains(&v));
            }
        }
    }

    #[test]
    fn tied_parameters_move_together() {
        let mut step = HesboStep::new(2, 5).unwrap();
        step.compress(&space(7), &[], None, Direction::Minimize);
        // Two parameters hashed to the same coordinate with equal signs
        // always unproject to equal values.
        let (hash, sign) = (step.hash.clone(), step.sign.clone());
        let mut low = Point::new();
        low.insert("hesbo_0".into(), ParamValue::Float(0.4));
        low.insert("hesbo_1".into(), ParamValue::Float(-0.9));
        let high = step.unproject_point(&low);
        for j in 0..7 {
            for k in (j + 1)..7 {
                if hash[j] == hash[k] && sign[j] == sign[k] {
                    let vj = high.get(&format!("p{j}")).unwrap().as_f64();
                    let vk = high.get(&format!("p{k}")).unwrap().as_f64();
                    assert!((vj - vk).abs() < 1e-12);
                }
            }
        }
    }

    #[test]
    fn round_trip_through_cache_is_exact() {
        let mut step = HesboStep::new(2, 5).unwrap();
        let outcome = step.compress(&space(6), &[], None, Direction::Minimize);
        let mut embedded = outcome.space.clone();
        embedded.set_seed(8);
        let low = embedded.sample();
        let high = step.unproject_point(&low);
        assert_eq!(step.project_point(&high), low);
    }

    #[test]
    fn approximate_projection_stays_in_bounds() {
        let mut step = HesboStep::new(2, 5).unwrap();
        step.compress(&space(6), &[], None, Direction::Minimize);
        let mut original = space(6);
        original.set_seed(12);
        let point = original.sample();
        let low = step.project_point(&point);
        assert_eq!(low.len(), 2);
        for value in low.values() {
            let v = value.as_f64();
            assert!((-1.0..=1.0).contains(&v));
        }
    }
}
