//! Density-based range compression.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::history::{EvaluationHistory, TaskSimilarities};
use crate::kde::WeightedKde;
use crate::samples::extract_top_samples;
use crate::sampling::{MixedRangeSampling, SamplingStrategy};
use crate::space::ParameterSpace;
use crate::step::{
    CompressOutcome, CompressionStep, DegradedReason, StepInfo, StepKind, StepState,
    default_step_info,
};
use crate::types::Direction;

use super::{collect_range_info, sanitize_range, space_with_ranges};

/// Narrows each numeric range to the high-density region of a weighted
/// kernel density estimate over the best observations.
///
/// Observation weights combine performance rank (better observations
/// weigh more) with the similarity of the task they came from. The kept
/// region is the span of grid points whose density reaches
/// `density_threshold` times the peak.
pub struct KdeRangeStep {
    state: StepState,
    top_ratio: f64,
    density_threshold: f64,
    mixed_sampling: bool,
    seed: u64,
}

impl KdeRangeStep {
    /// Minimum usable observations before the estimator applies.
    pub const MIN_SAMPLES: usize = 3;
    /// Grid resolution for density evaluation over the unit interval.
    pub const GRID_POINTS: usize = 1000;

    /// Creates a density step over the best `top_ratio` fraction of
    /// observations.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRatio`] when `top_ratio` is outside
    /// `(0, 1]` or `density_threshold` is outside `(0, 1)`.
    pub fn new(top_ratio: f64, density_threshold: f64) -> Result<Self> {
        if !(top_ratio > 0.0 && top_ratio <= 1.0) {
            return Err(Error::InvalidRatio(top_ratio));
        }
        if !(density_threshold > 0.0 && density_threshold < 1.0) {
            return Err(Error::InvalidRatio(density_threshold));
        }
        Ok(Self {
            state: StepState::default(),
            top_ratio,
            density_threshold,
            mixed_sampling: true,
            seed: 0,
        })
    }

    /// Turns mixed-range sampling on or off.
    #[must_use]
    pub fn with_mixed_sampling(mut self, enabled: bool) -> Self {
        self.mixed_sampling = enabled;
        self
    }

    /// Seeds the mixed sampler.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

impl Default for KdeRangeStep {
    fn default() -> Self {
        Self::new(0.3, 0.1).unwrap_or_else(|_| unreachable!())
    }
}

impl std::fmt::Debug for KdeRangeStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KdeRangeStep")
            .field("top_ratio", &self.top_ratio)
            .field("density_threshold", &self.density_threshold)
            .finish_non_exhaustive()
    }
}

/// The span of unit-grid points whose density reaches the threshold
/// fraction of the peak.
fn high_density_region(kde: &WeightedKde, threshold: f64, grid_points: usize) -> Option<(f64, f64)> {
    #[allow(clippy::cast_precision_loss)]
    let step = 1.0 / (grid_points - 1) as f64;
    #[allow(clippy::cast_precision_loss)]
    let densities: Vec<f64> = (0..grid_points)
        .map(|i| kde.pdf(i as f64 * step))
        .collect();
    let peak = densities.iter().copied().fold(0.0_f64, f64::max);
    if peak <= 0.0 {
        return None;
    }
    let cutoff = threshold * peak;
    let first = densities.iter().position(|&d| d >= cutoff)?;
    let last = densities.iter().rposition(|&d| d >= cutoff)?;
    #[allow(clippy::cast_precision_loss)]
    Some((first as f64 * step, last as f64 * step))
}

impl CompressionStep for KdeRangeStep {
    fn name(&self) -> &str {
        "kde_range"
    }

    fn kind(&self) -> StepKind {
        StepKind::RangeCompression
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
        similarities: Option<&TaskSimilarities>,
        direction: Direction,
    ) -> CompressOutcome {
        let names = input.numeric_names();
        if names.is_empty() {
            let outcome =
                CompressOutcome::degraded(input.clone(), DegradedReason::NoNumericParameters);
            self.state.record(input, &outcome);
            return outcome;
        }
        let samples =
            extract_top_samples(histories, &names, input, self.top_ratio, direction, true);
        if samples.len() < Self::MIN_SAMPLES {
            let reason = if histories.iter().all(EvaluationHistory::is_empty) {
                DegradedReason::NoHistory
            } else {
                DegradedReason::InsufficientSamples
            };
            let outcome = CompressOutcome::degraded(input.clone(), reason);
            self.state.record(input, &outcome);
            return outcome;
        }

        // Rank weight: best sample gets weight 1, worst approaches 1/n.
        // Samples arrive best-first per task; rank globally by target.
        let n = samples.len();
        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&a, &b| {
            let ta = crate::sampling::canonical_objective(samples.targets[a], direction);
            let tb = crate::sampling::canonical_objective(samples.targets[b], direction);
            ta.total_cmp(&tb)
        });
        let mut weights = vec![0.0; n];
        for (rank, &i) in order.iter().enumerate() {
            let rank_weight = (n - rank) as f64 / n as f64;
            let similarity = similarities
                .and_then(|s| s.get(&samples.task_indices[i]).copied())
                .unwrap_or(1.0)
                .max(0.0);
            weights[i] = rank_weight * similarity;
        }

        let columns = samples.columns(names.len());
        let mut ranges: HashMap<String, (f64, f64)> = HashMap::new();
        for (name, column) in names.iter().zip(&columns) {
            let Some((orig_low, orig_high)) =
                input.get(name).and_then(crate::space::ParamDef::bounds)
            else {
                continue;
            };
            let Ok(kde) = WeightedKde::new(column.clone(), weights.clone()) else {
                continue;
            };
            let Some((unit_low, unit_high)) =
                high_density_region(&kde, self.density_threshold, Self::GRID_POINTS)
            else {
                continue;
            };
            let width = orig_high - orig_low;
            let candidate = (orig_low + unit_low * width, orig_low + unit_high * width);
            let observed = (
                orig_low + column.iter().copied().fold(f64::INFINITY, f64::min) * width,
                orig_low + column.iter().copied().fold(f64::NEG_INFINITY, f64::max) * width,
            );
            let (low, high) = sanitize_range(candidate, (orig_low, orig_high), observed);
            if high - low < width {
                ranges.insert(name.clone(), (low, high));
            }
        }

        let skip: Vec<String> = self
            .state
            .filling
            .as_ref()
            .map(|f| f.fixed_parameters().to_vec())
            .unwrap_or_default();
        let space = space_with_ranges(input, &ranges, &skip);
        trace_debug!(
            narrowed = ranges.len(),
            samples = samples.len(),
            "density range compression"
        );
        let outcome = CompressOutcome::ok(space);
        self.state.record(input, &outcome);
        outcome
    }

    fn affects_sampling_space(&self) -> bool {
        true
    }

    fn sampling_strategy(&self) -> Option<Box<dyn SamplingStrategy>> {
        if !self.mixed_sampling {
            return None;
        }
        let output = self.state.output_space.clone()?;
        let input = self.state.input_space.clone()?;
        Some(Box::new(MixedRangeSampling::new(output, input, self.seed)))
    }

    fn step_info(&self) -> StepInfo {
        let mut info = default_step_info(self);
        if let (Some(input), Some(output)) =
            (self.state.input_space.as_ref(), self.state.output_space.as_ref())
        {
            info.ranges = Some(collect_range_info(input, output));
        }
        info
    }
}
