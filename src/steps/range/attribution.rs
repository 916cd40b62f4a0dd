//! Attribution-weighted range compression.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::forest::{ForestConfig, RandomForest};
use crate::history::{EvaluationHistory, TaskSimilarities};
use crate::samples::extract_top_samples;
use crate::sampling::{MixedRangeSampling, SamplingStrategy, canonical_objective};
use crate::space::ParameterSpace;
use crate::step::{
    CompressOutcome, CompressionStep, DegradedReason, StepInfo, StepKind, StepState,
    default_step_info,
};
use crate::types::Direction;

use super::{collect_range_info, sanitize_range, space_with_ranges};

/// Narrows ranges using forest attributions instead of raw performance
/// rank.
///
/// A random forest is fitted to the normalized observations; for each
/// parameter, only observations whose marginal attribution points in the
/// beneficial direction contribute, weighted by attribution magnitude.
/// This discounts values that merely rode along with other good
/// parameters.
pub struct AttributionRangeStep {
    state: StepState,
    top_ratio: f64,
    sigma: f64,
    forest_config: ForestConfig,
    mixed_sampling: bool,
    seed: u64,
}

impl AttributionRangeStep {
    /// Minimum usable observations before the forest is fitted.
    pub const MIN_SAMPLES: usize = 5;

    /// Creates a step over the best `top_ratio` fraction of
    /// observations, spanning `sigma` weighted standard deviations.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRatio`] when `top_ratio` is outside
    /// `(0, 1]` or `sigma` is not positive.
    pub fn new(top_ratio: f64, sigma: f64) -> Result<Self> {
        if !(top_ratio > 0.0 && top_ratio <= 1.0) {
            return Err(Error::InvalidRatio(top_ratio));
        }
        if sigma <= 0.0 {
            return Err(Error::InvalidRatio(sigma));
        }
        Ok(Self {
            state: StepState::default(),
            top_ratio,
            sigma,
            forest_config: ForestConfig::default(),
            mixed_sampling: true,
            seed: 0,
        })
    }

    /// Overrides the forest configuration.
    #[must_use]
    pub fn with_forest_config(mut self, config: ForestConfig) -> Self {
        self.forest_config = config;
        self
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

impl Default for AttributionRangeStep {
    fn default() -> Self {
        Self::new(0.5, 2.0).unwrap_or_else(|_| unreachable!())
    }
}

impl std::fmt::Debug for AttributionRangeStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttributionRangeStep")
            .field("top_ratio", &self.top_ratio)
            .field("sigma", &self.sigma)
            .finish_non_exhaustive()
    }
}

/// Weighted mean and standard deviation; weights must be non-negative.
fn weighted_moments(values: &[f64], weights: &[f64]) -> Option<(f64, f64)> {
    let total: f64 = weights.iter().sum();
    if total <= 0.0 {
        return None;
    }
    let mean = values
        .iter()
        .zip(weights)
        .map(|(&v, &w)| v * w)
        .sum::<f64>()
        / total;
    let variance = values
        .iter()
        .zip(weights)
        .map(|(&v, &w)| w * (v - mean).powi(2))
        .sum::<f64>()
        / total;
    Some((mean, variance.sqrt()))
}

impl CompressionStep for AttributionRangeStep {
    fn name(&self) -> &str {
        "attribution_range"
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

        // Fit on canonicalized targets so a negative attribution always
        // means the value was beneficial.
        let targets: Vec<f64> = samples
            .targets
            .iter()
            .map(|&t| canonical_objective(t, direction))
            .collect();
        let Some(forest) = RandomForest::fit(&samples.rows, &targets, &self.forest_config) else {
            let outcome = CompressOutcome::degraded(input.clone(), DegradedReason::FitFailed);
            self.state.record(input, &outcome);
            return outcome;
        };
        let attributions = forest.attributions(&samples.rows);

        let mut ranges: HashMap<String, (f64, f64)> = HashMap::new();
        for (j, name) in names.iter().enumerate() {
            let Some((orig_low, orig_high)) =
                input.get(name).and_then(crate::space::ParamDef::bounds)
            else {
                continue;
            };
            let mut values = Vec::new();
            let mut weights = Vec::new();
            for ((row, attribution), &task) in
                samples.rows.iter().zip(&attributions).zip(&samples.task_indices)
            {
                if attribution[j] < 0.0 {
                    // Cross-task observations count in proportion to how
                    // similar their task is to the current one.
                    let similarity = similarities
                        .and_then(|s| s.get(&task).copied())
                        .unwrap_or(1.0)
                        .max(0.0);
                    values.push(row[j]);
                    weights.push(attribution[j].abs() * similarity);
                }
            }
            if values.len() < 2 {
                continue;
            }
            let Some((mean, std)) = weighted_moments(&values, &weights) else {
                continue;
            };
            let width = orig_high - orig_low;
            let candidate = (
                orig_low + (mean - self.sigma * std) * width,
                orig_low + (mean + self.sigma * std) * width,
            );
            let observed = (
                orig_low + values.iter().copied().fold(f64::INFINITY, f64::min) * width,
                orig_low + values.iter().copied().fold(f64::NEG_INFINITY, f64::max) * width,
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
            "attribution range compression"
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
