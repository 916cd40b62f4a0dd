//! Statistical boundary range compression.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::history::{EvaluationHistory, TaskSimilarities};
use crate::samples::extract_top_samples;
use crate::sampling::{MixedRangeSampling, SamplingStrategy};
use crate::space::ParameterSpace;
use crate::step::{
    CompressOutcome, CompressionStep, DegradedReason, StepInfo, StepKind, StepState,
    default_step_info,
};
use crate::types::Direction;

use super::{collect_range_info, sanitize_range, space_with_ranges};

/// Narrows each numeric range to `mean ± sigma * std` of the normalized
/// values of the best observations.
pub struct BoundaryRangeStep {
    state: StepState,
    top_ratio: f64,
    sigma: f64,
    mixed_sampling: bool,
    seed: u64,
}

impl BoundaryRangeStep {
    /// Minimum usable observations before the step applies.
    pub const MIN_SAMPLES: usize = 2;

    /// Creates a boundary step over the best `top_ratio` fraction of
    /// observations, spanning `sigma` standard deviations around their
    /// mean.
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
            mixed_sampling: true,
            seed: 0,
        })
    }

    /// Turns mixed-range sampling over the narrowed and original spaces
    /// on or off.
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

impl Default for BoundaryRangeStep {
    fn default() -> Self {
        // Validated constants.
        Self::new(0.2, 2.0).unwrap_or_else(|_| unreachable!())
    }
}

impl std::fmt::Debug for BoundaryRangeStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundaryRangeStep")
            .field("top_ratio", &self.top_ratio)
            .field("sigma", &self.sigma)
            .finish_non_exhaustive()
    }
}

impl CompressionStep for BoundaryRangeStep {
    fn name(&self) -> &str {
        "boundary_range"
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
        let _ = similarities;
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

        let columns = samples.columns(names.len());
        let mut ranges: HashMap<String, (f64, f64)> = HashMap::new();
        for (name, column) in names.iter().zip(&columns) {
            let Some(def) = input.get(name) else { continue };
            let Some((orig_low, orig_high)) = def.bounds() else {
                continue;
            };
            let n = column.len() as f64;
            let mean = column.iter().sum::<f64>() / n;
            let std = (column.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt();
            let unit_low = mean - self.sigma * std;
            let unit_high = mean + self.sigma * std;
            // Back out of unit coordinates onto the raw scale.
            let width = orig_high - orig_low;
            let candidate = (orig_low + unit_low * width, orig_low + unit_high * width);
            let observed_min = column.iter().copied().fold(f64::INFINITY, f64::min);
            let observed_max = column.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let observed = (
                orig_low + observed_min * width,
                orig_low + observed_max * width,
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
            "boundary range compression"
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
