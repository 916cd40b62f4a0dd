//! Expert-specified range compression.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::history::{EvaluationHistory, TaskSimilarities};
use crate::sampling::{MixedRangeSampling, SamplingStrategy};
use crate::space::ParameterSpace;
use crate::step::{
    CompressOutcome, CompressionStep, DegradedReason, StepInfo, StepKind, StepState,
    default_step_info,
};
use crate::types::Direction;

use super::{collect_range_info, space_with_ranges};

/// Applies literal expert-provided bounds, intersected with the input
/// space.
///
/// Needs no evaluation history. Names absent from the input space are
/// ignored; a listed range that does not overlap the input bounds leaves
/// that parameter unchanged.
#[derive(Debug)]
pub struct ExpertRangeStep {
    state: StepState,
    ranges: HashMap<String, (f64, f64)>,
    mixed_sampling: bool,
    seed: u64,
}

impl ExpertRangeStep {
    /// Creates a step from explicit per-parameter bounds.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidExpertRange`] for any entry with
    /// `low >= high` or non-finite bounds.
    pub fn new(ranges: HashMap<String, (f64, f64)>) -> Result<Self> {
        for (name, &(low, high)) in &ranges {
            if !low.is_finite() || !high.is_finite() || low >= high {
                return Err(Error::InvalidExpertRange {
                    name: name.clone(),
                    low,
                    high,
                });
            }
        }
        Ok(Self {
            state: StepState::default(),
            ranges,
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

impl CompressionStep for ExpertRangeStep {
    fn name(&self) -> &str {
        "expert_range"
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
        _histories: &[EvaluationHistory],
        _similarities: Option<&TaskSimilarities>,
        _direction: Direction,
    ) -> CompressOutcome {
        let mut applicable: HashMap<String, (f64, f64)> = HashMap::new();
        for (name, &(low, high)) in &self.ranges {
            let Some((orig_low, orig_high)) =
                input.get(name).and_then(crate::space::ParamDef::bounds)
            else {
                continue;
            };
            let clipped = (low.max(orig_low), high.min(orig_high));
            if clipped.0 < clipped.1 {
                applicable.insert(name.clone(), clipped);
            }
        }
        let outcome = if applicable.is_empty() {
            CompressOutcome::degraded(input.clone(), DegradedReason::EmptySelection)
        } else {
            let skip: Vec<String> = self
                .state
                .filling
                .as_ref()
                .map(|f| f.fixed_parameters().to_vec())
                .unwrap_or_default();
            CompressOutcome::ok(space_with_ranges(input, &applicable, &skip))
        };
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
