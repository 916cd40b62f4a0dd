//! The compression step contract.
//!
//! Every compression technique implements [`CompressionStep`]: it takes an
//! input space plus evaluation histories and produces an output space,
//! together with point projection in both directions. Steps are composed
//! by [`CompressionPipeline`](crate::pipeline::CompressionPipeline).
//!
//! A step never fails at compression time. Degenerate inputs (no history,
//! no numeric parameters, a fit that cannot converge) produce a
//! [`CompressOutcome`] that passes the input space through unchanged and
//! records a [`DegradedReason`] for diagnostics.

use std::fmt;
use std::sync::Arc;

use crate::filling::FillingStrategy;
use crate::history::{EvaluationHistory, TaskSimilarities};
use crate::param::Point;
use crate::progress::OptimizationProgress;
use crate::sampling::SamplingStrategy;
use crate::space::{ParameterSpace, clip_to_space};
use crate::types::Direction;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Why a step passed its input through unchanged.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum DegradedReason {
    /// The step was configured off.
    Disabled,
    /// No evaluation history was available.
    NoHistory,
    /// The input space has no numeric parameters to work on.
    NoNumericParameters,
    /// Selection produced an empty parameter set.
    EmptySelection,
    /// No importance calculator produced usable scores.
    ImportanceUnavailable,
    /// Too few usable observations to fit on.
    InsufficientSamples,
    /// Model fitting failed to converge or produced no usable result.
    FitFailed,
}

impl fmt::Display for DegradedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Disabled => "step disabled",
            Self::NoHistory => "no evaluation history",
            Self::NoNumericParameters => "no numeric parameters",
            Self::EmptySelection => "empty parameter selection",
            Self::ImportanceUnavailable => "importance scores unavailable",
            Self::InsufficientSamples => "insufficient usable samples",
            Self::FitFailed => "model fit failed",
        };
        f.write_str(text)
    }
}

/// The result of running one step's compression.
#[derive(Clone, Debug)]
pub struct CompressOutcome {
    /// The derived output space.
    pub space: ParameterSpace,
    /// Set when the step could not apply and passed its input through.
    pub degraded: Option<DegradedReason>,
}

impl CompressOutcome {
    /// A successful compression producing `space`.
    #[must_use]
    pub fn ok(space: ParameterSpace) -> Self {
        Self {
            space,
            degraded: None,
        }
    }

    /// A pass-through outcome with the given reason.
    #[must_use]
    pub fn degraded(space: ParameterSpace, reason: DegradedReason) -> Self {
        Self {
            space,
            degraded: Some(reason),
        }
    }
}

/// Bookkeeping shared by all step implementations.
///
/// The owning pipeline sets the input and output spaces and the filling
/// strategy around each compression; steps read them when projecting
/// points.
#[derive(Clone, Debug, Default)]
pub struct StepState {
    /// The space this step last compressed from.
    pub input_space: Option<ParameterSpace>,
    /// The space this step last produced.
    pub output_space: Option<ParameterSpace>,
    /// Strategy for filling parameters this step dropped.
    pub filling: Option<Arc<dyn FillingStrategy>>,
    /// The degradation recorded by the last compression, if any.
    pub last_degraded: Option<DegradedReason>,
}

/// A range narrowed by a range-compression step.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CompressedRange {
    /// The parameter name.
    pub name: String,
    /// Bounds in the input space.
    pub original: (f64, f64),
    /// Bounds in the output space.
    pub compressed: (f64, f64),
    /// Compressed width over original width.
    pub ratio: f64,
}

/// Summary of the ranges a step narrowed.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RangeInfo {
    /// Per-parameter narrowed ranges.
    pub compressed: Vec<CompressedRange>,
    /// Parameters left untouched.
    pub unchanged: Vec<String>,
    /// Mean width ratio over the narrowed parameters, 1.0 when none.
    pub avg_ratio: f64,
}

/// The family a step belongs to.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum StepKind {
    /// Drops unimportant parameters.
    DimensionSelection,
    /// Narrows numeric parameter ranges.
    RangeCompression,
    /// Maps the space into a different coordinate system.
    Projection,
    /// Pass-through.
    Identity,
}

/// Diagnostic snapshot of one step after compression.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StepInfo {
    /// The step's identifier.
    pub name: String,
    /// The family it belongs to.
    pub kind: StepKind,
    /// Parameter count of the input space.
    pub input_params: usize,
    /// Parameter count of the output space.
    pub output_params: usize,
    /// Whether the output space replaces the sampling space.
    pub affects_sampling_space: bool,
    /// Whether sampled points must be unprojected before evaluation.
    pub needs_unproject: bool,
    /// Parameters the step kept, for selection steps.
    pub selected_parameters: Option<Vec<String>>,
    /// Range narrowing details, for range steps.
    pub ranges: Option<RangeInfo>,
    /// The step's current target size, where it has one.
    pub target_size: Option<usize>,
    /// Why the step degraded, if it did.
    pub degraded: Option<DegradedReason>,
}

impl StepState {
    /// Records a finished compression so the projection defaults and
    /// diagnostics see the latest spaces.
    pub fn record(&mut self, input: &ParameterSpace, outcome: &CompressOutcome) {
        self.input_space = Some(input.clone());
        self.output_space = Some(outcome.space.clone());
        self.last_degraded = outcome.degraded;
    }
}

/// A single stage of the compression pipeline.
pub trait CompressionStep: Send {
    /// The step's identifier, stable across runs.
    fn name(&self) -> &str;

    /// The family this step belongs to.
    fn kind(&self) -> StepKind;

    /// Shared bookkeeping, read by the default projection methods.
    fn state(&self) -> &StepState;

    /// Mutable access to the shared bookkeeping.
    fn state_mut(&mut self) -> &mut StepState;

    /// Derives an output space from `input` and the given histories.
    ///
    /// Never fails; degenerate inputs produce a degraded pass-through
    /// outcome.
    fn compress(
        &mut self,
        input: &ParameterSpace,
        histories: &[EvaluationHistory],
        similarities: Option<&TaskSimilarities>,
        direction: Direction,
    ) -> CompressOutcome;

    /// Maps a point from this step's input space into its output space.
    ///
    /// The default drops parameters absent from the output space, clips
    /// the rest into it, and fills anything still missing.
    fn project_point(&self, point: &Point) -> Point {
        let state = self.state();
        let Some(output) = state.output_space.as_ref() else {
            return point.clone();
        };
        let mut kept: Point = point
            .iter()
            .filter(|(name, _)| output.contains(name))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        kept = clip_to_space(&kept, output);
        match state.filling.as_ref() {
            Some(filling) => filling.fill_missing(&kept, output),
            None => kept,
        }
    }

    /// Maps a point from this step's output space back into its input
    /// space. Identity by default; only meaningful when
    /// [`needs_unproject`](CompressionStep::needs_unproject) is true.
    fn unproject_point(&self, point: &Point) -> Point {
        point.clone()
    }

    /// Whether sampled points must pass through
    /// [`unproject_point`](CompressionStep::unproject_point) before they
    /// can be evaluated.
    fn needs_unproject(&self) -> bool {
        false
    }

    /// Whether this step's output space is suitable for direct sampling.
    fn affects_sampling_space(&self) -> bool {
        false
    }

    /// Whether [`update`](CompressionStep::update) can ever return true.
    fn supports_adaptive_update(&self) -> bool {
        false
    }

    /// Whether this step can re-compress from its own output rather than
    /// from the original space.
    fn uses_progressive_compression(&self) -> bool {
        false
    }

    /// Reconsiders the step's configuration against current progress.
    ///
    /// Returns true when the configuration changed and the pipeline must
    /// re-compress.
    fn update(
        &mut self,
        _progress: &OptimizationProgress,
        _histories: &[EvaluationHistory],
    ) -> bool {
        false
    }

    /// A sampling strategy bound to this step's output, when it provides
    /// one. The pipeline asks steps from last to first and takes the
    /// first strategy offered.
    fn sampling_strategy(&self) -> Option<Box<dyn SamplingStrategy>> {
        None
    }

    /// The step's current target dimension count, for re-compression
    /// policy decisions.
    fn target_size(&self) -> Option<usize> {
        None
    }

    /// Drops any fitted model state so the next compression starts fresh.
    fn reset_cache(&self) {}

    /// A diagnostic snapshot of the step's last compression.
    fn step_info(&self) -> StepInfo {
        let state = self.state();
        StepInfo {
            name: self.name().to_owned(),
            kind: self.kind(),
            input_params: state.input_space.as_ref().map_or(0, ParameterSpace::len),
            output_params: state.output_space.as_ref().map_or(0, ParameterSpace::len),
            affects_sampling_space: self.affects_sampling_space(),
            needs_unproject: self.needs_unproject(),
            selected_parameters: None,
            ranges: None,
            target_size: self.target_size(),
            degraded: state.last_degraded,
        }
    }
}

/// The trait-default [`StepInfo`] for a step, for implementations that
/// only add fields on top of it.
pub(crate) fn default_step_info(step: &dyn CompressionStep) -> StepInfo {
    let state = step.state();
    StepInfo {
        name: step.name().to_owned(),
        kind: step.kind(),
        input_params: state.input_space.as_ref().map_or(0, ParameterSpace::len),
        output_params: state.output_space.as_ref().map_or(0, ParameterSpace::len),
        affects_sampling_space: step.affects_sampling_space(),
        needs_unproject: step.needs_unproject(),
        selected_parameters: None,
        ranges: None,
        target_size: step.target_size(),
        degraded: state.last_degraded,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filling::DefaultValueFilling;
    use crate::param::ParamValue;
    use crate::space::ParamDef;

    #[derive(Debug, Default)]
    struct PassThrough {
        state: StepState,
    }

    impl CompressionStep for PassThrough {
        fn name(&self) -> &str {
            "pass_through"
        }

        fn kind(&self) -> StepKind {
            StepKind::Identity
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
            CompressOutcome::ok(input.clone())
        }
    }

    #[test]
    fn default_projection_filters_clips_and_fills() {
        let output = ParameterSpace::new(vec![
            ParamDef::float("x", 0.0, 1.0).unwrap(),
            ParamDef::int("n", 1, 5)
                .unwrap()
                .default_value(ParamValue::Int(2)),
        ])
        .unwrap();
        let mut step = PassThrough::default();
        step.state.output_space = Some(output);
        step.state.filling = Some(Arc::new(DefaultValueFilling::new()));

        let mut point = Point::new();
        point.insert("x".into(), ParamValue::Float(1.7));
        point.insert("dropped".into(), ParamValue::Float(0.0));
        let projected = step.project_point(&point);

        assert_eq!(projected.get("x"), Some(&ParamValue::Float(1.0)));
        assert_eq!(projected.get("n"), Some(&ParamValue::Int(2)));
        assert!(!projected.contains_key("dropped"));
    }

    #[test]
    fn projection_without_output_space_is_identity() {
        let step = PassThrough::default();
        let mut point = Point::new();
        point.insert("x".into(), ParamValue::Float(0.5));
        assert_eq!(step.project_point(&point), point);
        assert_eq!(step.unproject_point(&point), point);
    }

    #[test]
    fn degraded_reason_display() {
        assert_eq!(DegradedReason::NoHistory.to_string(), "no evaluation history");
        assert_eq!(
            DegradedReason::ImportanceUnavailable.to_string(),
            "importance scores unavailable"
        );
    }
}
