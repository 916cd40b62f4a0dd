//! Built-in compression steps.
//!
//! Three families: dimension selection drops unimportant parameters,
//! range compression narrows numeric bounds, and projection maps the
//! space into a different coordinate system. [`NoopStep`] is the
//! identity placeholder used when a slot in a configured chain should do
//! nothing.

pub mod dimension;
pub mod projection;
pub mod range;

use crate::history::{EvaluationHistory, TaskSimilarities};
use crate::space::ParameterSpace;
use crate::step::{CompressOutcome, CompressionStep, StepKind, StepState};
use crate::types::Direction;

/// A step that passes its input space through unchanged.
#[derive(Debug, Default)]
pub struct NoopStep {
    state: StepState,
}

impl NoopStep {
    /// Creates an identity step.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl CompressionStep for NoopStep {
    fn name(&self) -> &str {
        "none"
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
        let outcome = CompressOutcome::ok(input.clone());
        self.state.record(input, &outcome);
        outcome
    }
}
