//! Expert-specified dimension selection.

use std::collections::HashSet;

use crate::error::{Error, Result};
use crate::history::{EvaluationHistory, TaskSimilarities};
use crate::space::ParameterSpace;
use crate::step::{
    CompressOutcome, CompressionStep, DegradedReason, StepInfo, StepKind, StepState,
    default_step_info,
};
use crate::types::Direction;

use super::subspace;

/// Keeps exactly the parameters an expert listed, plus categoricals.
///
/// Needs no evaluation history; listed names absent from the input space
/// are ignored.
#[derive(Debug)]
pub struct ExpertDimensionStep {
    state: StepState,
    keep: Vec<String>,
    selected: Option<Vec<String>>,
}

impl ExpertDimensionStep {
    /// Creates a step keeping the listed parameters.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTopK`] when the list is empty.
    pub fn new(keep: Vec<String>) -> Result<Self> {
        if keep.is_empty() {
            return Err(Error::InvalidTopK(0));
        }
        Ok(Self {
            state: StepState::default(),
            keep,
            selected: None,
        })
    }
}

impl CompressionStep for ExpertDimensionStep {
    fn name(&self) -> &str {
        "expert_dimension"
    }

    fn kind(&self) -> StepKind {
        StepKind::DimensionSelection
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
        self.selected = None;
        let mut keep: HashSet<String> = self
            .keep
            .iter()
            .filter(|n| input.contains(n))
            .cloned()
            .collect();
        for def in input.params() {
            if !def.is_numeric() {
                keep.insert(def.name().to_owned());
            }
        }
        if let Some(filling) = self.state.filling.as_ref() {
            for name in filling.fixed_parameters() {
                keep.remove(name);
            }
        }
        let outcome = if keep.is_empty() {
            CompressOutcome::degraded(input.clone(), DegradedReason::EmptySelection)
        } else {
            let space = subspace(input, &keep);
            self.selected = Some(space.names());
            CompressOutcome::ok(space)
        };
        self.state.record(input, &outcome);
        outcome
    }

    fn affects_sampling_space(&self) -> bool {
        true
    }

    fn target_size(&self) -> Option<usize> {
        Some(self.keep.len())
    }

    fn step_info(&self) -> StepInfo {
        let mut info = default_step_info(self);
        info.selected_parameters = self.selected.clone();
        info
    }
}
