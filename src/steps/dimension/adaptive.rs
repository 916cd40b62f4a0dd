//! Adaptive dimension selection driven by an update strategy.

use crate::error::{Error, Result};
use crate::history::{EvaluationHistory, TaskSimilarities};
use crate::importance::{CorrelationImportance, ImportanceCalculator};
use crate::progress::OptimizationProgress;
use crate::space::ParameterSpace;
use crate::step::{
    CompressOutcome, CompressionStep, StepInfo, StepKind, StepState, default_step_info,
};
use crate::types::Direction;
use crate::update::{TargetBounds, UpdateStrategy};

use super::compress_by_importance;

/// Dimension selection whose target count moves with optimization
/// progress.
///
/// Without an update strategy this behaves like a plain
/// [`DimensionSelectionStep`](super::DimensionSelectionStep) pinned at
/// its initial target. With one, [`update`](CompressionStep::update)
/// re-targets the kept dimension count between `min_dimensions` and
/// `max_dimensions`; growth beyond the current selection requires the
/// pipeline to restart from the original space, while shrinking can be
/// applied progressively to the current surrogate.
pub struct AdaptiveDimensionStep {
    state: StepState,
    calculator: Box<dyn ImportanceCalculator>,
    strategy: Option<Box<dyn UpdateStrategy>>,
    initial_target: usize,
    current_target: usize,
    reduction_ratio: f64,
    min_dimensions: usize,
    max_dimensions: usize,
    selected: Option<Vec<String>>,
}

impl AdaptiveDimensionStep {
    /// Creates an adaptive step starting at `initial_target` dimensions.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTopK`] when `initial_target` is zero or
    /// `min_dimensions > max_dimensions`, and [`Error::InvalidRatio`]
    /// when `reduction_ratio` is outside `(0, 1)`.
    pub fn new(
        initial_target: usize,
        reduction_ratio: f64,
        min_dimensions: usize,
        max_dimensions: usize,
    ) -> Result<Self> {
        if initial_target == 0 || min_dimensions == 0 || min_dimensions > max_dimensions {
            return Err(Error::InvalidTopK(initial_target.min(min_dimensions)));
        }
        if reduction_ratio <= 0.0 || reduction_ratio >= 1.0 {
            return Err(Error::InvalidRatio(reduction_ratio));
        }
        Ok(Self {
            state: StepState::default(),
            calculator: Box::new(CorrelationImportance::default()),
            strategy: None,
            initial_target,
            current_target: initial_target.clamp(min_dimensions, max_dimensions),
            reduction_ratio,
            min_dimensions,
            max_dimensions,
            selected: None,
        })
    }

    /// Sets the importance calculator.
    #[must_use]
    pub fn with_calculator(mut self, calculator: Box<dyn ImportanceCalculator>) -> Self {
        self.calculator = calculator;
        self
    }

    /// Installs the update strategy that re-targets the dimension count.
    #[must_use]
    pub fn with_update_strategy(mut self, strategy: Box<dyn UpdateStrategy>) -> Self {
        self.strategy = Some(strategy);
        self
    }

    /// The dimension count the step currently targets.
    #[must_use]
    pub fn current_target(&self) -> usize {
        self.current_target
    }

    /// Restores the target to its initial value.
    pub fn reset_target(&mut self) {
        self.current_target = self
            .initial_target
            .clamp(self.min_dimensions, self.max_dimensions);
    }
}

impl std::fmt::Debug for AdaptiveDimensionStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdaptiveDimensionStep")
            .field("current_target", &self.current_target)
            .field("calculator", &self.calculator.name())
            .field("strategy", &self.strategy.as_ref().map(|s| s.name()))
            .finish_non_exhaustive()
    }
}

impl CompressionStep for AdaptiveDimensionStep {
    fn name(&self) -> &str {
        "adaptive_dimension"
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
        histories: &[EvaluationHistory],
        similarities: Option<&TaskSimilarities>,
        direction: Direction,
    ) -> CompressOutcome {
        let fixed: Vec<String> = self
            .state
            .filling
            .as_ref()
            .map(|f| f.fixed_parameters().to_vec())
            .unwrap_or_default();
        let mut selected = None;
        let outcome = compress_by_importance(
            input,
            histories,
            similarities,
            direction,
            self.calculator.as_ref(),
            self.current_target,
            &[],
            &[],
            &fixed,
            &mut selected,
        );
        self.selected = selected;
        self.state.record(input, &outcome);
        outcome
    }

    fn affects_sampling_space(&self) -> bool {
        true
    }

    fn supports_adaptive_update(&self) -> bool {
        self.strategy.is_some()
    }

    fn uses_progressive_compression(&self) -> bool {
        true
    }

    fn update(
        &mut self,
        progress: &OptimizationProgress,
        _histories: &[EvaluationHistory],
    ) -> bool {
        let Some(strategy) = self.strategy.as_ref() else {
            return false;
        };
        if !strategy.should_update(progress) {
            return false;
        }
        let bounds = TargetBounds {
            current: self.current_target,
            reduction_ratio: self.reduction_ratio,
            min_dimensions: self.min_dimensions,
            max_dimensions: self.max_dimensions,
        };
        let target = strategy.compute_target(&bounds, progress);
        if target == self.current_target {
            return false;
        }
        trace_info!(
            strategy = strategy.name(),
            from = self.current_target,
            to = target,
            "re-targeting adaptive dimension selection"
        );
        self.current_target = target;
        true
    }

    fn target_size(&self) -> Option<usize> {
        Some(self.current_target)
    }

    fn reset_cache(&self) {
        self.calculator.reset_cache();
    }

    fn step_info(&self) -> StepInfo {
        let mut info = default_step_info(self);
        info.selected_parameters = self.selected.clone();
        info
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::param::{ParamValue, Point};
    use crate::space::ParamDef;
    use crate::update::{PeriodicUpdate, StagnationUpdate};

    fn space() -> ParameterSpace {
        ParameterSpace::new(vec![
            ParamDef::float("a", 0.0, 10.0).unwrap(),
            ParamDef::float("b", 0.0, 10.0).unwrap(),
            ParamDef::float("c", 0.0, 10.0).unwrap(),
            ParamDef::float("d", 0.0, 10.0).unwrap(),
        ])
        .unwrap()
    }

    fn history() -> EvaluationHistory {
        let mut rng = fastrand::Rng::with_seed(4);
        let mut h = EvaluationHistory::new();
        for _ in 0..50 {
            let vals: Vec<f64> = (0..4).map(|_| rng.f64() * 10.0).collect();
            let mut p = Point::new();
            for (name, &v) in ["a", "b", "c", "d"].iter().zip(&vals) {
                p.insert((*name).to_owned(), ParamValue::Float(v));
            }
            h.record(p, 8.0 * vals[0] + 2.0 * vals[1] + 0.1 * vals[2]);
        }
        h
    }

    #[test]
    fn invalid_configuration_rejected() {
        assert!(AdaptiveDimensionStep::new(0, 0.5, 1, 4).is_err());
        assert!(AdaptiveDimensionStep::new(3, 0.0, 1, 4).is_err());
        assert!(AdaptiveDimensionStep::new(3, 1.5, 1, 4).is_err());
        assert!(AdaptiveDimensionStep::new(3, 0.5, 4, 2).is_err());
    }

    #[test]
    fn without_strategy_never_updates() {
        let mut step = AdaptiveDimensionStep::new(3, 0.5, 1, 4).unwrap();
        assert!(!step.supports_adaptive_update());
        let mut progress = OptimizationProgress::new(Direction::Minimize);
        for _ in 0..20 {
            progress.update(1.0);
        }
        assert!(!step.update(&progress, &[]));
    }

    #[test]
    fn periodic_strategy_shrinks_target() {
        let mut step = AdaptiveDimensionStep::new(4, 0.5, 1, 4)
            .unwrap()
            .with_update_strategy(Box::new(PeriodicUpdate::new(5)));
        let mut progress = OptimizationProgress::new(Direction::Minimize);
        for _ in 0..5 {
            progress.update(1.0);
        }
        assert!(step.update(&progress, &[]));
        assert_eq!(step.current_target(), 2);
    }

    #[test]
    fn stagnation_strategy_grows_target() {
        let mut step = AdaptiveDimensionStep::new(2, 0.5, 1, 4)
            .unwrap()
            .with_update_strategy(Box::new(StagnationUpdate::new(3)));
        let mut progress = OptimizationProgress::new(Direction::Minimize);
        progress.update(1.0);
        for _ in 0..3 {
            progress.update(2.0);
        }
        assert!(step.update(&progress, &[]));
        assert_eq!(step.current_target(), 3);
    }

    #[test]
    fn compress_honors_current_target() {
        let mut step = AdaptiveDimensionStep::new(2, 0.5, 1, 4).unwrap();
        let outcome = step.compress(&space(), &[history()], None, Direction::Minimize);
        assert_eq!(outcome.space.len(), 2);
        assert!(outcome.space.contains("a"));
        assert!(outcome.space.contains("b"));
    }

    #[test]
    fn reset_target_restores_initial() {
        let mut step = AdaptiveDimensionStep::new(4, 0.5, 1, 4)
            .unwrap()
            .with_update_strategy(Box::new(PeriodicUpdate::new(2)));
        let mut progress = OptimizationProgress::new(Direction::Minimize);
        progress.update(1.0);
        progress.update(1.0);
        assert!(step.update(&progress, &[]));
        assert_ne!(step.current_target(), 4);
        step.reset_target();
        assert_eq!(step.current_target(), 4);
    }
}
