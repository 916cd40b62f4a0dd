//! Dimension selection: dropping parameters that do not drive the
//! objective.
//!
//! [`DimensionSelectionStep`] ranks numeric parameters with an
//! [`ImportanceCalculator`] and keeps the top `k`, honoring expert
//! include and exclude lists. Categorical parameters cannot be scored
//! and are always kept. [`AdaptiveDimensionStep`] wraps the same
//! selection with an update strategy that re-targets `k` as the search
//! progresses; [`ExpertDimensionStep`] skips importance entirely and
//! keeps an explicit list.

mod adaptive;
mod expert;

pub use adaptive::AdaptiveDimensionStep;
pub use expert::ExpertDimensionStep;

use std::collections::HashSet;

use crate::error::{Error, Result};
use crate::history::{EvaluationHistory, TaskSimilarities};
use crate::importance::{CorrelationImportance, ImportanceCalculator};
use crate::space::ParameterSpace;
use crate::step::{
    CompressOutcome, CompressionStep, DegradedReason, StepInfo, StepKind, StepState,
    default_step_info,
};
use crate::types::Direction;

/// Builds the sub-space of `input` keeping exactly the named parameters,
/// in the input's definition order.
pub(crate) fn subspace(input: &ParameterSpace, keep: &HashSet<String>) -> ParameterSpace {
    let params = input
        .params()
        .iter()
        .filter(|def| keep.contains(def.name()))
        .cloned()
        .collect();
    // Kept definitions were already valid in the input space.
    let mut space = ParameterSpace::new(params).unwrap_or_else(|_| input.clone());
    space.set_seed(input.seed());
    space
}

/// Ranks numeric parameters and resolves include and exclude lists into
/// the final kept set.
///
/// Scores are ascending (lower is more important). Included names always
/// stay; excluded names never do; remaining slots up to `top_k` go to the
/// best-ranked candidates. Categorical parameters are kept unconditionally.
fn resolve_selection(
    input: &ParameterSpace,
    names: &[String],
    scores: &[f64],
    top_k: usize,
    include: &[String],
    exclude: &[String],
) -> HashSet<String> {
    let excluded: HashSet<&String> = exclude.iter().collect();
    let mut keep: HashSet<String> = include
        .iter()
        .filter(|n| input.contains(n) && !excluded.contains(n))
        .cloned()
        .collect();

    let mut ranked: Vec<(&String, f64)> = names
        .iter()
        .zip(scores.iter().copied())
        .filter(|(n, _)| !excluded.contains(n) && !keep.contains(n.as_str()))
        .collect();
    ranked.sort_by(|a, b| a.1.total_cmp(&b.1));
    for (name, _) in ranked {
        if keep.len() >= top_k {
            break;
        }
        keep.insert(name.clone());
    }

    for def in input.params() {
        if !def.is_numeric() {
            keep.insert(def.name().to_owned());
        }
    }
    keep
}

/// Keeps the `top_k` most important numeric parameters.
pub struct DimensionSelectionStep {
    state: StepState,
    calculator: Box<dyn ImportanceCalculator>,
    top_k: usize,
    include: Vec<String>,
    exclude: Vec<String>,
    selected: Option<Vec<String>>,
}

impl DimensionSelectionStep {
    /// Creates a selection step keeping `top_k` parameters, scored by
    /// Spearman correlation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTopK`] when `top_k` is zero.
    pub fn new(top_k: usize) -> Result<Self> {
        Self::with_calculator(top_k, Box::new(CorrelationImportance::default()))
    }

    /// Creates a selection step with a custom importance calculator.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTopK`] when `top_k` is zero.
    pub fn with_calculator(
        top_k: usize,
        calculator: Box<dyn ImportanceCalculator>,
    ) -> Result<Self> {
        if top_k == 0 {
            return Err(Error::InvalidTopK(top_k));
        }
        Ok(Self {
            state: StepState::default(),
            calculator,
            top_k,
            include: Vec::new(),
            exclude: Vec::new(),
            selected: None,
        })
    }

    /// Parameters that are always kept regardless of their rank.
    #[must_use]
    pub fn include(mut self, names: Vec<String>) -> Self {
        self.include = names;
        self
    }

    /// Parameters that are never kept.
    #[must_use]
    pub fn exclude(mut self, names: Vec<String>) -> Self {
        self.exclude = names;
        self
    }

    /// The names the last compression kept, in input order.
    #[must_use]
    pub fn selected(&self) -> Option<&[String]> {
        self.selected.as_deref()
    }
}

impl std::fmt::Debug for DimensionSelectionStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DimensionSelectionStep")
            .field("top_k", &self.top_k)
            .field("calculator", &self.calculator.name())
            .finish_non_exhaustive()
    }
}

/// Selection shared by the plain and adaptive dimension steps.
pub(crate) fn compress_by_importance(
    input: &ParameterSpace,
    histories: &[EvaluationHistory],
    similarities: Option<&TaskSimilarities>,
    direction: Direction,
    calculator: &dyn ImportanceCalculator,
    top_k: usize,
    include: &[String],
    exclude: &[String],
    fixed: &[String],
    selected_out: &mut Option<Vec<String>>,
) -> CompressOutcome {
    *selected_out = None;
    let numeric = input.numeric_names();
    if numeric.is_empty() {
        return CompressOutcome::degraded(input.clone(), DegradedReason::NoNumericParameters);
    }
    if histories.iter().all(EvaluationHistory::is_empty) {
        return CompressOutcome::degraded(input.clone(), DegradedReason::NoHistory);
    }
    let usable: Vec<&String> = numeric.iter().filter(|n| !exclude.contains(n)).collect();
    if top_k >= usable.len() && exclude.is_empty() {
        // Nothing to drop.
        let names = input.names();
        *selected_out = Some(names);
        return CompressOutcome::ok(input.clone());
    }

    let Some((names, scores)) =
        calculator.calculate_importances(input, histories, similarities, direction)
    else {
        return CompressOutcome::degraded(input.clone(), DegradedReason::ImportanceUnavailable);
    };

    let mut keep = resolve_selection(input, &names, &scores, top_k, include, exclude);
    for name in fixed {
        keep.remove(name);
    }
    if keep.is_empty() {
        return CompressOutcome::degraded(input.clone(), DegradedReason::EmptySelection);
    }

    let space = subspace(input, &keep);
    let ordered: Vec<String> = space.names();
    trace_info!(
        kept = ordered.len(),
        from = input.len(),
        "selected important dimensions"
    );
    *selected_out = Some(ordered);
    CompressOutcome::ok(space)
}

impl CompressionStep for DimensionSelectionStep {
    fn name(&self) -> &str {
        "dimension_selection"
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
            self.top_k,
            &self.include,
            &self.exclude,
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

    fn target_size(&self) -> Option<usize> {
        Some(self.top_k)
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
