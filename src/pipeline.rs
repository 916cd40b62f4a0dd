//! Ordered composition of compression steps.
//!
//! A [`CompressionPipeline`] owns the original parameter space and a
//! chain of [`CompressionStep`]s. Compressing folds the chain left to
//! right, each step consuming the previous step's output, and derives
//! three views of the result:
//!
//! * the **surrogate space**, the final output, where surrogate models
//!   are trained;
//! * the **sampling space**, the output of the last step whose output
//!   can be sampled directly;
//! * the **unprojected space**, the input of the first step requiring
//!   unprojection, which is where evaluated configurations live.
//!
//! Adaptive steps can later request re-compression. Whether that restarts
//! from the original space or continues from the current surrogate
//! depends on which steps changed and how; see
//! [`update_compression`](CompressionPipeline::update_compression).

use std::sync::Arc;

use crate::filling::{DefaultValueFilling, FillingStrategy};
use crate::history::{EvaluationHistory, TaskSimilarities};
use crate::param::Point;
use crate::progress::OptimizationProgress;
use crate::sampling::{
    Sample, SampleOrigin, SamplingStrategy, StandardSampling, canonical_objective,
};
use crate::space::ParameterSpace;
use crate::step::{CompressionStep, StepInfo};
use crate::types::Direction;

/// Where a re-compression starts from.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RestartPoint {
    /// The chain re-runs from the original space.
    Original,
    /// The chain continues from the current surrogate space.
    Surrogate,
}

/// An ordered chain of compression steps over one original space.
pub struct CompressionPipeline {
    original_space: ParameterSpace,
    steps: Vec<Box<dyn CompressionStep>>,
    direction: Direction,
    seed: u64,
    filling: Arc<dyn FillingStrategy>,
    progress: OptimizationProgress,
    space_after_steps: Vec<ParameterSpace>,
    surrogate_space: ParameterSpace,
    sample_space: ParameterSpace,
    unprojected_space: ParameterSpace,
    sampling: Option<Box<dyn SamplingStrategy>>,
}

impl CompressionPipeline {
    /// Creates a pipeline over `original_space` with the given step
    /// chain.
    ///
    /// Before the first [`compress_space`](Self::compress_space) call
    /// every derived space equals the original.
    #[must_use]
    pub fn new(
        original_space: ParameterSpace,
        steps: Vec<Box<dyn CompressionStep>>,
        direction: Direction,
    ) -> Self {
        let surrogate = original_space.clone();
        let sample = original_space.clone();
        let unprojected = original_space.clone();
        Self {
            original_space,
            steps,
            direction,
            seed: 0,
            filling: Arc::new(DefaultValueFilling::new()),
            progress: OptimizationProgress::new(direction),
            space_after_steps: Vec::new(),
            surrogate_space: surrogate,
            sample_space: sample,
            unprojected_space: unprojected,
            sampling: None,
        }
    }

    /// Replaces the filling strategy for dropped parameters.
    #[must_use]
    pub fn with_filling(mut self, filling: Arc<dyn FillingStrategy>) -> Self {
        self.filling = filling;
        self
    }

    /// Seeds the pipeline; derived spaces and samplers inherit it.
    pub fn set_seed(&mut self, seed: u64) {
        self.seed = seed;
        self.original_space.set_seed(seed);
    }

    /// The optimization direction.
    #[must_use]
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// The uncompressed space the pipeline started from.
    #[must_use]
    pub fn original_space(&self) -> &ParameterSpace {
        &self.original_space
    }

    /// The final output space, where surrogate models train.
    #[must_use]
    pub fn surrogate_space(&self) -> &ParameterSpace {
        &self.surrogate_space
    }

    /// The space candidate configurations are drawn from.
    #[must_use]
    pub fn sample_space(&self) -> &ParameterSpace {
        &self.sample_space
    }

    /// The space evaluated configurations live in.
    #[must_use]
    pub fn unprojected_space(&self) -> &ParameterSpace {
        &self.unprojected_space
    }

    /// The intermediate space after each step, in chain order.
    #[must_use]
    pub fn space_after_steps(&self) -> &[ParameterSpace] {
        &self.space_after_steps
    }

    /// Progress counters driving adaptive updates.
    #[must_use]
    pub fn progress(&self) -> &OptimizationProgress {
        &self.progress
    }

    /// Whether sampled points must be unprojected before evaluation.
    #[must_use]
    pub fn needs_unproject(&self) -> bool {
        self.steps.iter().any(|s| s.needs_unproject())
    }

    /// Diagnostic snapshots of every step, in chain order.
    #[must_use]
    pub fn step_infos(&self) -> Vec<StepInfo> {
        self.steps.iter().map(|s| s.step_info()).collect()
    }

    /// Runs the full chain from the original space.
    pub fn compress_space(
        &mut self,
        histories: &[EvaluationHistory],
        similarities: Option<&TaskSimilarities>,
    ) {
        let original = self.original_space.clone();
        self.run_chain(&original, histories, similarities);
    }

    fn run_chain(
        &mut self,
        from: &ParameterSpace,
        histories: &[EvaluationHistory],
        similarities: Option<&TaskSimilarities>,
    ) {
        let mut current = from.clone();
        current.set_seed(self.seed);
        self.space_after_steps.clear();
        // Index 0 is the chain's input; index i + 1 is the output of step i.
        self.space_after_steps.push(current.clone());
        for step in &mut self.steps {
            step.state_mut().filling = Some(self.filling.clone());
            let outcome = step.compress(&current, histories, similarities, self.direction);
            if let Some(_reason) = outcome.degraded {
                trace_info!(step = step.name(), reason = %_reason, "step passed through");
            } else {
                trace_info!(
                    step = step.name(),
                    input = current.len(),
                    output = outcome.space.len(),
                    "step compressed"
                );
            }
            current = outcome.space;
            self.space_after_steps.push(current.clone());
        }
        self.derive_spaces();
        self.build_sampling();
    }

    /// Resolves the surrogate, sampling, and unprojected views from the
    /// per-step outputs.
    fn derive_spaces(&mut self) {
        self.surrogate_space = self
            .space_after_steps
            .last()
            .cloned()
            .unwrap_or_else(|| self.original_space.clone());

        self.sample_space = self.original_space.clone();
        for (step, space) in self.steps.iter().zip(&self.space_after_steps[1..]).rev() {
            if step.affects_sampling_space() {
                self.sample_space = space.clone();
                break;
            }
        }

        self.unprojected_space = self.original_space.clone();
        for (i, step) in self.steps.iter().enumerate() {
            if step.needs_unproject() {
                // The input of step i.
                self.unprojected_space = self.space_after_steps[i].clone();
                break;
            }
        }
    }

    /// Installs the sampling strategy: the last step offering one wins,
    /// otherwise uniform sampling over the sampling space.
    fn build_sampling(&mut self) {
        let from_step = self.steps.iter().rev().find_map(|s| s.sampling_strategy());
        self.sampling = Some(from_step.unwrap_or_else(|| {
            let mut space = self.sample_space.clone();
            space.set_seed(self.seed);
            Box::new(StandardSampling::new(space))
        }));
    }

    /// Draws `n` candidates from the current sampling strategy.
    pub fn sample(&mut self, n: usize) -> Vec<Sample> {
        match self.sampling.as_mut() {
            Some(strategy) => strategy.sample(n),
            None => {
                self.build_sampling();
                self.sample(n)
            }
        }
    }

    /// Feeds evaluated outcomes back into progress tracking and the
    /// sampling strategy. Objectives arrive in the study's direction and
    /// are canonicalized internally.
    pub fn observe_outcomes(&mut self, outcomes: &[(SampleOrigin, f64)]) {
        for &(_, value) in outcomes {
            self.progress.update(value);
        }
        if let Some(strategy) = self.sampling.as_mut() {
            let canonical: Vec<(SampleOrigin, f64)> = outcomes
                .iter()
                .map(|&(origin, value)| (origin, canonical_objective(value, self.direction)))
                .collect();
            strategy.observe(&canonical);
        }
    }

    /// Lets adaptive steps reconsider their configuration and, when any
    /// changed, re-compresses the chain.
    ///
    /// The restart point follows from what changed: a step now targeting
    /// more dimensions than the surrogate currently has must restart
    /// from the original space; if every changed step supports
    /// progressive compression the chain continues from the surrogate;
    /// any other change restarts from the original space.
    pub fn update_compression(
        &mut self,
        histories: &[EvaluationHistory],
        similarities: Option<&TaskSimilarities>,
    ) -> Option<RestartPoint> {
        if let Some(current) = histories.first() {
            self.progress.update_from_history(current);
        }
        let mut updated: Vec<usize> = Vec::new();
        let progress = self.progress.clone();
        for (i, step) in self.steps.iter_mut().enumerate() {
            if step.supports_adaptive_update() && step.update(&progress, histories) {
                updated.push(i);
            }
        }
        if updated.is_empty() {
            return None;
        }

        let surrogate_size = self.surrogate_space.len();
        let grows_beyond_surrogate = updated.iter().any(|&i| {
            self.steps[i]
                .target_size()
                .is_some_and(|target| target > surrogate_size)
        });
        let all_progressive = updated
            .iter()
            .all(|&i| self.steps[i].uses_progressive_compression());

        let restart = if grows_beyond_surrogate || !all_progressive {
            RestartPoint::Original
        } else {
            RestartPoint::Surrogate
        };
        trace_info!(
            updated = updated.len(),
            restart = ?restart,
            "re-compressing after adaptive update"
        );
        match restart {
            RestartPoint::Original => {
                let original = self.original_space.clone();
                self.run_chain(&original, histories, similarities);
            }
            RestartPoint::Surrogate => {
                let surrogate = self.surrogate_space.clone();
                self.run_chain(&surrogate, histories, similarities);
            }
        }
        Some(restart)
    }

    /// Maps a point from the original space through every step into the
    /// surrogate space.
    #[must_use]
    pub fn project_point(&self, point: &Point) -> Point {
        self.steps
            .iter()
            .fold(point.clone(), |p, step| step.project_point(&p))
    }

    /// Maps a point from the sampling space back into the unprojected
    /// space, reversing every projection step.
    #[must_use]
    pub fn unproject_point(&self, point: &Point) -> Point {
        self.steps
            .iter()
            .rev()
            .filter(|s| s.needs_unproject())
            .fold(point.clone(), |p, step| step.unproject_point(&p))
    }

    /// Drops all fitted model state across steps.
    pub fn reset_caches(&self) {
        for step in &self.steps {
            step.reset_cache();
        }
    }
}

impl std::fmt::Debug for CompressionPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompressionPipeline")
            .field("steps", &self.steps.iter().map(|s| s.name().to_owned()).collect::<Vec<_>>())
            .field("direction", &self.direction)
            .field("surrogate", &self.surrogate_space.len())
            .field("sample", &self.sample_space.len())
            .finish_non_exhaustive()
    }
}
