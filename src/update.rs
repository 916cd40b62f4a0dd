//! Update strategies for adaptive dimension selection.
//!
//! An [`UpdateStrategy`] decides, from tracked [`OptimizationProgress`],
//! whether a step should re-derive its selection and what dimension count
//! to target next. Strategies only compute targets; the owning step applies
//! them and triggers re-compression through the pipeline.

use std::fmt::Debug;

use crate::progress::OptimizationProgress;

/// Bounds and context for computing a new target dimension count.
#[derive(Clone, Copy, Debug)]
pub struct TargetBounds {
    /// The step's current target dimension count.
    pub current: usize,
    /// Multiplicative shrink factor applied when reducing.
    pub reduction_ratio: f64,
    /// Smallest allowed target.
    pub min_dimensions: usize,
    /// Largest allowed target.
    pub max_dimensions: usize,
}

impl TargetBounds {
    fn clamp(&self, target: usize) -> usize {
        target.clamp(self.min_dimensions, self.max_dimensions)
    }

    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn shrunk(&self) -> usize {
        let raw = (self.current as f64 * self.reduction_ratio).round() as usize;
        self.clamp(raw.min(self.current.saturating_sub(1)).max(1))
    }

    fn grown(&self) -> usize {
        self.clamp(self.current + 1)
    }
}

/// Decides when and how an adaptive step changes its target size.
pub trait UpdateStrategy: Debug + Send {
    /// Whether the step should recompute its selection now.
    fn should_update(&self, progress: &OptimizationProgress) -> bool;

    /// The next target dimension count, given that an update is due.
    fn compute_target(&self, bounds: &TargetBounds, progress: &OptimizationProgress) -> usize;

    /// A short identifier for diagnostics.
    fn name(&self) -> &'static str;
}

/// Shrinks the target on a fixed iteration period.
#[derive(Clone, Debug)]
pub struct PeriodicUpdate {
    period: usize,
}

impl PeriodicUpdate {
    /// Updates every `period` iterations.
    #[must_use]
    pub fn new(period: usize) -> Self {
        Self { period }
    }
}

impl Default for PeriodicUpdate {
    fn default() -> Self {
        Self::new(10)
    }
}

impl UpdateStrategy for PeriodicUpdate {
    fn should_update(&self, progress: &OptimizationProgress) -> bool {
        progress.should_periodic_update(self.period)
    }

    fn compute_target(&self, bounds: &TargetBounds, _progress: &OptimizationProgress) -> usize {
        bounds.shrunk()
    }

    fn name(&self) -> &'static str {
        "periodic"
    }
}

/// Grows the target when the search stalls, widening the space to escape
/// a plateau.
#[derive(Clone, Debug)]
pub struct StagnationUpdate {
    window: usize,
}

impl StagnationUpdate {
    /// Triggers after `window` consecutive non-improving iterations.
    #[must_use]
    pub fn new(window: usize) -> Self {
        Self { window }
    }
}

impl Default for StagnationUpdate {
    fn default() -> Self {
        Self::new(5)
    }
}

impl UpdateStrategy for StagnationUpdate {
    fn should_update(&self, progress: &OptimizationProgress) -> bool {
        progress.is_stagnant(self.window)
    }

    fn compute_target(&self, bounds: &TargetBounds, _progress: &OptimizationProgress) -> usize {
        bounds.grown()
    }

    fn name(&self) -> &'static str {
        "stagnation"
    }
}

/// Shrinks the target while the search keeps improving, focusing the space
/// around what already works.
#[derive(Clone, Debug)]
pub struct ImprovementUpdate {
    window: usize,
}

impl ImprovementUpdate {
    /// Triggers while an improvement occurred within the last `window`
    /// iterations.
    #[must_use]
    pub fn new(window: usize) -> Self {
        Self { window }
    }
}

impl Default for ImprovementUpdate {
    fn default() -> Self {
        Self::new(3)
    }
}

impl UpdateStrategy for ImprovementUpdate {
    fn should_update(&self, progress: &OptimizationProgress) -> bool {
        progress.iteration() > 0 && progress.has_improvement(self.window)
    }

    fn compute_target(&self, bounds: &TargetBounds, _progress: &OptimizationProgress) -> usize {
        bounds.shrunk()
    }

    fn name(&self) -> &'static str {
        "improvement"
    }
}

/// Delegates to the first inner strategy whose trigger fires.
#[derive(Debug)]
pub struct CompositeUpdate {
    strategies: Vec<Box<dyn UpdateStrategy>>,
}

impl CompositeUpdate {
    /// Chains strategies in priority order.
    #[must_use]
    pub fn new(strategies: Vec<Box<dyn UpdateStrategy>>) -> Self {
        Self { strategies }
    }

    fn active(&self, progress: &OptimizationProgress) -> Option<&dyn UpdateStrategy> {
        self.strategies
            .iter()
            .map(AsRef::as_ref)
            .find(|s| s.should_update(progress))
    }
}

impl UpdateStrategy for CompositeUpdate {
    fn should_update(&self, progress: &OptimizationProgress) -> bool {
        self.active(progress).is_some()
    }

    fn compute_target(&self, bounds: &TargetBounds, progress: &OptimizationProgress) -> usize {
        self.active(progress)
            .map_or(bounds.current, |s| s.compute_target(bounds, progress))
    }

    fn name(&self) -> &'static str {
        "composite"
    }
}

/// Stagnation first, then improvement, then a periodic fallback.
#[derive(Debug)]
pub struct HybridUpdate {
    inner: CompositeUpdate,
}

impl HybridUpdate {
    /// Combines the three default strategies in priority order.
    #[must_use]
    pub fn new(stagnation_window: usize, improvement_window: usize, period: usize) -> Self {
        Self {
            inner: CompositeUpdate::new(vec![
                Box::new(StagnationUpdate::new(stagnation_window)),
                Box::new(ImprovementUpdate::new(improvement_window)),
                Box::new(PeriodicUpdate::new(period)),
            ]),
        }
    }
}

impl Default for HybridUpdate {
    fn default() -> Self {
        Self::new(5, 3, 10)
    }
}

impl UpdateStrategy for HybridUpdate {
    fn should_update(&self, progress: &OptimizationProgress) -> bool {
        self.inner.should_update(progress)
    }

    fn compute_target(&self, bounds: &TargetBounds, progress: &OptimizationProgress) -> usize {
        self.inner.compute_target(bounds, progress)
    }

    fn name(&self) -> &'static str {
        "hybrid"
    }
}
