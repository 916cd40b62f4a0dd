//! Optimization progress tracking.
//!
//! Adaptive steps decide when and how to re-compress based on how the
//! search is going. [`OptimizationProgress`] tracks per-iteration best
//! values and derives improvement and stagnation signals from them.

use crate::history::EvaluationHistory;
use crate::types::Direction;

/// Qualitative summary of recent progress over a trailing window.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Trend {
    /// The best value improved within the window.
    Improving,
    /// The best value did not move within the window.
    Stagnating,
    /// Not enough data to judge.
    Unknown,
}

/// Iteration counter plus best-value bookkeeping.
#[derive(Clone, Debug)]
pub struct OptimizationProgress {
    direction: Direction,
    iteration: usize,
    best_value_history: Vec<f64>,
    last_best: Option<f64>,
    improvement_count: usize,
    stagnation_count: usize,
}

impl OptimizationProgress {
    /// Creates a fresh tracker for the given optimization direction.
    #[must_use]
    pub fn new(direction: Direction) -> Self {
        Self {
            direction,
            iteration: 0,
            best_value_history: Vec::new(),
            last_best: None,
            improvement_count: 0,
            stagnation_count: 0,
        }
    }

    /// Records one iteration's objective value.
    ///
    /// The first recorded value establishes the baseline and counts as
    /// neither improvement nor stagnation.
    pub fn update(&mut self, value: f64) {
        self.iteration += 1;
        if !value.is_finite() {
            // A failed evaluation still counts as a non-improving iteration.
            self.stagnation_count += 1;
            self.improvement_count = 0;
            if let Some(best) = self.last_best {
                self.best_value_history.push(best);
            }
            return;
        }
        match self.last_best {
            None => {
                self.last_best = Some(value);
            }
            Some(best) => {
                let improved = match self.direction {
                    Direction::Minimize => value < best,
                    Direction::Maximize => value > best,
                };
                if improved {
                    self.last_best = Some(value);
                    self.improvement_count += 1;
                    self.stagnation_count = 0;
                } else {
                    self.stagnation_count += 1;
                    self.improvement_count = 0;
                }
            }
        }
        if let Some(best) = self.last_best {
            self.best_value_history.push(best);
        }
    }

    /// Records a single iteration using the history's incumbent value.
    pub fn update_from_history(&mut self, history: &EvaluationHistory) {
        if let Some(best) = history.best_value(self.direction) {
            self.update(best);
        }
    }

    /// Clears all counters and the best-value record.
    pub fn reset(&mut self) {
        self.iteration = 0;
        self.best_value_history.clear();
        self.last_best = None;
        self.improvement_count = 0;
        self.stagnation_count = 0;
    }

    /// The number of iterations recorded.
    #[must_use]
    pub fn iteration(&self) -> usize {
        self.iteration
    }

    /// The best objective value seen so far.
    #[must_use]
    pub fn best_value(&self) -> Option<f64> {
        self.last_best
    }

    /// Per-iteration running best values.
    #[must_use]
    pub fn best_value_history(&self) -> &[f64] {
        &self.best_value_history
    }

    /// Consecutive iterations without improvement.
    #[must_use]
    pub fn stagnation_count(&self) -> usize {
        self.stagnation_count
    }

    /// Consecutive improving iterations, reset on every non-improving one.
    #[must_use]
    pub fn improvement_count(&self) -> usize {
        self.improvement_count
    }

    /// Whether the best value improved on at least `window` consecutive
    /// iterations.
    #[must_use]
    pub fn has_improvement(&self, window: usize) -> bool {
        self.improvement_count >= window
    }

    /// Whether at least `window` consecutive iterations passed without
    /// improvement.
    #[must_use]
    pub fn is_stagnant(&self, window: usize) -> bool {
        self.stagnation_count >= window
    }

    /// Whether the current iteration falls on a periodic update boundary.
    #[must_use]
    pub fn should_periodic_update(&self, period: usize) -> bool {
        period > 0 && self.iteration > 0 && self.iteration % period == 0
    }

    /// Compares the running best at the window edges to classify recent
    /// movement.
    #[must_use]
    pub fn recent_trend(&self, window: usize) -> Trend {
        let n = self.best_value_history.len();
        if window == 0 || n < window + 1 {
            return Trend::Unknown;
        }
        let earlier = self.best_value_history[n - window - 1];
        let latest = self.best_value_history[n - 1];
        let improved = match self.direction {
            Direction::Minimize => latest < earlier,
            Direction::Maximize => latest > earlier,
        };
        if improved { Trend::Improving } else { Trend::Stagnating }
    }
}
