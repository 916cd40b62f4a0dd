//! Evaluation histories: observed parameter configurations and their
//! objective values, used as training data by compression steps.

use std::collections::HashMap;

use crate::param::Point;
use crate::types::{Direction, TrialState};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Per-task similarity weights, keyed by history index.
///
/// A higher weight means the task's history is more relevant to the current
/// task. Missing entries are treated as weight zero.
pub type TaskSimilarities = HashMap<usize, f64>;

/// A single evaluated configuration.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Observation {
    /// The evaluated configuration.
    pub point: Point,
    /// The objective value.
    pub objective: f64,
    /// The evaluation state.
    pub state: TrialState,
}

impl Observation {
    /// Creates a completed observation.
    #[must_use]
    pub fn new(point: Point, objective: f64) -> Self {
        Self {
            point,
            objective,
            state: TrialState::Complete,
        }
    }

    /// Whether this observation is usable as training data.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        self.state == TrialState::Complete && self.objective.is_finite()
    }
}

/// An ordered record of evaluations for one optimization task.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EvaluationHistory {
    /// Optional identifier of the task this history belongs to.
    pub task_id: Option<String>,
    observations: Vec<Observation>,
}

impl EvaluationHistory {
    /// Creates an empty history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty history tagged with a task identifier.
    #[must_use]
    pub fn for_task(task_id: impl Into<String>) -> Self {
        Self {
            task_id: Some(task_id.into()),
            observations: Vec::new(),
        }
    }

    /// Appends an observation.
    pub fn push(&mut self, observation: Observation) {
        self.observations.push(observation);
    }

    /// Records a completed evaluation.
    pub fn record(&mut self, point: Point, objective: f64) {
        self.push(Observation::new(point, objective));
    }

    /// Returns all observations in insertion order.
    #[must_use]
    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    /// The number of observations, usable or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.observations.len()
    }

    /// Whether the history has no observations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    /// Objective values of all usable observations.
    #[must_use]
    pub fn objectives(&self) -> Vec<f64> {
        self.observations
            .iter()
            .filter(|o| o.is_usable())
            .map(|o| o.objective)
            .collect()
    }

    /// The best objective seen so far under the given direction.
    #[must_use]
    pub fn best_value(&self, direction: Direction) -> Option<f64> {
        let objectives = self.objectives();
        match direction {
            Direction::Minimize => objectives.into_iter().min_by(f64::total_cmp),
            Direction::Maximize => objectives.into_iter().max_by(f64::total_cmp),
        }
    }

    /// The best-performing fraction of usable observations.
    ///
    /// Observations are ordered best-first under `direction`. Always returns
    /// at least one observation when any usable observation exists, even for
    /// very small `ratio`.
    #[must_use]
    #[allow(clippy::cast_precision_loss, clippy::cast_sign_loss, clippy::cast_possible_truncation)]
    pub fn top_fraction(&self, ratio: f64, direction: Direction) -> Vec<&Observation> {
        let mut usable: Vec<&Observation> =
            self.observations.iter().filter(|o| o.is_usable()).collect();
        if usable.is_empty() {
            return usable;
        }
        usable.sort_by(|a, b| match direction {
            Direction::Minimize => a.objective.total_cmp(&b.objective),
            Direction::Maximize => b.objective.total_cmp(&a.objective),
        });
        let k = ((usable.len() as f64 * ratio).floor() as usize).max(1);
        usable.truncate(k.min(usable.len()));
        usable
    }
}
