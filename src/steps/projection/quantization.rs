//! Quantization of large-cardinality integer parameters.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::history::{EvaluationHistory, TaskSimilarities};
use crate::param::{ParamValue, Point};
use crate::progress::OptimizationProgress;
use crate::space::{ParamDef, ParamKind, ParameterSpace};
use crate::step::{CompressOutcome, CompressionStep, DegradedReason, StepKind, StepState};
use crate::types::Direction;

/// Linear scaler between an integer range and a bounded level grid.
///
/// Levels run from 1 to `levels`. Values that sit exactly on the grid
/// round-trip without loss.
#[derive(Clone, Copy, Debug)]
struct LevelScaler {
    low: i64,
    high: i64,
    levels: u32,
}

impl LevelScaler {
    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    fn to_level(self, value: i64) -> i64 {
        let span = (self.high - self.low) as f64;
        if span <= 0.0 {
            return 1;
        }
        let fraction = (value.clamp(self.low, self.high) - self.low) as f64 / span;
        (fraction * f64::from(self.levels - 1)).round() as i64 + 1
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    fn from_level(self, level: i64) -> i64 {
        let level = level.clamp(1, i64::from(self.levels));
        let span = (self.high - self.low) as f64;
        let fraction = (level - 1) as f64 / f64::from(self.levels - 1);
        self.low + (fraction * span).round() as i64
    }
}

/// Replaces every integer parameter with more than `max_values` distinct
/// values by a level-grid parameter named `<name>|q`.
///
/// With adaptive resolution enabled, stagnation refines the grid (more
/// levels) and steady improvement coarsens it, within a fixed floor and
/// cap.
#[derive(Debug)]
pub struct QuantizationStep {
    state: StepState,
    max_values: u32,
    adaptive: bool,
    scalers: HashMap<String, LevelScaler>,
}

impl QuantizationStep {
    /// Smallest adaptive grid resolution.
    pub const MIN_LEVELS: u32 = 5;
    /// Largest adaptive grid resolution.
    pub const MAX_LEVELS: u32 = 100;
    /// Consecutive non-improving iterations that trigger refinement.
    pub const STAGNATION_WINDOW: usize = 5;
    /// Trailing window in which an improvement triggers coarsening.
    pub const IMPROVEMENT_WINDOW: usize = 3;

    /// Creates a quantization step with a fixed grid resolution.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidMaxValues`] when `max_values < 2`.
    pub fn new(max_values: u32) -> Result<Self> {
        if max_values < 2 {
            return Err(Error::InvalidMaxValues(max_values));
        }
        Ok(Self {
            state: StepState::default(),
            max_values,
            adaptive: false,
            scalers: HashMap::new(),
        })
    }

    /// Enables progress-driven adjustment of the grid resolution.
    #[must_use]
    pub fn adaptive(mut self) -> Self {
        self.adaptive = true;
        self
    }

    /// The current grid resolution.
    #[must_use]
    pub fn max_values(&self) -> u32 {
        self.max_values
    }

    fn quantized_name(name: &str) -> String {
        format!("{name}|q")
    }

    fn original_name(quantized: &str) -> Option<&str> {
        quantized.strip_suffix("|q")
    }
}

impl CompressionStep for QuantizationStep {
    fn name(&self) -> &str {
        "quantization"
    }

    fn kind(&self) -> StepKind {
        StepKind::Projection
    }

    fn state(&self) -> &StepState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut StepState {
        &mut self.state
    }

    #[allow(clippy::cast_possible_truncation)]
    fn compress(
        &mut self,
        input: &ParameterSpace,
        _histories: &[EvaluationHistory],
        _similarities: Option<&TaskSimilarities>,
        _direction: Direction,
    ) -> CompressOutcome {
        self.scalers.clear();
        let mut params: Vec<ParamDef> = Vec::with_capacity(input.len());
        for def in input.params() {
            match def.kind() {
                ParamKind::Int { low, high, .. }
                    if def.cardinality().is_some_and(|c| c > u64::from(self.max_values)) =>
                {
                    let scaler = LevelScaler {
                        low: *low,
                        high: *high,
                        levels: self.max_values,
                    };
                    let name = Self::quantized_name(def.name());
                    match ParamDef::int(name.clone(), 1, i64::from(self.max_values)) {
                        Ok(q) => {
                            self.scalers.insert(def.name().to_owned(), scaler);
                            params.push(q.default_value(ParamValue::Int(
                                scaler.to_level(def.default().as_f64().round() as i64),
                            )));
                        }
                        Err(_) => params.push(def.clone()),
                    }
                }
                _ => params.push(def.clone()),
            }
        }
        let outcome = if self.scalers.is_empty() {
            CompressOutcome::degraded(input.clone(), DegradedReason::EmptySelection)
        } else {
            match ParameterSpace::new(params) {
                Ok(mut space) => {
                    space.set_seed(input.seed());
                    CompressOutcome::ok(space)
                }
                Err(_) => CompressOutcome::degraded(input.clone(), DegradedReason::FitFailed),
            }
        };
        self.state.record(input, &outcome);
        outcome
    }

    /// Replaces quantized parameters' raw values by their grid level.
    fn project_point(&self, point: &Point) -> Point {
        let mut out = Point::new();
        for (name, value) in point {
            match self.scalers.get(name) {
                #[allow(clippy::cast_possible_truncation)]
                Some(scaler) => {
                    let raw = value.as_f64().round() as i64;
                    out.insert(
                        Self::quantized_name(name),
                        ParamValue::Int(scaler.to_level(raw)),
                    );
                }
                None => {
                    out.insert(name.clone(), value.clone());
                }
            }
        }
        out
    }

    /// Replaces grid levels by their raw integer values.
    fn unproject_point(&self, point: &Point) -> Point {
        let mut out = Point::new();
        for (name, value) in point {
            let scaled = Self::original_name(name)
                .and_then(|orig| self.scalers.get(orig).map(|s| (orig, s)));
            match scaled {
                #[allow(clippy::cast_possible_truncation)]
                Some((orig, scaler)) => {
                    let level = value.as_f64().round() as i64;
                    out.insert(orig.to_owned(), ParamValue::Int(scaler.from_level(level)));
                }
                None => {
                    out.insert(name.clone(), value.clone());
                }
            }
        }
        out
    }

    fn needs_unproject(&self) -> bool {
        true
    }

    fn affects_sampling_space(&self) -> bool {
        true
    }

    fn supports_adaptive_update(&self) -> bool {
        self.adaptive
    }

    fn update(
        &mut self,
        progress: &OptimizationProgress,
        _histories: &[EvaluationHistory],
    ) -> bool {
        if !self.adaptive {
            return false;
        }
        let next = if progress.is_stagnant(Self::STAGNATION_WINDOW) {
            // A finer grid gives a stalled search new values to try.
            (self.max_values + 5).min(Self::MAX_LEVELS)
        } else if progress.iteration() > 0 && progress.has_improvement(Self::IMPROVEMENT_WINDOW) {
            self.max_values.saturating_sub(2).max(Self::MIN_LEVELS)
        } else {
            self.max_values
        };
        if next == self.max_values {
            return false;
        }
        trace_info!(from = self.max_values, to = next, "re-sizing quantization grid");
        self.max_values = next;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn space() -> ParameterSpace {
        ParameterSpace::new(vec![
            ParamDef::int("big", 0, 10_000).unwrap(),
            ParamDef::int("small", 1, 5).unwrap(),
            ParamDef::float("x", 0.0, 1.0).unwrap(),
        ])
        .unwrap()
    }

    #[test]
    fn invalid_max_values_rejected() {
        assert!(matches!(
            QuantizationStep::new(1),
            Err(Error::InvalidMaxValues(1))
        ));
    }

    #[test]
    fn quantizes_only_oversized_integers() {
        let mut step = QuantizationStep::new(10).unwrap();
        let outcome = step.compress(&space(), &[], None, Direction::Minimize);
        assert!(outcome.degraded.is_none());
        assert!(outcome.space.contains("big|q"));
        assert!(!outcome.space.contains("big"));
        assert!(outcome.space.contains("small"));
        assert!(outcome.space.contains("x"));
        assert_eq!(outcome.space.get("big|q").unwrap().bounds(), Some((1.0, 10.0)));
    }

    #[test]
    fn grid_values_round_trip_exactly() {
        let mut step = QuantizationStep::new(11).unwrap();
        step.compress(&space(), &[], None, Direction::Minimize);
        for level in 1..=11 {
            let mut low = Point::new();
            low.insert("big|q".into(), ParamValue::Int(level));
            let high = step.unproject_point(&low);
            let raw = high.get("big").unwrap();
            let back = step.project_point(&high);
            assert_eq!(back.get("big|q"), Some(&ParamValue::Int(level)), "raw {raw:?}");
        }
    }

    #[test]
    fn nothing_to_quantize_degrades() {
        let small = ParameterSpace::new(vec![ParamDef::int("n", 1, 3).unwrap()]).unwrap();
        let mut step = QuantizationStep::new(10).unwrap();
        let outcome = step.compress(&small, &[], None, Direction::Minimize);
        assert_eq!(outcome.degraded, Some(DegradedReason::EmptySelection));
    }

    #[test]
    fn adaptive_update_refines_on_stagnation() {
        let mut step = QuantizationStep::new(10).unwrap().adaptive();
        let mut progress = OptimizationProgress::new(Direction::Minimize);
        progress.update(1.0);
        for _ in 0..5 {
            progress.update(2.0);
        }
        assert!(step.update(&progress, &[]));
        assert_eq!(step.max_values(), 15);
    }

    #[test]
    fn adaptive_update_coarsens_on_improvement() {
        let mut step = QuantizationStep::new(10).unwrap().adaptive();
        let mut progress = OptimizationProgress::new(Direction::Minimize);
        for v in [4.0, 3.0, 2.0, 1.0] {
            progress.update(v);
        }
        assert!(step.update(&progress, &[]));
        assert_eq!(step.max_values(), 8);
    }

    #[test]
    fn single_improvement_then_stall_leaves_grid_alone() {
        let mut step = QuantizationStep::new(10).unwrap().adaptive();
        let mut progress = OptimizationProgress::new(Direction::Minimize);
        progress.update(2.0);
        progress.update(1.0);
        progress.update(1.0);
        progress.update(1.0);
        assert!(!step.update(&progress, &[]));
        assert_eq!(step.max_values(), 10);
    }

    #[test]
    fn adaptive_bounds_are_honored() {
        let mut step = QuantizationStep::new(98).unwrap().adaptive();
        let mut progress = OptimizationProgress::new(Direction::Minimize);
        progress.update(1.0);
        for _ in 0..6 {
            progress.update(2.0);
        }
        assert!(step.update(&progress, &[]));
        assert_eq!(step.max_values(), QuantizationStep::MAX_LEVELS);

        let mut step = QuantizationStep::new(6).unwrap().adaptive();
        let mut improving = OptimizationProgress::new(Direction::Minimize);
        for v in [4.0, 3.0, 2.0, 1.0] {
            improving.update(v);
        }
        assert!(step.update(&improving, &[]));
        assert_eq!(step.max_values(), QuantizationStep::MIN_LEVELS);
    }

    #[test]
    fn non_adaptive_never_updates() {
        let mut step = QuantizationStep::new(10).unwrap();
        assert!(!step.supports_adaptive_update());
        let mut progress = OptimizationProgress::new(Direction::Minimize);
        for _ in 0..10 {
            progress.update(2.0);
        }
        assert!(!step.update(&progress, &[]));
    }
}
