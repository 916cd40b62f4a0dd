//! Parameter importance estimation.
//!
//! Dimension selection ranks parameters by an importance score where
//! **lower scores mean more important**. Correlation-based calculators
//! score a parameter as the negated absolute rank or linear correlation
//! between its values and the objective; the attribution calculator uses
//! negated mean absolute marginal effects from a random forest.
//!
//! Multi-task histories are combined by similarity-weighted averaging of
//! per-task scores; tasks with no weight in the similarity map fall back
//! to uniform weighting.

use std::fmt::Debug;

use parking_lot::Mutex;

use crate::forest::{ForestConfig, RandomForest};
use crate::history::{EvaluationHistory, TaskSimilarities};
use crate::samples::extract_top_samples;
use crate::space::ParameterSpace;
use crate::types::Direction;

/// Computes per-parameter importance scores from evaluation histories.
///
/// Returns `None` when no usable scores can be derived, which callers
/// treat as a degraded (keep-everything) outcome rather than an error.
pub trait ImportanceCalculator: Debug + Send {
    /// Scores every numeric parameter of `space`.
    ///
    /// The returned names and scores are parallel vectors over the
    /// numeric parameters; lower scores are more important.
    fn calculate_importances(
        &self,
        space: &ParameterSpace,
        histories: &[EvaluationHistory],
        similarities: Option<&TaskSimilarities>,
        direction: Direction,
    ) -> Option<(Vec<String>, Vec<f64>)>;

    /// A short identifier for diagnostics.
    fn name(&self) -> &'static str;

    /// Drops any fitted model state.
    fn reset_cache(&self) {}
}

/// Similarity-weighted average of per-task score vectors.
///
/// `per_task` holds `(task_index, scores)` pairs. Weights are normalized
/// over the participating tasks; tasks summing to zero weight fall back
/// to uniform averaging.
fn weighted_average(
    per_task: &[(usize, Vec<f64>)],
    similarities: Option<&TaskSimilarities>,
) -> Option<Vec<f64>> {
    let first = per_task.first()?;
    let n = first.1.len();
    let mut weights: Vec<f64> = per_task
        .iter()
        .map(|(task, _)| {
            similarities
                .and_then(|s| s.get(task).copied())
                .unwrap_or(1.0)
                .max(0.0)
        })
        .collect();
    let total: f64 = weights.iter().sum();
    if total > 0.0 {
        for w in &mut weights {
            *w /= total;
        }
    } else {
        #[allow(clippy::cast_precision_loss)]
        weights.fill(1.0 / per_task.len() as f64);
    }
    let mut out = vec![0.0; n];
    for ((_, scores), &w) in per_task.iter().zip(&weights) {
        for (acc, &s) in out.iter_mut().zip(scores) {
            *acc += w * s;
        }
    }
    Some(out)
}

/// Which correlation statistic a [`CorrelationImportance`] uses.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CorrelationKind {
    /// Spearman rank correlation; robust to monotone nonlinearity.
    Spearman,
    /// Pearson linear correlation.
    Pearson,
}

/// Scores parameters by correlation with the objective.
#[derive(Clone, Debug)]
pub struct CorrelationImportance {
    kind: CorrelationKind,
}

impl CorrelationImportance {
    /// Creates a calculator using the given correlation statistic.
    #[must_use]
    pub fn new(kind: CorrelationKind) -> Self {
        Self { kind }
    }

    fn correlate(&self, x: &[f64], y: &[f64]) -> f64 {
        match self.kind {
            CorrelationKind::Spearman => spearman(x, y),
            CorrelationKind::Pearson => pearson(x, y),
        }
    }
}

impl Default for CorrelationImportance {
    fn default() -> Self {
        Self::new(CorrelationKind::Spearman)
    }
}

impl ImportanceCalculator for CorrelationImportance {
    fn calculate_importances(
        &self,
        space: &ParameterSpace,
        histories: &[EvaluationHistory],
        similarities: Option<&TaskSimilarities>,
        direction: Direction,
    ) -> Option<(Vec<String>, Vec<f64>)> {
        let names = space.numeric_names();
        if names.is_empty() {
            return None;
        }
        let mut per_task: Vec<(usize, Vec<f64>)> = Vec::new();
        for (task, history) in histories.iter().enumerate() {
            let samples = extract_top_samples(
                core::slice::from_ref(history),
                &names,
                space,
                1.0,
                direction,
                false,
            );
            if samples.len() < 3 {
                continue;
            }
            let columns = samples.columns(names.len());
            let scores: Vec<f64> = columns
                .iter()
                .map(|col| -self.correlate(col, &samples.targets).abs())
                .collect();
            per_task.push((task, scores));
        }
        weighted_average(&per_task, similarities).map(|scores| (names, scores))
    }

    fn name(&self) -> &'static str {
        match self.kind {
            CorrelationKind::Spearman => "spearman",
            CorrelationKind::Pearson => "pearson",
        }
    }
}

#[derive(Debug)]
struct CachedForest {
    n_rows: usize,
    n_features: usize,
    forest: RandomForest,
}

/// Scores parameters by forest-based marginal attributions.
///
/// The fitted forest is cached per input shape so repeated scoring of the
/// same history does not refit; any shape change refits from scratch.
#[derive(Debug)]
pub struct AttributionImportance {
    config: ForestConfig,
    cache: Mutex<Option<CachedForest>>,
}

impl AttributionImportance {
    /// Creates a calculator with the given forest configuration.
    #[must_use]
    pub fn new(config: ForestConfig) -> Self {
        Self {
            config,
            cache: Mutex::new(None),
        }
    }

    fn forest_scores(&self, rows: &[Vec<f64>], targets: &[f64]) -> Option<Vec<f64>> {
        let n_rows = rows.len();
        let n_features = rows.first()?.len();
        let mut cache = self.cache.lock();
        let reusable = cache
            .as_ref()
            .is_some_and(|c| c.n_rows == n_rows && c.n_features == n_features);
        if !reusable {
            let forest = RandomForest::fit(rows, targets, &self.config)?;
            *cache = Some(CachedForest {
                n_rows,
                n_features,
                forest,
            });
        }
        cache.as_ref().map(|c| c.forest.importances(rows))
    }
}

impl Default for AttributionImportance {
    fn default() -> Self {
        Self::new(ForestConfig::default())
    }
}

impl ImportanceCalculator for AttributionImportance {
    fn calculate_importances(
        &self,
        space: &ParameterSpace,
        histories: &[EvaluationHistory],
        similarities: Option<&TaskSimilarities>,
        direction: Direction,
    ) -> Option<(Vec<String>, Vec<f64>)> {
        let names = space.numeric_names();
        if names.is_empty() {
            return None;
        }
        let mut per_task: Vec<(usize, Vec<f64>)> = Vec::new();
        for (task, history) in histories.iter().enumerate() {
            let samples = extract_top_samples(
                core::slice::from_ref(history),
                &names,
                space,
                1.0,
                direction,
                true,
            );
            if samples.len() < 5 {
                continue;
            }
            if let Some(scores) = self.forest_scores(&samples.rows, &samples.targets) {
                per_task.push((task, scores));
            }
        }
        weighted_average(&per_task, similarities).map(|scores| (names, scores))
    }

    fn name(&self) -> &'static str {
        "attribution"
    }

    fn reset_cache(&self) {
        *self.cache.lock() = None;
    }
}

/// Pearson linear correlation coefficient.
///
/// Returns `0.0` for degenerate inputs (length mismatch, fewer than two
/// points, or zero variance).
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn pearson(x: &[f64], y: &[f64]) -> f64 {
    if x.len() != y.len() || x.len() < 2 {
        return 0.0;
    }
    let n = x.len() as f64;
    let mean_x = x.iter().sum::<f64>() / n;
    let mean_y = y.iter().sum::<f64>() / n;
    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (&xi, &yi) in x.iter().zip(y) {
        let dx = xi - mean_x;
        let dy = yi - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }
    if var_x <= f64::EPSILON || var_y <= f64::EPSILON {
        return 0.0;
    }
    cov / (var_x.sqrt() * var_y.sqrt())
}

/// Spearman rank correlation coefficient with tie-averaged ranks.
#[must_use]
pub fn spearman(x: &[f64], y: &[f64]) -> f64 {
    if x.len() != y.len() || x.len() < 2 {
        return 0.0;
    }
    pearson(&ranks(x), &ranks(y))
}

/// Fractional ranks, assigning tied values the mean of their positions.
#[allow(clippy::cast_precision_loss, clippy::float_cmp)]
fn ranks(values: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));
    let mut out = vec![0.0; values.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && values[order[j + 1]] == values[order[i]] {
            j += 1;
        }
        let rank = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            out[idx] = rank;
        }
        i = j + 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::param::{ParamValue, Point};
    use crate::space::ParamDef;

    fn space() -> ParameterSpace {
        ParameterSpace::new(vec![
            ParamDef::float("strong", 0.0, 10.0).unwrap(),
            ParamDef::float("weak", 0.0, 10.0).unwrap(),
        ])
        .unwrap()
    }

    fn history_from(f: impl Fn(f64, f64) -> f64) -> EvaluationHistory {
        let mut rng = fastrand::Rng::with_seed(11);
        let mut h = EvaluationHistory::new();
        for _ in 0..60 {
            let a = rng.f64() * 10.0;
            let b = rng.f64() * 10.0;
            let mut p = Point::new();
            p.insert("strong".into(), ParamValue::Float(a));
            p.insert("weak".into(), ParamValue::Float(b));
            h.record(p, f(a, b));
        }
        h
    }

    #[test]
    fn pearson_on_exact_line() {
        let x = [1.0, 2.0, 3.0, 4.0];
        let y = [2.0, 4.0, 6.0, 8.0];
        assert!((pearson(&x, &y) - 1.0).abs() < 1e-12);
        let neg = [8.0, 6.0, 4.0, 2.0];
        assert!((pearson(&x, &neg) + 1.0).abs() < 1e-12);
    }

    #[test]
    fn spearman_handles_monotone_nonlinearity() {
        let x: [f64; 5] = [1.0, 2.0, 3.0, 4.0, 5.0];
        let y: Vec<f64> = x.iter().map(|v| v.exp()).collect();
        assert!((spearman(&x, &y) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn ranks_average_ties() {
        assert_eq!(ranks(&[1.0, 2.0, 2.0, 3.0]), vec![1.0, 2.5, 2.5, 4.0]);
    }

    #[test]
    fn degenerate_inputs_score_zero() {
        assert_eq!(pearson(&[1.0], &[2.0]), 0.0);
        assert_eq!(pearson(&[1.0, 1.0], &[2.0, 3.0]), 0.0);
        assert_eq!(spearman(&[], &[]), 0.0);
    }

    #[test]
    fn correlation_ranks_driving_parameter_first() {
        let calc = CorrelationImportance::default();
        let h = history_from(|a, _| a);
        let (names, scores) = calc
            .calculate_importances(&space(), &[h], None, Direction::Minimize)
            .unwrap();
        let strong = names.iter().position(|n| n == "strong").unwrap();
        let weak = names.iter().position(|n| n == "weak").unwrap();
        assert!(scores[strong] < scores[weak], "{scores:?}");
    }

    #[test]
    fn attribution_ranks_driving_parameter_first() {
        let calc = AttributionImportance::default();
        let h = history_from(|a, b| 5.0 * a + 0.01 * b);
        let (names, scores) = calc
            .calculate_importances(&space(), &[h], None, Direction::Minimize)
            .unwrap();
        let strong = names.iter().position(|n| n == "strong").unwrap();
        let weak = names.iter().position(|n| n == "weak").unwrap();
        assert!(scores[strong] < scores[weak], "{scores:?}");
    }

    #[test]
    fn similarity_weights_bias_toward_relevant_task() {
        let calc = CorrelationImportance::default();
        // Task 0 says "strong" matters; task 1 says "weak" matters.
        let h0 = history_from(|a, _| a);
        let h1 = history_from(|_, b| b);
        let mut sims = TaskSimilarities::new();
        sims.insert(0, 1.0);
        sims.insert(1, 0.01);
        let (names, scores) = calc
            .calculate_importances(&space(), &[h0, h1], Some(&sims), Direction::Minimize)
            .unwrap();
        let strong = names.iter().position(|n| n == "strong").unwrap();
        let weak = names.iter().position(|n| n == "weak").unwrap();
        assert!(scores[strong] < scores[weak], "{scores:?}");
    }

    #[test]
    fn no_usable_histories_yields_none() {
        let calc = CorrelationImportance::default();
        assert!(
            calc.calculate_importances(&space(), &[], None, Direction::Minimize)
                .is_none()
        );
        let empty = EvaluationHistory::new();
        assert!(
            calc.calculate_importances(&space(), &[empty], None, Direction::Minimize)
                .is_none()
        );
    }
}
