//! Extraction of training matrices from evaluation histories.
//!
//! Range and projection steps operate on dense numeric matrices rather than
//! on raw points. This module pulls the best-performing observations out of
//! one or more histories and lays them out as rows over a fixed column
//! order.

use crate::history::EvaluationHistory;
use crate::space::ParameterSpace;
use crate::types::Direction;

/// Top-performing observations in matrix form.
///
/// `rows[i][j]` is the value of the `j`-th named parameter in the `i`-th
/// selected observation. `task_indices[i]` records which history row `i`
/// came from, for similarity weighting.
#[derive(Clone, Debug, Default)]
pub(crate) struct TopSamples {
    pub rows: Vec<Vec<f64>>,
    pub targets: Vec<f64>,
    pub task_indices: Vec<usize>,
}

impl TopSamples {
    pub(crate) fn len(&self) -> usize {
        self.rows.len()
    }

    /// Column-wise values, one vector per named parameter.
    pub(crate) fn columns(&self, n_cols: usize) -> Vec<Vec<f64>> {
        let mut cols = vec![Vec::with_capacity(self.rows.len()); n_cols];
        for row in &self.rows {
            for (j, &v) in row.iter().enumerate() {
                cols[j].push(v);
            }
        }
        cols
    }
}

/// Extracts the top `top_ratio` fraction of each history as a dense matrix
/// over the given parameter names.
///
/// Observations missing any of the named parameters are skipped. With
/// `normalize` set, values are mapped onto the unit interval using the
/// parameter bounds in `space`.
pub(crate) fn extract_top_samples(
    histories: &[EvaluationHistory],
    names: &[String],
    space: &ParameterSpace,
    top_ratio: f64,
    direction: Direction,
    normalize: bool,
) -> TopSamples {
    let mut out = TopSamples::default();
    for (task_index, history) in histories.iter().enumerate() {
        for obs in history.top_fraction(top_ratio, direction) {
            let mut row = Vec::with_capacity(names.len());
            let mut complete = true;
            for name in names {
                match (obs.point.get(name), space.get(name)) {
                    (Some(value), Some(def)) => {
                        row.push(if normalize {
                            def.to_unit(value)
                        } else {
                            value.as_f64()
                        });
                    }
                    _ => {
                        complete = false;
                        break;
                    }
                }
            }
            if complete {
                out.rows.push(row);
                out.targets.push(obs.objective);
                out.task_indices.push(task_index);
            }
        }
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
            ParamDef::float("a", 0.0, 10.0).unwrap(),
            ParamDef::float("b", 0.0, 1.0).unwrap(),
        ])
        .unwrap()
    }

    fn obs_point(a: f64, b: f64) -> Point {
        let mut p = Point::new();
        p.insert("a".into(), ParamValue::Float(a));
        p.insert("b".into(), ParamValue::Float(b));
        p
    }

    #[test]
    fn extracts_best_fraction_normalized() {
        let mut h = EvaluationHistory::new();
        h.record(obs_point(10.0, 1.0), 9.0);
        h.record(obs_point(5.0, 0.5), 1.0);
        h.record(obs_point(2.0, 0.2), 3.0);
        let names = vec!["a".to_owned(), "b".to_owned()];
        let samples = extract_top_samples(
            &[h],
            &names,
            &space(),
            0.67,
            Direction::Minimize,
            true,
        );
        assert_eq!(samples.len(), 2);
        assert_eq!(samples.rows[0], vec![0.5, 0.5]);
        assert_eq!(samples.rows[1], vec![0.2, 0.2]);
        assert_eq!(samples.targets, vec![1.0, 3.0]);
    }

    #[test]
    fn skips_incomplete_observations() {
        let mut h = EvaluationHistory::new();
        let mut partial = Point::new();
        partial.insert("a".into(), ParamValue::Float(1.0));
        h.record(partial, 0.0);
        h.record(obs_point(4.0, 0.4), 1.0);
        let names = vec!["a".to_owned(), "b".to_owned()];
        let samples =
            extract_top_samples(&[h], &names, &space(), 1.0, Direction::Minimize, false);
        assert_eq!(samples.len(), 1);
        assert_eq!(samples.rows[0], vec![4.0, 0.4]);
    }

    #[test]
    fn records_task_indices_across_histories() {
        let mut h0 = EvaluationHistory::new();
        h0.record(obs_point(1.0, 0.1), 1.0);
        let mut h1 = EvaluationHistory::new();
        h1.record(obs_point(2.0, 0.2), 2.0);
        let names = vec!["a".to_owned()];
        let samples =
            extract_top_samples(&[h0, h1], &names, &space(), 1.0, Direction::Minimize, false);
        assert_eq!(samples.task_indices, vec![0, 1]);
    }
}
