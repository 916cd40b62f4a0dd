//! Transformative projections: rewriting the space in new coordinates.
//!
//! [`RemboStep`] and [`HesboStep`] embed a high-dimensional space into a
//! random low-dimensional one and must unproject sampled points back
//! before evaluation. [`KpcaStep`] is a forward-only kernel PCA feature
//! map for surrogate modeling. [`QuantizationStep`] coarsens
//! large-cardinality integer parameters onto a bounded level grid.
//!
//! Unprojection is exact by construction, so both embedding steps
//! memoize every pair of points they translate. Projecting a point that
//! never went through unprojection is an approximation (pseudo-inverse
//! for REMBO, contribution averaging for HesBO); those paths log a
//! warning rather than fail.

mod hesbo;
mod kpca;
mod quantization;
mod rembo;

pub use hesbo::HesboStep;
pub use kpca::KpcaStep;
pub use quantization::QuantizationStep;
pub use rembo::RemboStep;

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::param::{ParamValue, Point};

/// A hashable key for one parameter value.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub(crate) enum ValueKey {
    Float(u64),
    Int(i64),
    Categorical(usize),
}

impl From<&ParamValue> for ValueKey {
    fn from(value: &ParamValue) -> Self {
        match value {
            ParamValue::Float(v) => Self::Float(v.to_bits()),
            ParamValue::Int(v) => Self::Int(*v),
            ParamValue::Categorical(i) => Self::Categorical(*i),
        }
    }
}

/// A hashable key for a whole point, name-sorted for stability.
pub(crate) type PointKey = Vec<(String, ValueKey)>;

pub(crate) fn point_key(point: &Point) -> PointKey {
    let mut key: PointKey = point
        .iter()
        .map(|(name, value)| (name.clone(), ValueKey::from(value)))
        .collect();
    key.sort_by(|a, b| a.0.cmp(&b.0));
    key
}

/// Two-way memoization of translated point pairs.
///
/// Guarded by a mutex because projection happens through `&self` while
/// the owning pipeline may be shared across threads.
#[derive(Debug, Default)]
pub(crate) struct ProjectionCache {
    low_to_high: Mutex<HashMap<PointKey, Point>>,
    high_to_low: Mutex<HashMap<PointKey, Point>>,
}

impl ProjectionCache {
    pub(crate) fn remember(&self, low: &Point, high: &Point) {
        self.low_to_high
            .lock()
            .insert(point_key(low), high.clone());
        self.high_to_low
            .lock()
            .insert(point_key(high), low.clone());
    }

    pub(crate) fn high_for(&self, low: &Point) -> Option<Point> {
        self.low_to_high.lock().get(&point_key(low)).cloned()
    }

    pub(crate) fn low_for(&self, high: &Point) -> Option<Point> {
        self.high_to_low.lock().get(&point_key(high)).cloned()
    }

    pub(crate) fn clear(&self) {
        self.low_to_high.lock().clear();
        self.high_to_low.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(pairs: &[(&str, f64)]) -> Point {
        pairs
            .iter()
            .map(|&(name, v)| (name.to_owned(), ParamValue::Float(v)))
            .collect()
    }

    #[test]
    fn cache_round_trips_pairs() {
        let cache = ProjectionCache::default();
        let low = point(&[("e_0", 0.5)]);
        let high = point(&[("x", 1.0), ("y", 2.0)]);
        cache.remember(&low, &high);
        assert_eq!(cache.high_for(&low), Some(high.clone()));
        assert_eq!(cache.low_for(&high), Some(low));
        cache.clear();
        assert_eq!(cache.low_for(&high), None);
    }

    #[test]
    fn key_is_order_insensitive() {
        let mut a = Point::new();
        a.insert("x".into(), ParamValue::Float(1.0));
        a.insert("y".into(), ParamValue::Int(2));
        let mut b = Point::new();
        b.insert("y".into(), ParamValue::Int(2));
        b.insert("x".into(), ParamValue::Float(1.0));
        assert_eq!(point_key(&a), point_key(&b));
    }
}
