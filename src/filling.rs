//! Filling strategies for dropped parameters.
//!
//! When a step removes parameters from the space, points projected back
//! into the full space still need values for them. A [`FillingStrategy`]
//! supplies those values; the default uses each parameter's declared
//! default, with optional per-parameter fixed overrides.

use std::collections::HashMap;
use std::fmt::Debug;

use crate::param::{ParamValue, Point};
use crate::space::ParameterSpace;

/// Supplies values for parameters present in a target space but absent
/// from a point.
pub trait FillingStrategy: Debug + Send + Sync {
    /// Returns `point` extended with values for every parameter of
    /// `target` it was missing. Existing entries are never overwritten,
    /// except for parameters pinned via
    /// [`fixed_parameters`](FillingStrategy::fixed_parameters).
    fn fill_missing(&self, point: &Point, target: &ParameterSpace) -> Point;

    /// Names of parameters this strategy pins to a fixed value.
    ///
    /// Compression steps leave these out of their derived spaces so the
    /// pinned values always win.
    fn fixed_parameters(&self) -> &[String] {
        &[]
    }
}

/// Fills missing parameters from the space defaults, with optional fixed
/// overrides that always take effect.
#[derive(Clone, Debug, Default)]
pub struct DefaultValueFilling {
    fixed: HashMap<String, ParamValue>,
    fixed_names: Vec<String>,
}

impl DefaultValueFilling {
    /// A strategy with no overrides.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A strategy that pins the given parameters to fixed values.
    #[must_use]
    pub fn with_fixed(fixed: HashMap<String, ParamValue>) -> Self {
        let fixed_names = fixed.keys().cloned().collect();
        Self { fixed, fixed_names }
    }
}

impl FillingStrategy for DefaultValueFilling {
    fn fill_missing(&self, point: &Point, target: &ParameterSpace) -> Point {
        let mut out = point.clone();
        for def in target.params() {
            if let Some(value) = self.fixed.get(def.name()) {
                out.insert(def.name().to_owned(), value.clone());
            } else if !out.contains_key(def.name()) {
                out.insert(def.name().to_owned(), def.default().clone());
            }
        }
        out
    }

    fn fixed_parameters(&self) -> &[String] {
        &self.fixed_names
    }
}
