//! Parameter value storage types.

use std::collections::HashMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Represents a concrete parameter value.
///
/// This enum stores different parameter value types uniformly.
/// For categorical parameters, the `Categorical` variant stores
/// the index into the choices array.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ParamValue {
    /// A floating-point parameter value.
    Float(f64),
    /// An integer parameter value.
    Int(i64),
    /// A categorical parameter value, stored as an index into the choices array.
    Categorical(usize),
}

impl ParamValue {
    /// Returns the value as an `f64`, treating categorical values as
    /// their choice index.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> f64 {
        match self {
            ParamValue::Float(v) => *v,
            ParamValue::Int(v) => *v as f64,
            ParamValue::Categorical(i) => *i as f64,
        }
    }
}

/// A configuration: parameter values keyed by parameter name.
///
/// Points are the currency of [`project_point`](crate::step::CompressionStep::project_point)
/// and [`unproject_point`](crate::step::CompressionStep::unproject_point): a
/// point expressed in one space's coordinates is mapped into another's.
pub type Point = HashMap<String, ParamValue>;
