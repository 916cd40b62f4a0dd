//! Core types shared across the compression pipeline.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The direction of the optimization the compressor serves.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Direction {
    /// Lower objective values are better.
    #[default]
    Minimize,
    /// Higher objective values are better.
    Maximize,
}

/// The state of an observation in an evaluation history.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum TrialState {
    /// The evaluation is still running.
    Running,
    /// The evaluation completed successfully.
    Complete,
    /// The evaluation failed with an error.
    Failed,
}
