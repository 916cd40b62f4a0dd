#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![deny(unreachable_pub)]
#![deny(clippy::correctness)]
#![deny(clippy::suspicious)]
#![deny(clippy::style)]
#![deny(clippy::complexity)]
#![deny(clippy::perf)]
#![deny(clippy::pedantic)]
#![deny(clippy::std_instead_of_core)]

//! Search-space compression for black-box hyperparameter optimization.
//! High-dimensional parameter spaces are shrunk through a configurable
//! chain of compression steps so that surrogate models and samplers
//! operate in a smaller, better-conditioned space. Evaluation history
//! drives the compression, and adaptive steps re-compress as the
//! optimization progresses.
//!
//! # Getting Started
//!
//! Compress a five-parameter space down to its two most important
//! dimensions, then sample from the compressed space:
//!
//! ```
//! use compressor::prelude::*;
//!
//! let params = (0..5)
//!     .map(|i| ParamDef::float(format!("x{i}"), 0.0, 1.0))
//!     .collect::<Result<Vec<_>>>()
//!     .unwrap();
//! let space = ParameterSpace::new(params).unwrap();
//!
//! // Pretend history: x0 dominates the objective.
//! let mut history = EvaluationHistory::new();
//! for i in 0..40 {
//!     let v = f64::from(i) / 40.0;
//!     let point = space.sample();
//!     let x0 = point["x0"].as_f64();
//!     history.record(point, x0 * 10.0 + v * 0.1);
//! }
//!
//! let steps: Vec<Box<dyn CompressionStep>> =
//!     vec![Box::new(DimensionSelectionStep::new(2).unwrap())];
//! let mut compressor = Compressor::new(space, steps, Direction::Minimize).with_seed(42);
//! let (surrogate, _sample) = compressor.compress_space(&[history], None);
//! assert_eq!(surrogate.len(), 2);
//! ```
//!
//! # Core Concepts
//!
//! | Type | Role |
//! |------|------|
//! | [`ParameterSpace`] | The search space — named float, int and categorical parameters. |
//! | [`CompressionStep`](step::CompressionStep) | One stage of the chain: dimension selection, range compression or projection. |
//! | [`CompressionPipeline`] | Runs the step chain and derives the surrogate, sampling and unprojected spaces. |
//! | [`Compressor`] | Pipeline plus event recording and optional journaling; the usual entry point. |
//! | [`EvaluationHistory`] | Completed evaluations that drive data-driven steps. |
//! | [`Direction`] | Whether the objective is minimized or maximized. |
//!
//! # Step Guide
//!
//! | Step | Family | Needs history |
//! |------|--------|---------------|
//! | [`DimensionSelectionStep`](steps::dimension::DimensionSelectionStep) | Dimension selection | yes |
//! | [`AdaptiveDimensionStep`](steps::dimension::AdaptiveDimensionStep) | Dimension selection | yes |
//! | [`ExpertDimensionStep`](steps::dimension::ExpertDimensionStep) | Dimension selection | no |
//! | [`BoundaryRangeStep`](steps::range::BoundaryRangeStep) | Range compression | yes |
//! | [`AttributionRangeStep`](steps::range::AttributionRangeStep) | Range compression | yes |
//! | [`KdeRangeStep`](steps::range::KdeRangeStep) | Range compression | yes |
//! | [`ExpertRangeStep`](steps::range::ExpertRangeStep) | Range compression | no |
//! | [`RemboStep`](steps::projection::RemboStep) | Projection | no |
//! | [`HesboStep`](steps::projection::HesboStep) | Projection | no |
//! | [`KpcaStep`](steps::projection::KpcaStep) | Projection | yes |
//! | [`QuantizationStep`](steps::projection::QuantizationStep) | Projection | no |
//!
//! # Feature Flags
//!
//! | Flag | What it enables | Default |
//! |------|----------------|---------|
//! | `serde` | `Serialize`/`Deserialize` on public types | off |
//! | `journal` | [`EventJournal`] — JSONL persistence of compression events with file locking (enables `serde`) | off |
//! | `tracing` | Structured log events via [`tracing`](https://docs.rs/tracing) at key compression points | off |

/// Emit a `tracing::info!` event when the `tracing` feature is enabled.
/// No-op otherwise.
#[cfg(feature = "tracing")]
macro_rules! trace_info {
    ($($arg:tt)*) => { tracing::info!($($arg)*) };
}

#[cfg(not(feature = "tracing"))]
macro_rules! trace_info {
    ($($arg:tt)*) => {};
}

/// Emit a `tracing::debug!` event when the `tracing` feature is enabled.
/// No-op otherwise.
#[cfg(feature = "tracing")]
macro_rules! trace_debug {
    ($($arg:tt)*) => { tracing::debug!($($arg)*) };
}

#[cfg(not(feature = "tracing"))]
macro_rules! trace_debug {
    ($($arg:tt)*) => {};
}

/// Emit a `tracing::warn!` event when the `tracing` feature is enabled.
/// No-op otherwise.
#[cfg(feature = "tracing")]
macro_rules! trace_warn {
    ($($arg:tt)*) => { tracing::warn!($($arg)*) };
}

#[cfg(not(feature = "tracing"))]
macro_rules! trace_warn {
    ($($arg:tt)*) => {};
}

mod compressor;
mod error;
mod event;
mod factory;
pub mod filling;
mod forest;
mod history;
pub mod importance;
mod kde;
mod param;
mod pipeline;
mod progress;
mod rng_util;
mod samples;
pub mod sampling;
mod space;
pub mod step;
pub mod steps;
mod types;
pub mod update;

pub use compressor::{CompressionSummary, Compressor};
pub use error::{Error, Result};
#[cfg(feature = "journal")]
pub use event::EventJournal;
pub use event::{CompressionEvent, EventKind, SpaceSnapshot};
pub use factory::{build_importance, build_step, build_update_strategy};
pub use forest::{ForestConfig, RandomForest};
pub use history::{EvaluationHistory, Observation, TaskSimilarities};
pub use param::{ParamValue, Point};
pub use pipeline::{CompressionPipeline, RestartPoint};
pub use progress::{OptimizationProgress, Trend};
pub use space::{ParamDef, ParamKind, ParameterSpace, clip_to_space};
pub use types::{Direction, TrialState};

/// Convenient wildcard import for the most common types.
///
/// ```
/// use compressor::prelude::*;
/// ```
pub mod prelude {
    pub use crate::compressor::{CompressionSummary, Compressor};
    pub use crate::error::{Error, Result};
    #[cfg(feature = "journal")]
    pub use crate::event::EventJournal;
    pub use crate::event::{CompressionEvent, EventKind};
    pub use crate::factory::{build_importance, build_step, build_update_strategy};
    pub use crate::filling::{DefaultValueFilling, FillingStrategy};
    pub use crate::history::{EvaluationHistory, Observation, TaskSimilarities};
    pub use crate::importance::{
        AttributionImportance, CorrelationImportance, CorrelationKind, ImportanceCalculator,
    };
    pub use crate::param::{ParamValue, Point};
    pub use crate::pipeline::{CompressionPipeline, RestartPoint};
    pub use crate::progress::{OptimizationProgress, Trend};
    pub use crate::sampling::{Sample, SampleOrigin, SamplingStrategy};
    pub use crate::space::{ParamDef, ParamKind, ParameterSpace};
    pub use crate::step::{
        CompressOutcome, CompressionStep, DegradedReason, StepInfo, StepKind,
    };
    pub use crate::steps::NoopStep;
    pub use crate::steps::dimension::{
        AdaptiveDimensionStep, DimensionSelectionStep, ExpertDimensionStep,
    };
    pub use crate::steps::projection::{HesboStep, KpcaStep, QuantizationStep, RemboStep};
    pub use crate::steps::range::{
        AttributionRangeStep, BoundaryRangeStep, ExpertRangeStep, KdeRangeStep,
    };
    pub use crate::types::{Direction, TrialState};
    pub use crate::update::{
        CompositeUpdate, HybridUpdate, ImprovementUpdate, PeriodicUpdate, StagnationUpdate,
        UpdateStrategy,
    };
}
