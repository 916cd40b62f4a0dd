//! The compressor facade.
//!
//! [`Compressor`] wraps a [`CompressionPipeline`] with event recording
//! and an optional on-disk journal, and is the type most callers
//! interact with.

use std::sync::Arc;

use crate::event::{CompressionEvent, EventKind};
use crate::filling::FillingStrategy;
use crate::history::{EvaluationHistory, TaskSimilarities};
use crate::param::Point;
use crate::pipeline::{CompressionPipeline, RestartPoint};
use crate::sampling::{Sample, SampleOrigin};
use crate::space::ParameterSpace;
use crate::step::{CompressionStep, StepInfo};
use crate::types::Direction;

#[cfg(feature = "journal")]
use crate::event::EventJournal;

/// High-level shape summary of the current compression.
#[derive(Clone, Debug)]
pub struct CompressionSummary {
    /// Parameter count of the original space.
    pub original_size: usize,
    /// Parameter count of the sampling space.
    pub sample_size: usize,
    /// Parameter count of the surrogate space.
    pub surrogate_size: usize,
    /// Surrogate size over original size.
    pub surrogate_ratio: f64,
    /// Compressions performed so far.
    pub n_compressions: usize,
    /// Per-step diagnostics, in chain order.
    pub steps: Vec<StepInfo>,
}

/// Compresses a parameter space and tracks every compression performed.
pub struct Compressor {
    pipeline: CompressionPipeline,
    events: Vec<CompressionEvent>,
    #[cfg(feature = "journal")]
    journal: Option<EventJournal>,
}

impl Compressor {
    /// Creates a compressor over `space` with the given step chain.
    #[must_use]
    pub fn new(
        space: ParameterSpace,
        steps: Vec<Box<dyn CompressionStep>>,
        direction: Direction,
    ) -> Self {
        Self {
            pipeline: CompressionPipeline::new(space, steps, direction),
            events: Vec::new(),
            #[cfg(feature = "journal")]
            journal: None,
        }
    }

    /// Replaces the filling strategy for dropped parameters.
    #[must_use]
    pub fn with_filling(mut self, filling: Arc<dyn FillingStrategy>) -> Self {
        self.pipeline = self.pipeline.with_filling(filling);
        self
    }

    /// Seeds the compressor for reproducible compression and sampling.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.pipeline.set_seed(seed);
        self
    }

    /// Additionally appends every event to a JSONL journal.
    #[cfg(feature = "journal")]
    #[must_use]
    pub fn with_journal(mut self, journal: EventJournal) -> Self {
        self.journal = Some(journal);
        self
    }

    /// The underlying pipeline.
    #[must_use]
    pub fn pipeline(&self) -> &CompressionPipeline {
        &self.pipeline
    }

    /// Runs the initial compression and returns the surrogate and
    /// sampling spaces.
    pub fn compress_space(
        &mut self,
        histories: &[EvaluationHistory],
        similarities: Option<&TaskSimilarities>,
    ) -> (&ParameterSpace, &ParameterSpace) {
        self.pipeline.compress_space(histories, similarities);
        self.record(EventKind::InitialCompression);
        (self.pipeline.surrogate_space(), self.pipeline.sample_space())
    }

    /// Lets adaptive steps reconsider and re-compresses when any
    /// changed. Returns whether a re-compression happened.
    pub fn update_compression(
        &mut self,
        histories: &[EvaluationHistory],
        similarities: Option<&TaskSimilarities>,
    ) -> bool {
        match self.pipeline.update_compression(histories, similarities) {
            None => false,
            Some(RestartPoint::Original) => {
                self.record(EventKind::AdaptiveUpdate);
                true
            }
            Some(RestartPoint::Surrogate) => {
                self.record(EventKind::ProgressiveCompression);
                true
            }
        }
    }

    fn record(&mut self, kind: EventKind) {
        let event = CompressionEvent::new(
            kind,
            self.pipeline.progress().iteration(),
            self.pipeline.original_space(),
            self.pipeline.sample_space(),
            self.pipeline.surrogate_space(),
            self.pipeline.step_infos(),
        );
        #[cfg(feature = "journal")]
        if let Some(journal) = self.journal.as_ref()
            && let Err(_error) = journal.append(&event)
        {
            // Journaling is best-effort; the in-memory record stays
            // authoritative.
            trace_warn!(error = %_error, "failed to append compression event to journal");
        }
        self.events.push(event);
    }

    /// Draws `n` candidates from the current sampling strategy.
    pub fn sample(&mut self, n: usize) -> Vec<Sample> {
        self.pipeline.sample(n)
    }

    /// Feeds evaluated outcomes back for progress tracking and sampling
    /// adaptation.
    pub fn observe_outcomes(&mut self, outcomes: &[(SampleOrigin, f64)]) {
        self.pipeline.observe_outcomes(outcomes);
    }

    /// Maps an original-space point into the surrogate space.
    #[must_use]
    pub fn project_point(&self, point: &Point) -> Point {
        self.pipeline.project_point(point)
    }

    /// Maps a sampled point back into the unprojected space.
    #[must_use]
    pub fn unproject_point(&self, point: &Point) -> Point {
        self.pipeline.unproject_point(point)
    }

    /// Whether sampled points must be unprojected before evaluation.
    #[must_use]
    pub fn needs_unproject(&self) -> bool {
        self.pipeline.needs_unproject()
    }

    /// The original, uncompressed space.
    #[must_use]
    pub fn original_space(&self) -> &ParameterSpace {
        self.pipeline.original_space()
    }

    /// The current surrogate space.
    #[must_use]
    pub fn surrogate_space(&self) -> &ParameterSpace {
        self.pipeline.surrogate_space()
    }

    /// The current sampling space.
    #[must_use]
    pub fn sample_space(&self) -> &ParameterSpace {
        self.pipeline.sample_space()
    }

    /// The space evaluated configurations live in.
    #[must_use]
    pub fn unprojected_space(&self) -> &ParameterSpace {
        self.pipeline.unprojected_space()
    }

    /// Every compression event recorded so far, oldest first.
    #[must_use]
    pub fn events(&self) -> &[CompressionEvent] {
        &self.events
    }

    /// A shape summary of the current compression.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn compression_summary(&self) -> CompressionSummary {
        let original_size = self.pipeline.original_space().len();
        let surrogate_size = self.pipeline.surrogate_space().len();
        CompressionSummary {
            original_size,
            sample_size: self.pipeline.sample_space().len(),
            surrogate_size,
            surrogate_ratio: surrogate_size as f64 / original_size.max(1) as f64,
            n_compressions: self.events.len(),
            steps: self.pipeline.step_infos(),
        }
    }

    /// Drops all fitted model state across steps.
    pub fn reset_caches(&self) {
        self.pipeline.reset_caches();
    }
}

impl std::fmt::Debug for Compressor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Compressor")
            .field("pipeline", &self.pipeline)
            .field("events", &self.events.len())
            .finish_non_exhaustive()
    }
}
