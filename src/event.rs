//! Compression event records and the JSONL event journal.
//!
//! Every compression the [`Compressor`](crate::compressor::Compressor)
//! performs is captured as a [`CompressionEvent`]: what triggered it,
//! the space shapes before and after, and per-step diagnostics. Events
//! are kept in memory; with the `journal` feature they are additionally
//! appended as JSON lines to a shared file.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::space::ParameterSpace;
use crate::step::StepInfo;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// What triggered a compression.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum EventKind {
    /// The first compression of the original space.
    InitialCompression,
    /// An adaptive update that restarted from the original space.
    AdaptiveUpdate,
    /// An adaptive update that continued from the surrogate space.
    ProgressiveCompression,
}

/// Shape summary of one space at event time.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SpaceSnapshot {
    /// Parameter count.
    pub n_parameters: usize,
    /// Parameter names in definition order.
    pub parameters: Vec<String>,
}

impl From<&ParameterSpace> for SpaceSnapshot {
    fn from(space: &ParameterSpace) -> Self {
        Self {
            n_parameters: space.len(),
            parameters: space.names(),
        }
    }
}

/// One recorded compression.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CompressionEvent {
    /// Seconds since the Unix epoch.
    pub timestamp: u64,
    /// What triggered this compression.
    pub kind: EventKind,
    /// Progress iteration at event time.
    pub iteration: usize,
    /// The original space.
    pub original: SpaceSnapshot,
    /// The sampling space after this compression.
    pub sample: SpaceSnapshot,
    /// The surrogate space after this compression.
    pub surrogate: SpaceSnapshot,
    /// Sampling-space size over original size.
    pub sample_ratio: f64,
    /// Surrogate-space size over original size.
    pub surrogate_ratio: f64,
    /// Per-step diagnostics, in chain order.
    pub steps: Vec<StepInfo>,
}

impl CompressionEvent {
    /// Builds an event from the current pipeline shapes.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn new(
        kind: EventKind,
        iteration: usize,
        original: &ParameterSpace,
        sample: &ParameterSpace,
        surrogate: &ParameterSpace,
        steps: Vec<StepInfo>,
    ) -> Self {
        let denominator = original.len().max(1) as f64;
        Self {
            timestamp: unix_timestamp(),
            kind,
            iteration,
            original: original.into(),
            sample: sample.into(),
            surrogate: surrogate.into(),
            sample_ratio: sample.len() as f64 / denominator,
            surrogate_ratio: surrogate.len() as f64 / denominator,
            steps,
        }
    }
}

fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}

#[cfg(feature = "journal")]
pub use journal::EventJournal;

#[cfg(feature = "journal")]
mod journal {
    use std::fs::OpenOptions;
    use std::io::Write;
    use std::path::{Path, PathBuf};

    use fs2::FileExt;
    use parking_lot::Mutex;

    use super::CompressionEvent;
    use crate::error::{Error, Result};

    /// Appends compression events as JSON lines to a shared file.
    ///
    /// Multiple processes can share the same file; each append takes an
    /// exclusive file lock. The in-process mutex keeps the file lock
    /// held only briefly.
    #[derive(Debug)]
    pub struct EventJournal {
        path: PathBuf,
        write_lock: Mutex<()>,
    }

    impl EventJournal {
        /// Creates a journal writing to `path`; the file is created on
        /// the first append.
        #[must_use]
        pub fn new(path: impl AsRef<Path>) -> Self {
            Self {
                path: path.as_ref().to_path_buf(),
                write_lock: Mutex::new(()),
            }
        }

        /// Appends one event.
        ///
        /// # Errors
        ///
        /// Returns [`Error::Journal`] when the file cannot be opened,
        /// locked, or written.
        pub fn append(&self, event: &CompressionEvent) -> Result<()> {
            let _guard = self.write_lock.lock();
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .map_err(|e| Error::Journal(e.to_string()))?;
            file.lock_exclusive()
                .map_err(|e| Error::Journal(e.to_string()))?;
            let line =
                serde_json::to_string(event).map_err(|e| Error::Journal(e.to_string()))?;
            writeln!(file, "{line}").map_err(|e| Error::Journal(e.to_string()))?;
            file.flush().map_err(|e| Error::Journal(e.to_string()))?;
            FileExt::unlock(&file).map_err(|e| Error::Journal(e.to_string()))?;
            Ok(())
        }
    }
}
