#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Returned when the lower bound is greater than the upper bound.
    #[error("invalid bounds: low ({low}) must be less than or equal to high ({high})")]
    InvalidBounds {
        /// The lower bound value.
        low: f64,
        /// The upper bound value.
        high: f64,
    },

    /// Returned when log scale is used with non-positive bounds.
    #[error("invalid log bounds: low must be positive for log scale")]
    InvalidLogBounds,

    /// Returned when a step size is not positive.
    #[error("invalid step: step must be positive")]
    InvalidStep,

    /// Returned when categorical choices are empty.
    #[error("categorical choices cannot be empty")]
    EmptyChoices,

    /// Returned when two parameters in one space share a name.
    #[error("duplicate parameter name '{0}' in space")]
    DuplicateParameter(String),

    /// Returned when a dimension-selection target count is zero.
    #[error("invalid topk: {0} must be at least 1")]
    InvalidTopK(usize),

    /// Returned when a ratio parameter is outside (0.0, 1.0].
    #[error("invalid ratio: {0} must be in (0.0, 1.0]")]
    InvalidRatio(f64),

    /// Returned when an expert-provided range is inverted or empty.
    #[error("invalid expert range for '{name}': [{low}, {high}] is empty")]
    InvalidExpertRange {
        /// The parameter the range was supplied for.
        name: String,
        /// The supplied lower bound.
        low: f64,
        /// The supplied upper bound.
        high: f64,
    },

    /// Returned when a projection target dimension is zero.
    #[error("invalid target dimension: {0} must be at least 1")]
    InvalidLowDim(usize),

    /// Returned when a quantization value count is below 2.
    #[error("invalid max_values: {0} must be at least 2")]
    InvalidMaxValues(u32),

    /// Returned by the step factory for an unrecognized step identifier.
    #[error("unknown compression step '{0}'")]
    UnknownStep(String),

    /// Returned by the factories for an unrecognized strategy identifier.
    #[error("unknown strategy '{0}'")]
    UnknownStrategy(String),

    /// Returned when a density estimate is requested over zero samples.
    #[error("KDE requires at least one sample")]
    EmptySamples,

    /// Returned when sample weights do not match the sample count.
    #[error("weight count mismatch: expected {expected} weights but got {got}")]
    WeightCountMismatch {
        /// The expected number of weights.
        expected: usize,
        /// The actual number of weights provided.
        got: usize,
    },

    /// Returned when writing the compression-event journal fails.
    #[cfg(feature = "journal")]
    #[error("journal error: {0}")]
    Journal(String),
}

pub type Result<T> = core::result::Result<T, Error>;
