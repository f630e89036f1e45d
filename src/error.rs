use thiserror::Error;

/// Errors raised while building or using channels and data sets.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DataError {
    /// A BR hypothesis that is not a valid probability vector.
    #[error("Invalid BR hypothesis: {0}")]
    InvalidHypothesis(String),

    /// A BR vector with the wrong number of entries.
    #[error("BR vector has {got} entries, expected {expected}")]
    BrLength { expected: usize, got: usize },

    /// A rename request that does not match the number of existing names.
    #[error("Cannot rename {what}: {expected} names present, {got} given")]
    NameLengthMismatch {
        what: &'static str,
        expected: usize,
        got: usize,
    },

    /// A name that would appear twice among boxes or processes.
    #[error("Name {0:?} is not unique")]
    DuplicateName(String),

    /// Malformed channel input table.
    #[error("Malformed channel table: {0}")]
    Table(String),

    /// A channel whose matrices disagree with its metadata or with the data set.
    #[error("Inconsistent channel {channel}: {reason}")]
    InconsistentChannel { channel: String, reason: String },

    /// A channel name that is already taken.
    #[error("A channel with name {0:?} already exists")]
    DuplicateChannel(String),

    /// A channel name that does not exist.
    #[error("No channel with name {0:?}")]
    UnknownChannel(String),

    /// A background process that does not exist.
    #[error("Background process(es) not found: {0:?}")]
    UnknownBackground(Vec<String>),

    /// A data set that cannot be combined with the others.
    #[error("Incompatible data set {name:?}: {reason}")]
    IncompatibleDataSet { name: String, reason: String },

    /// An invalid polarization value or polarization change.
    #[error("Polarization error: {0}")]
    Polarization(String),

    /// The multinomial or hypergeometric draw cannot represent the requested counts.
    #[error(
        "Resampling overflow: {0}. \
         Expected only for extremely high MC statistics (in the billions)."
    )]
    ResamplingOverflow(String),
}

/// Errors raised by the fit orchestration and the toy study.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FitError {
    /// The fit cannot be set up with the provided inputs.
    #[error("Fit configuration error: {0}")]
    Configuration(String),

    /// A fit mode name that is not registered.
    #[error("No fit mode with the name {name:?} is implemented. Choose between: {available:?}")]
    UnknownFitMode {
        name: String,
        available: Vec<&'static str>,
    },

    /// The minimizer reported an invalid minimum.
    #[error(
        "Invalid fit: {0}\n\
         If the reason for the invalid status is understood, \
         silence this with `raise_invalid_fit(false)`."
    )]
    InvalidFit(String),

    /// The fit has no toy ensemble yet.
    #[error("No toys available: fit passed without throwing toys first")]
    NoToys,

    /// Per-toy channel counts were requested but not stored.
    #[error(
        "Channel counts not filled for the toys. Set `store_channel_counts` \
         in `fill_toys` (usually a few (<< 100) toys are enough for diagnostics)"
    )]
    ChannelCountsNotStored,

    /// The arrays of a toy ensemble disagree in length.
    #[error("Toy ensemble shape mismatch: {0}")]
    ToyShape(String),
}

/// Error types for the alldecays-rs library.
#[derive(Error, Debug)]
pub enum AllDecaysError {
    /// Channel and data set errors.
    #[error(transparent)]
    Data(#[from] DataError),

    /// Fit and toy study errors.
    #[error(transparent)]
    Fit(#[from] FitError),

    /// Error indicating a mismatch in matrix dimensions.
    #[error("Matrix dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// Error during matrix conversion operations.
    #[error("Matrix conversion error: {0}")]
    ConversionError(String),

    /// Error indicating the algorithm failed to converge.
    #[error("Algorithm failed to converge: {0}")]
    ConvergenceFailure(String),

    /// Error for boundary constraint violations.
    #[error("Bounds error: {0}")]
    BoundsError(String),

    /// Error during function evaluation.
    #[error("Function evaluation error: {0}")]
    FunctionEvaluation(String),

    /// Linear algebra error.
    #[error("Linear algebra error: {0}")]
    LinearAlgebraError(String),

    /// Special function evaluation error.
    #[error("Statistics error: {0}")]
    Statistics(String),

    /// I/O error wrapper.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl From<crate::minimizer::bounds::BoundsError> for AllDecaysError {
    fn from(err: crate::minimizer::bounds::BoundsError) -> Self {
        AllDecaysError::BoundsError(format!("{}", err))
    }
}

/// Result type alias for alldecays-rs operations.
pub type Result<T> = std::result::Result<T, AllDecaysError>;
