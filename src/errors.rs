//! Centralized error handling for enso-metrics
//!
//! Every stage of the diagnostic chain returns a [`Result`]; failures are data,
//! not control flow. [`EnsoMetricsError::kind`] collapses each error onto the
//! serializable [`ErrorKind`] tag that is reported in a `MetricOutcome`.

use serde::Serialize;

/// Main error type for enso-metrics operations
#[derive(Debug, thiserror::Error)]
pub enum EnsoMetricsError {
    /// Region definition is inconsistent (e.g. land and ocean both masked)
    #[error("invalid region '{region}': {reason}")]
    InvalidRegion { region: String, reason: String },

    /// Region name is not present in the catalog
    #[error("unknown region '{region}'")]
    UnknownRegion { region: String },

    /// The mask excludes every grid cell
    #[error("region '{region}' retains no grid cell")]
    EmptyDomain { region: String },

    /// An array and an ancillary field live on different grids
    #[error("shape mismatch for {field}: expected {expected:?}, found {found:?}")]
    GridShapeMismatch {
        field: String,
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    /// Fewer samples than the operation needs
    #[error("too short time period: {found} time steps, at least {required} required")]
    TooShortTimePeriod { required: usize, found: usize },

    /// Series length is not a multiple of the seasonal period
    #[error("series of length {length} does not cover complete years (period {period})")]
    IncompleteYears { length: usize, period: usize },

    /// Frequency string not in {daily, monthly, yearly}
    #[error("unknown frequency '{frequency}'")]
    UnknownFrequency { frequency: String },

    /// Detrend or smoothing method name not recognized
    #[error("unknown {stage} method '{method}'")]
    UnknownMethod { stage: String, method: String },

    /// Smoothing window must be odd and non-zero
    #[error("smoothing window must be an odd number of points, got {window}")]
    InvalidSmoothingWindow { window: usize },

    /// Structurally valid configuration with an unusable value
    #[error("invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    /// Variable not found in a dataset
    #[error("variable '{var}' not found in dataset")]
    VariableNotFound { var: String },

    /// Dimension not found in a variable
    #[error("dimension '{dim}' not found in variable '{var}'")]
    DimensionNotFound { var: String, dim: String },

    /// NetCDF file operation errors
    #[error("NetCDF error: {0}")]
    NetCDF(#[from] netcdf::Error),

    /// I/O operation errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Array shape or dimension error
    #[error("array error: {0}")]
    Array(#[from] ndarray::ShapeError),

    /// Configuration document could not be parsed
    #[error("configuration error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failure taxonomy reported alongside a metric outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    InvalidRegion,
    UnknownRegion,
    EmptyDomain,
    GridShapeMismatch,
    TooShortTimePeriod,
    IncompleteYears,
    UnknownFrequency,
    UnknownMethod,
    InvalidConfiguration,
    DataAccess,
}

impl EnsoMetricsError {
    /// Tag of this error in the failure taxonomy
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidRegion { .. } => ErrorKind::InvalidRegion,
            Self::UnknownRegion { .. } => ErrorKind::UnknownRegion,
            Self::EmptyDomain { .. } => ErrorKind::EmptyDomain,
            Self::GridShapeMismatch { .. } | Self::Array(_) => ErrorKind::GridShapeMismatch,
            Self::TooShortTimePeriod { .. } => ErrorKind::TooShortTimePeriod,
            Self::IncompleteYears { .. } => ErrorKind::IncompleteYears,
            Self::UnknownFrequency { .. } => ErrorKind::UnknownFrequency,
            Self::UnknownMethod { .. } => ErrorKind::UnknownMethod,
            Self::InvalidSmoothingWindow { .. }
            | Self::InvalidConfiguration { .. }
            | Self::Json(_) => ErrorKind::InvalidConfiguration,
            Self::VariableNotFound { .. }
            | Self::DimensionNotFound { .. }
            | Self::NetCDF(_)
            | Self::Io(_) => ErrorKind::DataAccess,
        }
    }

    pub(crate) fn shape_mismatch(field: &str, expected: &[usize], found: &[usize]) -> Self {
        Self::GridShapeMismatch {
            field: field.to_string(),
            expected: expected.to_vec(),
            found: found.to_vec(),
        }
    }
}

/// Result type alias for enso-metrics operations
pub type Result<T> = std::result::Result<T, EnsoMetricsError>;
