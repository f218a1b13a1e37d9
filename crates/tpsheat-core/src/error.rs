use thiserror::Error;

/// Precondition failures of the bucketing and layout pipeline.
///
/// Every variant is raised before any work begins, so a failed call never
/// yields a partial grid.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HeatmapError {
    #[error("no samples or days to lay out")]
    EmptyInput,

    #[error("length mismatch: expected {expected}, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("sample {index} is earlier than the sample before it")]
    OutOfOrder { index: usize },
}

pub type Result<T> = std::result::Result<T, HeatmapError>;
