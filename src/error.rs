//! Error types for moment propagation.

use thiserror::Error;

/// Errors raised by moment computations and their verification helpers.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MomentError {
    /// Matrix or vector dimensions do not conform.
    #[error("shape mismatch ({context}): expected {expected}, got {got}")]
    ShapeMismatch {
        context: &'static str,
        expected: usize,
        got: usize,
    },

    /// A batch helper was given no samples.
    #[error("batch must contain at least one sample")]
    EmptyBatch,

    /// A scalar parameter is outside its valid range.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// A covariance matrix failed validation or could not be factorized.
    #[error("covariance is not positive semi-definite: {0}")]
    NotPositiveSemiDefinite(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, MomentError>;

/// Returns `ShapeMismatch` unless `expected == got`.
pub(crate) fn ensure_dim(context: &'static str, expected: usize, got: usize) -> Result<()> {
    if expected == got {
        Ok(())
    } else {
        Err(MomentError::ShapeMismatch { context, expected, got })
    }
}
