//! Error kinds surfaced by every stage of the pipeline.
//!
//! Nothing retries: a failure on any one view aborts the whole run.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum OmicsNetError {
    /// Empty matrices, non-finite values, too few patients or views.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Shapes that should agree across the pipeline do not.
    #[error("dimension mismatch in {context}: expected {expected}, found {found}")]
    DimensionMismatch {
        context: String,
        expected: usize,
        found: usize,
    },

    /// A hyperparameter outside its valid domain (K, alpha, T, C, top-k...).
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    /// Eigen/SVD non-convergence or a normalisation dividing by zero.
    #[error("numerical failure: {0}")]
    NumericalFailure(String),
}

impl OmicsNetError {
    pub(crate) fn mismatch(context: impl Into<String>, expected: usize, found: usize) -> Self {
        Self::DimensionMismatch {
            context: context.into(),
            expected,
            found,
        }
    }

    pub(crate) fn parameter(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, OmicsNetError>;
