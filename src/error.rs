use thiserror::Error;

// Unified error type for petrel

/// Where an incomplete factorization broke down.
///
/// Carried as recoverable state on the owning preconditioner rather than
/// propagated as a hard error, so a caller can shift the diagonal and retry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FactorFailure {
    /// Exact zero pivot at the given factor row.
    ZeroPivot { row: usize },
    /// Negative pivot at the given row (matrix not positive definite).
    IndefinitePivot { row: usize, value: f64 },
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("size mismatch in {context}: {left} vs {right}")]
    SizeMismatch {
        context: &'static str,
        left: usize,
        right: usize,
    },
    #[error("invalid state: {0}")]
    InvalidState(&'static str),
    #[error("new nonzero at ({row},{col}) exceeds preallocation and NEW_NONZERO_ALLOCATION_ERR is set")]
    AllocationError { row: usize, col: usize },
    #[error("numerical error: {0}")]
    NumericalError(String),
    #[error("factorization failed: {0:?}")]
    FactorError(FactorFailure),
    #[error("indefinite matrix detected (p^T A p <= 0)")]
    IndefiniteMatrix,
    #[error("indefinite preconditioner detected (beta < 0)")]
    IndefinitePreconditioner,
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),
    #[error("no registered kind named {0:?}")]
    NotFound(String),
    #[error("operation requires a communicator of size {expected}, got {actual}")]
    WrongCommSize { expected: usize, actual: usize },
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Check that two lengths agree, tagging the failure with `context`.
    pub fn check_lengths(context: &'static str, left: usize, right: usize) -> Result<(), Error> {
        if left != right {
            return Err(Error::SizeMismatch { context, left, right });
        }
        Ok(())
    }
}
