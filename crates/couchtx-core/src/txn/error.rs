//! Errors surfaced by transactions.

use crate::store::StoreError;

/// One failed step of a transaction, kept in order in the error aggregate.
#[derive(Debug, thiserror::Error)]
pub enum AttemptError {
    /// The caller's transform reported an error.
    #[error("transform failed: {0:#}")]
    Transform(anyhow::Error),
    /// The store rejected the write as stale. Recorded, but does not use up an attempt.
    #[error("{0}")]
    Conflict(StoreError),
    /// Writing the transformed document failed for a reason other than a conflict.
    #[error("store failed: {0}")]
    Store(StoreError),
    /// Fetching the current document failed.
    #[error("reload failed: {0}")]
    Reload(StoreError),
}

impl AttemptError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, AttemptError::Conflict(_))
    }

    pub fn store_error(&self) -> Option<&StoreError> {
        match self {
            AttemptError::Conflict(e) | AttemptError::Store(e) | AttemptError::Reload(e) => Some(e),
            AttemptError::Transform(_) => None,
        }
    }
}

/// Terminal error of a transaction, delivered once.
///
/// Every variant except `InvalidArgument` and `Aborted` carries the ordered
/// list of errors encountered (oldest first).
#[derive(Debug, thiserror::Error)]
pub enum TransactionError {
    /// Neither a document id nor a document; no store call was made.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// The attempt budget ran out.
    #[error("too many errors ({attempts} attempts, {} errors recorded)", .errors.len())]
    Exhausted {
        attempts: u32,
        errors: Vec<AttemptError>,
    },
    /// The cancel token fired while the transaction was waiting.
    #[error("transaction cancelled ({} errors recorded)", .errors.len())]
    Cancelled { errors: Vec<AttemptError> },
    /// The configured deadline passed while the transaction was waiting.
    #[error("transaction deadline exceeded ({} errors recorded)", .errors.len())]
    DeadlineExceeded { errors: Vec<AttemptError> },
    /// The task running the transaction was aborted or panicked.
    #[error("transaction task ended before completing")]
    Aborted,
}

impl TransactionError {
    /// Ordered aggregate of attempt errors.
    pub fn errors(&self) -> &[AttemptError] {
        match self {
            TransactionError::Exhausted { errors, .. }
            | TransactionError::Cancelled { errors }
            | TransactionError::DeadlineExceeded { errors } => errors,
            TransactionError::InvalidArgument(_) | TransactionError::Aborted => &[],
        }
    }

    pub fn into_errors(self) -> Vec<AttemptError> {
        match self {
            TransactionError::Exhausted { errors, .. }
            | TransactionError::Cancelled { errors }
            | TransactionError::DeadlineExceeded { errors } => errors,
            TransactionError::InvalidArgument(_) | TransactionError::Aborted => Vec::new(),
        }
    }
}
