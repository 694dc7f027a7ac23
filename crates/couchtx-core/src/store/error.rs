//! Store error type with a distinguishable conflict condition.

/// Error returned by a document store operation.
///
/// The state machine only needs to tell conflicts apart from everything else;
/// the remaining variants are kept distinct for logging and for callers that
/// inspect the aggregated errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The write targeted a stale revision (HTTP 409).
    #[error("document update conflict on {id}")]
    Conflict { id: String },
    /// No document with this id exists (HTTP 404).
    #[error("document {id} not found")]
    NotFound { id: String },
    /// Any other non-2xx reply.
    #[error("HTTP {status}: {reason}")]
    Http { status: u32, reason: String },
    /// Curl reported an error (timeout, connection, etc.).
    #[error("transport: {0}")]
    Transport(#[from] curl::Error),
    /// A document or reply could not be (de)serialized.
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    /// Store-specific failure with no HTTP status (background task died, injected fault).
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    /// HTTP status code carried by this error, when known.
    pub fn status_code(&self) -> Option<u32> {
        match self {
            StoreError::Conflict { .. } => Some(409),
            StoreError::NotFound { .. } => Some(404),
            StoreError::Http { status, .. } => Some(*status),
            StoreError::Transport(_) | StoreError::Json(_) | StoreError::Unavailable(_) => None,
        }
    }
}
