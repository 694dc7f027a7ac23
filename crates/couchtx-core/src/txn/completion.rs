//! One-shot delivery of a transaction outcome to a caller callback.

use crate::document::Document;
use crate::txn::TransactionError;

type Callback = Box<dyn FnOnce(Result<Document, TransactionError>) + Send>;

/// Holds the caller's completion callback until it fires.
///
/// `fire` consumes the completion, so the callback runs at most once. If the
/// completion is dropped unfired (task aborted, transform panicked) the
/// callback receives [`TransactionError::Aborted`] instead.
pub(crate) struct Completion {
    callback: Option<Callback>,
}

impl Completion {
    pub(crate) fn new<F>(callback: F) -> Self
    where
        F: FnOnce(Result<Document, TransactionError>) + Send + 'static,
    {
        Self {
            callback: Some(Box::new(callback)),
        }
    }

    pub(crate) fn fire(mut self, outcome: Result<Document, TransactionError>) {
        if let Some(callback) = self.callback.take() {
            callback(outcome);
        }
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        if let Some(callback) = self.callback.take() {
            tracing::warn!("transaction ended without an outcome; reporting abort");
            callback(Err(TransactionError::Aborted));
        }
    }
}
