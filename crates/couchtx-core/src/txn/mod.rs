//! Optimistic-concurrency transactions over a [`DocumentStore`].
//!
//! A [`Transaction`] binds a store, a [`Transform`] and [`TransactionOptions`]
//! into a reusable handle. Each invocation fetches (if given an id),
//! transforms and stores the document, reloading and re-applying the
//! transform on write conflicts and backing off on other errors until the
//! attempt budget runs out.

mod completion;
mod error;
mod machine;
mod transform;


use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::Instrument;

use crate::control::CancelToken;
use crate::document::{Document, Target};
use crate::retry::{BackoffPolicy, DEFAULT_LIMIT};
use crate::store::DocumentStore;

use completion::Completion;
use machine::Machine;

pub use error::{AttemptError, TransactionError};
pub use transform::{Transform, TransformCallback};

/// Options bound into a [`Transaction`].
#[derive(Debug, Clone)]
pub struct TransactionOptions {
    /// Total attempt budget; every recoverable error except a conflict uses one.
    pub limit: u32,
    pub backoff: BackoffPolicy,
    /// Wall-clock bound for one invocation, measured from its start.
    pub deadline: Option<Duration>,
    /// When an id target does not exist yet, transform an empty document instead of failing.
    pub create_missing: bool,
}

impl Default for TransactionOptions {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            backoff: BackoffPolicy::default(),
            deadline: None,
            create_missing: false,
        }
    }
}

impl TransactionOptions {
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    pub fn backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn create_missing(mut self, create_missing: bool) -> Self {
        self.create_missing = create_missing;
        self
    }
}

/// A store, a transform and options bound together. Cheap to clone; every
/// invocation gets its own attempt state.
pub struct Transaction<S: ?Sized> {
    store: Arc<S>,
    transform: Transform,
    options: Arc<TransactionOptions>,
}

impl<S: ?Sized> Clone for Transaction<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            transform: self.transform.clone(),
            options: Arc::clone(&self.options),
        }
    }
}

impl<S: DocumentStore + ?Sized> Transaction<S> {
    pub fn new(store: Arc<S>, transform: Transform) -> Self {
        Self::with_options(store, transform, TransactionOptions::default())
    }

    pub fn with_options(store: Arc<S>, transform: Transform, options: TransactionOptions) -> Self {
        Self {
            store,
            transform,
            options: Arc::new(options),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn options(&self) -> &TransactionOptions {
        &self.options
    }

    /// Run one invocation for an id or a document.
    pub async fn run(&self, target: impl Into<Target>) -> Result<Document, TransactionError> {
        self.execute(target.into(), None).await
    }

    /// Like [`run`](Self::run), stopping early when `cancel` fires.
    pub async fn run_with_cancel(
        &self,
        target: impl Into<Target>,
        cancel: &CancelToken,
    ) -> Result<Document, TransactionError> {
        self.execute(target.into(), Some(cancel)).await
    }

    /// Run with an untyped input: a JSON string id or a JSON document object.
    pub async fn run_json(&self, value: &Value) -> Result<Document, TransactionError> {
        let target = Target::from_json(value)?;
        self.execute(target, None).await
    }

    async fn execute(
        &self,
        target: Target,
        cancel: Option<&CancelToken>,
    ) -> Result<Document, TransactionError> {
        target.validate()?;
        let kind = if self.transform.is_async() { "async" } else { "sync" };
        let span = tracing::debug_span!("transaction", doc_id = %target.id(), transform = kind);
        let machine = Machine {
            store: &*self.store,
            transform: &self.transform,
            options: &self.options,
            cancel,
            // Deadlines past the clock's range never fire.
            deadline: self
                .options
                .deadline
                .and_then(|d| Instant::now().checked_add(d)),
        };
        machine.drive(target).instrument(span).await
    }
}

impl<S: DocumentStore + ?Sized + 'static> Transaction<S> {
    /// Run one invocation on the tokio runtime and hand the outcome to
    /// `callback` exactly once. If the task is aborted or panics the callback
    /// receives [`TransactionError::Aborted`].
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn spawn<F>(&self, target: impl Into<Target>, callback: F) -> JoinHandle<()>
    where
        F: FnOnce(Result<Document, TransactionError>) + Send + 'static,
    {
        self.spawn_target(target.into(), None, callback)
    }

    /// [`spawn`](Self::spawn) with a cancel token. Panics outside a tokio runtime.
    pub fn spawn_with_cancel<F>(
        &self,
        target: impl Into<Target>,
        cancel: CancelToken,
        callback: F,
    ) -> JoinHandle<()>
    where
        F: FnOnce(Result<Document, TransactionError>) + Send + 'static,
    {
        self.spawn_target(target.into(), Some(cancel), callback)
    }

    /// Validate an untyped input, then [`spawn`](Self::spawn). Invalid input
    /// is reported to `callback` before this returns, and no task is started.
    /// Valid input panics outside a tokio runtime, like [`spawn`](Self::spawn).
    pub fn spawn_json<F>(&self, value: &Value, callback: F) -> Option<JoinHandle<()>>
    where
        F: FnOnce(Result<Document, TransactionError>) + Send + 'static,
    {
        match Target::from_json(value) {
            Ok(target) => Some(self.spawn_target(target, None, callback)),
            Err(e) => {
                callback(Err(e));
                None
            }
        }
    }

    fn spawn_target<F>(
        &self,
        target: Target,
        cancel: Option<CancelToken>,
        callback: F,
    ) -> JoinHandle<()>
    where
        F: FnOnce(Result<Document, TransactionError>) + Send + 'static,
    {
        let txn = self.clone();
        let completion = Completion::new(callback);
        tokio::spawn(async move {
            let outcome = txn.execute(target, cancel.as_ref()).await;
            completion.fire(outcome);
        })
    }
}
