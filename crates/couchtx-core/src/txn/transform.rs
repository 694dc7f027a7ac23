//! Caller-supplied document transforms.
//!
//! A transform is either synchronous (returns the new document) or
//! callback-based (hands the result to a [`TransformCallback`], possibly from
//! another task or thread). The variant is chosen when the transform is
//! built, never inferred per call.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use tokio::sync::oneshot;

use crate::document::Document;

type SyncFn = dyn Fn(Document) -> Result<Document> + Send + Sync;
type CallbackFn = dyn Fn(Document, TransformCallback) + Send + Sync;

/// Business logic computing a new document from the current one.
#[derive(Clone)]
pub enum Transform {
    Sync(Arc<SyncFn>),
    Async(Arc<CallbackFn>),
}

impl fmt::Debug for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transform::Sync(_) => f.write_str("Transform::Sync(..)"),
            Transform::Async(_) => f.write_str("Transform::Async(..)"),
        }
    }
}

impl Transform {
    /// Synchronous transform: `Document -> Result<Document>`.
    pub fn sync<F>(f: F) -> Self
    where
        F: Fn(Document) -> Result<Document> + Send + Sync + 'static,
    {
        Transform::Sync(Arc::new(f))
    }

    /// Callback transform: receives the document and a callback to complete.
    pub fn callback<F>(f: F) -> Self
    where
        F: Fn(Document, TransformCallback) + Send + Sync + 'static,
    {
        Transform::Async(Arc::new(f))
    }

    /// Callback transform driven by a future spawned on the current runtime.
    ///
    /// # Panics
    ///
    /// Applying the transform panics outside a tokio runtime.
    pub fn future<F, Fut>(f: F) -> Self
    where
        F: Fn(Document) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Document>> + Send + 'static,
    {
        Transform::callback(move |doc, done| {
            let fut = f(doc);
            tokio::spawn(async move { done.done(fut.await) });
        })
    }

    pub fn is_async(&self) -> bool {
        matches!(self, Transform::Async(_))
    }

    /// Apply the transform to `doc`, waiting for the callback if needed.
    pub(crate) async fn apply(&self, doc: Document) -> Result<Document> {
        match self {
            Transform::Sync(f) => f(doc),
            Transform::Async(f) => {
                let (tx, rx) = oneshot::channel();
                f(doc, TransformCallback { tx });
                rx.await
                    .unwrap_or_else(|_| Err(anyhow!("transform dropped its callback")))
            }
        }
    }
}

/// Completion handle passed to callback transforms. Consumed on use.
#[derive(Debug)]
pub struct TransformCallback {
    tx: oneshot::Sender<Result<Document>>,
}

impl TransformCallback {
    pub fn done(self, result: Result<Document>) {
        // Receiver is gone when the transaction was cancelled meanwhile.
        let _ = self.tx.send(result);
    }

    pub fn ok(self, doc: Document) {
        self.done(Ok(doc));
    }

    pub fn err(self, error: impl Into<anyhow::Error>) {
        self.done(Err(error.into()));
    }
}
