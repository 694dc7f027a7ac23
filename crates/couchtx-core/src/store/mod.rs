//! Document store interface consumed by transactions.
//!
//! Transactions only depend on [`DocumentStore`]; the CouchDB HTTP client
//! and the in-memory store are two implementations of it.

mod classify;
mod couch;
mod error;
mod memory;

use std::sync::Arc;

use async_trait::async_trait;

use crate::document::{Document, WriteResult};

pub use classify::{classify_status, status_error, StatusClass};
pub use couch::{CouchOptions, CouchStore};
pub use error::StoreError;
pub use memory::MemoryStore;

/// A revisioned document store.
///
/// `insert` must reject a write whose revision is not the current one with
/// [`StoreError::Conflict`]. Implementations are shared across concurrent
/// transactions and must be safe for concurrent use.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch the current revision of a document.
    async fn get(&self, id: &str) -> Result<Document, StoreError>;

    /// Create or update a document at the revision it carries.
    async fn insert(&self, doc: &Document) -> Result<WriteResult, StoreError>;
}

#[async_trait]
impl<S: DocumentStore + ?Sized> DocumentStore for Arc<S> {
    async fn get(&self, id: &str) -> Result<Document, StoreError> {
        (**self).get(id).await
    }

    async fn insert(&self, doc: &Document) -> Result<WriteResult, StoreError> {
        (**self).insert(doc).await
    }
}
