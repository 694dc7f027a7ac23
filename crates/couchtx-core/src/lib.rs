//! Optimistic-concurrency updates against a revisioned document store.
//!
//! Bind a [`DocumentStore`], a [`Transform`] and [`TransactionOptions`] into a
//! [`Transaction`], then run it for a document id or a document. Write
//! conflicts reload the document and re-apply the transform; other errors
//! back off and retry until the attempt budget runs out.

pub mod config;
pub mod logging;

pub mod control;
pub mod document;
pub mod retry;
pub mod store;
pub mod txn;

pub use control::CancelToken;
pub use document::{Document, Target, WriteResult};
pub use retry::BackoffPolicy;
pub use store::{CouchStore, DocumentStore, MemoryStore, StoreError};
pub use txn::{
    AttemptError, Transaction, TransactionError, TransactionOptions, Transform,
    TransformCallback,
};
