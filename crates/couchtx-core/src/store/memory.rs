//! In-process revisioned store with CouchDB revision semantics.
//!
//! Revisions look like `"<generation>-<digest>"`; the generation grows by one
//! on every accepted write and the digest covers the previous revision and
//! the new body.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::{DocumentStore, StoreError};
use crate::document::{Document, WriteResult};

/// Thread-safe in-memory document store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    docs: Mutex<HashMap<String, Document>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current stored copy of a document, without going through the async API.
    pub fn peek(&self, id: &str) -> Option<Document> {
        self.lock().ok()?.get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().map(|docs| docs.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, Document>>, StoreError> {
        self.docs
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))
    }
}

/// Next revision token after `previous` for `doc`'s body.
fn next_revision(previous: Option<&str>, doc: &Document) -> Result<String, StoreError> {
    let generation = match previous {
        Some(rev) => revision_generation(rev) + 1,
        None => 1,
    };
    let mut hasher = Sha256::new();
    hasher.update(previous.unwrap_or("").as_bytes());
    hasher.update(serde_json::to_vec(&doc.body)?);
    let digest = hex::encode(hasher.finalize());
    Ok(format!("{}-{}", generation, &digest[..32]))
}

/// Generation prefix of a revision token (`"3-abc"` -> 3). Malformed tokens count as 0.
pub(crate) fn revision_generation(rev: &str) -> u64 {
    rev.split_once('-')
        .and_then(|(generation, _)| generation.parse().ok())
        .unwrap_or(0)
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, id: &str) -> Result<Document, StoreError> {
        self.lock()?
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound { id: id.to_string() })
    }

    async fn insert(&self, doc: &Document) -> Result<WriteResult, StoreError> {
        let mut docs = self.lock()?;
        let current = docs.get(&doc.id).and_then(|stored| stored.rev.clone());
        if current != doc.rev {
            return Err(StoreError::Conflict { id: doc.id.clone() });
        }
        let rev = next_revision(current.as_deref(), doc)?;
        let mut stored = doc.clone();
        stored.rev = Some(rev.clone());
        docs.insert(doc.id.clone(), stored);
        tracing::trace!(id = %doc.id, rev = %rev, "memory store accepted write");
        Ok(WriteResult {
            id: doc.id.clone(),
            rev,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_then_update_bumps_generation() {
        let store = MemoryStore::new();
        let mut doc = Document::new("1");
        doc.set("n", 1);
        let first = store.insert(&doc).await.unwrap();
        assert_eq!(first.id, "1");
        assert_eq!(revision_generation(&first.rev), 1);

        doc.apply_write(&first);
        doc.set("n", 2);
        let second = store.insert(&doc).await.unwrap();
        assert_eq!(revision_generation(&second.rev), 2);
        assert_ne!(first.rev, second.rev);

        let stored = store.get("1").await.unwrap();
        assert_eq!(stored.rev.as_deref(), Some(second.rev.as_str()));
        assert_eq!(stored.get("n"), Some(&serde_json::json!(2)));
    }

    #[tokio::test]
    async fn stale_or_missing_revision_conflicts() {
        let store = MemoryStore::new();
        let doc = Document::new("1");
        store.insert(&doc).await.unwrap();

        // Second create without a revision: conflict.
        let err = store.insert(&doc).await.unwrap_err();
        assert!(err.is_conflict());

        let mut stale = doc.clone();
        stale.rev = Some("1-deadbeef".to_string());
        assert!(store.insert(&stale).await.unwrap_err().is_conflict());
    }

    #[tokio::test]
    async fn new_document_with_revision_conflicts() {
        let store = MemoryStore::new();
        let mut doc = Document::new("ghost");
        doc.rev = Some("1-abc".to_string());
        assert!(store.insert(&doc).await.unwrap_err().is_conflict());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn digest_covers_previous_revision() {
        let store = MemoryStore::new();
        let mut doc = Document::new("1");
        let first = store.insert(&doc).await.unwrap();
        doc.apply_write(&first);
        // Same body again: only the previous revision differs.
        let second = store.insert(&doc).await.unwrap();
        let digest = |rev: &str| rev.split_once('-').map(|(_, d)| d.to_string());
        assert_ne!(digest(&first.rev), digest(&second.rev));
        assert_eq!(digest(&second.rev).map(|d| d.len()), Some(32));
    }

    #[tokio::test]
    async fn get_missing_is_not_found() {
        let store = MemoryStore::new();
        let err = store.get("nope").await.unwrap_err();
        assert!(err.is_not_found());
        assert!(store.peek("nope").is_none());
    }

    #[test]
    fn revision_generation_parses_prefix() {
        assert_eq!(revision_generation("3-abc"), 3);
        assert_eq!(revision_generation("garbage"), 0);
    }
}
