//! Store double that plays back scripted faults over a `MemoryStore` and
//! records every call in order.

use async_trait::async_trait;
use couchtx_core::{Document, DocumentStore, MemoryStore, StoreError, WriteResult};
use std::collections::VecDeque;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// 409 without touching the backing store.
    Conflict,
    /// Any other HTTP status.
    Status(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Call {
    Get,
    Insert,
}

#[derive(Default)]
pub struct ScriptedStore {
    pub backing: MemoryStore,
    insert_faults: Mutex<VecDeque<Fault>>,
    get_faults: Mutex<VecDeque<Fault>>,
    insert_fault_forever: Option<Fault>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Faults returned by the next inserts, in order; later inserts reach the backing store.
    pub fn fail_inserts(self, faults: impl IntoIterator<Item = Fault>) -> Self {
        self.insert_faults.lock().unwrap().extend(faults);
        self
    }

    pub fn fail_gets(self, faults: impl IntoIterator<Item = Fault>) -> Self {
        self.get_faults.lock().unwrap().extend(faults);
        self
    }

    pub fn always_fail_inserts(mut self, fault: Fault) -> Self {
        self.insert_fault_forever = Some(fault);
        self
    }

    pub async fn seed(&self, doc: Document) -> Document {
        let result = self.backing.insert(&doc).await.expect("seed insert");
        let mut doc = doc;
        doc.apply_write(&result);
        doc
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, call: Call) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| **c == call).count()
    }
}

fn to_error(fault: Fault, id: &str) -> StoreError {
    match fault {
        Fault::Conflict => StoreError::Conflict { id: id.to_string() },
        Fault::Status(status) => StoreError::Http {
            status,
            reason: "scripted".to_string(),
        },
    }
}

#[async_trait]
impl DocumentStore for ScriptedStore {
    async fn get(&self, id: &str) -> Result<Document, StoreError> {
        self.calls.lock().unwrap().push(Call::Get);
        let fault = self.get_faults.lock().unwrap().pop_front();
        if let Some(fault) = fault {
            return Err(to_error(fault, id));
        }
        self.backing.get(id).await
    }

    async fn insert(&self, doc: &Document) -> Result<WriteResult, StoreError> {
        self.calls.lock().unwrap().push(Call::Insert);
        let fault = self
            .insert_faults
            .lock()
            .unwrap()
            .pop_front()
            .or(self.insert_fault_forever);
        if let Some(fault) = fault {
            return Err(to_error(fault, &doc.id));
        }
        self.backing.insert(doc).await
    }
}
