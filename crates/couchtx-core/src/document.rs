//! Document model: id, opaque revision token and a free-form JSON body.
//!
//! Serializes to the CouchDB wire shape (`_id`, `_rev`, body fields flattened
//! beside them) so the same type travels through every store implementation.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::txn::TransactionError;

/// A single document in a revisioned store.
///
/// A document without a revision is new (never stored). Once read from or
/// written to the store it carries the revision it was seen at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", default, skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(flatten)]
    pub body: Map<String, Value>,
}

impl Document {
    /// New, not yet stored document with an empty body.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            rev: None,
            body: Map::new(),
        }
    }

    pub fn with_body(id: impl Into<String>, body: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            rev: None,
            body,
        }
    }

    pub fn is_new(&self) -> bool {
        self.rev.is_none()
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.body.get(field)
    }

    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.body.insert(field.into(), value.into());
    }

    /// Merge the id and revision assigned by a successful write.
    pub fn apply_write(&mut self, result: &WriteResult) {
        self.id = result.id.clone();
        self.rev = Some(result.rev.clone());
    }
}

/// Reply to an accepted write (CouchDB `{"ok": true, "id": .., "rev": ..}`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteResult {
    pub id: String,
    pub rev: String,
}

/// Input of a transaction: either an id to fetch first, or a document to
/// transform directly.
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    Id(String),
    Document(Document),
}

impl Target {
    /// The id this target refers to.
    pub fn id(&self) -> &str {
        match self {
            Target::Id(id) => id,
            Target::Document(doc) => &doc.id,
        }
    }

    /// Interpret an untyped JSON value: a string is an id, an object with a
    /// string `_id` is a document. Anything else is rejected.
    pub fn from_json(value: &Value) -> Result<Self, TransactionError> {
        let target = match value {
            Value::String(id) => Target::Id(id.clone()),
            Value::Object(map) => match map.get("_id") {
                Some(Value::String(_)) => {
                    let doc: Document = serde_json::from_value(value.clone()).map_err(|e| {
                        TransactionError::InvalidArgument(format!("malformed document: {}", e))
                    })?;
                    Target::Document(doc)
                }
                _ => {
                    return Err(TransactionError::InvalidArgument(
                        "document has no string `_id` field".to_string(),
                    ))
                }
            },
            other => {
                return Err(TransactionError::InvalidArgument(format!(
                    "expected a document id or a document object, got {}",
                    json_kind(other)
                )))
            }
        };
        target.validate()?;
        Ok(target)
    }

    pub(crate) fn validate(&self) -> Result<(), TransactionError> {
        if self.id().is_empty() {
            return Err(TransactionError::InvalidArgument(
                "document id must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

impl From<&str> for Target {
    fn from(id: &str) -> Self {
        Target::Id(id.to_string())
    }
}

impl From<String> for Target {
    fn from(id: String) -> Self {
        Target::Id(id)
    }
}

impl From<Document> for Target {
    fn from(doc: Document) -> Self {
        Target::Document(doc)
    }
}
