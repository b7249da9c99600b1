//! The document store the engine persists into.
//!
//! Records are loose JSON objects grouped into named collections. Identifiers
//! are opaque strings assigned by the store, and a field may ask the store to
//! stamp its own notion of "now" via [`FieldValue::ServerTimestamp`].

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use thiserror::Error;

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

pub const LISTS: &str = "lists";
pub const TODOS: &str = "todos";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("document {collection}/{id} not found")]
    NotFound { collection: String, id: String },
    #[error("store rejected the request: {0}")]
    PermissionDenied(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Which store call an injected failure should hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Create,
    Get,
    Update,
    Delete,
    Query,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Json(Value),
    /// Replaced by the store's clock when the write is applied.
    ServerTimestamp,
}

impl FieldValue {
    pub fn json(value: impl Into<Value>) -> Self {
        FieldValue::Json(value.into())
    }
}

pub type Fields = BTreeMap<String, FieldValue>;

/// A stored record: the store-assigned id plus the persisted fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub fields: Map<String, Value>,
}

impl Document {
    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }
}

/// Equality filter on one top-level field.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub value: Value,
}

impl Filter {
    pub fn eq(field: &str, value: impl Into<Value>) -> Self {
        Filter {
            field: field.to_string(),
            value: value.into(),
        }
    }

    fn matches(&self, fields: &Map<String, Value>) -> bool {
        fields.get(&self.field) == Some(&self.value)
    }
}

pub(crate) fn matches_all(filters: &[Filter], fields: &Map<String, Value>) -> bool {
    filters.iter().all(|filter| filter.matches(fields))
}

/// Resolves server timestamps and merges `update` over `target`.
pub(crate) fn apply_fields(target: &mut Map<String, Value>, update: Fields, stamp: &str) {
    for (name, value) in update {
        let value = match value {
            FieldValue::Json(value) => value,
            FieldValue::ServerTimestamp => Value::String(stamp.to_string()),
        };
        target.insert(name, value);
    }
}

pub trait DocumentStore: Send + Sync {
    fn create(&self, collection: &str, fields: Fields) -> StoreResult<String>;

    fn get(&self, collection: &str, id: &str) -> StoreResult<Document>;

    /// Merges `fields` into an existing document. Unnamed fields are kept.
    fn update(&self, collection: &str, id: &str, fields: Fields) -> StoreResult<()>;

    fn delete(&self, collection: &str, id: &str) -> StoreResult<()>;

    fn query(&self, collection: &str, filters: &[Filter]) -> StoreResult<Vec<Document>>;
}
