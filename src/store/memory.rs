use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, Mutex, MutexGuard},
};

use serde_json::Map;
use uuid::Uuid;

use super::{
    apply_fields, matches_all, Document, DocumentStore, Fields, Filter, StoreError, StoreOp,
    StoreResult,
};
use crate::clock::Clock;

type Collection = BTreeMap<String, Map<String, serde_json::Value>>;

#[derive(Default)]
struct Inner {
    collections: HashMap<String, Collection>,
    failures: HashMap<(StoreOp, String), StoreError>,
}

/// In-process store. Nothing survives the process; used for `--ephemeral`
/// sessions and for exercising the engine against injected store failures.
pub struct MemoryStore {
    clock: Arc<dyn Clock>,
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        MemoryStore {
            clock,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Makes the next `op` against `collection` fail with `error`. One shot.
    pub fn fail_next(&self, op: StoreOp, collection: &str, error: StoreError) {
        self.lock()
            .failures
            .insert((op, collection.to_string()), error);
    }

    /// Number of documents currently held in `collection`.
    pub fn len(&self, collection: &str) -> usize {
        self.lock()
            .collections
            .get(collection)
            .map_or(0, BTreeMap::len)
    }

    pub fn is_empty(&self) -> bool {
        self.lock().collections.values().all(BTreeMap::is_empty)
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn begin(&self, op: StoreOp, collection: &str) -> StoreResult<MutexGuard<'_, Inner>> {
        let mut inner = self.lock();
        match inner.failures.remove(&(op, collection.to_string())) {
            Some(error) => Err(error),
            None => Ok(inner),
        }
    }

    fn stamp(&self) -> String {
        self.clock.now().to_rfc3339()
    }
}

impl DocumentStore for MemoryStore {
    fn create(&self, collection: &str, fields: Fields) -> StoreResult<String> {
        let stamp = self.stamp();
        let mut inner = self.begin(StoreOp::Create, collection)?;
        let id = Uuid::new_v4().simple().to_string();
        let mut body = Map::new();
        apply_fields(&mut body, fields, &stamp);
        inner
            .collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.clone(), body);
        Ok(id)
    }

    fn get(&self, collection: &str, id: &str) -> StoreResult<Document> {
        let inner = self.begin(StoreOp::Get, collection)?;
        inner
            .collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .map(|fields| Document {
                id: id.to_string(),
                fields: fields.clone(),
            })
            .ok_or_else(|| StoreError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            })
    }

    fn update(&self, collection: &str, id: &str, fields: Fields) -> StoreResult<()> {
        let stamp = self.stamp();
        let mut inner = self.begin(StoreOp::Update, collection)?;
        let body = inner
            .collections
            .get_mut(collection)
            .and_then(|docs| docs.get_mut(id))
            .ok_or_else(|| StoreError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            })?;
        apply_fields(body, fields, &stamp);
        Ok(())
    }

    fn delete(&self, collection: &str, id: &str) -> StoreResult<()> {
        let mut inner = self.begin(StoreOp::Delete, collection)?;
        if let Some(docs) = inner.collections.get_mut(collection) {
            docs.remove(id);
        }
        Ok(())
    }

    fn query(&self, collection: &str, filters: &[Filter]) -> StoreResult<Vec<Document>> {
        let inner = self.begin(StoreOp::Query, collection)?;
        let docs = match inner.collections.get(collection) {
            Some(docs) => docs,
            None => return Ok(vec![]),
        };
        Ok(docs
            .iter()
            .filter(|(_, fields)| matches_all(filters, fields))
            .map(|(id, fields)| Document {
                id: id.clone(),
                fields: fields.clone(),
            })
            .collect())
    }
}
