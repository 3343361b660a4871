/// IN-MEMORY DOCUMENT STORE
///
/// Used on its own when no remote store is configured, and as the local side
/// of the fallback store. Unordered queries return documents in insertion
/// order.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::document::{set_field, Document, Fields, Query};
use crate::error::StoreError;
use crate::store::{require_object, DocumentStore};

type Collection = BTreeMap<String, (u64, Value)>;

#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<BTreeMap<String, Collection>>,
    sequence: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_seq(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::SeqCst)
    }

    pub fn len(&self, collection: &str) -> usize {
        self.collections.read().get(collection).map_or(0, |c| c.len())
    }

    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }

    pub fn contains(&self, collection: &str, id: &str) -> bool {
        self.collections
            .read()
            .get(collection)
            .map_or(false, |c| c.contains_key(id))
    }

    /// Insert or replace, keeping the original insertion position on replace
    pub fn put(&self, collection: &str, id: &str, data: Value) {
        let seq = self.next_seq();
        let mut collections = self.collections.write();
        let docs = collections.entry(collection.to_string()).or_default();
        match docs.get_mut(id) {
            Some(entry) => entry.1 = data,
            None => {
                docs.insert(id.to_string(), (seq, data));
            }
        }
    }

    /// All documents of a collection in insertion order
    pub fn documents(&self, collection: &str) -> Vec<Document> {
        let collections = self.collections.read();
        let mut entries: Vec<(u64, Document)> = collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .map(|(id, (seq, data))| (*seq, Document::new(id.clone(), data.clone())))
                    .collect()
            })
            .unwrap_or_default();
        entries.sort_by_key(|(seq, _)| *seq);
        entries.into_iter().map(|(_, doc)| doc).collect()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn add(&self, collection: &str, data: Value) -> Result<String, StoreError> {
        require_object(&data)?;
        let id = format!("local-{}", uuid::Uuid::new_v4().simple());
        self.put(collection, &id, data);
        Ok(id)
    }

    async fn set(&self, collection: &str, id: &str, data: Value) -> Result<(), StoreError> {
        require_object(&data)?;
        self.put(collection, id, data);
        Ok(())
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        Ok(self
            .collections
            .read()
            .get(collection)
            .and_then(|docs| docs.get(id))
            .map(|(_, data)| Document::new(id, data.clone())))
    }

    async fn update(&self, collection: &str, id: &str, fields: Fields) -> Result<(), StoreError> {
        let mut collections = self.collections.write();
        let entry = collections
            .get_mut(collection)
            .and_then(|docs| docs.get_mut(id))
            .ok_or_else(|| StoreError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            })?;
        for (path, value) in fields {
            set_field(&mut entry.1, &path, value);
        }
        Ok(())
    }

    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<Document>, StoreError> {
        Ok(query.apply(self.documents(collection)))
    }
}
