/// WRITE-THROUGH FALLBACK STORE
///
/// Wraps an optional remote store with a local in-memory copy. Every write is
/// mirrored locally; when the remote write fails the record is kept locally,
/// queued for replay and the operation still succeeds.
///
/// Queued records are replayed as whole documents at the start of the next
/// operation. Until a record has been replayed the local copy is
/// authoritative: reads return it instead of the stale remote version and
/// further updates to it stay local.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::document::{Document, Fields, Query};
use crate::error::StoreError;
use crate::memory::MemoryStore;
use crate::store::DocumentStore;

type DocKey = (String, String);

pub struct FallbackStore {
    primary: Option<Arc<dyn DocumentStore>>,
    local: MemoryStore,
    /// Records the remote store has not seen, with the version last queued
    pending: Mutex<BTreeMap<DocKey, u64>>,
    next_version: AtomicU64,
    replay_lock: tokio::sync::Mutex<()>,
}

impl FallbackStore {
    pub fn new(primary: Option<Arc<dyn DocumentStore>>) -> Self {
        FallbackStore {
            primary,
            local: MemoryStore::new(),
            pending: Mutex::new(BTreeMap::new()),
            next_version: AtomicU64::new(0),
            replay_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Local-only store
    pub fn local_only() -> Self {
        Self::new(None)
    }

    pub fn local(&self) -> &MemoryStore {
        &self.local
    }

    pub fn has_primary(&self) -> bool {
        self.primary.is_some()
    }

    /// Number of records waiting to be replayed to the remote store
    pub fn pending_writes(&self) -> usize {
        self.pending.lock().len()
    }

    /// Push queued records to the remote store. Stops at the first failure
    /// and returns how many records are still queued.
    pub async fn replay_pending(&self) -> usize {
        let primary = match &self.primary {
            Some(primary) => primary,
            None => return 0,
        };
        let _guard = match self.replay_lock.try_lock() {
            Ok(guard) => guard,
            Err(_) => return self.pending_writes(),
        };

        let queued: Vec<(DocKey, u64)> = self.pending.lock().iter().map(|(k, v)| (k.clone(), *v)).collect();
        let mut replayed = 0usize;
        for ((collection, id), version) in queued {
            let doc = match self.local.get(&collection, &id).await {
                Ok(Some(doc)) => doc,
                _ => {
                    self.clear_pending(&collection, &id, version);
                    continue;
                }
            };
            match primary.set(&collection, &id, doc.data).await {
                Ok(()) => {
                    self.clear_pending(&collection, &id, version);
                    replayed += 1;
                }
                Err(e) => {
                    debug!(collection = %collection, id = %id, error = %e, "Remote store still unavailable, replay deferred");
                    break;
                }
            }
        }

        let remaining = self.pending_writes();
        if replayed > 0 {
            info!(replayed, remaining, backend = primary.backend(), "Replayed local writes to remote store");
        }
        remaining
    }

    async fn replay_if_needed(&self) {
        if self.primary.is_some() && self.pending_writes() > 0 {
            self.replay_pending().await;
        }
    }

    fn mark_pending(&self, collection: &str, id: &str) {
        let version = self.next_version.fetch_add(1, Ordering::SeqCst);
        self.pending
            .lock()
            .insert((collection.to_string(), id.to_string()), version);
    }

    fn clear_pending(&self, collection: &str, id: &str, version: u64) {
        let mut pending = self.pending.lock();
        let key = (collection.to_string(), id.to_string());
        if pending.get(&key) == Some(&version) {
            pending.remove(&key);
        }
    }

    fn is_pending(&self, collection: &str, id: &str) -> bool {
        self.pending
            .lock()
            .contains_key(&(collection.to_string(), id.to_string()))
    }

    fn pending_ids(&self, collection: &str) -> BTreeSet<String> {
        self.pending
            .lock()
            .keys()
            .filter(|(c, _)| c == collection)
            .map(|(_, id)| id.clone())
            .collect()
    }
}

#[async_trait]
impl DocumentStore for FallbackStore {
    fn backend(&self) -> &'static str {
        match &self.primary {
            Some(_) => "fallback",
            None => self.local.backend(),
        }
    }

    async fn add(&self, collection: &str, data: Value) -> Result<String, StoreError> {
        self.replay_if_needed().await;
        if let Some(primary) = &self.primary {
            match primary.add(collection, data.clone()).await {
                Ok(id) => {
                    self.local.put(collection, &id, data);
                    return Ok(id);
                }
                Err(e) => {
                    warn!(collection, backend = primary.backend(), error = %e, "Remote write failed, keeping record locally");
                    let id = self.local.add(collection, data).await?;
                    self.mark_pending(collection, &id);
                    return Ok(id);
                }
            }
        }
        self.local.add(collection, data).await
    }

    async fn set(&self, collection: &str, id: &str, data: Value) -> Result<(), StoreError> {
        self.replay_if_needed().await;
        self.local.set(collection, id, data.clone()).await?;
        if let Some(primary) = &self.primary {
            if let Err(e) = primary.set(collection, id, data).await {
                warn!(collection, id, error = %e, "Remote write failed, keeping record locally");
                self.mark_pending(collection, id);
            }
        }
        Ok(())
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        self.replay_if_needed().await;
        if let Some(primary) = &self.primary {
            if self.is_pending(collection, id) {
                return self.local.get(collection, id).await;
            }
            match primary.get(collection, id).await {
                Ok(Some(doc)) => return Ok(Some(doc)),
                Ok(None) => {}
                Err(e) => warn!(collection, id, error = %e, "Remote read failed, using local copy"),
            }
        }
        self.local.get(collection, id).await
    }

    async fn update(&self, collection: &str, id: &str, fields: Fields) -> Result<(), StoreError> {
        self.replay_if_needed().await;
        let held_locally = self.local.contains(collection, id);
        let local_result = if held_locally {
            self.local.update(collection, id, fields.clone()).await
        } else {
            Err(StoreError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            })
        };

        let primary = match &self.primary {
            Some(primary) => primary,
            None => return local_result,
        };

        if held_locally && self.is_pending(collection, id) {
            local_result?;
            self.mark_pending(collection, id);
            return Ok(());
        }

        match primary.update(collection, id, fields).await {
            Ok(()) => Ok(()),
            Err(e) if held_locally => {
                warn!(collection, id, error = %e, "Remote update failed, local copy updated");
                local_result?;
                self.mark_pending(collection, id);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<Document>, StoreError> {
        self.replay_if_needed().await;
        let primary = match &self.primary {
            Some(primary) => primary,
            None => return self.local.query(collection, query).await,
        };

        match primary.query(collection, query).await {
            Ok(mut docs) => {
                let pending = self.pending_ids(collection);
                docs.retain(|d| !pending.contains(&d.id));
                let seen: BTreeSet<String> = docs.iter().map(|d| d.id.clone()).collect();
                let local_only = self
                    .local
                    .documents(collection)
                    .into_iter()
                    .filter(|d| !seen.contains(&d.id));
                docs.extend(local_only);
                Ok(query.apply(docs))
            }
            Err(e) => {
                warn!(collection, error = %e, "Remote query failed, using local copy");
                self.local.query(collection, query).await
            }
        }
    }
}
