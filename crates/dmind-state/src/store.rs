use async_trait::async_trait;
use serde_json::Value;

use crate::document::{Document, Fields, Query};
use crate::error::StoreError;

/// Collection names shared by every backend
pub mod collections {
    pub const BURN_EVENTS: &str = "burnEvents";
    pub const BURNING_METRICS: &str = "burningMetrics";
    pub const SUBSCRIPTIONS: &str = "subscriptions";
    pub const STAKING_POSITIONS: &str = "staking_positions";
    pub const USERS: &str = "users";
}

/// **Document store abstraction**
///
/// Collections hold JSON object documents keyed by id. `add` assigns the id;
/// `set` writes a caller-chosen id. `update` merges top-level or dotted field
/// paths into an existing document and fails with `NotFound` otherwise.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Short backend name for logs
    fn backend(&self) -> &'static str;

    async fn add(&self, collection: &str, data: Value) -> Result<String, StoreError>;

    async fn set(&self, collection: &str, id: &str, data: Value) -> Result<(), StoreError>;

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError>;

    async fn update(&self, collection: &str, id: &str, fields: Fields) -> Result<(), StoreError>;

    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<Document>, StoreError>;
}

pub(crate) fn require_object(data: &Value) -> Result<(), StoreError> {
    if data.is_object() {
        Ok(())
    } else {
        Err(StoreError::InvalidDocument("document body must be a JSON object".to_string()))
    }
}
