/// DECENTRAMIND STATE
///
/// Document persistence for the accounting services. Services depend only on
/// the `DocumentStore` trait; the daemon chooses between a pure in-memory
/// store and a Firestore-backed store with local fallback.

pub mod document;
pub mod error;
pub mod fallback;
pub mod firestore;
pub mod memory;
pub mod store;

pub use document::{encode_record, Direction, Document, Fields, Query};
pub use error::StoreError;
pub use fallback::FallbackStore;
pub use firestore::{FirestoreSettings, FirestoreStore};
pub use memory::MemoryStore;
pub use store::{collections, DocumentStore};
