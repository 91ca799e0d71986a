//! searchscale-state: durable Operation State for the scaler.
//!
//! One JSON document per cluster records which scaling operation, if any,
//! is in flight. Every process consults the same document, which is how a
//! new leader discovers work its predecessor left unfinished.
//!
//! # Architecture
//!
//! ```text
//! StateManager (mutex-guarded in-memory record, per-call timeouts)
//!   └── dyn DocumentStore
//!         ├── OpenSearchStore  (HTTP, shared across processes)
//!         └── RedbStore        (embedded, on-disk or in-memory)
//! ```
//!
//! The document key is the decimal FNV-1a hash of the cluster name, so
//! every process derives the same key without coordination.

pub mod error;
pub mod key;
pub mod manager;
pub mod opensearch;
pub mod redb_store;
pub mod store;
pub mod types;

pub use error::{StateError, StateResult};
pub use key::{document_key, fnv1a_32};
pub use manager::StateManager;
pub use opensearch::OpenSearchStore;
pub use redb_store::RedbStore;
pub use store::{DocumentStore, INDEX_NAME, STATE_MAPPING};
pub use types::*;
