//! The document store contract.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::StateResult;

/// Name of the index (or table) holding Operation State documents.
pub const INDEX_NAME: &str = "searchscale-state";

/// Index mapping used when the backing store supports schemas.
pub const STATE_MAPPING: &str = r#"{
  "mappings": {
    "properties": {
      "operation":  { "type": "keyword" },
      "stage":      { "type": "keyword" },
      "task_name":  { "type": "keyword" },
      "node_delta": { "type": "integer" },
      "nodes":      { "type": "keyword" },
      "started_at": { "type": "long" },
      "updated_at": { "type": "long" },
      "attempts":   { "type": "integer" },
      "last_error": { "type": "text" }
    }
  }
}"#;

/// Durable key-value document storage shared by every scaler process.
///
/// Writes overwrite unconditionally: there is no optimistic concurrency
/// check, so the last writer wins.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Create the backing index with the fixed schema if it is missing.
    ///
    /// Must succeed when the index already exists.
    async fn ensure_index(&self) -> StateResult<()>;

    /// Fetch a document. `Ok(None)` means it was never written.
    async fn get(&self, key: &str) -> StateResult<Option<Value>>;

    /// Write a document, replacing any previous version.
    async fn upsert(&self, key: &str, document: &Value) -> StateResult<()>;
}
