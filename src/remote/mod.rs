//! Remote document store
//!
//! One document per `(collection, document_id)`. Writes use merge semantics;
//! live subscriptions yield the current snapshot first and then every change.

pub mod http;
pub mod memory;

pub use http::HttpRemoteStore;
pub use memory::MemoryRemoteStore;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::Value;

/// Stream of document snapshots; `None` means the document does not exist
pub type DocumentStream = BoxStream<'static, Result<Option<Value>, StoreError>>;

#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Read a document
    async fn get(&self, collection: &str, document_id: &str) -> Result<Option<Value>, StoreError>;

    /// Write a document, merging into whatever is already stored
    async fn set_merge(
        &self,
        collection: &str,
        document_id: &str,
        data: Value,
    ) -> Result<(), StoreError>;

    /// Write a document, replacing whatever is already stored
    async fn set(&self, collection: &str, document_id: &str, data: Value)
        -> Result<(), StoreError>;

    /// Delete a document; deleting an absent document succeeds
    async fn delete(&self, collection: &str, document_id: &str) -> Result<(), StoreError>;

    /// Open a live feed on a document
    async fn subscribe(
        &self,
        collection: &str,
        document_id: &str,
    ) -> Result<DocumentStream, StoreError>;

    /// Allow network traffic again
    async fn enable_network(&self) -> Result<(), StoreError>;

    /// Fail fast instead of waiting on network timeouts
    async fn disable_network(&self) -> Result<(), StoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Network access disabled")]
    NetworkDisabled,

    #[error("Unauthorized - sign in required")]
    Unauthorized,

    #[error("Permission denied")]
    PermissionDenied,

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Invalid response from server")]
    InvalidResponse,

    #[error("Subscription failed: {0}")]
    Subscription(String),
}

/// Merge `incoming` into `existing` the way a merge-write does.
///
/// Nested objects merge recursively; arrays and scalars replace. Fields
/// missing from `incoming` are kept.
pub fn merge_documents(existing: &mut Value, incoming: Value) {
    match (existing, incoming) {
        (Value::Object(current), Value::Object(update)) => {
            for (key, value) in update {
                let nested = value.is_object() && current.get(&key).is_some_and(Value::is_object);
                match current.get_mut(&key) {
                    Some(slot) if nested => merge_documents(slot, value),
                    _ => {
                        current.insert(key, value);
                    }
                }
            }
        }
        (slot, update) => *slot = update,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_preserves_missing_fields() {
        let mut doc = json!({"todos": [1], "userId": "u1", "extra": true});
        merge_documents(&mut doc, json!({"todos": [2, 3], "updatedAt": "t"}));

        assert_eq!(
            doc,
            json!({"todos": [2, 3], "userId": "u1", "extra": true, "updatedAt": "t"})
        );
    }

    #[test]
    fn test_merge_nested_objects() {
        let mut doc = json!({"settings": {"theme": "amber", "sound": true}});
        merge_documents(&mut doc, json!({"settings": {"theme": "green"}}));

        assert_eq!(doc, json!({"settings": {"theme": "green", "sound": true}}));
    }

    #[test]
    fn test_merge_non_object_replaces() {
        let mut doc = json!(null);
        merge_documents(&mut doc, json!({"a": 1}));
        assert_eq!(doc, json!({"a": 1}));

        let mut doc = json!({"a": 1});
        merge_documents(&mut doc, json!([1, 2]));
        assert_eq!(doc, json!([1, 2]));
    }
}
