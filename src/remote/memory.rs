//! In-process document store
//!
//! Keeps documents in memory and fans changes out over a broadcast channel.
//! Failure injection and call counting make it the store of choice for tests
//! and offline demos.

use super::{merge_documents, DocumentStream, RemoteStore, StoreError};
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::broadcast;

const FEED_CAPACITY: usize = 64;

type DocumentKey = (String, String);

#[derive(Debug, Clone)]
enum FeedEvent {
    Change {
        collection: String,
        document_id: String,
        snapshot: Option<Value>,
    },
    Error(String),
}

pub struct MemoryRemoteStore {
    documents: Mutex<HashMap<DocumentKey, Value>>,
    feed: broadcast::Sender<FeedEvent>,
    network_enabled: AtomicBool,
    failing: AtomicBool,
    calls: AtomicUsize,
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        let (feed, _) = broadcast::channel(FEED_CAPACITY);
        Self {
            documents: Mutex::new(HashMap::new()),
            feed,
            network_enabled: AtomicBool::new(true),
            failing: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        }
    }

    /// Make every data operation fail until switched back
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Relaxed);
    }

    /// Number of data operations attempted (get/set/delete/subscribe)
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    pub fn is_network_enabled(&self) -> bool {
        self.network_enabled.load(Ordering::Relaxed)
    }

    /// Read a document without counting it as a client call
    pub fn document(&self, collection: &str, document_id: &str) -> Option<Value> {
        self.documents()
            .get(&(collection.to_string(), document_id.to_string()))
            .cloned()
    }

    /// Seed a document directly, notifying subscribers
    pub fn insert_document(&self, collection: &str, document_id: &str, data: Value) {
        self.documents()
            .insert((collection.to_string(), document_id.to_string()), data.clone());
        self.publish(collection, document_id, Some(data));
    }

    /// Push an error to every open subscription and end them
    pub fn break_subscriptions(&self, reason: &str) {
        let _ = self.feed.send(FeedEvent::Error(reason.to_string()));
    }

    fn documents(&self) -> MutexGuard<'_, HashMap<DocumentKey, Value>> {
        self.documents.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check(&self) -> Result<(), StoreError> {
        self.calls.fetch_add(1, Ordering::Relaxed);

        if !self.is_network_enabled() {
            return Err(StoreError::NetworkDisabled);
        }
        if self.failing.load(Ordering::Relaxed) {
            return Err(StoreError::NetworkError("simulated outage".to_string()));
        }
        Ok(())
    }

    fn publish(&self, collection: &str, document_id: &str, snapshot: Option<Value>) {
        // No receivers is fine
        let _ = self.feed.send(FeedEvent::Change {
            collection: collection.to_string(),
            document_id: document_id.to_string(),
            snapshot,
        });
    }
}

impl Default for MemoryRemoteStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn get(&self, collection: &str, document_id: &str) -> Result<Option<Value>, StoreError> {
        self.check()?;
        Ok(self.document(collection, document_id))
    }

    async fn set_merge(
        &self,
        collection: &str,
        document_id: &str,
        data: Value,
    ) -> Result<(), StoreError> {
        self.check()?;

        let snapshot = {
            let mut documents = self.documents();
            let slot = documents
                .entry((collection.to_string(), document_id.to_string()))
                .or_insert(Value::Null);
            merge_documents(slot, data);
            slot.clone()
        };

        self.publish(collection, document_id, Some(snapshot));
        Ok(())
    }

    async fn set(&self, collection: &str, document_id: &str, data: Value) -> Result<(), StoreError> {
        self.check()?;

        self.documents()
            .insert((collection.to_string(), document_id.to_string()), data.clone());
        self.publish(collection, document_id, Some(data));
        Ok(())
    }

    async fn delete(&self, collection: &str, document_id: &str) -> Result<(), StoreError> {
        self.check()?;

        let removed = self
            .documents()
            .remove(&(collection.to_string(), document_id.to_string()));
        if removed.is_some() {
            self.publish(collection, document_id, None);
        }
        Ok(())
    }

    async fn subscribe(
        &self,
        collection: &str,
        document_id: &str,
    ) -> Result<DocumentStream, StoreError> {
        self.check()?;

        // Subscribe before reading so no change slips between the two
        let rx = self.feed.subscribe();
        let initial = self.document(collection, document_id);

        let collection = collection.to_string();
        let document_id = document_id.to_string();

        let updates = futures::stream::unfold(Some(rx), move |state| {
            let collection = collection.clone();
            let document_id = document_id.clone();
            async move {
                let mut rx = state?;
                loop {
                    match rx.recv().await {
                        Ok(FeedEvent::Change {
                            collection: changed,
                            document_id: changed_id,
                            snapshot,
                        }) => {
                            if changed == collection && changed_id == document_id {
                                return Some((Ok(snapshot), Some(rx)));
                            }
                        }
                        Ok(FeedEvent::Error(reason)) => {
                            return Some((Err(StoreError::Subscription(reason)), None));
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            log::warn!("Subscription lagged, skipped {} changes", skipped);
                        }
                        Err(broadcast::error::RecvError::Closed) => return None,
                    }
                }
            }
        });

        Ok(futures::stream::once(async move { Ok(initial) })
            .chain(updates)
            .boxed())
    }

    async fn enable_network(&self) -> Result<(), StoreError> {
        self.network_enabled.store(true, Ordering::Relaxed);
        Ok(())
    }

    async fn disable_network(&self) -> Result<(), StoreError> {
        self.network_enabled.store(false, Ordering::Relaxed);
        Ok(())
    }
}
