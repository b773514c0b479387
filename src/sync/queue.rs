//! Pending-write queue
//!
//! Holds writes that could not reach the remote store, keyed by
//! `(collection, local key)` so a newer write to the same target replaces
//! the older one. The queue lives in memory only: it survives sign-out but
//! not a process restart.

use super::models::{PendingKey, PendingWrite};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// Queue statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending_count: usize,
    pub oldest_at: Option<DateTime<Utc>>,
    pub newest_at: Option<DateTime<Utc>>,
}

#[derive(Default)]
pub struct PendingQueue {
    entries: Mutex<HashMap<PendingKey, PendingWrite>>,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<PendingKey, PendingWrite>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Insert or overwrite the entry for this write's key
    pub fn upsert(&self, write: PendingWrite) {
        let key = write.key();
        log::info!("Queueing pending write {}", key);
        self.entries().insert(key, write);
    }

    pub fn remove(&self, key: &PendingKey) -> Option<PendingWrite> {
        let removed = self.entries().remove(key);
        if removed.is_some() {
            log::debug!("Removed pending write {}", key);
        }
        removed
    }

    pub fn get(&self, key: &PendingKey) -> Option<PendingWrite> {
        self.entries().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    /// Every queued write, oldest first
    pub fn snapshot(&self) -> Vec<(PendingKey, PendingWrite)> {
        let mut items: Vec<(PendingKey, PendingWrite)> = self
            .entries()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        items.sort_by(|a, b| a.1.timestamp.cmp(&b.1.timestamp).then_with(|| a.0.cmp(&b.0)));
        items
    }

    /// Drop everything; returns how many writes were discarded
    pub fn clear(&self) -> usize {
        let mut entries = self.entries();
        let count = entries.len();
        entries.clear();
        if count > 0 {
            log::info!("Discarded {} pending writes", count);
        }
        count
    }

    pub fn stats(&self) -> QueueStats {
        let entries = self.entries();
        QueueStats {
            pending_count: entries.len(),
            oldest_at: entries.values().map(|w| w.timestamp).min(),
            newest_at: entries.values().map(|w| w.timestamp).max(),
        }
    }
}
