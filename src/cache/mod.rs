//! Local cache module - device-side key/value persistence
//!
//! Provides the synchronous store the sync engine falls back to whenever the
//! remote document store cannot be reached:
//! - `SqliteCache`: durable, survives restarts, with an in-memory hot layer
//! - `MemoryCache`: process-local, for tests and throwaway sessions

use crate::db::{Database, DbError};
use moka::sync::Cache;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Local cache errors. These are never downgraded by the sync engine.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Local cache unavailable: {0}")]
    Unavailable(String),
}

pub type CacheResult<T> = Result<T, CacheError>;

/// Synchronous key/value persistence on the client device
pub trait LocalCache: Send + Sync {
    /// Read a value, `None` when absent
    fn get(&self, key: &str) -> CacheResult<Option<Value>>;

    /// Write (insert or replace) a value
    fn set(&self, key: &str, value: &Value) -> CacheResult<()>;

    /// Remove a value; absent keys are not an error
    fn remove(&self, key: &str) -> CacheResult<()>;

    /// Read a value or fall back to `default`
    fn get_or(&self, key: &str, default: Value) -> CacheResult<Value> {
        Ok(self.get(key)?.unwrap_or(default))
    }
}

/// Hot layer configuration for `SqliteCache`
pub struct CacheConfig {
    /// Maximum number of values kept in memory
    pub max_capacity: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { max_capacity: 256 }
    }
}

// ============================================================================
// SQLite-backed cache
// ============================================================================

/// Durable local cache: SQLite underneath, moka in front
#[derive(Clone)]
pub struct SqliteCache {
    db: Database,
    hot: Cache<String, Value>,
    hits: Arc<AtomicU64>,
    misses: Arc<AtomicU64>,
}

impl SqliteCache {
    /// Open the cache file at `path`
    pub fn open(path: &Path) -> CacheResult<Self> {
        Ok(Self::with_database(Database::new(path)?, CacheConfig::default()))
    }

    /// Ephemeral SQLite cache (for testing)
    pub fn in_memory() -> CacheResult<Self> {
        Ok(Self::with_database(
            Database::in_memory()?,
            CacheConfig::default(),
        ))
    }

    pub fn with_database(db: Database, config: CacheConfig) -> Self {
        Self {
            db,
            hot: Cache::builder().max_capacity(config.max_capacity).build(),
            hits: Arc::new(AtomicU64::new(0)),
            misses: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Get hot layer statistics
    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total_requests = hits + misses;
        let hit_rate = if total_requests > 0 {
            (hits as f64 / total_requests as f64) * 100.0
        } else {
            0.0
        };

        CacheStats {
            hits,
            misses,
            total_requests,
            hit_rate,
            entry_count: self.hot.entry_count(),
        }
    }

    /// Reset hot layer statistics
    pub fn reset_stats(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }
}

impl LocalCache for SqliteCache {
    fn get(&self, key: &str) -> CacheResult<Option<Value>> {
        if let Some(value) = self.hot.get(key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Some(value));
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        let value: Option<Value> = self.db.get_value(key)?;
        if let Some(value) = &value {
            self.hot.insert(key.to_string(), value.clone());
        }
        Ok(value)
    }

    fn set(&self, key: &str, value: &Value) -> CacheResult<()> {
        self.db.set_value(key, value)?;
        self.hot.insert(key.to_string(), value.clone());
        Ok(())
    }

    fn remove(&self, key: &str) -> CacheResult<()> {
        self.db.delete_value(key)?;
        self.hot.invalidate(key);
        Ok(())
    }
}

/// Cache statistics
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CacheStats {
    /// Number of hot layer hits
    pub hits: u64,

    /// Number of hot layer misses (served from SQLite or absent)
    pub misses: u64,

    /// Total cache requests
    pub total_requests: u64,

    /// Hit rate (percentage)
    pub hit_rate: f64,

    /// Number of entries in the hot layer
    pub entry_count: u64,
}

// ============================================================================
// In-memory cache
// ============================================================================

/// Process-local cache with an optional failure switch
#[derive(Default)]
pub struct MemoryCache {
    values: Mutex<HashMap<String, Value>>,
    failing: AtomicBool,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent operation fail (simulates a broken device store)
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Relaxed);
    }

    fn check(&self) -> CacheResult<()> {
        if self.failing.load(Ordering::Relaxed) {
            Err(CacheError::Unavailable("memory cache disabled".to_string()))
        } else {
            Ok(())
        }
    }

    fn values(&self) -> std::sync::MutexGuard<'_, HashMap<String, Value>> {
        self.values.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl LocalCache for MemoryCache {
    fn get(&self, key: &str) -> CacheResult<Option<Value>> {
        self.check()?;
        Ok(self.values().get(key).cloned())
    }

    fn set(&self, key: &str, value: &Value) -> CacheResult<()> {
        self.check()?;
        self.values().insert(key.to_string(), value.clone());
        Ok(())
    }

    fn remove(&self, key: &str) -> CacheResult<()> {
        self.check()?;
        self.values().remove(key);
        Ok(())
    }
}
