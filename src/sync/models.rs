//! Sync Data Models
//!
//! Collections, pending writes, status and the report types returned by
//! batch operations.
//!
//! Collections:
//! - Activities, Notes, Todos: array-valued, merged item by item
//! - Schedule, Settings, UserProfile: object-valued, last write wins

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

// ============================================================================
// Collections
// ============================================================================

/// Local cache key holding the last signed-in user snapshot
pub const LAST_USER_KEY: &str = "retrodesk_last_user";

/// Local cache key holding the migration-complete marker
pub const MIGRATION_MARKER_KEY: &str = "retrodesk_migration_complete";

/// Typed collections known to the sync engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Collection {
    Activities,
    Notes,
    Todos,
    Schedule,
    Settings,
    UserProfile,
}

/// Expected payload shape of a collection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    List,
    Map,
}

impl Collection {
    pub const ALL: [Collection; 6] = [
        Collection::Activities,
        Collection::Notes,
        Collection::Todos,
        Collection::Schedule,
        Collection::Settings,
        Collection::UserProfile,
    ];

    /// Array-valued collections, the only ones eligible for item merging
    pub const LISTS: [Collection; 3] = [
        Collection::Activities,
        Collection::Notes,
        Collection::Todos,
    ];

    /// Remote collection name
    pub fn name(&self) -> &'static str {
        match self {
            Collection::Activities => "activities",
            Collection::Notes => "notes",
            Collection::Todos => "todos",
            Collection::Schedule => "schedules",
            Collection::Settings => "settings",
            Collection::UserProfile => "profiles",
        }
    }

    /// Local cache key
    pub fn local_key(&self) -> &'static str {
        match self {
            Collection::Activities => "activities",
            Collection::Notes => "notes",
            Collection::Todos => "todos",
            Collection::Schedule => "schedule",
            Collection::Settings => "retrodesk_settings",
            Collection::UserProfile => "retrodesk_user_profile",
        }
    }

    /// Field of the stored document that carries the payload
    pub fn field(&self) -> &'static str {
        match self {
            Collection::Activities => "activities",
            Collection::Notes => "notes",
            Collection::Todos => "todos",
            Collection::Schedule => "schedule",
            Collection::Settings => "settings",
            Collection::UserProfile => "profile",
        }
    }

    pub fn shape(&self) -> Shape {
        match self {
            Collection::Activities | Collection::Notes | Collection::Todos => Shape::List,
            Collection::Schedule | Collection::Settings | Collection::UserProfile => Shape::Map,
        }
    }

    pub fn empty_value(&self) -> Value {
        match self.shape() {
            Shape::List => Value::Array(Vec::new()),
            Shape::Map => Value::Object(Map::new()),
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Every local cache key the engine writes
pub fn all_local_keys() -> Vec<&'static str> {
    let mut keys: Vec<&'static str> = Collection::ALL.iter().map(|c| c.local_key()).collect();
    keys.push(LAST_USER_KEY);
    keys.push(MIGRATION_MARKER_KEY);
    keys
}

// ============================================================================
// Writes
// ============================================================================

/// Options accepted by `SyncEngine::save`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveOptions {
    /// Merge into the existing remote document instead of replacing it
    pub merge: bool,

    /// Local cache key mirroring the written data
    pub local_key: Option<String>,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            merge: true,
            local_key: None,
        }
    }
}

impl SaveOptions {
    /// Merge write mirrored under `key`
    pub fn local(key: impl Into<String>) -> Self {
        Self {
            merge: true,
            local_key: Some(key.into()),
        }
    }
}

/// Identity of a pending write: collection plus local cache key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingKey {
    pub collection: String,
    pub local_key: Option<String>,
}

impl PendingKey {
    pub fn new(collection: &str, local_key: Option<&str>) -> Self {
        Self {
            collection: collection.to_string(),
            local_key: local_key.map(str::to_string),
        }
    }
}

impl fmt::Display for PendingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}",
            self.collection,
            self.local_key.as_deref().unwrap_or("")
        )
    }
}

/// A write that has not reached the remote store yet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingWrite {
    pub collection: String,
    pub data: Value,
    /// When the write was captured
    pub timestamp: DateTime<Utc>,
    pub options: SaveOptions,
}

impl PendingWrite {
    pub fn new(collection: &str, data: Value, options: SaveOptions) -> Self {
        Self {
            collection: collection.to_string(),
            data,
            timestamp: Utc::now(),
            options,
        }
    }

    pub fn key(&self) -> PendingKey {
        PendingKey::new(&self.collection, self.options.local_key.as_deref())
    }
}

// ============================================================================
// Status & bundles
// ============================================================================

/// Derived sync status, computed on demand
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub is_online: bool,
    pub cloud_available: bool,
    pub pending_count: usize,
    pub has_user: bool,
    pub remote_configured: bool,
}

/// User data for import and batch saves; absent fields are left alone
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserDataBundle {
    pub activities: Option<Vec<Value>>,
    pub notes: Option<Vec<Value>>,
    pub todos: Option<Vec<Value>>,
    pub schedule: Option<Value>,
    pub settings: Option<Value>,
    pub user_profile: Option<Value>,
}

impl UserDataBundle {
    /// Present collections with their payloads
    pub fn entries(&self) -> Vec<(Collection, Value)> {
        let lists = [
            (Collection::Activities, &self.activities),
            (Collection::Notes, &self.notes),
            (Collection::Todos, &self.todos),
        ];
        let maps = [
            (Collection::Schedule, &self.schedule),
            (Collection::Settings, &self.settings),
            (Collection::UserProfile, &self.user_profile),
        ];

        let mut entries: Vec<(Collection, Value)> = lists
            .into_iter()
            .filter_map(|(c, items)| items.as_ref().map(|items| (c, Value::Array(items.clone()))))
            .collect();
        entries.extend(
            maps.into_iter()
                .filter_map(|(c, value)| value.as_ref().map(|value| (c, value.clone()))),
        );
        entries
    }

    /// Total number of list items across activities, notes and todos
    pub fn item_count(&self) -> usize {
        [&self.activities, &self.notes, &self.todos]
            .iter()
            .map(|items| items.as_ref().map_or(0, Vec::len))
            .sum()
    }
}

/// Snapshot produced by `SyncEngine::export_user_data`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportBundle {
    pub version: String,
    pub exported_at: DateTime<Utc>,
    pub user_id: Option<String>,
    pub activities: Vec<Value>,
    pub notes: Vec<Value>,
    pub todos: Vec<Value>,
    pub schedule: Value,
    pub settings: Value,
    pub user_profile: Value,
}

pub const EXPORT_VERSION: &str = "1.0";

/// Marker stamped once local data has been migrated to the cloud
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationMarker {
    pub completed_at: DateTime<Utc>,
    pub collections_migrated: usize,
    pub items_migrated: usize,
}

// ============================================================================
// Reports
// ============================================================================

/// Outcome counts of a batch of independent operations
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    pub succeeded: usize,
    pub failed: usize,
}

impl BatchReport {
    pub fn record(&mut self, success: bool) {
        if success {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
    }

    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    pub fn has_any_success(&self) -> bool {
        self.succeeded > 0
    }
}

/// Result of flushing the pending-write queue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlushReport {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationReport {
    /// Marker stamped (at least one collection reached the cloud)
    pub completed: bool,
    /// Not reachable, nothing attempted
    pub skipped: bool,
    pub collections: BatchReport,
    pub items_migrated: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForceSyncReport {
    pub skipped: bool,
    pub flush: FlushReport,
    pub collections_merged: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearReport {
    pub remote: BatchReport,
    pub local_keys_removed: usize,
    pub pending_discarded: usize,
}

// ============================================================================
// Tests
// ============================================================================
