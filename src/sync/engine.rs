//! Sync Engine - routes reads and writes between the local cache and the cloud
//!
//! Handles:
//! - Reachability routing (remote configured + user set + online)
//! - Pending-write queue and flush on reconnect / sign-in
//! - Item-level merge of divergent local and cloud copies
//! - Live subscriptions with local fallback
//! - Migration, export/import and account data removal
//!
//! Remote failures never reach the caller of `save`/`load`/`subscribe_*`;
//! they degrade to the local cache. Local cache failures always propagate.

use super::merge::intelligent_merge;
use super::models::{
    all_local_keys, BatchReport, ClearReport, Collection, ExportBundle, FlushReport,
    ForceSyncReport, MigrationMarker, MigrationReport, PendingKey, PendingWrite, SaveOptions,
    Shape, SyncStatus, UserDataBundle, EXPORT_VERSION, LAST_USER_KEY, MIGRATION_MARKER_KEY,
};
use super::queue::PendingQueue;
use super::schema;
use crate::cache::{CacheConfig, CacheError, LocalCache, SqliteCache};
use crate::config::{ConfigError, SyncConfig};
use crate::connectivity::ConnectivityMonitor;
use crate::db::{Database, DbError};
use crate::remote::{HttpRemoteStore, RemoteStore, StoreError};
use crate::session::{SessionHandle, User};
use chrono::Utc;
use futures::future::join_all;
use futures::StreamExt;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use tokio::task::{AbortHandle, JoinHandle};

/// How a single write ended up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SaveOutcome {
    /// Reached the remote store
    Remote,
    /// Not reachable; kept locally and queued
    Local,
    /// Remote write failed; kept locally and queued
    RemoteFailed,
}

/// Handle to a live collection feed
#[derive(Debug)]
pub struct Subscription {
    handle: Option<AbortHandle>,
}

impl Subscription {
    fn inactive() -> Self {
        Self { handle: None }
    }

    /// Whether a remote feed is still delivering updates
    pub fn is_live(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    pub fn unsubscribe(self) {
        if let Some(handle) = self.handle {
            handle.abort();
        }
    }
}

/// Sync engine - main orchestrator
#[derive(Clone)]
pub struct SyncEngine {
    cache: Arc<dyn LocalCache>,
    remote: Option<Arc<dyn RemoteStore>>,
    user: Arc<RwLock<Option<User>>>,
    online: Arc<AtomicBool>,
    queue: Arc<PendingQueue>,
    subscriptions: Arc<Mutex<HashMap<Collection, AbortHandle>>>,
}

impl SyncEngine {
    /// Create an engine; `remote: None` means the cloud is not configured
    pub fn new(cache: Arc<dyn LocalCache>, remote: Option<Arc<dyn RemoteStore>>) -> Self {
        Self {
            cache,
            remote,
            user: Arc::new(RwLock::new(None)),
            online: Arc::new(AtomicBool::new(true)),
            queue: Arc::new(PendingQueue::new()),
            subscriptions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Build the durable cache and (when a URL is set) the HTTP store
    pub fn from_config(config: &SyncConfig) -> Result<Self, SyncError> {
        let db = Database::new(&config.cache_path)?;
        let cache = SqliteCache::with_database(
            db,
            CacheConfig {
                max_capacity: config.hot_cache_capacity,
            },
        );

        let remote: Option<Arc<dyn RemoteStore>> = match &config.remote_url {
            Some(url) => {
                let mut store = HttpRemoteStore::new(
                    url.clone(),
                    config.request_timeout(),
                    config.poll_interval(),
                )?;
                if let Some(token) = &config.api_token {
                    store = store.with_token(token.clone());
                }
                Some(Arc::new(store) as Arc<dyn RemoteStore>)
            }
            None => {
                log::info!("No remote store configured, running local-only");
                None
            }
        };

        Ok(Self::new(Arc::new(cache), remote))
    }

    // ========================================================================
    // Session & reachability
    // ========================================================================

    pub fn current_user(&self) -> Option<User> {
        self.user.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Set or clear the active user. Signing in flushes pending writes;
    /// signing out keeps them queued for the next sign-in. Any change of
    /// identity closes every live feed opened for the previous user.
    pub async fn set_current_user(&self, user: Option<User>) -> Result<FlushReport, SyncError> {
        let previous = std::mem::replace(
            &mut *self.user.write().unwrap_or_else(|e| e.into_inner()),
            user.clone(),
        );
        if previous.as_ref().map(|u| &u.id) != user.as_ref().map(|u| &u.id) {
            self.unsubscribe_all();
        }

        let Some(user) = user else {
            log::info!("User cleared, {} pending writes kept", self.queue.len());
            return Ok(FlushReport::default());
        };

        log::info!("User set: {}", user.id);
        let snapshot = serde_json::to_value(&user).map_err(CacheError::from)?;
        self.cache.set(LAST_USER_KEY, &snapshot)?;

        self.flush_pending().await
    }

    /// Last user seen signed in on this device, if any
    pub fn last_signed_in_user(&self) -> Result<Option<User>, SyncError> {
        let Some(raw) = self.cache.get(LAST_USER_KEY)? else {
            return Ok(None);
        };
        match serde_json::from_value(raw) {
            Ok(user) => Ok(Some(user)),
            Err(e) => {
                log::warn!("Ignoring malformed last-user snapshot: {}", e);
                Ok(None)
            }
        }
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    pub fn remote_configured(&self) -> bool {
        self.remote.is_some()
    }

    /// Remote configured, user set and online
    pub fn is_reachable(&self) -> bool {
        self.reachable_user().is_some()
    }

    fn reachable_user(&self) -> Option<(Arc<dyn RemoteStore>, String)> {
        let remote = self.remote.as_ref()?;
        if !self.is_online() {
            return None;
        }
        let user = self.current_user()?;
        Some((remote.clone(), user.id))
    }

    /// Network came back: re-enable the store and flush
    pub async fn handle_online(&self) -> Result<FlushReport, SyncError> {
        self.online.store(true, Ordering::SeqCst);
        if let Some(remote) = &self.remote {
            if let Err(e) = remote.enable_network().await {
                log::warn!("Failed to re-enable remote network: {}", e);
            }
        }
        self.flush_pending().await
    }

    /// Network lost: make remote calls fail fast
    pub async fn handle_offline(&self) {
        self.online.store(false, Ordering::SeqCst);
        if let Some(remote) = &self.remote {
            if let Err(e) = remote.disable_network().await {
                log::warn!("Failed to disable remote network: {}", e);
            }
        }
    }

    /// Follow a connectivity monitor until it is dropped
    pub fn watch_connectivity(&self, monitor: &ConnectivityMonitor) -> JoinHandle<()> {
        let engine = self.clone();
        let mut rx = monitor.subscribe();

        tokio::spawn(async move {
            let initially_online = *rx.borrow_and_update();
            if !initially_online {
                engine.handle_offline().await;
            }

            while rx.changed().await.is_ok() {
                let online = *rx.borrow_and_update();
                if online {
                    match engine.handle_online().await {
                        Ok(report) if report.attempted > 0 => log::info!(
                            "Reconnected: flushed {}/{} pending writes",
                            report.succeeded,
                            report.attempted
                        ),
                        Ok(_) => {}
                        Err(e) => log::error!("Flush after reconnect failed: {}", e),
                    }
                } else {
                    engine.handle_offline().await;
                }
            }
        })
    }

    /// Follow a session handle until it is dropped
    pub fn watch_session(&self, session: &SessionHandle) -> JoinHandle<()> {
        let engine = self.clone();
        let mut rx = session.subscribe();

        tokio::spawn(async move {
            loop {
                // Only the latest value is kept; a sign-out followed by a
                // sign-in may arrive as a single change
                let user = rx.borrow_and_update().clone();

                if let Err(e) = engine.set_current_user(user).await {
                    log::error!("Failed to apply session change: {}", e);
                }

                if rx.changed().await.is_err() {
                    break;
                }
            }
        })
    }

    // ========================================================================
    // Save / load
    // ========================================================================

    /// Write `data` to `collection`.
    ///
    /// Returns whether the write left the device: `true` when it reached the
    /// remote store or when the remote was simply unreachable (kept locally
    /// and queued), `false` when the remote write failed.
    pub async fn save(
        &self,
        collection: &str,
        data: Value,
        options: SaveOptions,
    ) -> Result<bool, SyncError> {
        let outcome = self.save_inner(collection, data, options).await?;
        Ok(outcome != SaveOutcome::RemoteFailed)
    }

    async fn save_inner(
        &self,
        collection: &str,
        data: Value,
        options: SaveOptions,
    ) -> Result<SaveOutcome, SyncError> {
        let Some((remote, user_id)) = self.reachable_user() else {
            self.persist_locally(collection, data, options)?;
            return Ok(SaveOutcome::Local);
        };

        let document = remote_document(&data, &user_id);
        let result = if options.merge {
            remote.set_merge(collection, &user_id, document).await
        } else {
            remote.set(collection, &user_id, document).await
        };

        match result {
            Ok(()) => {
                if let Some(key) = &options.local_key {
                    self.cache.set(key, &data)?;
                }
                self.queue
                    .remove(&PendingKey::new(collection, options.local_key.as_deref()));
                log::debug!("Saved {} for {}", collection, user_id);
                Ok(SaveOutcome::Remote)
            }
            Err(e) => {
                log::warn!("Remote save of {} failed, keeping locally: {}", collection, e);
                self.persist_locally(collection, data, options)?;
                Ok(SaveOutcome::RemoteFailed)
            }
        }
    }

    fn persist_locally(
        &self,
        collection: &str,
        data: Value,
        options: SaveOptions,
    ) -> Result<(), SyncError> {
        if let Some(key) = &options.local_key {
            self.cache.set(key, &data)?;
        }
        self.queue.upsert(PendingWrite::new(collection, data, options));
        Ok(())
    }

    /// Read `collection`, preferring the cloud and refreshing the cache
    pub async fn load(
        &self,
        collection: &str,
        local_key: &str,
        default: Value,
    ) -> Result<Value, SyncError> {
        if let Some((remote, user_id)) = self.reachable_user() {
            match remote.get(collection, &user_id).await {
                Ok(Some(document)) => {
                    self.cache.set(local_key, &document)?;
                    return Ok(document);
                }
                Ok(None) => log::debug!("No remote {} for {}", collection, user_id),
                Err(e) => log::warn!("Remote load of {} failed, using cache: {}", collection, e),
            }
        }

        Ok(self.cache.get_or(local_key, default)?)
    }

    async fn save_typed(&self, collection: Collection, payload: Value) -> Result<bool, SyncError> {
        self.save(
            collection.name(),
            schema::wrap(collection, payload),
            SaveOptions::local(collection.local_key()),
        )
        .await
    }

    async fn load_typed(&self, collection: Collection) -> Result<Value, SyncError> {
        let raw = self
            .load(collection.name(), collection.local_key(), Value::Null)
            .await?;
        Ok(schema::normalize_or_empty(collection, &raw))
    }

    async fn load_list(&self, collection: Collection) -> Result<Vec<Value>, SyncError> {
        match self.load_typed(collection).await? {
            Value::Array(items) => Ok(items),
            _ => Ok(Vec::new()),
        }
    }

    pub async fn save_activities(&self, activities: Vec<Value>) -> Result<bool, SyncError> {
        self.save_typed(Collection::Activities, Value::Array(activities))
            .await
    }

    pub async fn load_activities(&self) -> Result<Vec<Value>, SyncError> {
        self.load_list(Collection::Activities).await
    }

    pub async fn save_notes(&self, notes: Vec<Value>) -> Result<bool, SyncError> {
        self.save_typed(Collection::Notes, Value::Array(notes)).await
    }

    pub async fn load_notes(&self) -> Result<Vec<Value>, SyncError> {
        self.load_list(Collection::Notes).await
    }

    pub async fn save_todos(&self, todos: Vec<Value>) -> Result<bool, SyncError> {
        self.save_typed(Collection::Todos, Value::Array(todos)).await
    }

    pub async fn load_todos(&self) -> Result<Vec<Value>, SyncError> {
        self.load_list(Collection::Todos).await
    }

    pub async fn save_schedule(&self, schedule: Value) -> Result<bool, SyncError> {
        self.save_typed(Collection::Schedule, schedule).await
    }

    pub async fn load_schedule(&self) -> Result<Value, SyncError> {
        self.load_typed(Collection::Schedule).await
    }

    pub async fn save_settings(&self, settings: Value) -> Result<bool, SyncError> {
        self.save_typed(Collection::Settings, settings).await
    }

    pub async fn load_settings(&self) -> Result<Value, SyncError> {
        self.load_typed(Collection::Settings).await
    }

    pub async fn save_user_profile(&self, profile: Value) -> Result<bool, SyncError> {
        self.save_typed(Collection::UserProfile, profile).await
    }

    pub async fn load_user_profile(&self) -> Result<Value, SyncError> {
        self.load_typed(Collection::UserProfile).await
    }

    // ========================================================================
    // Pending queue
    // ========================================================================

    /// Retry every queued write. Entries run concurrently and fail
    /// independently; failures stay queued.
    pub async fn flush_pending(&self) -> Result<FlushReport, SyncError> {
        if !self.is_reachable() || self.queue.is_empty() {
            return Ok(FlushReport::default());
        }

        let entries = self.queue.snapshot();
        log::info!("Flushing {} pending writes", entries.len());

        let results = join_all(entries.into_iter().map(|(key, write)| async move {
            let result = self
                .save_inner(&write.collection, write.data, write.options)
                .await;
            (key, result)
        }))
        .await;

        let mut report = FlushReport {
            attempted: results.len(),
            ..FlushReport::default()
        };
        let mut first_error = None;

        for (key, result) in results {
            match result {
                Ok(SaveOutcome::Remote) => report.succeeded += 1,
                Ok(_) => {
                    log::warn!("Pending write {} still queued", key);
                    report.failed += 1;
                }
                Err(e) => {
                    log::error!("Pending write {} failed locally: {}", key, e);
                    report.failed += 1;
                    first_error.get_or_insert(e);
                }
            }
        }

        log::info!(
            "Flush complete: {} succeeded, {} failed",
            report.succeeded,
            report.failed
        );

        match first_error {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }

    /// Queued writes, oldest first
    pub fn pending_writes(&self) -> Vec<PendingWrite> {
        self.queue
            .snapshot()
            .into_iter()
            .map(|(_, write)| write)
            .collect()
    }

    pub fn pending_count(&self) -> usize {
        self.queue.len()
    }

    // ========================================================================
    // Merge
    // ========================================================================

    /// Merge the cloud and local copies of a list collection, persist the
    /// result on both sides and return it. When not reachable the local value
    /// is returned untouched.
    pub async fn merge_data_sources(
        &self,
        collection: &str,
        local_key: &str,
    ) -> Result<Value, SyncError> {
        let local = self
            .cache
            .get(local_key)?
            .unwrap_or_else(|| Value::Array(Vec::new()));

        let Some((remote, user_id)) = self.reachable_user() else {
            return Ok(local);
        };

        let cloud = match remote.get(collection, &user_id).await {
            Ok(document) => document.unwrap_or(Value::Null),
            Err(e) => {
                log::warn!("Cannot merge {}, cloud read failed: {}", collection, e);
                return Ok(local);
            }
        };

        let merged = intelligent_merge(&cloud, &local, collection);

        let mut document = Map::new();
        document.insert(collection.to_string(), merged.clone());
        self.save_inner(collection, Value::Object(document), SaveOptions::local(local_key))
            .await?;

        Ok(merged)
    }

    /// Flush, then merge every list collection
    pub async fn force_sync_all(&self) -> Result<ForceSyncReport, SyncError> {
        if !self.is_reachable() {
            log::info!("Force sync skipped, cloud not reachable");
            return Ok(ForceSyncReport {
                skipped: true,
                ..ForceSyncReport::default()
            });
        }

        let flush = self.flush_pending().await?;

        let mut collections_merged = 0;
        for collection in Collection::LISTS {
            self.merge_data_sources(collection.name(), collection.local_key())
                .await?;
            collections_merged += 1;
        }

        Ok(ForceSyncReport {
            skipped: false,
            flush,
            collections_merged,
        })
    }

    // ========================================================================
    // Subscriptions
    // ========================================================================

    pub async fn subscribe_to_activities<F>(&self, callback: F) -> Result<Subscription, SyncError>
    where
        F: Fn(Vec<Value>) + Send + Sync + 'static,
    {
        self.subscribe(Collection::Activities, callback).await
    }

    pub async fn subscribe_to_notes<F>(&self, callback: F) -> Result<Subscription, SyncError>
    where
        F: Fn(Vec<Value>) + Send + Sync + 'static,
    {
        self.subscribe(Collection::Notes, callback).await
    }

    pub async fn subscribe_to_todos<F>(&self, callback: F) -> Result<Subscription, SyncError>
    where
        F: Fn(Vec<Value>) + Send + Sync + 'static,
    {
        self.subscribe(Collection::Todos, callback).await
    }

    async fn subscribe<F>(&self, collection: Collection, callback: F) -> Result<Subscription, SyncError>
    where
        F: Fn(Vec<Value>) + Send + Sync + 'static,
    {
        // At most one live feed per collection
        if let Some(previous) = self.subscriptions().remove(&collection) {
            log::debug!("Closing previous {} subscription", collection);
            previous.abort();
        }

        let Some((remote, user_id)) = self.reachable_user() else {
            callback(self.cached_items(collection)?);
            return Ok(Subscription::inactive());
        };

        let mut stream = match remote.subscribe(collection.name(), &user_id).await {
            Ok(stream) => stream,
            Err(e) => {
                log::warn!("Cannot subscribe to {}, using cache: {}", collection, e);
                callback(self.cached_items(collection)?);
                return Ok(Subscription::inactive());
            }
        };

        let cache = self.cache.clone();
        let task = tokio::spawn(async move {
            while let Some(event) = stream.next().await {
                match event {
                    Ok(Some(document)) => {
                        if let Err(e) = cache.set(collection.local_key(), &document) {
                            log::error!("Failed to cache {} update: {}", collection, e);
                        }
                        callback(schema::list_items(collection, &document));
                    }
                    Ok(None) => callback(cached_items_or_empty(cache.as_ref(), collection)),
                    Err(e) => {
                        log::warn!("{} subscription failed, using cache: {}", collection, e);
                        callback(cached_items_or_empty(cache.as_ref(), collection));
                        break;
                    }
                }
            }
        });

        if let Some(previous) = self
            .subscriptions()
            .insert(collection, task.abort_handle())
        {
            previous.abort();
        }

        Ok(Subscription {
            handle: Some(task.abort_handle()),
        })
    }

    /// Tear down every live feed
    pub fn unsubscribe_all(&self) {
        let handles: Vec<AbortHandle> = self.subscriptions().drain().map(|(_, h)| h).collect();
        if !handles.is_empty() {
            log::info!("Closing {} subscriptions", handles.len());
        }
        for handle in handles {
            handle.abort();
        }
    }

    pub fn active_subscriptions(&self) -> usize {
        self.subscriptions()
            .values()
            .filter(|h| !h.is_finished())
            .count()
    }

    fn subscriptions(&self) -> MutexGuard<'_, HashMap<Collection, AbortHandle>> {
        self.subscriptions.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn cached_items(&self, collection: Collection) -> Result<Vec<Value>, SyncError> {
        let raw = self.cache.get_or(collection.local_key(), Value::Null)?;
        Ok(schema::list_items(collection, &raw))
    }

    // ========================================================================
    // Migration
    // ========================================================================

    /// Signed in, never migrated, and some list collection has local items
    pub fn needs_migration(&self) -> Result<bool, SyncError> {
        if self.current_user().is_none() {
            return Ok(false);
        }
        if self.cache.get(MIGRATION_MARKER_KEY)?.is_some() {
            return Ok(false);
        }

        for collection in Collection::LISTS {
            if !self.cached_items(collection)?.is_empty() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Push every local collection to the cloud. Any success stamps the
    /// migration marker, even if other collections failed.
    pub async fn migrate_local_data_to_cloud(&self) -> Result<MigrationReport, SyncError> {
        if !self.is_reachable() {
            log::info!("Migration skipped, cloud not reachable");
            return Ok(MigrationReport {
                skipped: true,
                ..MigrationReport::default()
            });
        }

        let bundle = self.local_bundle()?;
        let items_migrated = bundle.item_count();
        let collections = self.save_all_data(&bundle).await?;

        let mut report = MigrationReport {
            completed: false,
            skipped: false,
            collections,
            items_migrated: 0,
        };

        if collections.has_any_success() {
            let marker = MigrationMarker {
                completed_at: Utc::now(),
                collections_migrated: collections.succeeded,
                items_migrated,
            };
            let marker = serde_json::to_value(&marker).map_err(CacheError::from)?;
            self.cache.set(MIGRATION_MARKER_KEY, &marker)?;

            report.completed = true;
            report.items_migrated = items_migrated;
            log::info!(
                "Migration complete: {} collections, {} items",
                collections.succeeded,
                items_migrated
            );
        } else {
            log::warn!("Migration wrote nothing, will retry on next sign-in");
        }

        Ok(report)
    }

    /// Every collection present in the local cache
    fn local_bundle(&self) -> Result<UserDataBundle, SyncError> {
        let mut bundle = UserDataBundle::default();

        for collection in Collection::ALL {
            let Some(raw) = self.cache.get(collection.local_key())? else {
                continue;
            };
            match (collection, schema::normalize_or_empty(collection, &raw)) {
                (Collection::Activities, Value::Array(items)) => bundle.activities = Some(items),
                (Collection::Notes, Value::Array(items)) => bundle.notes = Some(items),
                (Collection::Todos, Value::Array(items)) => bundle.todos = Some(items),
                (Collection::Schedule, payload) => bundle.schedule = Some(payload),
                (Collection::Settings, payload) => bundle.settings = Some(payload),
                (Collection::UserProfile, payload) => bundle.user_profile = Some(payload),
                _ => {}
            }
        }

        Ok(bundle)
    }

    /// Save every present collection concurrently; success means the write
    /// reached the cloud
    pub async fn save_all_data(&self, bundle: &UserDataBundle) -> Result<BatchReport, SyncError> {
        let results = join_all(bundle.entries().into_iter().map(|(collection, payload)| async move {
            let outcome = self
                .save_inner(
                    collection.name(),
                    schema::wrap(collection, payload),
                    SaveOptions::local(collection.local_key()),
                )
                .await;
            (collection, outcome)
        }))
        .await;

        let mut report = BatchReport::default();
        let mut first_error = None;

        for (collection, outcome) in results {
            match outcome {
                Ok(outcome) => {
                    if outcome != SaveOutcome::Remote {
                        log::warn!("{} did not reach the cloud", collection);
                    }
                    report.record(outcome == SaveOutcome::Remote);
                }
                Err(e) => {
                    log::error!("Saving {} failed locally: {}", collection, e);
                    report.record(false);
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }

    // ========================================================================
    // Export / import / clear
    // ========================================================================

    pub async fn export_user_data(&self) -> Result<ExportBundle, SyncError> {
        let (activities, notes, todos, schedule, settings, user_profile) = tokio::try_join!(
            self.load_activities(),
            self.load_notes(),
            self.load_todos(),
            self.load_schedule(),
            self.load_settings(),
            self.load_user_profile(),
        )?;

        Ok(ExportBundle {
            version: EXPORT_VERSION.to_string(),
            exported_at: Utc::now(),
            user_id: self.current_user().map(|u| u.id),
            activities,
            notes,
            todos,
            schedule,
            settings,
            user_profile,
        })
    }

    /// Import a bundle. With `merge`, list collections are merged into what
    /// is already stored (imported items count as local); everything else is
    /// overwritten.
    pub async fn import_user_data(
        &self,
        bundle: UserDataBundle,
        merge: bool,
    ) -> Result<BatchReport, SyncError> {
        let entries = bundle.entries();

        // Reject the whole import before writing anything
        for (collection, payload) in &entries {
            if collection.shape() == Shape::Map && !payload.is_object() {
                return Err(SyncError::InvalidImport(format!(
                    "{} must be an object",
                    collection
                )));
            }
        }

        let mut report = BatchReport::default();
        for (collection, payload) in entries {
            let payload = if merge && collection.shape() == Shape::List {
                let existing = Value::Array(self.load_list(collection).await?);
                intelligent_merge(&existing, &payload, collection.field())
            } else {
                payload
            };
            report.record(self.save_typed(collection, payload).await?);
        }

        log::info!(
            "Imported {} collections ({} failed)",
            report.succeeded,
            report.failed
        );
        Ok(report)
    }

    /// Delete everything stored for the current user: cloud documents (best
    /// effort), local keys and pending writes
    pub async fn clear_user_data(&self) -> Result<ClearReport, SyncError> {
        let mut report = ClearReport::default();

        if let Some((remote, user_id)) = self.reachable_user() {
            let results = join_all(
                Collection::ALL
                    .iter()
                    .map(|collection| remote.delete(collection.name(), &user_id)),
            )
            .await;

            for (collection, result) in Collection::ALL.iter().zip(results) {
                if let Err(e) = &result {
                    log::warn!("Failed to delete remote {}: {}", collection, e);
                }
                report.remote.record(result.is_ok());
            }
        }

        for key in all_local_keys() {
            self.cache.remove(key)?;
            report.local_keys_removed += 1;
        }
        report.pending_discarded = self.queue.clear();

        log::info!(
            "User data cleared: {} remote deletes, {} local keys, {} pending writes",
            report.remote.succeeded,
            report.local_keys_removed,
            report.pending_discarded
        );
        Ok(report)
    }

    // ========================================================================
    // Status
    // ========================================================================

    pub fn get_sync_status(&self) -> SyncStatus {
        let is_online = self.is_online();
        SyncStatus {
            is_online,
            cloud_available: is_online && self.remote_configured(),
            pending_count: self.queue.len(),
            has_user: self.current_user().is_some(),
            remote_configured: self.remote_configured(),
        }
    }
}

/// `data` plus ownership and sync timestamps; non-object payloads go under
/// `value`
fn remote_document(data: &Value, user_id: &str) -> Value {
    let mut document = match data {
        Value::Object(map) => map.clone(),
        other => {
            let mut map = Map::new();
            map.insert("value".to_string(), other.clone());
            map
        }
    };

    let now = Value::String(Utc::now().to_rfc3339());
    document.insert("userId".to_string(), Value::String(user_id.to_string()));
    document.insert("updatedAt".to_string(), now.clone());
    document.insert("syncedAt".to_string(), now);
    Value::Object(document)
}

fn cached_items_or_empty(cache: &dyn LocalCache, collection: Collection) -> Vec<Value> {
    match cache.get(collection.local_key()) {
        Ok(raw) => schema::list_items(collection, &raw.unwrap_or(Value::Null)),
        Err(e) => {
            log::error!("Cache fallback for {} failed: {}", collection, e);
            Vec::new()
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Local cache error: {0}")]
    LocalCache(#[from] CacheError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Remote store setup failed: {0}")]
    Remote(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid import: {0}")]
    InvalidImport(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_remote_document_stamps_metadata() {
        let doc = remote_document(&json!({"todos": []}), "u1");

        assert_eq!(doc["userId"], "u1");
        assert!(doc["updatedAt"].is_string());
        assert_eq!(doc["updatedAt"], doc["syncedAt"]);
        assert_eq!(doc["todos"], json!([]));
    }

    #[test]
    fn test_remote_document_wraps_scalars() {
        let doc = remote_document(&json!(42), "u1");
        assert_eq!(doc["value"], 42);
    }

    #[test]
    fn test_inactive_subscription() {
        let subscription = Subscription::inactive();
        assert!(!subscription.is_live());
        subscription.unsubscribe();
    }

    #[test]
    fn test_from_config_local_only() {
        let dir = tempfile::tempdir().unwrap();
        let config = SyncConfig {
            cache_path: dir.path().join("cache.db"),
            ..SyncConfig::default()
        };

        let engine = SyncEngine::from_config(&config).unwrap();
        assert!(!engine.remote_configured());
        assert!(!engine.is_reachable());
    }
}
