//! # RetroDesk Sync
//!
//! Offline-first synchronization of a productivity desktop's user data
//! (activities, notes, todos, schedule, settings, profile) between a device
//! cache and a cloud document store.
//!
//! The composition root builds a [`SyncEngine`] from a [`LocalCache`] and an
//! optional [`RemoteStore`], then wires a [`ConnectivityMonitor`] and a
//! [`SessionHandle`] into it.

pub mod cache;
pub mod config;
pub mod connectivity;
pub mod db;
pub mod remote;
pub mod session;
pub mod sync;

pub use cache::{CacheError, LocalCache, MemoryCache, SqliteCache};
pub use config::{ConfigError, SyncConfig};
pub use connectivity::ConnectivityMonitor;
pub use remote::{HttpRemoteStore, MemoryRemoteStore, RemoteStore, StoreError};
pub use session::{SessionHandle, User};
pub use sync::{
    Collection, SaveOptions, Subscription, SyncEngine, SyncError, SyncStatus, UserDataBundle,
};

/// Install `env_logger` with an `info` default (`RUST_LOG` overrides).
/// Safe to call more than once.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();
}
