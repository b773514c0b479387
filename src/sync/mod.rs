//! Sync Module - Local/Cloud Data Synchronization
//!
//! Keeps the user's activities, notes, todos, schedule, settings and profile
//! available offline and converges them with the cloud document store:
//! - Writes go to the cloud when reachable, otherwise to the local cache
//!   plus an in-memory pending queue
//! - The queue is flushed on reconnect and on sign-in
//! - Divergent list collections are merged item by item (last writer wins)
//!
//! Architecture:
//! - `engine`: routing, queue flush, subscriptions, migration, import/export
//! - `merge`: pure merge of two item lists
//! - `schema`: stored document shapes
//! - `queue`: pending-write map

pub mod engine;
pub mod merge;
pub mod models;
pub mod queue;
pub mod schema;


// Re-export commonly used types
pub use engine::{Subscription, SyncEngine, SyncError};
pub use merge::intelligent_merge;
pub use models::{
    BatchReport, ClearReport, Collection, ExportBundle, FlushReport, ForceSyncReport,
    MigrationMarker, MigrationReport, PendingKey, PendingWrite, SaveOptions, SyncStatus,
    UserDataBundle,
};
pub use queue::{PendingQueue, QueueStats};
pub use schema::ShapeError;
