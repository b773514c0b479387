//! Walk through an offline edit that reaches the cloud after sign-in

use retrodesk_sync::{
    ConnectivityMonitor, MemoryCache, MemoryRemoteStore, RemoteStore, SessionHandle, SyncEngine,
    User,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    retrodesk_sync::init_logging();

    let cache = Arc::new(MemoryCache::new());
    let remote = Arc::new(MemoryRemoteStore::new());
    let engine = SyncEngine::new(cache, Some(remote.clone() as Arc<dyn RemoteStore>));

    let monitor = ConnectivityMonitor::new(true);
    let session = SessionHandle::new();
    let _connectivity = engine.watch_connectivity(&monitor);
    let _session = engine.watch_session(&session);

    println!("\n{}", "=".repeat(60));
    println!("Offline, signed out");
    println!("{}", "=".repeat(60));

    monitor.set_online(false);
    tokio::time::sleep(Duration::from_millis(50)).await;

    engine
        .save_todos(vec![json!({"id": "1", "title": "Water the plants", "timestamp": 1})])
        .await?;
    println!("Status: {:?}", engine.get_sync_status());
    println!("Remote calls so far: {}", remote.call_count());

    println!("\n{}", "=".repeat(60));
    println!("Back online, signing in");
    println!("{}", "=".repeat(60));

    monitor.set_online(true);
    session.sign_in(User::new("demo-user"));
    tokio::time::sleep(Duration::from_millis(50)).await;

    println!("Status: {:?}", engine.get_sync_status());
    println!("Cloud todos: {}", serde_json::to_string_pretty(&remote.document("todos", "demo-user"))?);

    let todos = engine.load_todos().await?;
    println!("Loaded {} todo(s)", todos.len());

    if engine.needs_migration()? {
        let report = engine.migrate_local_data_to_cloud().await?;
        println!("Migration: {:?}", report);
    }

    let export = engine.export_user_data().await?;
    println!("\nExport:\n{}", serde_json::to_string_pretty(&export)?);

    Ok(())
}
