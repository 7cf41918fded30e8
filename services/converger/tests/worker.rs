//! Convergence worker lifecycle against an in-memory store.

use std::sync::Arc;
use std::time::Duration;

use bbs::paths::desired_lrp_schema_path;
use bbs::{Bbs, LockConfig, LockError};
use bbs_converger::ConvergenceWorker;
use bbs_store::{KeyedStore, MemoryStore, StoreNode};
use tokio::sync::watch;

const LOCK_KEY: &str = "/v1/locks/converge_lock";

fn setup() -> (Arc<MemoryStore>, Bbs) {
    let store = Arc::new(MemoryStore::new());
    (store.clone(), Bbs::new(store))
}

fn lock_config() -> LockConfig {
    LockConfig::new(Duration::from_secs(1))
}

#[tokio::test(start_paused = true)]
async fn test_worker_prunes_and_releases_on_shutdown() {
    let (store, bbs) = setup();
    store
        .set(StoreNode::new(desired_lrp_schema_path("broken"), "ßßßßßß"))
        .await
        .unwrap();

    let lock = bbs
        .locks
        .new_converge_lock("converger-1", lock_config())
        .try_acquire()
        .await
        .unwrap();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker = ConvergenceWorker::new(bbs, Duration::from_secs(5));
    let running = tokio::spawn(async move { worker.run(lock, shutdown_rx).await });

    tokio::time::sleep(Duration::from_secs(6)).await;
    assert!(store
        .get("/v1/desired-lrp/broken")
        .await
        .unwrap_err()
        .is_not_found());
    assert_eq!(store.get(LOCK_KEY).await.unwrap().value, b"converger-1");

    shutdown_tx.send(true).unwrap();
    running.await.unwrap().unwrap();
    assert!(store.get(LOCK_KEY).await.unwrap_err().is_not_found());
}

#[tokio::test(start_paused = true)]
async fn test_worker_stops_when_lock_is_lost() {
    let (store, bbs) = setup();
    let lock = bbs
        .locks
        .new_converge_lock("converger-1", lock_config())
        .try_acquire()
        .await
        .unwrap();

    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker = ConvergenceWorker::new(bbs, Duration::from_secs(60));
    let running = tokio::spawn(async move { worker.run(lock, shutdown_rx).await });

    store
        .set(StoreNode::new(LOCK_KEY, "converger-2"))
        .await
        .unwrap();

    let result = tokio::time::timeout(Duration::from_secs(5), running)
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(result, Err(LockError::Lost { .. })));
    assert_eq!(store.get(LOCK_KEY).await.unwrap().value, b"converger-2");
}

#[tokio::test]
async fn test_run_once_returns_snapshot() {
    let (_store, bbs) = setup();
    bbs.domains.upsert_domain("cf-apps", 0).await.unwrap();

    let worker = ConvergenceWorker::new(bbs, Duration::from_secs(30));
    let input = worker.run_once().await.unwrap();

    assert!(input.domains.contains("cf-apps"));
    assert!(input.all_process_guids.is_empty());
}
