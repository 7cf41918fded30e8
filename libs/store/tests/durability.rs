//! SqliteStore state must survive reopening the database file.

use bbs_store::{KeyedStore, SqliteStore, StoreNode};

#[tokio::test]
async fn test_reopen_keeps_keys_and_index() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bbs.db");

    let last = {
        let store = SqliteStore::open(&path).unwrap();
        store
            .set(StoreNode::new("/v1/desired-lrp/p1", "{}"))
            .await
            .unwrap();
        store
            .set(StoreNode::new("/v1/domain/d1", "").with_ttl(60))
            .await
            .unwrap()
    };

    let store = SqliteStore::open(&path).unwrap();
    let domain = store.get("/v1/domain/d1").await.unwrap();
    assert_eq!(domain.index, last.index);
    assert_eq!(domain.ttl, 60);

    let next = store
        .set(StoreNode::new("/v1/domain/d1", "").with_ttl(60))
        .await
        .unwrap();
    assert!(next.index > last.index);

    let desired = store.list_recursively("/v1/desired-lrp").await.unwrap();
    assert_eq!(desired.len(), 1);
}
