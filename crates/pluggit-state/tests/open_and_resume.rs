//! Store lifecycle: opening, failing to open, closing and reopening.

use std::time::Duration;

use pluggit_state::{
    BoundedFeedStore, ConnectionTarget, FeedName, ItemKind, Post, Reply, StateError, StoreConfig,
};

#[tokio::test]
async fn malformed_target_is_rejected_before_connecting() {
    for target in ["localhost:8000", "mongodb://localhost:27017", "ws://", ""] {
        let err = match BoundedFeedStore::open_target(target).await {
            Ok(_) => panic!("{target:?} should not open"),
            Err(err) => err,
        };
        assert!(
            matches!(err, StateError::MalformedTarget { .. }),
            "{target:?}: unexpected {err:?}"
        );
    }
}

#[tokio::test]
async fn unreachable_backend_is_a_recoverable_error() {
    // Nothing listens on port 1; the caller gets an error instead of the
    // process exiting.
    let config = StoreConfig::new(ConnectionTarget::parse("ws://127.0.0.1:1").unwrap())
        .with_timeout(Duration::from_secs(3));

    let err = match BoundedFeedStore::open(config).await {
        Ok(_) => panic!("connected to a closed port"),
        Err(err) => err,
    };
    assert!(matches!(err, StateError::Connection(_)), "got {err:?}");
}

#[tokio::test]
async fn memory_target_opens_and_closes() {
    let store = BoundedFeedStore::open_target("mem://").await.unwrap();
    let feed = FeedName::new("lifecycle").unwrap();

    store.store_post(&feed, Post::new("p1", 1.0)).await.unwrap();
    assert_eq!(store.count(&feed, ItemKind::Post).await.unwrap(), 1);

    store.close().await.unwrap();
}

#[tokio::test]
async fn retained_items_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let target = format!("surrealkv://{}", dir.path().join("feeds").display());
    let feed = FeedName::new("resume").unwrap();

    {
        let store = BoundedFeedStore::open_target(&target).await.unwrap();
        for ts in 1..=30 {
            store
                .store_post(&feed, Post::new(format!("p{ts}"), ts as f64))
                .await
                .unwrap();
        }
        store
            .store_reply(&feed, Reply::new("c1", 31.0).with_body("still here"))
            .await
            .unwrap();
        store.close().await.unwrap();
    }
    // The embedded engine shuts down in a background task once dropped.
    tokio::time::sleep(Duration::from_millis(200)).await;

    let store = BoundedFeedStore::open_target(&target).await.unwrap();
    assert_eq!(store.count(&feed, ItemKind::Post).await.unwrap(), 25);

    let latest = store.get_latest(&feed, ItemKind::Post).await.unwrap().unwrap();
    assert_eq!(latest.id(), "p30");

    let reply = store.get_latest(&feed, ItemKind::Reply).await.unwrap().unwrap();
    assert_eq!(
        reply.as_reply().and_then(|r| r.body.as_deref()),
        Some("still here")
    );

    // The bound keeps holding after a restart.
    let outcome = store
        .store_post(&feed, Post::new("p31", 32.0))
        .await
        .unwrap();
    assert_eq!(outcome.evicted.as_deref(), Some("p6"));
    store.close().await.unwrap();
}
