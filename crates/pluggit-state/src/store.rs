//! Bounded feed store
//!
//! Keeps the most recent posts and replies per feed, evicting the oldest item
//! (by `created_utc`) whenever a write pushes a collection past its
//! retention bound.
//!
//! ## Consistency
//!
//! Insert and eviction are separate backend calls. The bound is enforced per
//! write, not transactionally: a crash between the two, or several writers on
//! the same feed and kind, can leave a collection above its bound until later
//! writes evict again. Each write inserts one document and deletes at most
//! one.

use std::future::Future;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::config::{ConnectionTarget, StoreConfig, DEFAULT_TIMEOUT};
use crate::error::StateError;
use crate::schema::{FeedName, Item, ItemKind, Post, Reply, RetentionPolicy, StoredDocument};
use crate::storage_traits::{CollectionRef, DocumentStore, SortOrder};
use crate::surreal::SurrealDocumentStore;
use crate::Result;

/// How often eviction re-picks a victim after losing it to another writer
const EVICTION_ATTEMPTS: usize = 3;

/// What a single write did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreOutcome {
    pub kind: ItemKind,
    /// Id of the stored item
    pub item_id: String,
    /// Id of the item evicted to make room, if any
    pub evicted: Option<String>,
}

/// Size-capped store of the latest posts and replies per feed.
///
/// Owns its backend connection. `close` consumes the store; dropping it
/// without closing still releases the connection.
pub struct BoundedFeedStore<S = SurrealDocumentStore> {
    backend: S,
    retention: RetentionPolicy,
    op_timeout: Duration,
}

impl BoundedFeedStore<SurrealDocumentStore> {
    /// Open a SurrealDB-backed store.
    ///
    /// Fails with [`StateError::Connection`] when the backend cannot be
    /// reached within the configured timeout.
    #[instrument(skip(config), fields(endpoint = %config.target))]
    pub async fn open(config: StoreConfig) -> Result<Self> {
        let op_timeout = config.op_timeout;
        let backend =
            match tokio::time::timeout(op_timeout, SurrealDocumentStore::connect(&config)).await {
                Ok(connected) => connected?,
                Err(_) => {
                    return Err(StateError::Connection(format!(
                        "timed out after {}ms connecting to {}",
                        op_timeout.as_millis(),
                        config.target
                    )))
                }
            };

        info!("Feed store opened");
        Ok(Self::with_backend(backend).with_timeout(op_timeout))
    }

    /// Open a store at `target` with default settings.
    ///
    /// Fails with [`StateError::MalformedTarget`] before any connection
    /// attempt if `target` is not a valid descriptor.
    pub async fn open_target(target: &str) -> Result<Self> {
        let target = ConnectionTarget::parse(target)?;
        Self::open(StoreConfig::new(target)).await
    }

    /// Open using `PLUGGIT_*` environment variables.
    pub async fn open_from_env() -> Result<Self> {
        Self::open(StoreConfig::from_env()?).await
    }
}

impl<S: DocumentStore> BoundedFeedStore<S> {
    /// Wrap an already connected backend.
    pub fn with_backend(backend: S) -> Self {
        Self {
            backend,
            retention: RetentionPolicy::STANDARD,
            op_timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Bound every backend call by `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.op_timeout = timeout;
        self
    }

    pub fn backend(&self) -> &S {
        &self.backend
    }

    pub fn retention(&self) -> RetentionPolicy {
        self.retention
    }

    /// Persist `item` in its feed's collection, then evict the oldest item if
    /// the collection is over its bound.
    #[instrument(skip(self, item), fields(feed = %feed, kind = %item.kind(), item_id = %item.id()))]
    pub async fn store_latest(&self, feed: &FeedName, item: &Item) -> Result<StoreOutcome> {
        let kind = item.kind();
        let coll = CollectionRef::new(feed.clone(), kind);
        let doc = StoredDocument::from_item(feed, item)?;
        let item_id = doc.item_id.clone();

        self.bounded("insert_one", self.backend.insert_one(&coll, doc))
            .await?;
        debug!(collection = %coll, item_id = %item_id, "Inserted {}", kind);

        let evicted = self.evict_overflow(&coll).await?;

        Ok(StoreOutcome {
            kind,
            item_id,
            evicted,
        })
    }

    /// Store a post. See [`store_latest`](Self::store_latest).
    pub async fn store_post(&self, feed: &FeedName, post: Post) -> Result<StoreOutcome> {
        self.store_latest(feed, &Item::Post(post)).await
    }

    /// Store a reply. See [`store_latest`](Self::store_latest).
    pub async fn store_reply(&self, feed: &FeedName, reply: Reply) -> Result<StoreOutcome> {
        self.store_latest(feed, &Item::Reply(reply)).await
    }

    /// Store a raw listing value from the content stream.
    ///
    /// Values that are neither a post nor a reply are not stored and yield
    /// [`StateError::UnsupportedItem`].
    pub async fn store_latest_raw(&self, feed: &FeedName, raw: Value) -> Result<StoreOutcome> {
        let item = match Item::from_listing(raw) {
            Ok(item) => item,
            Err(err) => {
                debug!(feed = %feed, error = %err, "Dropping unsupported item");
                return Err(err);
            }
        };
        self.store_latest(feed, &item).await
    }

    /// The newest retained item of `kind` in `feed`, or `None` if empty.
    #[instrument(skip(self), fields(feed = %feed, kind = %kind))]
    pub async fn get_latest(&self, feed: &FeedName, kind: ItemKind) -> Result<Option<Item>> {
        let coll = CollectionRef::new(feed.clone(), kind);
        let newest = self
            .bounded(
                "find_one",
                self.backend.find_one(&coll, SortOrder::Descending),
            )
            .await?;

        newest.map(|doc| doc.into_item(kind)).transpose()
    }

    /// Snapshot of every retained item of `kind` in `feed`.
    ///
    /// Empty when nothing is retained. Order is not guaranteed.
    #[instrument(skip(self), fields(feed = %feed, kind = %kind))]
    pub async fn get_all_latest(&self, feed: &FeedName, kind: ItemKind) -> Result<Vec<Item>> {
        let coll = CollectionRef::new(feed.clone(), kind);
        let docs = self.bounded("find", self.backend.find(&coll)).await?;

        docs.into_iter().map(|doc| doc.into_item(kind)).collect()
    }

    /// Number of retained items of `kind` in `feed`.
    pub async fn count(&self, feed: &FeedName, kind: ItemKind) -> Result<u64> {
        let coll = CollectionRef::new(feed.clone(), kind);
        self.bounded("count", self.backend.count(&coll)).await
    }

    /// Close the backend connection.
    #[instrument(skip(self))]
    pub async fn close(self) -> Result<()> {
        self.bounded("close", self.backend.close()).await?;
        info!("Feed store closed");
        Ok(())
    }

    async fn evict_overflow(&self, coll: &CollectionRef) -> Result<Option<String>> {
        let bound = self.retention.bound(coll.kind);

        for _ in 0..EVICTION_ATTEMPTS {
            let count = self.bounded("count", self.backend.count(coll)).await?;
            if count <= bound {
                return Ok(None);
            }

            let oldest = self
                .bounded("find_one", self.backend.find_one(coll, SortOrder::Ascending))
                .await?;
            let Some(oldest) = oldest else {
                return Ok(None);
            };

            let removed = self
                .bounded("delete_one", self.backend.delete_one(coll, &oldest.doc_key))
                .await?;
            if removed {
                debug!(
                    collection = %coll,
                    item_id = %oldest.item_id,
                    created_utc = oldest.created_utc,
                    count,
                    bound,
                    "Evicted oldest {}",
                    coll.kind
                );
                return Ok(Some(oldest.item_id));
            }

            debug!(collection = %coll, item_id = %oldest.item_id, "Eviction victim already gone");
        }

        warn!(collection = %coll, bound, "Collection left above its bound after eviction retries");
        Ok(None)
    }

    async fn bounded<T, F>(&self, operation: &'static str, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.op_timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                let timeout_ms = self.op_timeout.as_millis() as u64;
                warn!(operation, timeout_ms, "Backend call timed out");
                Err(StateError::Timeout {
                    operation,
                    timeout_ms,
                })
            }
        }
    }
}
