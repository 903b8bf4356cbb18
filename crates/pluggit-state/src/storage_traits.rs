//! Storage trait definitions for pluggit-state
//!
//! `DocumentStore` is the connector the bounded store is written against:
//! name-spaced collections with insert / count / sorted find-one / find-all /
//! delete-one primitives.
//!
//! The trait is async and backend-agnostic. An in-memory fake is provided
//! in the `fakes` module; `surreal` holds the SurrealDB implementation.

use std::sync::Arc;

use async_trait::async_trait;

use crate::schema::{FeedName, ItemKind, StoredDocument};
use crate::Result;

/// One feed's collection for one item kind
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CollectionRef {
    pub feed: FeedName,
    pub kind: ItemKind,
}

impl CollectionRef {
    pub fn new(feed: FeedName, kind: ItemKind) -> Self {
        Self { feed, kind }
    }

    /// Backend table name for this collection's kind
    pub fn collection_name(&self) -> &'static str {
        self.kind.collection()
    }
}

impl std::fmt::Display for CollectionRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.feed, self.kind.collection())
    }
}

/// Direction for `find_one`.
///
/// Documents are ordered by `created_utc`, then `item_id`, then `doc_key`.
/// `Ascending` yields the oldest document, `Descending` the newest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// Document store connector.
///
/// Guarantees:
/// - `insert_one` never deduplicates; every call adds one document.
/// - `find_one` ordering is total and deterministic (see [`SortOrder`]).
/// - `find` returns a materialized snapshot, oldest first.
/// - `delete_one` removes at most one document.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert one document into the collection.
    async fn insert_one(&self, coll: &CollectionRef, doc: StoredDocument) -> Result<()>;

    /// Number of documents in the collection.
    async fn count(&self, coll: &CollectionRef) -> Result<u64>;

    /// First document in the given sort order, if any.
    async fn find_one(
        &self,
        coll: &CollectionRef,
        order: SortOrder,
    ) -> Result<Option<StoredDocument>>;

    /// Every document in the collection.
    async fn find(&self, coll: &CollectionRef) -> Result<Vec<StoredDocument>>;

    /// Delete the document with `doc_key`. Returns whether one was removed.
    async fn delete_one(&self, coll: &CollectionRef, doc_key: &str) -> Result<bool>;

    /// Release the underlying connection now, not at drop.
    ///
    /// Later calls fail with `StateError::Closed`; a second `close` is a no-op.
    async fn close(&self) -> Result<()>;
}

#[async_trait]
impl<T: DocumentStore + ?Sized> DocumentStore for Arc<T> {
    async fn insert_one(&self, coll: &CollectionRef, doc: StoredDocument) -> Result<()> {
        (**self).insert_one(coll, doc).await
    }

    async fn count(&self, coll: &CollectionRef) -> Result<u64> {
        (**self).count(coll).await
    }

    async fn find_one(
        &self,
        coll: &CollectionRef,
        order: SortOrder,
    ) -> Result<Option<StoredDocument>> {
        (**self).find_one(coll, order).await
    }

    async fn find(&self, coll: &CollectionRef) -> Result<Vec<StoredDocument>> {
        (**self).find(coll).await
    }

    async fn delete_one(&self, coll: &CollectionRef, doc_key: &str) -> Result<bool> {
        (**self).delete_one(coll, doc_key).await
    }

    async fn close(&self) -> Result<()> {
        (**self).close().await
    }
}
