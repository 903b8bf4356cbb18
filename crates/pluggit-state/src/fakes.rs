//! In-memory fake for the document store connector
//!
//! `MemoryDocumentStore` satisfies the `DocumentStore` contract without any
//! external dependencies. It can also be told to fail or to stall, so that
//! error propagation and timeouts can be exercised.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::StateError;
use crate::schema::StoredDocument;
use crate::storage_traits::{CollectionRef, DocumentStore, SortOrder};
use crate::Result;

/// Total order used for eviction and "latest" lookups.
///
/// `created_utc` first, then `item_id`, then `doc_key`.
pub fn document_order(a: &StoredDocument, b: &StoredDocument) -> Ordering {
    a.created_utc
        .total_cmp(&b.created_utc)
        .then_with(|| a.item_id.cmp(&b.item_id))
        .then_with(|| a.doc_key.cmp(&b.doc_key))
}

/// In-memory document store backed by a `HashMap<collection, documents>`.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    collections: Mutex<HashMap<CollectionRef, Vec<StoredDocument>>>,
    latency: Mutex<Option<Duration>>,
    failing: AtomicBool,
    closed: AtomicBool,
    close_calls: AtomicUsize,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent operation fail with `StateError::Storage`.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, AtomicOrdering::SeqCst);
    }

    /// Delay every subsequent operation by `latency`.
    pub fn set_latency(&self, latency: Option<Duration>) {
        if let Ok(mut slot) = self.latency.lock() {
            *slot = latency;
        }
    }

    /// Number of times `close` has been called.
    pub fn close_calls(&self) -> usize {
        self.close_calls.load(AtomicOrdering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(AtomicOrdering::SeqCst)
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<CollectionRef, Vec<StoredDocument>>>> {
        self.collections
            .lock()
            .map_err(|_| StateError::Storage("memory store lock poisoned".to_string()))
    }

    async fn enter(&self, operation: &str) -> Result<()> {
        let latency = self.latency.lock().ok().and_then(|slot| *slot);
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if self.closed.load(AtomicOrdering::SeqCst) {
            return Err(StateError::Closed);
        }
        if self.failing.load(AtomicOrdering::SeqCst) {
            return Err(StateError::Storage(format!(
                "{operation}: memory store set to fail"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn insert_one(&self, coll: &CollectionRef, doc: StoredDocument) -> Result<()> {
        self.enter("insert_one").await?;
        let mut collections = self.lock()?;
        collections.entry(coll.clone()).or_default().push(doc);
        Ok(())
    }

    async fn count(&self, coll: &CollectionRef) -> Result<u64> {
        self.enter("count").await?;
        let collections = self.lock()?;
        Ok(collections.get(coll).map(|docs| docs.len() as u64).unwrap_or(0))
    }

    async fn find_one(
        &self,
        coll: &CollectionRef,
        order: SortOrder,
    ) -> Result<Option<StoredDocument>> {
        self.enter("find_one").await?;
        let collections = self.lock()?;
        let docs = match collections.get(coll) {
            Some(docs) => docs,
            None => return Ok(None),
        };
        let found = match order {
            SortOrder::Ascending => docs.iter().min_by(|a, b| document_order(a, b)),
            SortOrder::Descending => docs.iter().max_by(|a, b| document_order(a, b)),
        };
        Ok(found.cloned())
    }

    async fn find(&self, coll: &CollectionRef) -> Result<Vec<StoredDocument>> {
        self.enter("find").await?;
        let collections = self.lock()?;
        let mut docs = collections.get(coll).cloned().unwrap_or_default();
        docs.sort_by(document_order);
        Ok(docs)
    }

    async fn delete_one(&self, coll: &CollectionRef, doc_key: &str) -> Result<bool> {
        self.enter("delete_one").await?;
        let mut collections = self.lock()?;
        let Some(docs) = collections.get_mut(coll) else {
            return Ok(false);
        };
        match docs.iter().position(|d| d.doc_key == doc_key) {
            Some(idx) => {
                docs.remove(idx);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn close(&self) -> Result<()> {
        self.close_calls.fetch_add(1, AtomicOrdering::SeqCst);
        self.closed.store(true, AtomicOrdering::SeqCst);
        Ok(())
    }
}
