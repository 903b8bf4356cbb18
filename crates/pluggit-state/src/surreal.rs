//! SurrealDB Document Store - Connection and Operations
//!
//! Opens a single connection at construction time and reuses it for every
//! collection operation. Supports embedded (`mem://`, `surrealkv://`,
//! `rocksdb://`) and remote (`ws://`, `wss://`, `http(s)://`) targets.
//!
//! Each item kind lives in its own table; feeds are separated by the `feed`
//! field rather than by database, so one connection serves every feed without
//! switching namespaces.

use std::sync::Mutex;

use async_trait::async_trait;
use serde::Deserialize;
use surrealdb::engine::any::Any;
use surrealdb::opt::auth::{Database, Root};
use surrealdb::Surreal;
use tracing::{debug, info, instrument};

use crate::config::StoreConfig;
use crate::error::StateError;
use crate::migrations;
use crate::schema::StoredDocument;
use crate::storage_traits::{CollectionRef, DocumentStore, SortOrder};
use crate::Result;

/// SurrealDB-backed implementation of [`DocumentStore`].
///
/// The client is held until `close`, which drops it and releases the
/// connection even if the store itself is still alive.
pub struct SurrealDocumentStore {
    db: Mutex<Option<Surreal<Any>>>,
    target: String,
}

impl SurrealDocumentStore {
    /// Connect, sign in if credentials are configured, select
    /// namespace/database, and initialize the schema.
    ///
    /// A failure at any step drops the partially set up client, which closes
    /// the connection.
    #[instrument(skip(config), fields(endpoint = %config.target, namespace = %config.namespace, database = %config.database))]
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        info!("Connecting to SurrealDB");

        let db = surrealdb::engine::any::connect(config.target.as_str())
            .await
            .map_err(|e| {
                StateError::Connection(format!("Failed to connect to {}: {}", config.target, e))
            })?;

        if let Some(creds) = &config.credentials {
            if creds.is_root {
                db.signin(Root {
                    username: &creds.username,
                    password: &creds.password,
                })
                .await
                .map_err(|e| StateError::Connection(format!("Root authentication failed: {e}")))?;
            } else {
                db.signin(Database {
                    namespace: &config.namespace,
                    database: &config.database,
                    username: &creds.username,
                    password: &creds.password,
                })
                .await
                .map_err(|e| {
                    StateError::Connection(format!("Database authentication failed: {e}"))
                })?;
            }
        }

        db.use_ns(&config.namespace)
            .use_db(&config.database)
            .await
            .map_err(|e| {
                StateError::Connection(format!("Failed to select namespace/database: {e}"))
            })?;

        migrations::init_schema(&db).await?;

        info!("SurrealDB connected and schema initialized");
        Ok(Self {
            db: Mutex::new(Some(db)),
            target: config.target.to_string(),
        })
    }

    /// Connect to a fresh in-memory database.
    pub async fn in_memory() -> Result<Self> {
        Self::connect(&StoreConfig::memory()).await
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn is_closed(&self) -> bool {
        self.db.lock().map(|db| db.is_none()).unwrap_or(true)
    }

    /// Handle to the live client; the clone shares the connection.
    fn client(&self) -> Result<Surreal<Any>> {
        let db = self
            .db
            .lock()
            .map_err(|_| StateError::Storage("SurrealDB client lock poisoned".to_string()))?;
        db.clone().ok_or(StateError::Closed)
    }
}

fn direction(order: SortOrder) -> &'static str {
    match order {
        SortOrder::Ascending => "ASC",
        SortOrder::Descending => "DESC",
    }
}

#[async_trait]
impl DocumentStore for SurrealDocumentStore {
    #[instrument(skip(self, doc), fields(collection = %coll, item_id = %doc.item_id))]
    async fn insert_one(&self, coll: &CollectionRef, doc: StoredDocument) -> Result<()> {
        let db = self.client()?;

        let created: Option<StoredDocument> =
            db.create(coll.collection_name()).content(doc).await?;

        created
            .map(|_| ())
            .ok_or_else(|| StateError::Storage(format!("Failed to insert into {coll}")))
    }

    #[instrument(skip(self), fields(collection = %coll))]
    async fn count(&self, coll: &CollectionRef) -> Result<u64> {
        let db = self.client()?;

        let sql = format!(
            "SELECT count() AS total FROM {} WHERE feed = $feed GROUP ALL",
            coll.collection_name()
        );
        let mut result = db
            .query(sql)
            .bind(("feed", coll.feed.as_str().to_string()))
            .await?;

        #[derive(Deserialize)]
        struct CountResult {
            total: u64,
        }

        let rows: Vec<CountResult> = result.take(0)?;
        Ok(rows.first().map(|r| r.total).unwrap_or(0))
    }

    #[instrument(skip(self), fields(collection = %coll))]
    async fn find_one(
        &self,
        coll: &CollectionRef,
        order: SortOrder,
    ) -> Result<Option<StoredDocument>> {
        let db = self.client()?;

        let dir = direction(order);
        let sql = format!(
            "SELECT * FROM {} WHERE feed = $feed \
             ORDER BY created_utc {dir}, item_id {dir}, doc_key {dir} LIMIT 1",
            coll.collection_name()
        );
        let mut result = db
            .query(sql)
            .bind(("feed", coll.feed.as_str().to_string()))
            .await?;

        let docs: Vec<StoredDocument> = result.take(0)?;
        Ok(docs.into_iter().next())
    }

    #[instrument(skip(self), fields(collection = %coll))]
    async fn find(&self, coll: &CollectionRef) -> Result<Vec<StoredDocument>> {
        let db = self.client()?;

        let sql = format!(
            "SELECT * FROM {} WHERE feed = $feed \
             ORDER BY created_utc ASC, item_id ASC, doc_key ASC",
            coll.collection_name()
        );
        let mut result = db
            .query(sql)
            .bind(("feed", coll.feed.as_str().to_string()))
            .await?;

        let docs: Vec<StoredDocument> = result.take(0)?;
        Ok(docs)
    }

    #[instrument(skip(self), fields(collection = %coll))]
    async fn delete_one(&self, coll: &CollectionRef, doc_key: &str) -> Result<bool> {
        let db = self.client()?;

        let sql = format!(
            "DELETE FROM {} WHERE feed = $feed AND doc_key = $key RETURN BEFORE",
            coll.collection_name()
        );
        let mut result = db
            .query(sql)
            .bind(("feed", coll.feed.as_str().to_string()))
            .bind(("key", doc_key.to_string()))
            .await?;

        let deleted: Vec<StoredDocument> = result.take(0)?;
        Ok(!deleted.is_empty())
    }

    async fn close(&self) -> Result<()> {
        let taken = self
            .db
            .lock()
            .map_err(|_| StateError::Storage("SurrealDB client lock poisoned".to_string()))?
            .take();
        match taken {
            // Dropping the last handle shuts the connection down.
            Some(db) => {
                drop(db);
                info!(endpoint = %self.target, "SurrealDB connection closed");
            }
            None => debug!("SurrealDB connection already closed"),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FeedName, Item, ItemKind, Post, Reply};

    fn coll(feed: &str, kind: ItemKind) -> CollectionRef {
        CollectionRef::new(FeedName::new(feed).unwrap(), kind)
    }

    fn post_doc(feed: &str, id: &str, created_utc: f64) -> StoredDocument {
        let feed = FeedName::new(feed).unwrap();
        StoredDocument::from_item(&feed, &Item::Post(Post::new(id, created_utc))).unwrap()
    }

    #[tokio::test]
    async fn test_surreal_connection_and_schema_creation() {
        let store = SurrealDocumentStore::in_memory().await;
        assert!(store.is_ok(), "Failed to connect: {:?}", store.err());
    }

    #[tokio::test]
    async fn test_insert_and_count_are_scoped_by_feed() {
        let store = SurrealDocumentStore::in_memory().await.unwrap();

        store
            .insert_one(&coll("rust", ItemKind::Post), post_doc("rust", "a", 1.0))
            .await
            .unwrap();
        store
            .insert_one(&coll("rust", ItemKind::Post), post_doc("rust", "b", 2.0))
            .await
            .unwrap();
        store
            .insert_one(&coll("golang", ItemKind::Post), post_doc("golang", "c", 3.0))
            .await
            .unwrap();

        assert_eq!(store.count(&coll("rust", ItemKind::Post)).await.unwrap(), 2);
        assert_eq!(store.count(&coll("golang", ItemKind::Post)).await.unwrap(), 1);
        assert_eq!(store.count(&coll("rust", ItemKind::Reply)).await.unwrap(), 0);
        assert_eq!(store.count(&coll("nobody", ItemKind::Post)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_find_one_oldest_and_newest() {
        let store = SurrealDocumentStore::in_memory().await.unwrap();
        let posts = coll("rust", ItemKind::Post);

        for (id, ts) in [("mid", 20.0), ("old", 10.0), ("new", 30.0)] {
            store
                .insert_one(&posts, post_doc("rust", id, ts))
                .await
                .unwrap();
        }

        let oldest = store
            .find_one(&posts, SortOrder::Ascending)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(oldest.item_id, "old");

        let newest = store
            .find_one(&posts, SortOrder::Descending)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(newest.item_id, "new");
    }

    #[tokio::test]
    async fn test_reply_document_round_trips_through_surreal() {
        let store = SurrealDocumentStore::in_memory().await.unwrap();
        let replies = coll("rust", ItemKind::Reply);
        let feed = FeedName::new("rust").unwrap();

        let reply = Item::Reply(
            Reply::new("c1", 100.0)
                .with_author("ferris")
                .with_body("nice crate"),
        );
        let doc = StoredDocument::from_item(&feed, &reply).unwrap();
        store.insert_one(&replies, doc).await.unwrap();

        let found = store.find(&replies).await.unwrap();
        assert_eq!(found.len(), 1);
        let loaded = found.into_iter().next().unwrap().into_item(ItemKind::Reply);
        assert_eq!(loaded.unwrap(), reply);
    }

    #[tokio::test]
    async fn test_delete_one_existing_and_missing() {
        let store = SurrealDocumentStore::in_memory().await.unwrap();
        let posts = coll("rust", ItemKind::Post);
        let doc = post_doc("rust", "a", 1.0);
        let key = doc.doc_key.clone();

        store.insert_one(&posts, doc).await.unwrap();
        assert!(store.delete_one(&posts, &key).await.unwrap());
        assert!(!store.delete_one(&posts, &key).await.unwrap());
        assert_eq!(store.count(&posts).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_operations_refused_after_close() {
        let store = SurrealDocumentStore::in_memory().await.unwrap();
        assert!(!store.is_closed());
        store.close().await.unwrap();
        assert!(store.is_closed());
        store.close().await.unwrap();

        let err = store
            .count(&coll("rust", ItemKind::Post))
            .await
            .unwrap_err();
        assert!(matches!(err, StateError::Closed));
    }
}
