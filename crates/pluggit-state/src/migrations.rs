//! SurrealDB schema initialization
//!
//! Defines the two per-kind collections with the indexes the bounded store
//! relies on. Safe to call on every connect (idempotent).

use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

use crate::error::StateError;
use crate::schema::ItemKind;
use crate::Result;

/// Initialize every item collection
pub async fn init_schema(db: &Surreal<Any>) -> Result<()> {
    info!("Initializing pluggit feed schema");

    for kind in ItemKind::ALL {
        init_item_table(db, kind).await?;
    }

    info!("Feed schema initialization complete");
    Ok(())
}

/// Initialize one item collection
///
/// Schema:
/// ```text
/// TABLE latest_submission | latest_comment {
///   doc_key:      STRING (unique per document)
///   feed:         STRING (indexed)
///   item_id:      STRING
///   created_utc:  NUMBER (ordering key)
///   item:         STRING (the post or reply as JSON text)
/// }
/// ```
///
/// `item_id` is deliberately not unique: storing the same item twice keeps
/// two documents.
async fn init_item_table(db: &Surreal<Any>, kind: ItemKind) -> Result<()> {
    let table = kind.collection();
    debug!("Initializing {} table", table);

    let sql = format!(
        r#"
        DEFINE TABLE IF NOT EXISTS {table} SCHEMALESS;

        DEFINE INDEX IF NOT EXISTS idx_{table}_doc_key ON TABLE {table} COLUMNS doc_key UNIQUE;

        DEFINE INDEX IF NOT EXISTS idx_{table}_feed ON TABLE {table} COLUMNS feed;

        -- "oldest" / "newest" lookups within a feed
        DEFINE INDEX IF NOT EXISTS idx_{table}_feed_created ON TABLE {table} COLUMNS feed, created_utc;
        "#
    );

    db.query(sql)
        .await
        .map_err(|e| StateError::Connection(format!("schema setup for {table} failed: {e}")))?
        .check()
        .map_err(|e| StateError::Connection(format!("schema setup for {table} failed: {e}")))?;

    info!("✓ {} table initialized", table);
    Ok(())
}
