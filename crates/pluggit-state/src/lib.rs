//! Pluggit-State: bounded feed persistence
//!
//! This crate records the most recently seen posts and replies of every feed
//! a content-monitoring framework watches, so work can be deduplicated and
//! resumed across restarts without unbounded storage growth.
//!
//! ## Key Components
//!
//! - `BoundedFeedStore`: latest-N store per feed and item kind, oldest-first eviction
//! - `DocumentStore`: connector trait (insert / count / find / delete)
//! - `SurrealDocumentStore`: SurrealDB connector, one connection per store
//! - `MemoryDocumentStore`: in-memory connector for tests
//!
//! Posts keep 25 items per feed, replies keep 75.

mod config;
mod error;
pub mod fakes;
mod migrations;
mod schema;
pub mod storage_traits;
mod store;
pub mod surreal;

pub use config::{
    ConnectionTarget, Credentials, StoreConfig, TargetScheme, DEFAULT_DATABASE,
    DEFAULT_NAMESPACE, DEFAULT_TARGET, DEFAULT_TIMEOUT,
};
pub use error::StateError;
pub use schema::{
    FeedName, Item, ItemKind, Post, Reply, RetentionPolicy, StoredDocument, POST_RETENTION,
    REPLY_RETENTION,
};
pub use storage_traits::{CollectionRef, DocumentStore, SortOrder};
pub use store::{BoundedFeedStore, StoreOutcome};
pub use surreal::SurrealDocumentStore;

/// Result type for pluggit-state operations
pub type Result<T> = std::result::Result<T, StateError>;
