//! Schema definitions for feed items
//!
//! Collections:
//! - latest_submission: most recent posts per feed
//! - latest_comment: most recent replies per feed

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::StateError;
use crate::Result;

/// Maximum number of posts retained per feed
pub const POST_RETENTION: u64 = 25;

/// Maximum number of replies retained per feed
pub const REPLY_RETENTION: u64 = 75;

/// The two kinds of item a feed tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    /// Top-level submission
    Post,
    /// Comment on a submission or on another comment
    Reply,
}

impl ItemKind {
    pub const ALL: [ItemKind; 2] = [ItemKind::Post, ItemKind::Reply];

    /// Backend collection holding items of this kind
    pub fn collection(&self) -> &'static str {
        match self {
            ItemKind::Post => "latest_submission",
            ItemKind::Reply => "latest_comment",
        }
    }

    /// Map a listing type prefix (`t3` / `t1`) to a kind
    pub fn from_type_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "t3" => Some(ItemKind::Post),
            "t1" => Some(ItemKind::Reply),
            _ => None,
        }
    }
}

impl std::fmt::Display for ItemKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ItemKind::Post => write!(f, "post"),
            ItemKind::Reply => write!(f, "reply"),
        }
    }
}

/// Retention bound per item kind.
///
/// Global for every feed. Posts keep 25, replies keep 75.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    posts: u64,
    replies: u64,
}

impl RetentionPolicy {
    pub const STANDARD: RetentionPolicy = RetentionPolicy {
        posts: POST_RETENTION,
        replies: REPLY_RETENTION,
    };

    /// Maximum retained count for `kind`
    pub const fn bound(&self, kind: ItemKind) -> u64 {
        match kind {
            ItemKind::Post => self.posts,
            ItemKind::Reply => self.replies,
        }
    }
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self::STANDARD
    }
}

/// Name of a feed (e.g. a subreddit a plugin watches).
///
/// Always trimmed and non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FeedName(String);

impl FeedName {
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(StateError::InvalidFeedName(name));
        }
        Ok(FeedName(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for FeedName {
    type Error = StateError;

    fn try_from(s: String) -> Result<Self> {
        FeedName::new(s)
    }
}

impl TryFrom<&str> for FeedName {
    type Error = StateError;

    fn try_from(s: &str) -> Result<Self> {
        FeedName::new(s)
    }
}

impl From<FeedName> for String {
    fn from(name: FeedName) -> Self {
        name.0
    }
}

impl AsRef<str> for FeedName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for FeedName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A top-level post
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    /// Creation time, seconds since the Unix epoch
    pub created_utc: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permalink: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Source fields, copied as-is
    #[serde(default)]
    pub payload: Map<String, Value>,
}

impl Post {
    pub fn new(id: impl Into<String>, created_utc: f64) -> Self {
        Self {
            id: id.into(),
            created_utc,
            title: None,
            author: None,
            permalink: None,
            url: None,
            payload: Map::new(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn with_payload(mut self, payload: Map<String, Value>) -> Self {
        self.payload = payload;
        self
    }

    fn from_listing_data(data: Map<String, Value>) -> Result<Self> {
        let (id, created_utc) = identity(&data, ItemKind::Post)?;
        Ok(Self {
            id,
            created_utc,
            title: string_field(&data, "title"),
            author: string_field(&data, "author"),
            permalink: string_field(&data, "permalink"),
            url: string_field(&data, "url"),
            payload: data,
        })
    }
}

/// A reply to a post or to another reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    pub id: String,
    /// Creation time, seconds since the Unix epoch
    pub created_utc: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    /// Fullname of the parent item
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// Fullname of the post this reply belongs to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_id: Option<String>,
    /// Source fields, copied as-is
    #[serde(default)]
    pub payload: Map<String, Value>,
}

impl Reply {
    pub fn new(id: impl Into<String>, created_utc: f64) -> Self {
        Self {
            id: id.into(),
            created_utc,
            author: None,
            body: None,
            parent_id: None,
            link_id: None,
            payload: Map::new(),
        }
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_payload(mut self, payload: Map<String, Value>) -> Self {
        self.payload = payload;
        self
    }

    fn from_listing_data(data: Map<String, Value>) -> Result<Self> {
        let (id, created_utc) = identity(&data, ItemKind::Reply)?;
        Ok(Self {
            id,
            created_utc,
            author: string_field(&data, "author"),
            body: string_field(&data, "body"),
            parent_id: string_field(&data, "parent_id"),
            link_id: string_field(&data, "link_id"),
            payload: data,
        })
    }
}

/// An item seen on a feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "lowercase")]
pub enum Item {
    Post(Post),
    Reply(Reply),
}

impl Item {
    pub fn kind(&self) -> ItemKind {
        match self {
            Item::Post(_) => ItemKind::Post,
            Item::Reply(_) => ItemKind::Reply,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Item::Post(p) => &p.id,
            Item::Reply(r) => &r.id,
        }
    }

    pub fn created_utc(&self) -> f64 {
        match self {
            Item::Post(p) => p.created_utc,
            Item::Reply(r) => r.created_utc,
        }
    }

    /// `created_utc` as a UTC datetime, `None` if out of range
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        let ts = self.created_utc();
        if !ts.is_finite() {
            return None;
        }
        let secs = ts.floor();
        let nanos = ((ts - secs) * 1e9).round() as u32;
        DateTime::from_timestamp(secs as i64, nanos.min(999_999_999))
    }

    pub fn as_post(&self) -> Option<&Post> {
        match self {
            Item::Post(p) => Some(p),
            Item::Reply(_) => None,
        }
    }

    pub fn as_reply(&self) -> Option<&Reply> {
        match self {
            Item::Reply(r) => Some(r),
            Item::Post(_) => None,
        }
    }

    /// Classify a raw listing value from the content stream.
    ///
    /// Accepts a listing child (`{"kind": "t3" | "t1", "data": {..}}`) or a
    /// bare object whose `name` fullname starts with `t3_` or `t1_`. Anything
    /// else is [`StateError::UnsupportedItem`].
    pub fn from_listing(value: Value) -> Result<Self> {
        let Value::Object(mut obj) = value else {
            return Err(StateError::UnsupportedItem(
                "expected a JSON object".to_string(),
            ));
        };

        let tag = obj.get("kind").and_then(Value::as_str).map(str::to_owned);
        let (kind, data) = match (tag, obj.remove("data")) {
            (Some(tag), Some(Value::Object(data))) => {
                let kind = ItemKind::from_type_prefix(&tag).ok_or_else(|| {
                    StateError::UnsupportedItem(format!("unknown listing kind {tag:?}"))
                })?;
                (kind, data)
            }
            (_, data) => {
                if let Some(data) = data {
                    obj.insert("data".to_string(), data);
                }
                let kind = obj
                    .get("name")
                    .and_then(Value::as_str)
                    .and_then(|name| name.split_once('_'))
                    .and_then(|(prefix, _)| ItemKind::from_type_prefix(prefix))
                    .ok_or_else(|| {
                        StateError::UnsupportedItem(
                            "neither a listing child nor a post/reply fullname".to_string(),
                        )
                    })?;
                (kind, obj)
            }
        };

        match kind {
            ItemKind::Post => Post::from_listing_data(data).map(Item::Post),
            ItemKind::Reply => Reply::from_listing_data(data).map(Item::Reply),
        }
    }
}

impl From<Post> for Item {
    fn from(post: Post) -> Self {
        Item::Post(post)
    }
}

impl From<Reply> for Item {
    fn from(reply: Reply) -> Self {
        Item::Reply(reply)
    }
}

fn identity(data: &Map<String, Value>, kind: ItemKind) -> Result<(String, f64)> {
    let id = data
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| StateError::UnsupportedItem(format!("{kind} without a string id")))?;
    let created_utc = data
        .get("created_utc")
        .and_then(Value::as_f64)
        .ok_or_else(|| {
            StateError::UnsupportedItem(format!("{kind} {id} without a numeric created_utc"))
        })?;
    Ok((id.to_string(), created_utc))
}

fn string_field(data: &Map<String, Value>, key: &str) -> Option<String> {
    data.get(key).and_then(Value::as_str).map(str::to_owned)
}

/// Item as persisted in a collection.
///
/// `item_id` and `created_utc` are lifted out of the item so the backend can
/// filter and sort on them. `doc_key` identifies this one document; the same
/// item id may be stored more than once.
///
/// `item` is persisted as JSON text. Document backends may drop `null`
/// fields from nested objects, and listing payloads carry plenty of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDocument {
    pub doc_key: String,
    pub feed: String,
    pub item_id: String,
    pub created_utc: f64,
    #[serde(with = "json_text")]
    pub item: Value,
}

mod json_text {
    use serde::{de, Deserialize, Deserializer, Serializer};
    use serde_json::Value;

    pub fn serialize<S: Serializer>(value: &Value, serializer: S) -> Result<S::Ok, S::Error> {
        let text = serde_json::to_string(value).map_err(serde::ser::Error::custom)?;
        serializer.serialize_str(&text)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Value, D::Error> {
        let text = String::deserialize(deserializer)?;
        serde_json::from_str(&text).map_err(de::Error::custom)
    }
}

impl StoredDocument {
    /// Create a document with a fresh `doc_key`
    pub fn from_item(feed: &FeedName, item: &Item) -> Result<Self> {
        // -0.0 sorts below 0.0 under a total order but equal in the backend.
        let created_utc = item.created_utc() + 0.0;
        if !created_utc.is_finite() {
            return Err(StateError::Serialization(format!(
                "{} {} has non-finite created_utc",
                item.kind(),
                item.id()
            )));
        }

        let item_value = match item {
            Item::Post(p) => serde_json::to_value(p)?,
            Item::Reply(r) => serde_json::to_value(r)?,
        };

        Ok(Self {
            doc_key: Uuid::new_v4().to_string(),
            feed: feed.as_str().to_string(),
            item_id: item.id().to_string(),
            created_utc,
            item: item_value,
        })
    }

    /// Decode the stored item as `kind`
    pub fn into_item(self, kind: ItemKind) -> Result<Item> {
        let decoded = match kind {
            ItemKind::Post => serde_json::from_value(self.item).map(Item::Post),
            ItemKind::Reply => serde_json::from_value(self.item).map(Item::Reply),
        };
        decoded.map_err(|e| {
            StateError::Deserialization(format!("{kind} document {}: {e}", self.doc_key))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_retention_bounds() {
        let policy = RetentionPolicy::default();
        assert_eq!(policy.bound(ItemKind::Post), 25);
        assert_eq!(policy.bound(ItemKind::Reply), 75);
    }

    #[test]
    fn test_collection_names() {
        assert_eq!(ItemKind::Post.collection(), "latest_submission");
        assert_eq!(ItemKind::Reply.collection(), "latest_comment");
    }

    #[test]
    fn test_feed_name_is_trimmed_and_non_empty() {
        assert_eq!(FeedName::new("  rust ").unwrap().as_str(), "rust");
        assert!(matches!(
            FeedName::new("   "),
            Err(StateError::InvalidFeedName(_))
        ));
        assert!(FeedName::try_from("").is_err());
    }

    #[test]
    fn test_listing_child_post() {
        let raw = json!({
            "kind": "t3",
            "data": {
                "id": "abc123",
                "name": "t3_abc123",
                "created_utc": 1457024394.0,
                "title": "Hello",
                "author": "someone",
                "score": 12
            }
        });

        let item = Item::from_listing(raw).unwrap();
        let post = item.as_post().expect("post");
        assert_eq!(post.id, "abc123");
        assert_eq!(post.created_utc, 1457024394.0);
        assert_eq!(post.title.as_deref(), Some("Hello"));
        assert_eq!(post.payload["score"], 12);
    }

    #[test]
    fn test_bare_reply_by_fullname() {
        let raw = json!({
            "id": "c1",
            "name": "t1_c1",
            "created_utc": 100,
            "body": "first!",
            "parent_id": "t3_abc123",
            "link_id": "t3_abc123"
        });

        let item = Item::from_listing(raw).unwrap();
        assert_eq!(item.kind(), ItemKind::Reply);
        let reply = item.as_reply().unwrap();
        assert_eq!(reply.body.as_deref(), Some("first!"));
        assert_eq!(reply.link_id.as_deref(), Some("t3_abc123"));
        assert_eq!(item.created_utc(), 100.0);
    }

    #[test]
    fn test_unrecognised_listing_shapes() {
        for raw in [
            json!("just a string"),
            json!({"kind": "t5", "data": {"id": "sub", "created_utc": 1.0}}),
            json!({"kind": "Listing", "data": {"children": []}}),
            json!({"id": "x", "created_utc": 1.0}),
            json!({"kind": "t3", "data": {"created_utc": 1.0}}),
            json!({"kind": "t1", "data": {"id": "x"}}),
        ] {
            let err = Item::from_listing(raw.clone()).unwrap_err();
            assert!(
                matches!(err, StateError::UnsupportedItem(_)),
                "expected UnsupportedItem for {raw}, got {err:?}"
            );
        }
    }

    #[test]
    fn test_created_at_conversion() {
        let item = Item::Post(Post::new("p", 1_500_000_000.5));
        let at = item.created_at().unwrap();
        assert_eq!(at.timestamp(), 1_500_000_000);
        assert_eq!(at.timestamp_subsec_millis(), 500);

        assert!(Item::Post(Post::new("p", f64::NAN)).created_at().is_none());
    }

    #[test]
    fn test_stored_document_keeps_item_intact() {
        let feed = FeedName::new("rust").unwrap();
        let mut payload = Map::new();
        payload.insert("score".to_string(), json!(7));
        let item = Item::Reply(
            Reply::new("c9", 42.0)
                .with_author("ferris")
                .with_payload(payload),
        );

        let doc = StoredDocument::from_item(&feed, &item).unwrap();
        assert_eq!(doc.feed, "rust");
        assert_eq!(doc.item_id, "c9");
        assert_eq!(doc.created_utc, 42.0);

        let back = doc.into_item(ItemKind::Reply).unwrap();
        assert_eq!(back, item);
    }

    #[test]
    fn test_stored_item_is_json_text_with_nulls() {
        let feed = FeedName::new("rust").unwrap();
        let raw = json!({"kind": "t3", "data": {"id": "p1", "created_utc": 3.0, "media": null}});
        let item = Item::from_listing(raw).unwrap();
        let doc = StoredDocument::from_item(&feed, &item).unwrap();

        let encoded = serde_json::to_value(&doc).unwrap();
        let text = encoded["item"].as_str().unwrap();
        assert!(text.contains("\"media\":null"));

        let decoded: StoredDocument = serde_json::from_value(encoded).unwrap();
        assert_eq!(decoded, doc);
        assert_eq!(decoded.into_item(ItemKind::Post).unwrap(), item);
    }

    #[test]
    fn test_negative_zero_sort_key_is_normalized() {
        let feed = FeedName::new("rust").unwrap();
        let doc = StoredDocument::from_item(&feed, &Item::Post(Post::new("z", -0.0))).unwrap();
        assert!(doc.created_utc.is_sign_positive());
    }

    #[test]
    fn test_stored_documents_get_distinct_keys() {
        let feed = FeedName::new("rust").unwrap();
        let item = Item::Post(Post::new("same", 1.0));
        let a = StoredDocument::from_item(&feed, &item).unwrap();
        let b = StoredDocument::from_item(&feed, &item).unwrap();
        assert_ne!(a.doc_key, b.doc_key);
    }

    #[test]
    fn test_non_finite_timestamp_rejected() {
        let feed = FeedName::new("rust").unwrap();
        let item = Item::Post(Post::new("bad", f64::INFINITY));
        assert!(matches!(
            StoredDocument::from_item(&feed, &item),
            Err(StateError::Serialization(_))
        ));
    }
}
