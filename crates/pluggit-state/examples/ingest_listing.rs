//! Feed a saved listing through the store and show what was retained.
//!
//! Run with:
//!   cargo run --package pluggit-state --example ingest_listing -- <feed> <listing.json>
//!
//! Connection settings come from `PLUGGIT_*` variables (a `.env` file is
//! honoured). Set `PLUGGIT_DATABASE_URL=mem://` to try it without a server.
//! `RUST_LOG=pluggit_state=debug` shows every insert and eviction;
//! `PLUGGIT_LOG_FORMAT=json` switches to JSON log lines.

use anyhow::{bail, Context, Result};
use pluggit_state::{BoundedFeedStore, FeedName, ItemKind, StateError};
use serde_json::Value;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

fn init_tracing() {
    let json = std::env::var("PLUGGIT_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false).json())
            .try_init()
            .ok();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false))
            .try_init()
            .ok();
    }
}

/// Children of a `Listing`, or the value itself if it is a single item.
fn listing_children(listing: Value) -> Vec<Value> {
    match listing {
        Value::Object(mut obj) if obj.get("kind").and_then(Value::as_str) == Some("Listing") => obj
            .remove("data")
            .and_then(|mut data| data.get_mut("children").map(Value::take))
            .and_then(|children| match children {
                Value::Array(items) => Some(items),
                _ => None,
            })
            .unwrap_or_default(),
        Value::Array(items) => items,
        other => vec![other],
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let mut args = std::env::args().skip(1);
    let (Some(feed), Some(path)) = (args.next(), args.next()) else {
        bail!("usage: ingest_listing <feed> <listing.json>");
    };
    let feed = FeedName::new(feed)?;

    let raw = std::fs::read_to_string(&path).with_context(|| format!("reading {path}"))?;
    let listing: Value = serde_json::from_str(&raw).with_context(|| format!("parsing {path}"))?;

    let store = BoundedFeedStore::open_from_env()
        .await
        .context("opening feed store")?;

    let mut stored = 0usize;
    let mut skipped = 0usize;
    for child in listing_children(listing) {
        match store.store_latest_raw(&feed, child).await {
            Ok(outcome) => {
                stored += 1;
                if let Some(evicted) = outcome.evicted {
                    info!(kind = %outcome.kind, item_id = %outcome.item_id, evicted = %evicted, "Stored with eviction");
                }
            }
            Err(StateError::UnsupportedItem(reason)) => {
                skipped += 1;
                warn!(%reason, "Skipped listing entry");
            }
            Err(err) => return Err(err.into()),
        }
    }
    info!(stored, skipped, feed = %feed, "Listing ingested");

    for kind in ItemKind::ALL {
        let count = store.count(&feed, kind).await?;
        match store.get_latest(&feed, kind).await? {
            Some(latest) => println!(
                "{kind}: {count} retained, latest {} at {}",
                latest.id(),
                latest
                    .created_at()
                    .map(|at| at.to_rfc3339())
                    .unwrap_or_else(|| latest.created_utc().to_string())
            ),
            None => println!("{kind}: nothing retained"),
        }
    }

    store.close().await?;
    Ok(())
}
