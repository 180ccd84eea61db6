use url::Url;

use crate::app::{EstuaryError, Result};
use crate::domain::{Entry, Feed, FeedUpdate, Listing, Marker, Page, Stats};
use crate::puller::SharedPuller;
use crate::store::{EntryScope, SharedStore};
use crate::sync::refresh_feed;

#[derive(Clone)]
pub struct FeedService {
    store: SharedStore,
    puller: SharedPuller,
}

impl FeedService {
    pub fn new(store: SharedStore, puller: SharedPuller) -> Self {
        Self { store, puller }
    }

    /// Subscribe in Uncategorized and pull once. A failed first pull is
    /// logged; the feed is kept and retried by the next sync tick.
    pub async fn new_feed(&self, owner: &str, title: &str, subscription: &str) -> Result<Feed> {
        let subscription = parse_subscription(subscription)?;
        let uncategorized = self.store.uncategorized(owner)?;
        let feed = Feed::new(owner, &uncategorized.id, title.trim(), &subscription);
        self.store.create_feed(&feed)?;

        match refresh_feed(&self.store, &self.puller, &feed).await {
            Ok(added) => {
                tracing::debug!(feed = %feed.subscription, new_entries = added, "Initial pull complete");
            }
            Err(e) => {
                tracing::warn!(feed = %feed.subscription, error = %e, "Initial pull failed");
            }
        }

        self.store.get_feed(owner, &feed.id)
    }

    pub fn get(&self, owner: &str, id: &str) -> Result<Feed> {
        self.store.get_feed(owner, id)
    }

    /// Change title and/or subscription URL. A new URL drops the stored
    /// cache validators.
    pub fn update(
        &self,
        owner: &str,
        id: &str,
        title: Option<&str>,
        subscription: Option<&str>,
    ) -> Result<Feed> {
        let mut update = FeedUpdate {
            title: title.map(|t| t.trim().to_string()),
            ..Default::default()
        };
        if let Some(subscription) = subscription {
            update.subscription = Some(parse_subscription(subscription)?);
            update.etag = Some(String::new());
            update.last_modified = Some(String::new());
        }

        self.store.update_feed(owner, id, &update)?;
        self.store.get_feed(owner, id)
    }

    pub fn delete(&self, owner: &str, id: &str) -> Result<()> {
        self.store.delete_feed(owner, id)
    }

    pub fn list(&self, owner: &str, continuation: Option<&str>, count: usize) -> Result<Listing<Feed>> {
        self.store.list_feeds(owner, continuation, count)
    }

    pub fn entries(&self, owner: &str, id: &str, page: &Page) -> Result<Listing<Entry>> {
        self.store.list_entries(owner, EntryScope::Feed(id), page)
    }

    pub fn mark(&self, owner: &str, id: &str, marker: Marker) -> Result<usize> {
        self.store.mark_entries(owner, EntryScope::Feed(id), marker)
    }

    pub fn stats(&self, owner: &str, id: &str) -> Result<Stats> {
        self.store.stats(owner, EntryScope::Feed(id))
    }
}

/// Only absolute http(s) URLs can be pulled.
pub(crate) fn parse_subscription(raw: &str) -> Result<String> {
    let url = Url::parse(raw.trim())
        .map_err(|e| EstuaryError::BadRequest(format!("invalid subscription URL '{}': {}", raw, e)))?;
    match url.scheme() {
        "http" | "https" => Ok(url.to_string()),
        other => Err(EstuaryError::BadRequest(format!(
            "unsupported URL scheme '{}'",
            other
        ))),
    }
}
