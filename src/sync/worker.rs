use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Semaphore;

use crate::app::{EstuaryError, Result};
use crate::domain::{Entry, Feed, FeedUpdate};
use crate::puller::{CacheValidator, PullOutcome, SharedPuller};
use crate::store::SharedStore;

pub const DEFAULT_WORKERS: usize = 4;

/// Bounded pool that refreshes feeds concurrently.
pub struct WorkerPool {
    store: SharedStore,
    puller: SharedPuller,
    semaphore: Arc<Semaphore>,
}

impl WorkerPool {
    pub fn new(store: SharedStore, puller: SharedPuller, workers: usize) -> Self {
        Self {
            store,
            puller,
            semaphore: Arc::new(Semaphore::new(workers.max(1))),
        }
    }

    /// Refresh every feed, at most `workers` at a time. Results come back
    /// in input order; a panicking task is logged and dropped.
    pub async fn refresh_all(&self, feeds: Vec<Feed>) -> Vec<(Feed, Result<usize>)> {
        let mut handles = Vec::with_capacity(feeds.len());

        for feed in feeds {
            let store = self.store.clone();
            let puller = self.puller.clone();
            let semaphore = self.semaphore.clone();

            let handle = tokio::spawn(async move {
                let result = match semaphore.acquire_owned().await {
                    Ok(_permit) => refresh_feed(&store, &puller, &feed).await,
                    Err(_) => Err(EstuaryError::Other("worker pool closed".into())),
                };
                (feed, result)
            });

            handles.push(handle);
        }

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(result) => results.push(result),
                Err(e) => {
                    tracing::error!(error = %e, "Feed refresh task failed");
                }
            }
        }

        results
    }
}

/// Pull one feed and store the entries not seen before. Returns the number
/// of new entries.
pub async fn refresh_feed(store: &SharedStore, puller: &SharedPuller, feed: &Feed) -> Result<usize> {
    let outcome = puller
        .pull(&feed.subscription, &CacheValidator::of(feed))
        .await?;

    match outcome {
        PullOutcome::NotModified => {
            tracing::debug!(feed = %feed.subscription, "Feed not modified");
            let update = FeedUpdate {
                last_updated: Some(Utc::now()),
                ..Default::default()
            };
            store.update_feed(&feed.owner_id, &feed.id, &update)?;
            Ok(0)
        }
        PullOutcome::Pulled {
            feed: meta,
            entries,
            validator,
        } => {
            let mut fresh = Vec::new();
            for pulled in entries {
                if store.entry_exists(&feed.owner_id, &feed.id, &pulled.guid)? {
                    continue;
                }
                let mut entry = Entry::new(&feed.owner_id, &feed.id, &pulled.guid);
                entry.title = pulled.title;
                entry.link = pulled.link;
                entry.author = pulled.author;
                entry.published_at = pulled.published_at;
                fresh.push(entry);
            }

            let added = store.add_entries(&fresh)?;

            let mut update = FeedUpdate {
                etag: validator.etag,
                last_modified: validator.last_modified,
                last_updated: Some(Utc::now()),
                ..Default::default()
            };
            if feed.title.trim().is_empty() {
                update.title = meta.title.filter(|t| !t.is_empty());
            }
            store.update_feed(&feed.owner_id, &feed.id, &update)?;

            if added > 0 {
                tracing::info!(feed = %feed.display_title(), user = %feed.owner_id, new_entries = added, "Stored new entries");
            }
            Ok(added)
        }
    }
}
