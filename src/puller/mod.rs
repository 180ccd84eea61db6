pub mod http;

use std::sync::Arc;

use async_trait::async_trait;

use crate::app::Result;
use crate::domain::Feed;
use crate::normalizer::{PulledEntry, PulledFeed};

pub use http::HttpPuller;

/// Conditional-request validators remembered from the previous pull.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheValidator {
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

impl CacheValidator {
    pub fn of(feed: &Feed) -> Self {
        Self {
            etag: feed.etag.clone(),
            last_modified: feed.last_modified.clone(),
        }
    }
}

#[derive(Debug)]
pub enum PullOutcome {
    /// Feed fetched and parsed
    Pulled {
        feed: PulledFeed,
        entries: Vec<PulledEntry>,
        validator: CacheValidator,
    },
    /// Publisher reported no change (HTTP 304)
    NotModified,
}

/// One fetch-and-parse cycle of a subscription.
///
/// Failures surface as `EstuaryError::Unreachable` (network, HTTP status)
/// or `EstuaryError::BadContent` (unparseable body).
#[async_trait]
pub trait Puller {
    async fn pull(&self, url: &str, validator: &CacheValidator) -> Result<PullOutcome>;
}

pub type SharedPuller = Arc<dyn Puller + Send + Sync>;
