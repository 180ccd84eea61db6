use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Marker;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry {
    pub id: String,
    pub owner_id: String,
    pub feed_id: String,
    pub guid: String,
    pub title: String,
    pub link: String,
    pub author: String,
    pub published_at: DateTime<Utc>,
    pub marker: Marker,
}

impl Entry {
    pub fn new(owner_id: &str, feed_id: &str, guid: &str) -> Self {
        Self {
            id: super::new_id(),
            owner_id: owner_id.to_string(),
            feed_id: feed_id.to_string(),
            guid: guid.to_string(),
            title: String::new(),
            link: String::new(),
            author: String::new(),
            published_at: Utc::now(),
            marker: Marker::Unread,
        }
    }
}
