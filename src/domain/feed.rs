use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feed {
    pub id: String,
    pub owner_id: String,
    pub category_id: String,
    pub title: String,
    pub subscription: String,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub last_updated: Option<DateTime<Utc>>,
}

impl Feed {
    pub fn new(owner_id: &str, category_id: &str, title: &str, subscription: &str) -> Self {
        Self {
            id: super::new_id(),
            owner_id: owner_id.to_string(),
            category_id: category_id.to_string(),
            title: title.to_string(),
            subscription: subscription.to_string(),
            etag: None,
            last_modified: None,
            last_updated: None,
        }
    }

    pub fn display_title(&self) -> &str {
        if self.title.is_empty() {
            &self.subscription
        } else {
            &self.title
        }
    }
}

/// Partial update; `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct FeedUpdate {
    pub title: Option<String>,
    pub subscription: Option<String>,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub last_updated: Option<DateTime<Utc>>,
}
