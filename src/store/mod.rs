pub mod sqlite;

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::app::Result;
use crate::domain::{ApiKey, Category, Entry, Feed, FeedUpdate, Listing, Marker, Page, Stats, Tag, User};

pub use sqlite::SqliteStore;

pub type SharedStore = Arc<dyn Store + Send + Sync>;

/// Which entries a listing, marking or stats call covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryScope<'a> {
    All,
    Feed(&'a str),
    Category(&'a str),
    Tag(&'a str),
}

/// Durable storage. Every call taking an `owner` applies it as a predicate:
/// rows owned by somebody else behave exactly like missing rows.
pub trait Store {
    // User operations
    /// Inserts the user together with its Uncategorized category.
    fn create_user(&self, user: &User) -> Result<()>;
    fn get_user(&self, id: &str) -> Result<User>;
    fn get_user_by_name(&self, username: &str) -> Result<User>;
    fn list_users(&self, limit: usize) -> Result<Vec<User>>;
    fn all_user_ids(&self) -> Result<Vec<String>>;
    fn rename_user(&self, id: &str, username: &str) -> Result<()>;
    fn update_password(&self, id: &str, hash: &str, salt: &str) -> Result<()>;
    /// Removes the user and everything it owns.
    fn delete_user(&self, id: &str) -> Result<()>;

    // Category operations
    fn create_category(&self, category: &Category) -> Result<()>;
    fn get_category(&self, owner: &str, id: &str) -> Result<Category>;
    fn get_category_by_name(&self, owner: &str, name: &str) -> Result<Category>;
    fn uncategorized(&self, owner: &str) -> Result<Category>;
    fn list_categories(&self, owner: &str, continuation: Option<&str>, count: usize) -> Result<Listing<Category>>;
    fn rename_category(&self, owner: &str, id: &str, name: &str) -> Result<()>;
    /// Deletes the category after moving its feeds into Uncategorized.
    fn delete_category(&self, owner: &str, id: &str) -> Result<()>;

    // Feed operations
    fn create_feed(&self, feed: &Feed) -> Result<()>;
    /// Inserts the categories, then the feeds, in one transaction.
    fn add_subscriptions(&self, categories: &[Category], feeds: &[Feed]) -> Result<()>;
    fn get_feed(&self, owner: &str, id: &str) -> Result<Feed>;
    fn list_feeds(&self, owner: &str, continuation: Option<&str>, count: usize) -> Result<Listing<Feed>>;
    fn list_category_feeds(
        &self,
        owner: &str,
        category_id: &str,
        continuation: Option<&str>,
        count: usize,
    ) -> Result<Listing<Feed>>;
    fn all_feeds(&self, owner: &str) -> Result<Vec<Feed>>;
    fn update_feed(&self, owner: &str, id: &str, update: &FeedUpdate) -> Result<()>;
    /// Moves every feed into the category, or none of them if any id is
    /// missing or foreign.
    fn move_feeds(&self, owner: &str, category_id: &str, feed_ids: &[String]) -> Result<()>;
    fn delete_feed(&self, owner: &str, id: &str) -> Result<()>;

    // Entry operations
    fn create_entry(&self, entry: &Entry) -> Result<()>;
    /// Inserts entries whose `(owner, feed, guid)` is not stored yet; returns how many were new.
    fn add_entries(&self, entries: &[Entry]) -> Result<usize>;
    fn entry_exists(&self, owner: &str, feed_id: &str, guid: &str) -> Result<bool>;
    fn get_entry(&self, owner: &str, id: &str) -> Result<Entry>;
    fn list_entries(&self, owner: &str, scope: EntryScope<'_>, page: &Page) -> Result<Listing<Entry>>;
    fn mark_entry(&self, owner: &str, id: &str, marker: Marker) -> Result<()>;
    fn mark_entries(&self, owner: &str, scope: EntryScope<'_>, marker: Marker) -> Result<usize>;
    fn stats(&self, owner: &str, scope: EntryScope<'_>) -> Result<Stats>;

    // Tag operations
    fn create_tag(&self, tag: &Tag) -> Result<()>;
    fn get_tag(&self, owner: &str, id: &str) -> Result<Tag>;
    fn list_tags(&self, owner: &str, continuation: Option<&str>, count: usize) -> Result<Listing<Tag>>;
    fn rename_tag(&self, owner: &str, id: &str, name: &str) -> Result<()>;
    fn delete_tag(&self, owner: &str, id: &str) -> Result<()>;
    /// Tags every entry or none: an entry not owned by `owner` fails the whole call.
    fn tag_entries(&self, owner: &str, tag_id: &str, entry_ids: &[String]) -> Result<()>;
    fn untag_entries(&self, owner: &str, tag_id: &str, entry_ids: &[String]) -> Result<()>;
    fn entry_tags(&self, owner: &str, entry_id: &str) -> Result<Vec<Tag>>;

    // API key operations
    fn add_refresh_key(&self, key: &ApiKey) -> Result<()>;
    fn refresh_key_exists(&self, owner: &str, token: &str) -> Result<bool>;
    fn purge_expired_keys(&self, now: DateTime<Utc>) -> Result<usize>;
}
