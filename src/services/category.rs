use crate::app::{EstuaryError, Result};
use crate::domain::category::is_reserved_name;
use crate::domain::{Category, Entry, Feed, Listing, Marker, Page, Stats};
use crate::store::{EntryScope, SharedStore};

use super::require_name;

#[derive(Clone)]
pub struct CategoryService {
    store: SharedStore,
}

impl CategoryService {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    pub fn new_category(&self, owner: &str, name: &str) -> Result<Category> {
        let name = allowed_name(name)?;
        let category = Category::new(owner, name);
        self.store.create_category(&category)?;
        Ok(category)
    }

    pub fn rename(&self, owner: &str, id: &str, name: &str) -> Result<()> {
        let name = allowed_name(name)?;
        if self.store.get_category(owner, id)?.is_uncategorized() {
            return Err(protected());
        }
        self.store.rename_category(owner, id, name)
    }

    /// Feeds of the deleted category move to Uncategorized.
    pub fn delete(&self, owner: &str, id: &str) -> Result<()> {
        if self.store.get_category(owner, id)?.is_uncategorized() {
            return Err(protected());
        }
        self.store.delete_category(owner, id)
    }

    pub fn get(&self, owner: &str, id: &str) -> Result<Category> {
        self.store.get_category(owner, id)
    }

    pub fn uncategorized(&self, owner: &str) -> Result<Category> {
        self.store.uncategorized(owner)
    }

    pub fn list(&self, owner: &str, continuation: Option<&str>, count: usize) -> Result<Listing<Category>> {
        self.store.list_categories(owner, continuation, count)
    }

    pub fn feeds_of(
        &self,
        owner: &str,
        id: &str,
        continuation: Option<&str>,
        count: usize,
    ) -> Result<Listing<Feed>> {
        self.store.list_category_feeds(owner, id, continuation, count)
    }

    pub fn entries_of(&self, owner: &str, id: &str, page: &Page) -> Result<Listing<Entry>> {
        self.store.list_entries(owner, EntryScope::Category(id), page)
    }

    pub fn mark(&self, owner: &str, id: &str, marker: Marker) -> Result<usize> {
        self.store.mark_entries(owner, EntryScope::Category(id), marker)
    }

    pub fn stats(&self, owner: &str, id: &str) -> Result<Stats> {
        self.store.stats(owner, EntryScope::Category(id))
    }

    /// Move each feed into this category. A missing or foreign feed fails
    /// the whole call and nothing moves.
    pub fn add_feeds(&self, owner: &str, id: &str, feed_ids: &[String]) -> Result<()> {
        self.store.move_feeds(owner, id, feed_ids)
    }
}

fn allowed_name(name: &str) -> Result<&str> {
    let name = require_name(name, "category name")?;
    if is_reserved_name(name) {
        return Err(protected());
    }
    Ok(name)
}

fn protected() -> EstuaryError {
    EstuaryError::Protected("the Uncategorized category cannot be changed".into())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::domain::User;
    use crate::store::{SqliteStore, Store};

    fn setup() -> (SharedStore, CategoryService, String) {
        let store: SharedStore = Arc::new(SqliteStore::in_memory().unwrap());
        let user = User::new("alice".into(), "h".into(), "s".into());
        store.create_user(&user).unwrap();
        (store.clone(), CategoryService::new(store), user.id)
    }

    fn feed_in(store: &SharedStore, owner: &str, category_id: &str, url: &str) -> Feed {
        let feed = Feed::new(owner, category_id, "", url);
        store.create_feed(&feed).unwrap();
        feed
    }

    #[test]
    fn test_case_insensitive_conflict() {
        let (_, categories, alice) = setup();
        categories.new_category(&alice, "Tech").unwrap();
        assert!(matches!(
            categories.new_category(&alice, "tech"),
            Err(EstuaryError::Conflict(_))
        ));
    }

    #[test]
    fn test_reserved_name_is_protected() {
        let (_, categories, alice) = setup();
        assert!(matches!(
            categories.new_category(&alice, "UNCATEGORIZED"),
            Err(EstuaryError::Protected(_))
        ));

        let tech = categories.new_category(&alice, "Tech").unwrap();
        assert!(matches!(
            categories.rename(&alice, &tech.id, "Uncategorized"),
            Err(EstuaryError::Protected(_))
        ));
        assert!(matches!(
            categories.new_category(&alice, "   "),
            Err(EstuaryError::BadRequest(_))
        ));
    }

    #[test]
    fn test_uncategorized_cannot_change() {
        let (_, categories, alice) = setup();
        let uncategorized = categories.uncategorized(&alice).unwrap();

        assert!(matches!(
            categories.rename(&alice, &uncategorized.id, "Misc"),
            Err(EstuaryError::Protected(_))
        ));
        assert!(matches!(
            categories.delete(&alice, &uncategorized.id),
            Err(EstuaryError::Protected(_))
        ));
    }

    #[test]
    fn test_delete_reparents_feeds() {
        let (store, categories, alice) = setup();
        let tech = categories.new_category(&alice, "Tech").unwrap();
        let feed = feed_in(&store, &alice, &tech.id, "https://example.com/feed");

        categories.delete(&alice, &tech.id).unwrap();

        let uncategorized = categories.uncategorized(&alice).unwrap();
        assert_eq!(store.get_feed(&alice, &feed.id).unwrap().category_id, uncategorized.id);
        assert!(categories.stats(&alice, &tech.id).unwrap_err().is_not_found());
    }

    #[test]
    fn test_add_feeds_moves_feeds() {
        let (store, categories, alice) = setup();
        let uncategorized = categories.uncategorized(&alice).unwrap();
        let a = feed_in(&store, &alice, &uncategorized.id, "https://a.example.com/");
        let b = feed_in(&store, &alice, &uncategorized.id, "https://b.example.com/");
        let tech = categories.new_category(&alice, "Tech").unwrap();

        categories
            .add_feeds(&alice, &tech.id, &[a.id.clone(), b.id.clone()])
            .unwrap();

        let listing = categories.feeds_of(&alice, &tech.id, None, 10).unwrap();
        assert_eq!(listing.items.len(), 2);
        assert!(listing.is_last());
        assert!(categories
            .feeds_of(&alice, &uncategorized.id, None, 10)
            .unwrap()
            .items
            .is_empty());
    }

    #[test]
    fn test_add_feeds_with_missing_id_moves_nothing() {
        let (store, categories, alice) = setup();
        let uncategorized = categories.uncategorized(&alice).unwrap();
        let a = feed_in(&store, &alice, &uncategorized.id, "https://a.example.com/");
        let tech = categories.new_category(&alice, "Tech").unwrap();

        let err = categories
            .add_feeds(&alice, &tech.id, &[a.id.clone(), "missing".into()])
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(store.get_feed(&alice, &a.id).unwrap().category_id, uncategorized.id);
        assert!(categories.feeds_of(&alice, &tech.id, None, 10).unwrap().items.is_empty());
    }

    #[test]
    fn test_other_users_category_is_not_found() {
        let (store, categories, alice) = setup();
        let bob = User::new("bob".into(), "h".into(), "s".into());
        store.create_user(&bob).unwrap();
        let tech = categories.new_category(&alice, "Tech").unwrap();

        assert!(categories.get(&bob.id, &tech.id).unwrap_err().is_not_found());
        assert!(categories.rename(&bob.id, &tech.id, "Mine").unwrap_err().is_not_found());
        assert!(categories.delete(&bob.id, &tech.id).unwrap_err().is_not_found());
        assert!(categories.mark(&bob.id, &tech.id, Marker::Read).unwrap_err().is_not_found());
    }

    #[test]
    fn test_mark_and_stats() {
        let (store, categories, alice) = setup();
        let uncategorized = categories.uncategorized(&alice).unwrap();
        let feed = feed_in(&store, &alice, &uncategorized.id, "https://example.com/feed");
        let entries: Vec<Entry> = ["g1", "g2", "g3"]
            .iter()
            .map(|guid| Entry::new(&alice, &feed.id, guid))
            .collect();
        store.add_entries(&entries).unwrap();

        assert_eq!(categories.mark(&alice, &uncategorized.id, Marker::Read).unwrap(), 3);
        assert_eq!(
            categories.stats(&alice, &uncategorized.id).unwrap(),
            Stats { unread: 0, read: 3, saved: 0, total: 3 }
        );

        let page = Page::new(2).with_marker(Marker::Read);
        let listing = categories.entries_of(&alice, &uncategorized.id, &page).unwrap();
        assert_eq!(listing.items.len(), 2);
        assert!(!listing.is_last());
    }
}
