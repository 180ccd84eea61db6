use crate::app::Result;
use crate::domain::{Entry, Listing, Marker, Page, Stats, Tag};
use crate::store::{EntryScope, SharedStore};

#[derive(Clone)]
pub struct EntryService {
    store: SharedStore,
}

impl EntryService {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    pub fn get(&self, owner: &str, id: &str) -> Result<Entry> {
        self.store.get_entry(owner, id)
    }

    pub fn list(&self, owner: &str, page: &Page) -> Result<Listing<Entry>> {
        self.store.list_entries(owner, EntryScope::All, page)
    }

    pub fn mark(&self, owner: &str, id: &str, marker: Marker) -> Result<()> {
        self.store.mark_entry(owner, id, marker)
    }

    pub fn mark_all(&self, owner: &str, marker: Marker) -> Result<usize> {
        self.store.mark_entries(owner, EntryScope::All, marker)
    }

    pub fn stats(&self, owner: &str) -> Result<Stats> {
        self.store.stats(owner, EntryScope::All)
    }

    pub fn tags(&self, owner: &str, id: &str) -> Result<Vec<Tag>> {
        self.store.entry_tags(owner, id)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, Utc};

    use super::*;
    use crate::app::EstuaryError;
    use crate::domain::{Feed, User};
    use crate::store::{SqliteStore, Store};

    fn setup(count: usize) -> (SharedStore, EntryService, String, Vec<Entry>) {
        let store: SharedStore = Arc::new(SqliteStore::in_memory().unwrap());
        let user = User::new("alice".into(), "h".into(), "s".into());
        store.create_user(&user).unwrap();
        let uncategorized = store.uncategorized(&user.id).unwrap();
        let feed = Feed::new(&user.id, &uncategorized.id, "", "https://example.com/");
        store.create_feed(&feed).unwrap();

        let base = Utc::now();
        let entries: Vec<Entry> = (0..count)
            .map(|i| {
                let mut entry = Entry::new(&user.id, &feed.id, &format!("g{}", i));
                entry.published_at = base - Duration::minutes(i as i64);
                entry
            })
            .collect();
        store.add_entries(&entries).unwrap();

        (store.clone(), EntryService::new(store), user.id, entries)
    }

    #[test]
    fn test_mark_is_idempotent() {
        let (_, entries, alice, stored) = setup(1);
        entries.mark(&alice, &stored[0].id, Marker::Saved).unwrap();
        entries.mark(&alice, &stored[0].id, Marker::Saved).unwrap();

        assert_eq!(entries.get(&alice, &stored[0].id).unwrap().marker, Marker::Saved);
        assert_eq!(entries.stats(&alice).unwrap().saved, 1);
    }

    #[test]
    fn test_mark_any_is_rejected() {
        let (_, entries, alice, stored) = setup(1);
        assert!(matches!(
            entries.mark(&alice, &stored[0].id, Marker::Any),
            Err(EstuaryError::BadRequest(_))
        ));
    }

    #[test]
    fn test_mark_all_read() {
        let (_, entries, alice, _) = setup(4);
        assert_eq!(entries.mark_all(&alice, Marker::Read).unwrap(), 4);

        let stats = entries.stats(&alice).unwrap();
        assert_eq!(stats, Stats { unread: 0, read: 4, saved: 0, total: 4 });
    }

    #[test]
    fn test_list_newest_first_pages() {
        let (_, entries, alice, stored) = setup(3);

        let first = entries.list(&alice, &Page::new(2).newest_first()).unwrap();
        assert_eq!(first.items[0].id, stored[0].id);
        assert_eq!(first.items[1].id, stored[1].id);
        assert!(!first.is_last());

        let second = entries
            .list(&alice, &Page::new(2).newest_first().after(first.next.clone()))
            .unwrap();
        assert_eq!(second.items.len(), 1);
        assert_eq!(second.items[0].id, stored[2].id);
        assert!(second.is_last());
    }

    #[test]
    fn test_tags_of_entry() {
        let (store, entries, alice, stored) = setup(1);
        let tag = crate::domain::Tag::new(&alice, "later");
        store.create_tag(&tag).unwrap();
        store.tag_entries(&alice, &tag.id, &[stored[0].id.clone()]).unwrap();

        let tags = entries.tags(&alice, &stored[0].id).unwrap();
        assert_eq!(tags, vec![tag]);
    }

    #[test]
    fn test_other_users_entry_is_not_found() {
        let (store, entries, _, stored) = setup(1);
        let bob = User::new("bob".into(), "h".into(), "s".into());
        store.create_user(&bob).unwrap();

        assert!(entries.get(&bob.id, &stored[0].id).unwrap_err().is_not_found());
        assert!(entries.mark(&bob.id, &stored[0].id, Marker::Read).unwrap_err().is_not_found());
    }
}
