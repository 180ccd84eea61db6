use crate::app::Result;
use crate::domain::{Entry, Listing, Page, Tag};
use crate::store::{EntryScope, SharedStore};

use super::require_name;

#[derive(Clone)]
pub struct TagService {
    store: SharedStore,
}

impl TagService {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    pub fn new_tag(&self, owner: &str, name: &str) -> Result<Tag> {
        let tag = Tag::new(owner, require_name(name, "tag name")?);
        self.store.create_tag(&tag)?;
        Ok(tag)
    }

    pub fn get(&self, owner: &str, id: &str) -> Result<Tag> {
        self.store.get_tag(owner, id)
    }

    pub fn rename(&self, owner: &str, id: &str, name: &str) -> Result<()> {
        self.store
            .rename_tag(owner, id, require_name(name, "tag name")?)
    }

    pub fn delete(&self, owner: &str, id: &str) -> Result<()> {
        self.store.delete_tag(owner, id)
    }

    pub fn list(&self, owner: &str, continuation: Option<&str>, count: usize) -> Result<Listing<Tag>> {
        self.store.list_tags(owner, continuation, count)
    }

    /// Tag every listed entry, or none of them if any is not the owner's.
    pub fn apply(&self, owner: &str, id: &str, entry_ids: &[String]) -> Result<()> {
        self.store.tag_entries(owner, id, entry_ids)
    }

    pub fn remove(&self, owner: &str, id: &str, entry_ids: &[String]) -> Result<()> {
        self.store.untag_entries(owner, id, entry_ids)
    }

    pub fn entries_of(&self, owner: &str, id: &str, page: &Page) -> Result<Listing<Entry>> {
        self.store.list_entries(owner, EntryScope::Tag(id), page)
    }
}
