//! OPML 2.0 import and export of a user's subscriptions.
//!
//! Export writes one outline per category holding one `type="rss"` outline
//! per feed; Uncategorized feeds sit at the top level. Import creates the
//! categories it is missing and the feeds not already subscribed.

use std::collections::HashSet;

use opml::{Head, Outline, OPML};

use crate::app::{EstuaryError, Result};
use crate::domain::category::is_reserved_name;
use crate::domain::{Category, Feed};
use crate::services::feed::parse_subscription;
use crate::store::SharedStore;

const FEED_TYPE: &str = "rss";

#[derive(Clone)]
pub struct OpmlService {
    store: SharedStore,
}

impl OpmlService {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    pub fn export_user(&self, user_id: &str) -> Result<Vec<u8>> {
        let user = self.store.get_user(user_id)?;
        let feeds = self.store.all_feeds(user_id)?;

        let mut document = OPML {
            head: Some(Head {
                title: Some(format!("{} subscriptions", user.username)),
                ..Head::default()
            }),
            ..OPML::default()
        };

        for category in self.all_categories(user_id)? {
            let children: Vec<Outline> = feeds
                .iter()
                .filter(|feed| feed.category_id == category.id)
                .map(feed_outline)
                .collect();

            if category.is_uncategorized() {
                document.body.outlines.extend(children);
            } else {
                document.body.outlines.push(Outline {
                    text: category.name.clone(),
                    title: Some(category.name.clone()),
                    outlines: children,
                    ..Outline::default()
                });
            }
        }

        document
            .to_string()
            .map(String::into_bytes)
            .map_err(|e| EstuaryError::Other(format!("OPML encoding failed: {}", e)))
    }

    /// Returns the number of feeds added. Malformed documents add nothing
    /// and are not an error; outlines whose URL is not http(s) are skipped.
    /// Everything the document adds is stored in a single transaction.
    pub fn import_user(&self, user_id: &str, content: &[u8]) -> Result<usize> {
        let uncategorized = self.store.uncategorized(user_id)?;

        let Ok(text) = std::str::from_utf8(content) else {
            tracing::debug!(user = %user_id, "Ignoring OPML that is not UTF-8");
            return Ok(0);
        };
        let document = match OPML::from_str(text) {
            Ok(document) => document,
            Err(e) => {
                tracing::debug!(user = %user_id, error = %e, "Ignoring malformed OPML");
                return Ok(0);
            }
        };

        let subscribed = self
            .store
            .all_feeds(user_id)?
            .into_iter()
            .map(|feed| feed.subscription)
            .collect();
        let mut plan = ImportPlan {
            user_id,
            subscribed,
            categories: Vec::new(),
            feeds: Vec::new(),
        };

        for outline in &document.body.outlines {
            match outline.r#type.as_deref() {
                Some(kind) if kind.eq_ignore_ascii_case(FEED_TYPE) => {
                    plan.add_feed(&uncategorized.id, outline);
                }
                Some(_) => {}
                None => {
                    let name = outline.title.as_deref().unwrap_or(&outline.text).trim();
                    let category_id = if name.is_empty() || is_reserved_name(name) {
                        uncategorized.id.clone()
                    } else {
                        self.category_named(&mut plan, name)?
                    };

                    for child in &outline.outlines {
                        if child
                            .r#type
                            .as_deref()
                            .is_some_and(|kind| kind.eq_ignore_ascii_case(FEED_TYPE))
                        {
                            plan.add_feed(&category_id, child);
                        }
                    }
                }
            }
        }

        let added = plan.feeds.len();
        self.store.add_subscriptions(&plan.categories, &plan.feeds)?;

        tracing::info!(user = %user_id, added, "Imported OPML");
        Ok(added)
    }

    /// Id of the category with this name, planning a new one if the user
    /// has none yet.
    fn category_named(&self, plan: &mut ImportPlan<'_>, name: &str) -> Result<String> {
        if let Some(planned) = plan
            .categories
            .iter()
            .find(|category| category.name.to_lowercase() == name.to_lowercase())
        {
            return Ok(planned.id.clone());
        }

        match self.store.get_category_by_name(plan.user_id, name) {
            Ok(category) => Ok(category.id),
            Err(EstuaryError::NotFound(_)) => {
                let category = Category::new(plan.user_id, name);
                let id = category.id.clone();
                plan.categories.push(category);
                Ok(id)
            }
            Err(e) => Err(e),
        }
    }

    fn all_categories(&self, user_id: &str) -> Result<Vec<Category>> {
        let mut categories = Vec::new();
        let mut continuation: Option<String> = None;
        loop {
            let listing = self
                .store
                .list_categories(user_id, continuation.as_deref(), crate::domain::page::MAX_PAGE_SIZE)?;
            categories.extend(listing.items);
            if listing.next.is_empty() {
                return Ok(categories);
            }
            continuation = Some(listing.next);
        }
    }
}

/// Categories and feeds an import will add.
struct ImportPlan<'a> {
    user_id: &'a str,
    subscribed: HashSet<String>,
    categories: Vec<Category>,
    feeds: Vec<Feed>,
}

impl ImportPlan<'_> {
    fn add_feed(&mut self, category_id: &str, outline: &Outline) {
        let Some(raw) = outline.xml_url.as_deref().filter(|u| !u.trim().is_empty()) else {
            return;
        };
        let url = match parse_subscription(raw) {
            Ok(url) => url,
            Err(e) => {
                tracing::debug!(user = %self.user_id, error = %e, "Skipping OPML outline");
                return;
            }
        };
        if !self.subscribed.insert(url.clone()) {
            return;
        }

        let title = outline.title.as_deref().unwrap_or(&outline.text).trim();
        self.feeds.push(Feed::new(self.user_id, category_id, title, &url));
    }
}

fn feed_outline(feed: &Feed) -> Outline {
    Outline {
        text: feed.display_title().to_string(),
        title: Some(feed.display_title().to_string()),
        r#type: Some(FEED_TYPE.to_string()),
        xml_url: Some(feed.subscription.clone()),
        ..Outline::default()
    }
}
