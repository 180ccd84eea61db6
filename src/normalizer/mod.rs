use chrono::{DateTime, Utc};
use feed_rs::model::{Link, Text};
use feed_rs::parser;
use html_escape::decode_html_entities;

use crate::app::{EstuaryError, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PulledFeed {
    pub title: Option<String>,
    pub link: Option<String>,
}

/// One entry candidate as published, before it is bound to an owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PulledEntry {
    pub guid: String,
    pub title: String,
    pub link: String,
    pub author: String,
    pub published_at: DateTime<Utc>,
}

impl PulledEntry {
    pub fn new(guid: &str) -> Self {
        Self {
            guid: guid.to_string(),
            title: String::new(),
            link: String::new(),
            author: String::new(),
            published_at: Utc::now(),
        }
    }
}

#[derive(Clone)]
pub struct Normalizer;

impl Default for Normalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Normalizer {
    pub fn new() -> Self {
        Self
    }

    /// Parses RSS or Atom. Entries without a guid fall back to their link;
    /// entries with neither are dropped since they cannot be deduplicated.
    pub fn normalize(
        &self,
        body: &[u8],
        fetched_at: DateTime<Utc>,
    ) -> Result<(PulledFeed, Vec<PulledEntry>)> {
        let feed = parser::Builder::new()
            .id_generator(link_as_id)
            .build()
            .parse(body)
            .map_err(|e| EstuaryError::BadContent(e.to_string()))?;

        let meta = PulledFeed {
            title: feed
                .title
                .map(|t| decode_html_entities(&t.content).trim().to_string()),
            link: feed.links.first().map(|l| l.href.clone()),
        };

        let entries: Vec<PulledEntry> = feed
            .entries
            .into_iter()
            .filter_map(|entry| {
                let link = entry
                    .links
                    .first()
                    .map(|l| l.href.clone())
                    .unwrap_or_default();
                let guid = if entry.id.trim().is_empty() {
                    link.clone()
                } else {
                    entry.id.trim().to_string()
                };
                if guid.is_empty() {
                    return None;
                }

                Some(PulledEntry {
                    guid,
                    title: entry
                        .title
                        .map(|t| decode_html_entities(&t.content).trim().to_string())
                        .unwrap_or_default(),
                    link,
                    author: entry
                        .authors
                        .first()
                        .map(|a| a.name.clone())
                        .unwrap_or_default(),
                    published_at: entry
                        .published
                        .or(entry.updated)
                        .map(|dt| dt.with_timezone(&Utc))
                        .unwrap_or(fetched_at),
                })
            })
            .collect();

        Ok((meta, entries))
    }
}

/// Id for items published without one. feed-rs would otherwise hash the
/// title, which changes whenever the publisher edits it.
fn link_as_id(links: &[Link], _title: &Option<Text>, _base: Option<&str>) -> String {
    links
        .first()
        .map(|link| link.href.trim().to_string())
        .unwrap_or_default()
}
