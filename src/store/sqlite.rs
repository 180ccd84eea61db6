use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row, Transaction};
use rusqlite_migration::{Migrations, M};

use crate::app::{EstuaryError, Result};
use crate::domain::page::MAX_PAGE_SIZE;
use crate::domain::{
    ApiKey, Category, Entry, Feed, FeedUpdate, KeyType, Listing, Marker, Page, Stats, Tag, User,
    UNCATEGORIZED,
};
use crate::store::{EntryScope, Store};

const USER_COLUMNS: &str = "id, username, password_hash, password_salt, created_at";
const CATEGORY_COLUMNS: &str = "id, owner_id, name";
const FEED_COLUMNS: &str =
    "id, owner_id, category_id, title, subscription, etag, last_modified, last_updated";
const ENTRY_COLUMNS: &str =
    "id, owner_id, feed_id, guid, title, link, author, published_at, marker";
const TAG_COLUMNS: &str = "id, owner_id, name";

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.run_migrations()?;
        Ok(store)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.run_migrations()?;
        Ok(store)
    }

    fn run_migrations(&self) -> Result<()> {
        let migrations = Migrations::new(vec![M::up(include_str!(
            "../../migrations/001-initial/up.sql"
        ))]);

        let mut conn = self.lock()?;

        conn.execute("PRAGMA foreign_keys = ON", [])?;
        migrations
            .to_latest(&mut conn)
            .map_err(|e| EstuaryError::Migration(e.to_string()))?;

        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| {
            EstuaryError::Database(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(1),
                Some(e.to_string()),
            ))
        })
    }

    fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .or_else(|| s.parse::<DateTime<Utc>>().ok())
    }

    /// Fixed-width UTC form so that text ordering matches time ordering.
    fn format_datetime(dt: &DateTime<Utc>) -> String {
        dt.to_rfc3339_opts(SecondsFormat::Micros, true)
    }

    fn ensure_owned(conn: &Connection, table: &str, owner: &str, id: &str) -> Result<()> {
        let sql = format!("SELECT 1 FROM {} WHERE id = ?1 AND owner_id = ?2", table);
        let found = conn
            .query_row(&sql, params![id, owner], |_| Ok(()))
            .optional()?;
        found.ok_or_else(|| EstuaryError::NotFound(format!("{} {}", singular(table), id)))
    }

    fn insert_category(conn: &Connection, category: &Category) -> Result<()> {
        conn.execute(
            &format!("INSERT INTO categories ({}) VALUES (?1, ?2, ?3)", CATEGORY_COLUMNS),
            params![category.id, category.owner_id, category.name],
        )
        .map_err(|e| EstuaryError::from_write(e, format!("category '{}'", category.name)))?;
        Ok(())
    }

    /// The feed's category must already exist for the same owner.
    fn insert_feed(conn: &Connection, feed: &Feed) -> Result<()> {
        Self::ensure_owned(conn, "categories", &feed.owner_id, &feed.category_id)?;
        conn.execute(
            &format!(
                "INSERT INTO feeds ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                FEED_COLUMNS
            ),
            params![
                feed.id,
                feed.owner_id,
                feed.category_id,
                feed.title,
                feed.subscription,
                feed.etag,
                feed.last_modified,
                feed.last_updated.as_ref().map(Self::format_datetime),
            ],
        )
        .map_err(|e| EstuaryError::from_write(e, format!("feed {}", feed.id)))?;
        Ok(())
    }

    fn uncategorized_id(conn: &Connection, owner: &str) -> Result<String> {
        conn.query_row(
            "SELECT id FROM categories WHERE owner_id = ?1 AND lower(name) = ?2",
            params![owner, UNCATEGORIZED],
            |row| row.get(0),
        )
        .map_err(|e| EstuaryError::from_lookup(e, format!("uncategorized category of {}", owner)))
    }

    fn check_scope(conn: &Connection, owner: &str, scope: EntryScope<'_>) -> Result<()> {
        match scope {
            EntryScope::All => Ok(()),
            EntryScope::Feed(id) => Self::ensure_owned(conn, "feeds", owner, id),
            EntryScope::Category(id) => Self::ensure_owned(conn, "categories", owner, id),
            EntryScope::Tag(id) => Self::ensure_owned(conn, "tags", owner, id),
        }
    }

    /// Appends the scope predicate; `sql` must already filter on `owner_id`.
    fn push_scope(sql: &mut String, args: &mut Vec<Value>, owner: &str, scope: EntryScope<'_>) {
        match scope {
            EntryScope::All => {}
            EntryScope::Feed(id) => {
                sql.push_str(" AND feed_id = ?");
                args.push(Value::Text(id.to_string()));
            }
            EntryScope::Category(id) => {
                sql.push_str(
                    " AND feed_id IN (SELECT id FROM feeds WHERE owner_id = ? AND category_id = ?)",
                );
                args.push(Value::Text(owner.to_string()));
                args.push(Value::Text(id.to_string()));
            }
            EntryScope::Tag(id) => {
                sql.push_str(" AND id IN (SELECT entry_id FROM entry_tags WHERE tag_id = ?)");
                args.push(Value::Text(id.to_string()));
            }
        }
    }

    /// Runs `base` (which must end in a WHERE clause) ordered by id, one page at a time.
    fn list_page<T, F>(
        conn: &Connection,
        base: &str,
        mut args: Vec<Value>,
        continuation: Option<&str>,
        count: usize,
        map: F,
        id_of: impl Fn(&T) -> String,
    ) -> Result<Listing<T>>
    where
        F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
    {
        let limit = count.clamp(1, MAX_PAGE_SIZE);
        let mut sql = base.to_string();
        if let Some(after) = continuation.filter(|c| !c.is_empty()) {
            sql.push_str(" AND id > ?");
            args.push(Value::Text(after.to_string()));
        }
        sql.push_str(" ORDER BY id ASC LIMIT ?");
        args.push(Value::Integer(limit as i64 + 1));

        let mut stmt = conn.prepare(&sql)?;
        let items = stmt
            .query_map(params_from_iter(args.iter()), map)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(paginate(items, limit, id_of))
    }

    fn insert_entry(tx: &Transaction<'_>, entry: &Entry, or_ignore: bool) -> rusqlite::Result<usize> {
        let verb = if or_ignore { "INSERT OR IGNORE" } else { "INSERT" };
        tx.execute(
            &format!(
                "{} INTO entries ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                verb, ENTRY_COLUMNS
            ),
            params![
                entry.id,
                entry.owner_id,
                entry.feed_id,
                entry.guid,
                entry.title,
                entry.link,
                entry.author,
                Self::format_datetime(&entry.published_at),
                entry.marker.storable().map_or("unread", Marker::as_str),
            ],
        )
    }
}

fn singular(table: &str) -> &str {
    match table {
        "categories" => "category",
        "entries" => "entry",
        other => other.strip_suffix('s').unwrap_or(other),
    }
}

fn paginate<T>(mut items: Vec<T>, limit: usize, id_of: impl Fn(&T) -> String) -> Listing<T> {
    let next = if items.len() > limit {
        items.truncate(limit);
        items.last().map(id_of).unwrap_or_default()
    } else {
        String::new()
    };
    Listing { items, next }
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        password_hash: row.get(2)?,
        password_salt: row.get(3)?,
        created_at: row
            .get::<_, String>(4)
            .ok()
            .and_then(|s| SqliteStore::parse_datetime(&s))
            .unwrap_or_else(Utc::now),
    })
}

fn category_from_row(row: &Row<'_>) -> rusqlite::Result<Category> {
    Ok(Category {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        name: row.get(2)?,
    })
}

fn feed_from_row(row: &Row<'_>) -> rusqlite::Result<Feed> {
    Ok(Feed {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        category_id: row.get(2)?,
        title: row.get(3)?,
        subscription: row.get(4)?,
        etag: row.get::<_, Option<String>>(5)?.filter(|s| !s.is_empty()),
        last_modified: row.get::<_, Option<String>>(6)?.filter(|s| !s.is_empty()),
        last_updated: row
            .get::<_, Option<String>>(7)?
            .and_then(|s| SqliteStore::parse_datetime(&s)),
    })
}

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<Entry> {
    let marker = row
        .get::<_, String>(8)?
        .parse::<Marker>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(8, Type::Text, Box::new(e)))?;

    Ok(Entry {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        feed_id: row.get(2)?,
        guid: row.get(3)?,
        title: row.get(4)?,
        link: row.get(5)?,
        author: row.get(6)?,
        published_at: row
            .get::<_, String>(7)
            .ok()
            .and_then(|s| SqliteStore::parse_datetime(&s))
            .unwrap_or_else(Utc::now),
        marker,
    })
}

fn tag_from_row(row: &Row<'_>) -> rusqlite::Result<Tag> {
    Ok(Tag {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        name: row.get(2)?,
    })
}

impl Store for SqliteStore {
    fn create_user(&self, user: &User) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        tx.execute(
            &format!("INSERT INTO users ({}) VALUES (?1, ?2, ?3, ?4, ?5)", USER_COLUMNS),
            params![
                user.id,
                user.username,
                user.password_hash,
                user.password_salt,
                Self::format_datetime(&user.created_at)
            ],
        )
        .map_err(|e| EstuaryError::from_write(e, format!("username '{}'", user.username)))?;

        let uncategorized = Category::uncategorized(&user.id);
        tx.execute(
            &format!("INSERT INTO categories ({}) VALUES (?1, ?2, ?3)", CATEGORY_COLUMNS),
            params![uncategorized.id, uncategorized.owner_id, uncategorized.name],
        )?;

        tx.commit()?;
        Ok(())
    }

    fn get_user(&self, id: &str) -> Result<User> {
        let conn = self.lock()?;
        conn.query_row(
            &format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS),
            params![id],
            user_from_row,
        )
        .map_err(|e| EstuaryError::from_lookup(e, format!("user {}", id)))
    }

    fn get_user_by_name(&self, username: &str) -> Result<User> {
        let conn = self.lock()?;
        conn.query_row(
            &format!("SELECT {} FROM users WHERE username = ?1", USER_COLUMNS),
            params![username],
            user_from_row,
        )
        .map_err(|e| EstuaryError::from_lookup(e, format!("user '{}'", username)))
    }

    fn list_users(&self, limit: usize) -> Result<Vec<User>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM users ORDER BY pk ASC LIMIT ?1",
            USER_COLUMNS
        ))?;

        let users = stmt
            .query_map(params![limit as i64], user_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(users)
    }

    fn all_user_ids(&self) -> Result<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT id FROM users ORDER BY pk ASC")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(ids)
    }

    fn rename_user(&self, id: &str, username: &str) -> Result<()> {
        let conn = self.lock()?;
        let changed = conn
            .execute(
                "UPDATE users SET username = ?1 WHERE id = ?2",
                params![username, id],
            )
            .map_err(|e| EstuaryError::from_write(e, format!("username '{}'", username)))?;

        if changed == 0 {
            return Err(EstuaryError::NotFound(format!("user {}", id)));
        }
        Ok(())
    }

    fn update_password(&self, id: &str, hash: &str, salt: &str) -> Result<()> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE users SET password_hash = ?1, password_salt = ?2 WHERE id = ?3",
            params![hash, salt, id],
        )?;

        if changed == 0 {
            return Err(EstuaryError::NotFound(format!("user {}", id)));
        }
        Ok(())
    }

    fn delete_user(&self, id: &str) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let exists = tx
            .query_row("SELECT 1 FROM users WHERE id = ?1", params![id], |_| Ok(()))
            .optional()?;
        if exists.is_none() {
            return Err(EstuaryError::NotFound(format!("user {}", id)));
        }

        // Children first: feeds reference categories without a cascade.
        tx.execute("DELETE FROM entries WHERE owner_id = ?1", params![id])?;
        tx.execute("DELETE FROM tags WHERE owner_id = ?1", params![id])?;
        tx.execute("DELETE FROM feeds WHERE owner_id = ?1", params![id])?;
        tx.execute("DELETE FROM categories WHERE owner_id = ?1", params![id])?;
        tx.execute("DELETE FROM api_keys WHERE owner_id = ?1", params![id])?;
        tx.execute("DELETE FROM users WHERE id = ?1", params![id])?;

        tx.commit()?;
        Ok(())
    }

    fn create_category(&self, category: &Category) -> Result<()> {
        let conn = self.lock()?;
        Self::insert_category(&conn, category)
    }

    fn get_category(&self, owner: &str, id: &str) -> Result<Category> {
        let conn = self.lock()?;
        conn.query_row(
            &format!(
                "SELECT {} FROM categories WHERE id = ?1 AND owner_id = ?2",
                CATEGORY_COLUMNS
            ),
            params![id, owner],
            category_from_row,
        )
        .map_err(|e| EstuaryError::from_lookup(e, format!("category {}", id)))
    }

    fn get_category_by_name(&self, owner: &str, name: &str) -> Result<Category> {
        let conn = self.lock()?;
        conn.query_row(
            &format!(
                "SELECT {} FROM categories WHERE owner_id = ?1 AND lower(name) = lower(?2)",
                CATEGORY_COLUMNS
            ),
            params![owner, name],
            category_from_row,
        )
        .map_err(|e| EstuaryError::from_lookup(e, format!("category '{}'", name)))
    }

    fn uncategorized(&self, owner: &str) -> Result<Category> {
        self.get_category_by_name(owner, UNCATEGORIZED)
    }

    fn list_categories(
        &self,
        owner: &str,
        continuation: Option<&str>,
        count: usize,
    ) -> Result<Listing<Category>> {
        let conn = self.lock()?;
        Self::list_page(
            &conn,
            &format!("SELECT {} FROM categories WHERE owner_id = ?", CATEGORY_COLUMNS),
            vec![Value::Text(owner.to_string())],
            continuation,
            count,
            category_from_row,
            |c| c.id.clone(),
        )
    }

    fn rename_category(&self, owner: &str, id: &str, name: &str) -> Result<()> {
        let conn = self.lock()?;
        let changed = conn
            .execute(
                "UPDATE categories SET name = ?1 WHERE id = ?2 AND owner_id = ?3",
                params![name, id, owner],
            )
            .map_err(|e| EstuaryError::from_write(e, format!("category '{}'", name)))?;

        if changed == 0 {
            return Err(EstuaryError::NotFound(format!("category {}", id)));
        }
        Ok(())
    }

    fn delete_category(&self, owner: &str, id: &str) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        Self::ensure_owned(&tx, "categories", owner, id)?;
        let uncategorized = Self::uncategorized_id(&tx, owner)?;
        if uncategorized == id {
            return Err(EstuaryError::Protected(
                "the Uncategorized category cannot be deleted".into(),
            ));
        }

        tx.execute(
            "UPDATE feeds SET category_id = ?1 WHERE category_id = ?2 AND owner_id = ?3",
            params![uncategorized, id, owner],
        )?;
        tx.execute(
            "DELETE FROM categories WHERE id = ?1 AND owner_id = ?2",
            params![id, owner],
        )?;

        tx.commit()?;
        Ok(())
    }

    fn create_feed(&self, feed: &Feed) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        Self::insert_feed(&tx, feed)?;

        tx.commit()?;
        Ok(())
    }

    fn add_subscriptions(&self, categories: &[Category], feeds: &[Feed]) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        for category in categories {
            Self::insert_category(&tx, category)?;
        }
        for feed in feeds {
            Self::insert_feed(&tx, feed)?;
        }

        tx.commit()?;
        Ok(())
    }

    fn get_feed(&self, owner: &str, id: &str) -> Result<Feed> {
        let conn = self.lock()?;
        conn.query_row(
            &format!("SELECT {} FROM feeds WHERE id = ?1 AND owner_id = ?2", FEED_COLUMNS),
            params![id, owner],
            feed_from_row,
        )
        .map_err(|e| EstuaryError::from_lookup(e, format!("feed {}", id)))
    }

    fn list_feeds(&self, owner: &str, continuation: Option<&str>, count: usize) -> Result<Listing<Feed>> {
        let conn = self.lock()?;
        Self::list_page(
            &conn,
            &format!("SELECT {} FROM feeds WHERE owner_id = ?", FEED_COLUMNS),
            vec![Value::Text(owner.to_string())],
            continuation,
            count,
            feed_from_row,
            |f| f.id.clone(),
        )
    }

    fn list_category_feeds(
        &self,
        owner: &str,
        category_id: &str,
        continuation: Option<&str>,
        count: usize,
    ) -> Result<Listing<Feed>> {
        let conn = self.lock()?;
        Self::ensure_owned(&conn, "categories", owner, category_id)?;
        Self::list_page(
            &conn,
            &format!(
                "SELECT {} FROM feeds WHERE owner_id = ? AND category_id = ?",
                FEED_COLUMNS
            ),
            vec![
                Value::Text(owner.to_string()),
                Value::Text(category_id.to_string()),
            ],
            continuation,
            count,
            feed_from_row,
            |f| f.id.clone(),
        )
    }

    fn all_feeds(&self, owner: &str) -> Result<Vec<Feed>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM feeds WHERE owner_id = ?1 ORDER BY id ASC",
            FEED_COLUMNS
        ))?;

        let feeds = stmt
            .query_map(params![owner], feed_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(feeds)
    }

    fn update_feed(&self, owner: &str, id: &str, update: &FeedUpdate) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        Self::ensure_owned(&tx, "feeds", owner, id)?;

        if let Some(ref title) = update.title {
            tx.execute(
                "UPDATE feeds SET title = ?1 WHERE id = ?2",
                params![title, id],
            )?;
        }
        if let Some(ref subscription) = update.subscription {
            tx.execute(
                "UPDATE feeds SET subscription = ?1 WHERE id = ?2",
                params![subscription, id],
            )?;
        }
        if let Some(ref etag) = update.etag {
            tx.execute("UPDATE feeds SET etag = ?1 WHERE id = ?2", params![etag, id])?;
        }
        if let Some(ref last_modified) = update.last_modified {
            tx.execute(
                "UPDATE feeds SET last_modified = ?1 WHERE id = ?2",
                params![last_modified, id],
            )?;
        }
        if let Some(ref last_updated) = update.last_updated {
            tx.execute(
                "UPDATE feeds SET last_updated = ?1 WHERE id = ?2",
                params![Self::format_datetime(last_updated), id],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    fn move_feeds(&self, owner: &str, category_id: &str, feed_ids: &[String]) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        Self::ensure_owned(&tx, "categories", owner, category_id)?;
        for feed_id in feed_ids {
            Self::ensure_owned(&tx, "feeds", owner, feed_id)?;
            tx.execute(
                "UPDATE feeds SET category_id = ?1 WHERE id = ?2 AND owner_id = ?3",
                params![category_id, feed_id, owner],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    fn delete_feed(&self, owner: &str, id: &str) -> Result<()> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "DELETE FROM feeds WHERE id = ?1 AND owner_id = ?2",
            params![id, owner],
        )?;

        if changed == 0 {
            return Err(EstuaryError::NotFound(format!("feed {}", id)));
        }
        Ok(())
    }

    fn create_entry(&self, entry: &Entry) -> Result<()> {
        entry.marker.storable()?;
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        Self::ensure_owned(&tx, "feeds", &entry.owner_id, &entry.feed_id)?;
        Self::insert_entry(&tx, entry, false)
            .map_err(|e| EstuaryError::from_write(e, format!("entry guid '{}'", entry.guid)))?;

        tx.commit()?;
        Ok(())
    }

    fn add_entries(&self, entries: &[Entry]) -> Result<usize> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let mut count = 0;
        let mut checked_feed: Option<(&str, &str)> = None;

        for entry in entries {
            let key = (entry.owner_id.as_str(), entry.feed_id.as_str());
            if checked_feed != Some(key) {
                Self::ensure_owned(&tx, "feeds", &entry.owner_id, &entry.feed_id)?;
                checked_feed = Some(key);
            }
            count += Self::insert_entry(&tx, entry, true)?;
        }

        tx.commit()?;
        Ok(count)
    }

    fn entry_exists(&self, owner: &str, feed_id: &str, guid: &str) -> Result<bool> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM entries WHERE owner_id = ?1 AND feed_id = ?2 AND guid = ?3",
            params![owner, feed_id, guid],
            |row| row.get(0),
        )?;

        Ok(count > 0)
    }

    fn get_entry(&self, owner: &str, id: &str) -> Result<Entry> {
        let conn = self.lock()?;
        conn.query_row(
            &format!(
                "SELECT {} FROM entries WHERE id = ?1 AND owner_id = ?2",
                ENTRY_COLUMNS
            ),
            params![id, owner],
            entry_from_row,
        )
        .map_err(|e| EstuaryError::from_lookup(e, format!("entry {}", id)))
    }

    fn list_entries(&self, owner: &str, scope: EntryScope<'_>, page: &Page) -> Result<Listing<Entry>> {
        let conn = self.lock()?;
        Self::check_scope(&conn, owner, scope)?;

        let limit = page.limit();
        let mut sql = format!("SELECT {} FROM entries WHERE owner_id = ?", ENTRY_COLUMNS);
        let mut args = vec![Value::Text(owner.to_string())];
        Self::push_scope(&mut sql, &mut args, owner, scope);

        if page.marker != Marker::Any {
            sql.push_str(" AND marker = ?");
            args.push(Value::Text(page.marker.as_str().to_string()));
        }

        if let Some(after) = page.continuation.as_deref().filter(|c| !c.is_empty()) {
            if page.newest_first {
                let published: Option<String> = conn
                    .query_row(
                        "SELECT published_at FROM entries WHERE id = ?1 AND owner_id = ?2",
                        params![after, owner],
                        |row| row.get(0),
                    )
                    .optional()?;
                // The cursor entry is gone, so its position is unknown
                let Some(published) = published else {
                    tracing::debug!(continuation = %after, "Continuation entry no longer exists");
                    return Ok(Listing { items: Vec::new(), next: String::new() });
                };
                sql.push_str(" AND (published_at < ? OR (published_at = ? AND id > ?))");
                args.push(Value::Text(published.clone()));
                args.push(Value::Text(published));
                args.push(Value::Text(after.to_string()));
            } else {
                sql.push_str(" AND id > ?");
                args.push(Value::Text(after.to_string()));
            }
        }

        if page.newest_first {
            sql.push_str(" ORDER BY published_at DESC, id ASC");
        } else {
            sql.push_str(" ORDER BY id ASC");
        }
        sql.push_str(" LIMIT ?");
        args.push(Value::Integer(limit as i64 + 1));

        let mut stmt = conn.prepare(&sql)?;
        let entries = stmt
            .query_map(params_from_iter(args.iter()), entry_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(paginate(entries, limit, |e| e.id.clone()))
    }

    fn mark_entry(&self, owner: &str, id: &str, marker: Marker) -> Result<()> {
        let marker = marker.storable()?;
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE entries SET marker = ?1 WHERE id = ?2 AND owner_id = ?3",
            params![marker.as_str(), id, owner],
        )?;

        if changed == 0 {
            return Err(EstuaryError::NotFound(format!("entry {}", id)));
        }
        Ok(())
    }

    fn mark_entries(&self, owner: &str, scope: EntryScope<'_>, marker: Marker) -> Result<usize> {
        let marker = marker.storable()?;
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        Self::check_scope(&tx, owner, scope)?;

        let mut sql = String::from("UPDATE entries SET marker = ? WHERE owner_id = ?");
        let mut args = vec![
            Value::Text(marker.as_str().to_string()),
            Value::Text(owner.to_string()),
        ];
        Self::push_scope(&mut sql, &mut args, owner, scope);

        let changed = tx.execute(&sql, params_from_iter(args.iter()))?;
        tx.commit()?;
        Ok(changed)
    }

    fn stats(&self, owner: &str, scope: EntryScope<'_>) -> Result<Stats> {
        let conn = self.lock()?;
        Self::check_scope(&conn, owner, scope)?;

        let mut sql = String::from("SELECT marker, COUNT(*) FROM entries WHERE owner_id = ?");
        let mut args = vec![Value::Text(owner.to_string())];
        Self::push_scope(&mut sql, &mut args, owner, scope);
        sql.push_str(" GROUP BY marker");

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(args.iter()), |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut stats = Stats::default();
        for (marker, count) in rows {
            match marker.parse::<Marker>()? {
                Marker::Unread => stats.unread += count,
                Marker::Read => stats.read += count,
                Marker::Saved => stats.saved += count,
                Marker::Any => {}
            }
            stats.total += count;
        }

        Ok(stats)
    }

    fn create_tag(&self, tag: &Tag) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            &format!("INSERT INTO tags ({}) VALUES (?1, ?2, ?3)", TAG_COLUMNS),
            params![tag.id, tag.owner_id, tag.name],
        )
        .map_err(|e| EstuaryError::from_write(e, format!("tag '{}'", tag.name)))?;
        Ok(())
    }

    fn get_tag(&self, owner: &str, id: &str) -> Result<Tag> {
        let conn = self.lock()?;
        conn.query_row(
            &format!("SELECT {} FROM tags WHERE id = ?1 AND owner_id = ?2", TAG_COLUMNS),
            params![id, owner],
            tag_from_row,
        )
        .map_err(|e| EstuaryError::from_lookup(e, format!("tag {}", id)))
    }

    fn list_tags(&self, owner: &str, continuation: Option<&str>, count: usize) -> Result<Listing<Tag>> {
        let conn = self.lock()?;
        Self::list_page(
            &conn,
            &format!("SELECT {} FROM tags WHERE owner_id = ?", TAG_COLUMNS),
            vec![Value::Text(owner.to_string())],
            continuation,
            count,
            tag_from_row,
            |t| t.id.clone(),
        )
    }

    fn rename_tag(&self, owner: &str, id: &str, name: &str) -> Result<()> {
        let conn = self.lock()?;
        let changed = conn
            .execute(
                "UPDATE tags SET name = ?1 WHERE id = ?2 AND owner_id = ?3",
                params![name, id, owner],
            )
            .map_err(|e| EstuaryError::from_write(e, format!("tag '{}'", name)))?;

        if changed == 0 {
            return Err(EstuaryError::NotFound(format!("tag {}", id)));
        }
        Ok(())
    }

    fn delete_tag(&self, owner: &str, id: &str) -> Result<()> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "DELETE FROM tags WHERE id = ?1 AND owner_id = ?2",
            params![id, owner],
        )?;

        if changed == 0 {
            return Err(EstuaryError::NotFound(format!("tag {}", id)));
        }
        Ok(())
    }

    fn tag_entries(&self, owner: &str, tag_id: &str, entry_ids: &[String]) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        Self::ensure_owned(&tx, "tags", owner, tag_id)?;
        for entry_id in entry_ids {
            Self::ensure_owned(&tx, "entries", owner, entry_id)?;
            tx.execute(
                "INSERT OR IGNORE INTO entry_tags (entry_id, tag_id) VALUES (?1, ?2)",
                params![entry_id, tag_id],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    fn untag_entries(&self, owner: &str, tag_id: &str, entry_ids: &[String]) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        Self::ensure_owned(&tx, "tags", owner, tag_id)?;
        for entry_id in entry_ids {
            Self::ensure_owned(&tx, "entries", owner, entry_id)?;
            tx.execute(
                "DELETE FROM entry_tags WHERE entry_id = ?1 AND tag_id = ?2",
                params![entry_id, tag_id],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    fn entry_tags(&self, owner: &str, entry_id: &str) -> Result<Vec<Tag>> {
        let conn = self.lock()?;
        Self::ensure_owned(&conn, "entries", owner, entry_id)?;

        let mut stmt = conn.prepare(
            "SELECT t.id, t.owner_id, t.name FROM tags t
             JOIN entry_tags et ON et.tag_id = t.id
             WHERE et.entry_id = ?1 AND t.owner_id = ?2
             ORDER BY t.name",
        )?;

        let tags = stmt
            .query_map(params![entry_id, owner], tag_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(tags)
    }

    fn add_refresh_key(&self, key: &ApiKey) -> Result<()> {
        if key.key_type != KeyType::Refresh {
            return Err(EstuaryError::BadRequest(
                "only refresh keys are persisted".into(),
            ));
        }

        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO api_keys (token, owner_id, key_type, expires_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                key.token,
                key.owner_id,
                key.key_type.as_str(),
                Self::format_datetime(&key.expires_at)
            ],
        )
        .map_err(|e| EstuaryError::from_write(e, "refresh key"))?;
        Ok(())
    }

    fn refresh_key_exists(&self, owner: &str, token: &str) -> Result<bool> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM api_keys WHERE owner_id = ?1 AND token = ?2",
            params![owner, token],
            |row| row.get(0),
        )?;

        Ok(count > 0)
    }

    fn purge_expired_keys(&self, now: DateTime<Utc>) -> Result<usize> {
        let conn = self.lock()?;
        let removed = conn.execute(
            "DELETE FROM api_keys WHERE expires_at <= ?1",
            params![Self::format_datetime(&now)],
        )?;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn store_with_user(name: &str) -> (SqliteStore, User) {
        let store = SqliteStore::in_memory().unwrap();
        let user = User::new(name.into(), "hash".into(), "salt".into());
        store.create_user(&user).unwrap();
        (store, user)
    }

    fn add_feed(store: &SqliteStore, owner: &str, category_id: &str, url: &str) -> Feed {
        let feed = Feed::new(owner, category_id, "", url);
        store.create_feed(&feed).unwrap();
        feed
    }

    fn add_entry(store: &SqliteStore, feed: &Feed, guid: &str) -> Entry {
        let entry = Entry::new(&feed.owner_id, &feed.id, guid);
        store.create_entry(&entry).unwrap();
        entry
    }

    #[test]
    fn test_create_user_adds_uncategorized() {
        let (store, user) = store_with_user("alice");

        let category = store.uncategorized(&user.id).unwrap();
        assert_eq!(category.name, UNCATEGORIZED);

        let listing = store.list_categories(&user.id, None, 10).unwrap();
        assert_eq!(listing.items.len(), 1);
        assert!(listing.is_last());
    }

    #[test]
    fn test_duplicate_username_conflicts() {
        let (store, _) = store_with_user("bob");
        let again = User::new("bob".into(), "h".into(), "s".into());
        assert!(matches!(
            store.create_user(&again),
            Err(EstuaryError::Conflict(_))
        ));
    }

    #[test]
    fn test_category_name_unique_ignoring_case() {
        let (store, user) = store_with_user("alice");
        store.create_category(&Category::new(&user.id, "Tech")).unwrap();

        let result = store.create_category(&Category::new(&user.id, "tech"));
        assert!(matches!(result, Err(EstuaryError::Conflict(_))));
    }

    #[test]
    fn test_lookup_of_foreign_rows_is_not_found() {
        let (store, alice) = store_with_user("alice");
        let bob = User::new("bob".into(), "h".into(), "s".into());
        store.create_user(&bob).unwrap();

        let unc = store.uncategorized(&alice.id).unwrap();
        let feed = add_feed(&store, &alice.id, &unc.id, "https://example.com/feed.xml");
        let entry = add_entry(&store, &feed, "g1");

        assert!(store.get_feed(&bob.id, &feed.id).unwrap_err().is_not_found());
        assert!(store.get_entry(&bob.id, &entry.id).unwrap_err().is_not_found());
        assert!(store.get_category(&bob.id, &unc.id).unwrap_err().is_not_found());
        assert!(store.mark_entry(&bob.id, &entry.id, Marker::Read).unwrap_err().is_not_found());
        assert!(store.delete_feed(&bob.id, &feed.id).unwrap_err().is_not_found());
    }

    #[test]
    fn test_update_feed() {
        let (store, user) = store_with_user("alice");
        let unc = store.uncategorized(&user.id).unwrap();
        let feed = add_feed(&store, &user.id, &unc.id, "https://example.com/feed.xml");

        let update = FeedUpdate {
            title: Some("Updated Title".into()),
            etag: Some("\"abc123\"".into()),
            last_modified: Some("Mon, 01 Jan 2024 00:00:00 GMT".into()),
            last_updated: Some(Utc::now()),
            ..Default::default()
        };
        store.update_feed(&user.id, &feed.id, &update).unwrap();

        let retrieved = store.get_feed(&user.id, &feed.id).unwrap();
        assert_eq!(retrieved.title, "Updated Title");
        assert_eq!(retrieved.etag, Some("\"abc123\"".into()));
        assert_eq!(
            retrieved.last_modified,
            Some("Mon, 01 Jan 2024 00:00:00 GMT".into())
        );
        assert!(retrieved.last_updated.is_some());
        assert_eq!(retrieved.subscription, "https://example.com/feed.xml");
    }

    #[test]
    fn test_delete_category_reparents_feeds() {
        let (store, user) = store_with_user("alice");
        let tech = Category::new(&user.id, "Tech");
        store.create_category(&tech).unwrap();
        let feed = add_feed(&store, &user.id, &tech.id, "https://example.com/feed.xml");

        store.delete_category(&user.id, &tech.id).unwrap();

        let unc = store.uncategorized(&user.id).unwrap();
        assert_eq!(store.get_feed(&user.id, &feed.id).unwrap().category_id, unc.id);
        assert!(store.get_category(&user.id, &tech.id).unwrap_err().is_not_found());
    }

    #[test]
    fn test_uncategorized_cannot_be_deleted() {
        let (store, user) = store_with_user("alice");
        let unc = store.uncategorized(&user.id).unwrap();
        assert!(matches!(
            store.delete_category(&user.id, &unc.id),
            Err(EstuaryError::Protected(_))
        ));
    }

    #[test]
    fn test_delete_feed_cascades_entries() {
        let (store, user) = store_with_user("alice");
        let unc = store.uncategorized(&user.id).unwrap();
        let feed = add_feed(&store, &user.id, &unc.id, "https://example.com/feed.xml");
        let entry = add_entry(&store, &feed, "g1");

        store.delete_feed(&user.id, &feed.id).unwrap();

        assert!(store.get_entry(&user.id, &entry.id).unwrap_err().is_not_found());
        assert!(!store.entry_exists(&user.id, &feed.id, "g1").unwrap());
    }

    #[test]
    fn test_add_entries_batch_and_dedup() {
        let (store, user) = store_with_user("alice");
        let unc = store.uncategorized(&user.id).unwrap();
        let feed = add_feed(&store, &user.id, &unc.id, "https://example.com/feed.xml");

        let entries: Vec<Entry> = (0..3)
            .map(|i| Entry::new(&user.id, &feed.id, &format!("entry-{}", i)))
            .collect();
        assert_eq!(store.add_entries(&entries).unwrap(), 3);

        // Same guids under fresh ids: nothing new
        let again: Vec<Entry> = (0..3)
            .map(|i| Entry::new(&user.id, &feed.id, &format!("entry-{}", i)))
            .collect();
        assert_eq!(store.add_entries(&again).unwrap(), 0);

        assert_eq!(store.stats(&user.id, EntryScope::Feed(&feed.id)).unwrap().total, 3);
    }

    #[test]
    fn test_create_duplicate_entry_conflicts() {
        let (store, user) = store_with_user("alice");
        let unc = store.uncategorized(&user.id).unwrap();
        let feed = add_feed(&store, &user.id, &unc.id, "https://example.com/feed.xml");
        add_entry(&store, &feed, "g1");

        let dup = Entry::new(&user.id, &feed.id, "g1");
        assert!(matches!(store.create_entry(&dup), Err(EstuaryError::Conflict(_))));
    }

    #[test]
    fn test_add_entries_rejects_foreign_feed() {
        let (store, alice) = store_with_user("alice");
        let bob = User::new("bob".into(), "h".into(), "s".into());
        store.create_user(&bob).unwrap();
        let unc = store.uncategorized(&alice.id).unwrap();
        let feed = add_feed(&store, &alice.id, &unc.id, "https://example.com/feed.xml");

        let entry = Entry::new(&bob.id, &feed.id, "g1");
        assert!(store.add_entries(&[entry]).unwrap_err().is_not_found());
    }

    #[test]
    fn test_mark_scopes_and_stats() {
        let (store, user) = store_with_user("alice");
        let unc = store.uncategorized(&user.id).unwrap();
        let tech = Category::new(&user.id, "Tech");
        store.create_category(&tech).unwrap();
        let feed_a = add_feed(&store, &user.id, &unc.id, "https://a.example.com/feed.xml");
        let feed_b = add_feed(&store, &user.id, &tech.id, "https://b.example.com/feed.xml");
        let first = add_entry(&store, &feed_a, "a1");
        add_entry(&store, &feed_a, "a2");
        add_entry(&store, &feed_b, "b1");

        store.mark_entry(&user.id, &first.id, Marker::Saved).unwrap();
        assert_eq!(
            store.mark_entries(&user.id, EntryScope::Category(&tech.id), Marker::Read).unwrap(),
            1
        );

        let stats = store.stats(&user.id, EntryScope::All).unwrap();
        assert_eq!(
            stats,
            Stats {
                unread: 1,
                read: 1,
                saved: 1,
                total: 3
            }
        );

        store.mark_entries(&user.id, EntryScope::All, Marker::Read).unwrap();
        let stats = store.stats(&user.id, EntryScope::Feed(&feed_a.id)).unwrap();
        assert_eq!(stats.read, 2);
        assert_eq!(stats.unread, 0);
    }

    #[test]
    fn test_mark_with_any_is_rejected() {
        let (store, user) = store_with_user("alice");
        assert!(matches!(
            store.mark_entries(&user.id, EntryScope::All, Marker::Any),
            Err(EstuaryError::BadRequest(_))
        ));
    }

    #[test]
    fn test_stats_for_missing_scope_is_not_found() {
        let (store, user) = store_with_user("alice");
        assert!(store
            .stats(&user.id, EntryScope::Category("missing"))
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn test_entry_pagination_by_id() {
        let (store, user) = store_with_user("alice");
        let unc = store.uncategorized(&user.id).unwrap();
        let feed = add_feed(&store, &user.id, &unc.id, "https://example.com/feed.xml");
        for i in 0..5 {
            add_entry(&store, &feed, &format!("g{}", i));
        }

        let first = store.list_entries(&user.id, EntryScope::All, &Page::new(2)).unwrap();
        assert_eq!(first.items.len(), 2);
        assert_eq!(first.next, first.items[1].id);

        let second = store
            .list_entries(&user.id, EntryScope::All, &Page::new(2).after(first.next.clone()))
            .unwrap();
        let third = store
            .list_entries(&user.id, EntryScope::All, &Page::new(2).after(second.next.clone()))
            .unwrap();
        assert_eq!(third.items.len(), 1);
        assert!(third.is_last());

        let mut seen: Vec<String> = first
            .items
            .iter()
            .chain(second.items.iter())
            .chain(third.items.iter())
            .map(|e| e.id.clone())
            .collect();
        let sorted = {
            let mut s = seen.clone();
            s.sort();
            s
        };
        assert_eq!(seen, sorted);
        seen.dedup();
        assert_eq!(seen.len(), 5);
    }

    #[test]
    fn test_entry_pagination_newest_first() {
        let (store, user) = store_with_user("alice");
        let unc = store.uncategorized(&user.id).unwrap();
        let feed = add_feed(&store, &user.id, &unc.id, "https://example.com/feed.xml");
        let base = Utc::now();
        for i in 0..4 {
            let mut entry = Entry::new(&user.id, &feed.id, &format!("g{}", i));
            entry.published_at = base + Duration::minutes(i);
            store.create_entry(&entry).unwrap();
        }

        let page = Page::new(3).newest_first();
        let first = store.list_entries(&user.id, EntryScope::All, &page).unwrap();
        let guids: Vec<&str> = first.items.iter().map(|e| e.guid.as_str()).collect();
        assert_eq!(guids, vec!["g3", "g2", "g1"]);

        let second = store
            .list_entries(&user.id, EntryScope::All, &page.clone().after(first.next.clone()))
            .unwrap();
        assert_eq!(second.items.len(), 1);
        assert_eq!(second.items[0].guid, "g0");
        assert!(second.is_last());
    }

    #[test]
    fn test_newest_first_with_deleted_cursor_ends_listing() {
        let (store, user) = store_with_user("alice");
        let unc = store.uncategorized(&user.id).unwrap();
        let doomed = add_feed(&store, &user.id, &unc.id, "https://a.example.com/feed.xml");
        let kept = add_feed(&store, &user.id, &unc.id, "https://b.example.com/feed.xml");
        let base = Utc::now();
        for (i, feed) in [&kept, &doomed, &kept].into_iter().enumerate() {
            let mut entry = Entry::new(&user.id, &feed.id, &format!("g{}", i));
            entry.published_at = base + Duration::minutes(i as i64);
            store.create_entry(&entry).unwrap();
        }

        let page = Page::new(2).newest_first();
        let first = store.list_entries(&user.id, EntryScope::All, &page).unwrap();
        assert_eq!(first.items[1].feed_id, doomed.id);

        store.delete_feed(&user.id, &doomed.id).unwrap();

        let second = store
            .list_entries(&user.id, EntryScope::All, &page.clone().after(first.next.clone()))
            .unwrap();
        assert!(second.items.is_empty());
        assert!(second.is_last());
    }

    #[test]
    fn test_list_entries_filters_by_marker() {
        let (store, user) = store_with_user("alice");
        let unc = store.uncategorized(&user.id).unwrap();
        let feed = add_feed(&store, &user.id, &unc.id, "https://example.com/feed.xml");
        let read = add_entry(&store, &feed, "g1");
        add_entry(&store, &feed, "g2");
        store.mark_entry(&user.id, &read.id, Marker::Read).unwrap();

        let page = Page::new(10).with_marker(Marker::Unread);
        let listing = store.list_entries(&user.id, EntryScope::Feed(&feed.id), &page).unwrap();
        assert_eq!(listing.items.len(), 1);
        assert_eq!(listing.items[0].guid, "g2");
    }

    #[test]
    fn test_tagging_and_untagging() {
        let (store, user) = store_with_user("alice");
        let unc = store.uncategorized(&user.id).unwrap();
        let feed = add_feed(&store, &user.id, &unc.id, "https://example.com/feed.xml");
        let entry = add_entry(&store, &feed, "g1");
        let tag = Tag::new(&user.id, "rust");
        store.create_tag(&tag).unwrap();

        store.tag_entries(&user.id, &tag.id, &[entry.id.clone()]).unwrap();
        // Tagging twice is harmless
        store.tag_entries(&user.id, &tag.id, &[entry.id.clone()]).unwrap();

        let listing = store
            .list_entries(&user.id, EntryScope::Tag(&tag.id), &Page::default())
            .unwrap();
        assert_eq!(listing.items.len(), 1);
        assert_eq!(store.entry_tags(&user.id, &entry.id).unwrap(), vec![tag.clone()]);

        store.untag_entries(&user.id, &tag.id, &[entry.id.clone()]).unwrap();
        assert!(store.entry_tags(&user.id, &entry.id).unwrap().is_empty());
    }

    #[test]
    fn test_tag_entries_is_all_or_nothing() {
        let (store, user) = store_with_user("alice");
        let unc = store.uncategorized(&user.id).unwrap();
        let feed = add_feed(&store, &user.id, &unc.id, "https://example.com/feed.xml");
        let entry = add_entry(&store, &feed, "g1");
        let tag = Tag::new(&user.id, "rust");
        store.create_tag(&tag).unwrap();

        let result = store.tag_entries(&user.id, &tag.id, &[entry.id.clone(), "nope".into()]);
        assert!(result.unwrap_err().is_not_found());
        assert!(store.entry_tags(&user.id, &entry.id).unwrap().is_empty());
    }

    #[test]
    fn test_move_feeds_is_all_or_nothing() {
        let (store, user) = store_with_user("alice");
        let unc = store.uncategorized(&user.id).unwrap();
        let feed = add_feed(&store, &user.id, &unc.id, "https://example.com/feed.xml");
        let tech = Category::new(&user.id, "Tech");
        store.create_category(&tech).unwrap();

        let result = store.move_feeds(&user.id, &tech.id, &[feed.id.clone(), "missing".into()]);
        assert!(result.unwrap_err().is_not_found());
        assert_eq!(store.get_feed(&user.id, &feed.id).unwrap().category_id, unc.id);

        store.move_feeds(&user.id, &tech.id, &[feed.id.clone()]).unwrap();
        assert_eq!(store.get_feed(&user.id, &feed.id).unwrap().category_id, tech.id);
    }

    #[test]
    fn test_add_subscriptions_rolls_back_on_failure() {
        let (store, user) = store_with_user("alice");
        let tech = Category::new(&user.id, "Tech");
        let good = Feed::new(&user.id, &tech.id, "", "https://a.example.com/");
        let orphan = Feed::new(&user.id, "missing", "", "https://b.example.com/");

        let result = store.add_subscriptions(&[tech.clone()], &[good.clone(), orphan]);
        assert!(result.unwrap_err().is_not_found());
        assert!(store.get_category(&user.id, &tech.id).unwrap_err().is_not_found());
        assert!(store.all_feeds(&user.id).unwrap().is_empty());

        store.add_subscriptions(&[tech.clone()], &[good.clone()]).unwrap();
        assert_eq!(store.get_feed(&user.id, &good.id).unwrap().category_id, tech.id);
    }

    #[test]
    fn test_delete_user_removes_everything() {
        let (store, user) = store_with_user("alice");
        let unc = store.uncategorized(&user.id).unwrap();
        let feed = add_feed(&store, &user.id, &unc.id, "https://example.com/feed.xml");
        let entry = add_entry(&store, &feed, "g1");
        let tag = Tag::new(&user.id, "rust");
        store.create_tag(&tag).unwrap();
        store.tag_entries(&user.id, &tag.id, &[entry.id.clone()]).unwrap();
        store
            .add_refresh_key(&ApiKey {
                token: "refresh-token".into(),
                owner_id: user.id.clone(),
                key_type: KeyType::Refresh,
                expires_at: Utc::now() + Duration::hours(1),
            })
            .unwrap();

        store.delete_user(&user.id).unwrap();

        let conn = store.lock().unwrap();
        for table in ["categories", "feeds", "entries", "tags", "api_keys"] {
            let count: i64 = conn
                .query_row(
                    &format!("SELECT COUNT(*) FROM {} WHERE owner_id = ?1", table),
                    params![user.id],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(count, 0, "{} still has rows", table);
        }
        let links: i64 = conn
            .query_row("SELECT COUNT(*) FROM entry_tags", [], |row| row.get(0))
            .unwrap();
        assert_eq!(links, 0);
    }

    #[test]
    fn test_refresh_keys() {
        let (store, user) = store_with_user("alice");
        let now = Utc::now();
        let live = ApiKey {
            token: "live".into(),
            owner_id: user.id.clone(),
            key_type: KeyType::Refresh,
            expires_at: now + Duration::hours(1),
        };
        let stale = ApiKey {
            token: "stale".into(),
            owner_id: user.id.clone(),
            key_type: KeyType::Refresh,
            expires_at: now - Duration::hours(1),
        };
        store.add_refresh_key(&live).unwrap();
        store.add_refresh_key(&stale).unwrap();

        assert!(store.refresh_key_exists(&user.id, "live").unwrap());
        assert!(!store.refresh_key_exists("someone-else", "live").unwrap());

        assert_eq!(store.purge_expired_keys(now).unwrap(), 1);
        assert!(!store.refresh_key_exists(&user.id, "stale").unwrap());
        assert!(store.refresh_key_exists(&user.id, "live").unwrap());
    }

    #[test]
    fn test_access_keys_are_not_persisted() {
        let (store, user) = store_with_user("alice");
        let key = ApiKey {
            token: "access".into(),
            owner_id: user.id,
            key_type: KeyType::Access,
            expires_at: Utc::now(),
        };
        assert!(matches!(
            store.add_refresh_key(&key),
            Err(EstuaryError::BadRequest(_))
        ));
    }

    #[test]
    fn test_rename_user_conflict_and_missing() {
        let (store, alice) = store_with_user("alice");
        let bob = User::new("bob".into(), "h".into(), "s".into());
        store.create_user(&bob).unwrap();

        assert!(matches!(
            store.rename_user(&bob.id, "alice"),
            Err(EstuaryError::Conflict(_))
        ));
        assert!(store.rename_user("missing", "carol").unwrap_err().is_not_found());

        store.rename_user(&alice.id, "alicia").unwrap();
        assert_eq!(store.get_user_by_name("alicia").unwrap().id, alice.id);
    }

    #[test]
    fn test_get_category_by_name_ignores_case() {
        let (store, user) = store_with_user("alice");
        let tech = Category::new(&user.id, "Tech");
        store.create_category(&tech).unwrap();
        assert_eq!(store.get_category_by_name(&user.id, "TECH").unwrap().id, tech.id);
    }

    #[test]
    fn test_file_database_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("estuary.db");
        let user = User::new("alice".into(), "h".into(), "s".into());

        {
            let store = SqliteStore::new(&path).unwrap();
            store.create_user(&user).unwrap();
        }

        let store = SqliteStore::new(&path).unwrap();
        assert_eq!(store.get_user_by_name("alice").unwrap().id, user.id);
    }
}
