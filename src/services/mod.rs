//! Use-case layer over the [`Store`](crate::store::Store).
//!
//! Each service holds a shared store handle and applies policy the store
//! does not know about: reserved names, input validation, eager pulls.

pub mod category;
pub mod entry;
pub mod feed;
pub mod opml;
pub mod tag;
pub mod user;

pub use category::CategoryService;
pub use entry::EntryService;
pub use feed::FeedService;
pub use self::opml::OpmlService;
pub use tag::TagService;
pub use user::{UserService, UserSummary};

use crate::app::{EstuaryError, Result};

/// Trimmed, non-empty name or `BadRequest`.
fn require_name<'a>(name: &'a str, what: &str) -> Result<&'a str> {
    let name = name.trim();
    if name.is_empty() {
        return Err(EstuaryError::BadRequest(format!("{} must not be empty", what)));
    }
    Ok(name)
}
