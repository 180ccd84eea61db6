pub mod api_key;
pub mod category;
pub mod entry;
pub mod feed;
pub mod marker;
pub mod page;
pub mod tag;
pub mod user;

pub use api_key::{ApiKey, KeyType};
pub use category::{Category, UNCATEGORIZED};
pub use entry::Entry;
pub use feed::{Feed, FeedUpdate};
pub use marker::{Marker, Stats};
pub use page::{Listing, Page};
pub use tag::Tag;
pub use user::User;

/// Fresh opaque identifier for any entity kind.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}
