use std::path::Path;
use std::sync::Arc;

use crate::app::error::{EstuaryError, Result};
use crate::auth::Authenticator;
use crate::config::{Config, DatabaseConfig, DatabaseType};
use crate::puller::{HttpPuller, SharedPuller};
use crate::services::{CategoryService, EntryService, FeedService, OpmlService, TagService, UserService};
use crate::store::{SharedStore, SqliteStore};

/// Everything a request handler needs, wired once at startup.
pub struct AppContext {
    pub store: SharedStore,
    pub puller: SharedPuller,
    pub auth: Arc<Authenticator>,
    pub users: UserService,
    pub categories: CategoryService,
    pub feeds: FeedService,
    pub tags: TagService,
    pub entries: EntryService,
    pub opml: OpmlService,
}

impl AppContext {
    pub fn open(config: &Config) -> Result<Self> {
        let store = Self::open_store(&config.database)?;
        let puller: SharedPuller = Arc::new(HttpPuller::new(config.sync.timeout)?);
        Self::with_parts(store, puller, config)
    }

    /// Wire services over an existing store and puller.
    pub fn with_parts(store: SharedStore, puller: SharedPuller, config: &Config) -> Result<Self> {
        let secret = config.auth_secret()?;
        let auth = Authenticator::new(
            store.clone(),
            &secret,
            config.server.api_key_expiration,
            config.server.refresh_key_expiration,
        )?;

        Ok(Self {
            auth: Arc::new(auth),
            users: UserService::new(store.clone()),
            categories: CategoryService::new(store.clone()),
            feeds: FeedService::new(store.clone(), puller.clone()),
            tags: TagService::new(store.clone()),
            entries: EntryService::new(store.clone()),
            opml: OpmlService::new(store.clone()),
            store,
            puller,
        })
    }

    pub fn open_store(database: &DatabaseConfig) -> Result<SharedStore> {
        match database.kind {
            DatabaseType::Sqlite => {
                let path = Path::new(&database.connection);
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                tracing::info!(path = %path.display(), "Opening SQLite database");
                Ok(Arc::new(SqliteStore::new(path)?))
            }
            other => Err(EstuaryError::Config(format!(
                "database type {:?} is not supported by this build",
                other
            ))),
        }
    }
}
