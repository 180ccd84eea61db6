use serde::{Deserialize, Serialize};

use crate::app::{EstuaryError, Result};
use crate::auth;
use crate::domain::User;
use crate::store::SharedStore;

use super::require_name;

/// Wire message for a duplicate username.
pub const USERNAME_TAKEN: &str = "Username already exists";

/// What the admin channel reveals about a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub name: String,
    pub id: String,
}

impl From<User> for UserSummary {
    fn from(user: User) -> Self {
        Self {
            name: user.username,
            id: user.id,
        }
    }
}

#[derive(Clone)]
pub struct UserService {
    store: SharedStore,
}

impl UserService {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// Create a user together with its Uncategorized category.
    pub fn new_user(&self, username: &str, password: &str) -> Result<User> {
        let user = auth::new_user(username, password)?;
        self.store.create_user(&user).map_err(|e| match e {
            EstuaryError::Conflict(_) => EstuaryError::Conflict(USERNAME_TAKEN.into()),
            other => other,
        })?;
        tracing::info!(user = %user.id, username = %user.username, "Created user");
        Ok(user)
    }

    pub fn delete(&self, id: &str) -> Result<()> {
        self.store.delete_user(id)?;
        tracing::info!(user = %id, "Deleted user");
        Ok(())
    }

    pub fn list(&self, limit: usize) -> Result<Vec<UserSummary>> {
        Ok(self
            .store
            .list_users(limit)?
            .into_iter()
            .map(UserSummary::from)
            .collect())
    }

    pub fn get(&self, id: &str) -> Result<User> {
        self.store.get_user(id)
    }

    pub fn rename(&self, id: &str, username: &str) -> Result<()> {
        let username = require_name(username, "username")?;
        self.store.rename_user(id, username).map_err(|e| match e {
            EstuaryError::Conflict(_) => EstuaryError::Conflict(USERNAME_TAKEN.into()),
            other => other,
        })
    }

    /// Replace the password, drawing a fresh salt.
    pub fn change_password(&self, id: &str, password: &str) -> Result<()> {
        if password.is_empty() {
            return Err(EstuaryError::BadRequest("password must not be empty".into()));
        }
        let salt = auth::generate_salt();
        let hash = auth::hash_password(password, &salt)?;
        self.store.update_password(id, &hash, &salt)
    }

    pub fn user_with_name(&self, username: &str) -> Result<bool> {
        match self.store.get_user_by_name(username) {
            Ok(_) => Ok(true),
            Err(EstuaryError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub fn id_of(&self, username: &str) -> Result<String> {
        Ok(self.store.get_user_by_name(username)?.id)
    }
}
