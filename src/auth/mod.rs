//! Password and bearer-token authentication.
//!
//! Access tokens are stateless: a valid signature, an unexpired claim and
//! absence from the refresh-key table. Refresh tokens must be present in
//! that table. The `kind` claim only short-circuits; the table check always
//! runs.

pub mod password;
pub mod token;

use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::app::{EstuaryError, Result};
use crate::domain::{ApiKey, KeyType, User};
use crate::store::SharedStore;

pub use password::{generate_salt, hash_password, verify_password};
pub use token::{Claims, TokenSigner};

pub const DEFAULT_ACCESS_TTL: Duration = Duration::from_secs(72 * 3600);
pub const DEFAULT_REFRESH_TTL: Duration = Duration::from_secs(168 * 3600);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

pub struct Authenticator {
    store: SharedStore,
    signer: TokenSigner,
    access_ttl: chrono::Duration,
    refresh_ttl: chrono::Duration,
}

impl Authenticator {
    pub fn new(
        store: SharedStore,
        secret: &[u8],
        access_ttl: Duration,
        refresh_ttl: Duration,
    ) -> Result<Self> {
        Ok(Self {
            store,
            signer: TokenSigner::new(secret)?,
            access_ttl: to_chrono(access_ttl)?,
            refresh_ttl: to_chrono(refresh_ttl)?,
        })
    }

    /// Create the user (with its Uncategorized category) and sign it in.
    pub fn register(&self, username: &str, password: &str) -> Result<TokenPair> {
        let user = new_user(username, password)?;
        self.store.create_user(&user).map_err(|e| match e {
            EstuaryError::Conflict(_) => EstuaryError::Conflict("Username already exists".into()),
            other => other,
        })?;

        tracing::info!(user = %user.id, username = %user.username, "Registered user");
        self.issue_pair(&user.id)
    }

    pub fn login(&self, username: &str, password: &str) -> Result<TokenPair> {
        let user = self.store.get_user_by_name(username).map_err(unauthorized)?;
        if !verify_password(password, &user.password_hash, &user.password_salt) {
            tracing::debug!(username = %username, "Rejected login");
            return Err(EstuaryError::Unauthorized);
        }
        self.issue_pair(&user.id)
    }

    /// Mint a fresh access token from a stored refresh token. The refresh
    /// token itself stays valid.
    pub fn renew(&self, refresh_token: &str) -> Result<String> {
        let claims = self.valid_claims(refresh_token)?;
        if claims.kind != KeyType::Refresh {
            return Err(EstuaryError::Unauthorized);
        }
        if !self.store.refresh_key_exists(&claims.sub, refresh_token)? {
            return Err(EstuaryError::Unauthorized);
        }
        self.store.get_user(&claims.sub).map_err(unauthorized)?;

        self.issue(&claims.sub, KeyType::Access)
    }

    /// Resolve the user behind an access token.
    pub fn authenticate(&self, access_token: &str) -> Result<User> {
        let claims = self.valid_claims(access_token)?;
        if claims.kind != KeyType::Access {
            return Err(EstuaryError::Unauthorized);
        }
        if self.store.refresh_key_exists(&claims.sub, access_token)? {
            return Err(EstuaryError::Unauthorized);
        }
        self.store.get_user(&claims.sub).map_err(unauthorized)
    }

    fn valid_claims(&self, token: &str) -> Result<Claims> {
        let claims = self.signer.verify(token)?;
        if claims.is_expired(Utc::now()) {
            return Err(EstuaryError::Unauthorized);
        }
        Ok(claims)
    }

    fn issue_pair(&self, user_id: &str) -> Result<TokenPair> {
        let refresh = self.issue(user_id, KeyType::Refresh)?;
        Ok(TokenPair {
            access: self.issue(user_id, KeyType::Access)?,
            refresh,
        })
    }

    fn issue(&self, user_id: &str, kind: KeyType) -> Result<String> {
        let ttl = match kind {
            KeyType::Access => self.access_ttl,
            KeyType::Refresh => self.refresh_ttl,
        };
        let expires_at = Utc::now() + ttl;
        let token = self.signer.issue(user_id, kind, expires_at)?;

        if kind == KeyType::Refresh {
            self.store.add_refresh_key(&ApiKey {
                token: token.clone(),
                owner_id: user_id.to_string(),
                key_type: kind,
                expires_at,
            })?;
        }

        Ok(token)
    }
}

/// Validate credentials and build an unsaved user with a fresh salt.
pub fn new_user(username: &str, password: &str) -> Result<User> {
    let username = username.trim();
    if username.is_empty() {
        return Err(EstuaryError::BadRequest("username must not be empty".into()));
    }
    if password.is_empty() {
        return Err(EstuaryError::BadRequest("password must not be empty".into()));
    }

    let salt = generate_salt();
    let hash = hash_password(password, &salt)?;
    Ok(User::new(username.to_string(), hash, salt))
}

fn unauthorized(err: EstuaryError) -> EstuaryError {
    match err {
        EstuaryError::NotFound(_) => EstuaryError::Unauthorized,
        other => other,
    }
}

fn to_chrono(ttl: Duration) -> Result<chrono::Duration> {
    chrono::Duration::from_std(ttl)
        .map_err(|_| EstuaryError::Config(format!("token lifetime out of range: {:?}", ttl)))
}
