//! Compact signed tokens.
//!
//! A token is `base64url(claims JSON) . base64url(HMAC-SHA256(claims))`.
//! The signature covers the encoded claims exactly as transmitted.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::app::{EstuaryError, Result};
use crate::domain::{new_id, KeyType};

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: String,
    /// Expiry, unix seconds
    pub exp: i64,
    pub kind: KeyType,
    /// Unique per issued token so two tokens never collide.
    pub jti: String,
}

impl Claims {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now.timestamp() >= self.exp
    }
}

#[derive(Clone)]
pub struct TokenSigner {
    secret: Vec<u8>,
}

impl TokenSigner {
    /// Refuses an empty secret.
    pub fn new(secret: &[u8]) -> Result<Self> {
        if secret.is_empty() {
            return Err(EstuaryError::Config("auth secret must not be empty".into()));
        }
        Ok(Self {
            secret: secret.to_vec(),
        })
    }

    pub fn issue(&self, user_id: &str, kind: KeyType, expires_at: DateTime<Utc>) -> Result<String> {
        let claims = Claims {
            sub: user_id.to_string(),
            exp: expires_at.timestamp(),
            kind,
            jti: new_id(),
        };
        let payload = serde_json::to_vec(&claims)
            .map_err(|e| EstuaryError::Other(format!("token encoding failed: {}", e)))?;
        let payload = URL_SAFE_NO_PAD.encode(payload);
        let signature = URL_SAFE_NO_PAD.encode(self.mac(payload.as_bytes())?.finalize().into_bytes());

        Ok(format!("{}.{}", payload, signature))
    }

    /// Check the signature and decode the claims. Expiry is left to the caller.
    pub fn verify(&self, token: &str) -> Result<Claims> {
        let (payload, signature) = token.split_once('.').ok_or(EstuaryError::Unauthorized)?;
        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| EstuaryError::Unauthorized)?;

        self.mac(payload.as_bytes())?
            .verify_slice(&signature)
            .map_err(|_| EstuaryError::Unauthorized)?;

        let payload = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| EstuaryError::Unauthorized)?;
        serde_json::from_slice(&payload).map_err(|_| EstuaryError::Unauthorized)
    }

    fn mac(&self, data: &[u8]) -> Result<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| EstuaryError::Other(format!("invalid HMAC key: {}", e)))?;
        mac.update(data);
        Ok(mac)
    }
}
