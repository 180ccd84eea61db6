use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyType {
    Access,
    Refresh,
}

impl KeyType {
    pub fn as_str(self) -> &'static str {
        match self {
            KeyType::Access => "access",
            KeyType::Refresh => "refresh",
        }
    }
}

/// A bearer token. Only refresh keys are ever persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKey {
    pub token: String,
    pub owner_id: String,
    pub key_type: KeyType,
    pub expires_at: DateTime<Utc>,
}
