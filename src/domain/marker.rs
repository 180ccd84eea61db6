use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::app::EstuaryError;

/// Read state of an entry. `Any` only appears in queries, never in storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Marker {
    #[default]
    Any,
    Unread,
    Read,
    Saved,
}

impl Marker {
    pub fn as_str(self) -> &'static str {
        match self {
            Marker::Any => "any",
            Marker::Unread => "unread",
            Marker::Read => "read",
            Marker::Saved => "saved",
        }
    }

    /// Rejects the wildcard where a concrete marker must be written.
    pub fn storable(self) -> Result<Self, EstuaryError> {
        match self {
            Marker::Any => Err(EstuaryError::BadRequest(
                "marker 'any' cannot be stored".into(),
            )),
            m => Ok(m),
        }
    }
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Marker {
    type Err = EstuaryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "any" => Ok(Marker::Any),
            "unread" => Ok(Marker::Unread),
            "read" => Ok(Marker::Read),
            "saved" => Ok(Marker::Saved),
            other => Err(EstuaryError::BadRequest(format!("invalid marker: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub unread: i64,
    pub read: i64,
    pub saved: i64,
    pub total: i64,
}
