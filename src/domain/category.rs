use serde::{Deserialize, Serialize};

/// Reserved name of the per-user default category. Compared case-insensitively.
pub const UNCATEGORIZED: &str = "uncategorized";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub owner_id: String,
    pub name: String,
}

impl Category {
    pub fn new(owner_id: &str, name: &str) -> Self {
        Self {
            id: super::new_id(),
            owner_id: owner_id.to_string(),
            name: name.to_string(),
        }
    }

    pub fn uncategorized(owner_id: &str) -> Self {
        Self::new(owner_id, UNCATEGORIZED)
    }

    pub fn is_uncategorized(&self) -> bool {
        is_reserved_name(&self.name)
    }
}

pub fn is_reserved_name(name: &str) -> bool {
    name.trim().eq_ignore_ascii_case(UNCATEGORIZED)
}
