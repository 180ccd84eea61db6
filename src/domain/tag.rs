use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: String,
    pub owner_id: String,
    pub name: String,
}

impl Tag {
    pub fn new(owner_id: &str, name: &str) -> Self {
        Self {
            id: super::new_id(),
            owner_id: owner_id.to_string(),
            name: name.to_string(),
        }
    }
}
