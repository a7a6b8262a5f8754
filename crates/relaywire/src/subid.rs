use std::hash::{Hash, Hasher};
use uuid::Uuid;

/// A subscription id. Random uuids by default so subscriptions don't leak
/// anything about what the monitor is doing; the description only shows up
/// in logs.
#[derive(Debug, Clone)]
pub struct SubId {
    description: String,
    id: String,
}

impl PartialEq for SubId {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for SubId {}

impl SubId {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            id: Uuid::new_v4().to_string(),
        }
    }

    pub fn from_string(id: String, description: impl Into<String>) -> Self {
        Self {
            id,
            description: description.into(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.id
    }

    pub fn description(&self) -> &str {
        &self.description
    }
}

impl std::fmt::Display for SubId {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        // uuids are ascii, the slice below can't split a char
        let head = &self.id[..self.id.len().min(8)];
        write!(f, "SubId('{}', {}...)", self.description, head)
    }
}

impl Hash for SubId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}
