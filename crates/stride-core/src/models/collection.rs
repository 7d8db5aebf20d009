//! Collection model

use serde::{Deserialize, Serialize};

use super::entity::{new_local_id, require_text, Entity, Table};
use crate::error::Result;

/// A named group of shoes (e.g. "Road", "Trail")
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    /// Unique identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// Optional free-form description
    #[serde(default)]
    pub description: Option<String>,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
}

impl Collection {
    /// Create a new collection with a fresh local id
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: new_local_id(),
            name: name.into(),
            description: None,
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Attach a description
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

impl Entity for Collection {
    const TABLE: Table = Table::Collections;

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn validate(&self) -> Result<()> {
        require_text(&self.id, "collection id")?;
        require_text(&self.name, "collection name")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collection_new() {
        let collection = Collection::new("Road").with_description("daily trainers");
        assert_eq!(collection.name, "Road");
        assert_eq!(collection.description.as_deref(), Some("daily trainers"));
        assert!(collection.created_at > 0);
        assert!(collection.validate().is_ok());
    }

    #[test]
    fn test_collection_rejects_blank_name() {
        let collection = Collection::new("  ");
        assert!(collection.validate().is_err());
    }
}
