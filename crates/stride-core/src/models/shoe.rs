//! Shoe model

use serde::{Deserialize, Serialize};

use super::entity::{new_local_id, require_text, Entity, Table};
use crate::error::{Error, Result};

/// A pair of shoes tracked for mileage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shoe {
    /// Unique identifier
    pub id: String,
    /// Owning collection
    pub collection_id: String,
    /// Manufacturer
    pub brand: String,
    /// Model name
    pub model: String,
    #[serde(default)]
    pub nickname: Option<String>,
    /// Purchase date (`YYYY-MM-DD`)
    #[serde(default)]
    pub purchase_date: Option<String>,
    /// Retirement threshold in kilometres
    #[serde(default)]
    pub max_distance_km: Option<f64>,
    /// Remote image location, served through the blob cache
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub retired: bool,
}

impl Shoe {
    /// Create a new shoe in the given collection
    #[must_use]
    pub fn new(
        collection_id: impl Into<String>,
        brand: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            id: new_local_id(),
            collection_id: collection_id.into(),
            brand: brand.into(),
            model: model.into(),
            nickname: None,
            purchase_date: None,
            max_distance_km: None,
            image_url: None,
            retired: false,
        }
    }

    /// Human-readable label, preferring the nickname
    #[must_use]
    pub fn display_name(&self) -> String {
        self.nickname
            .clone()
            .unwrap_or_else(|| format!("{} {}", self.brand, self.model))
    }
}

impl Entity for Shoe {
    const TABLE: Table = Table::Shoes;

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn parent_id(&self) -> Option<&str> {
        Some(&self.collection_id)
    }

    fn date(&self) -> Option<&str> {
        self.purchase_date.as_deref()
    }

    fn validate(&self) -> Result<()> {
        require_text(&self.id, "shoe id")?;
        require_text(&self.collection_id, "shoe collection_id")?;
        require_text(&self.brand, "shoe brand")?;
        require_text(&self.model, "shoe model")?;
        if let Some(max) = self.max_distance_km {
            if !max.is_finite() || max <= 0.0 {
                return Err(Error::InvalidInput(
                    "shoe max_distance_km must be positive".to_string(),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_name_prefers_nickname() {
        let mut shoe = Shoe::new("c1", "Hoka", "Clifton 9");
        assert_eq!(shoe.display_name(), "Hoka Clifton 9");
        shoe.nickname = Some("Clouds".to_string());
        assert_eq!(shoe.display_name(), "Clouds");
    }

    #[test]
    fn test_validate_rejects_negative_distance() {
        let mut shoe = Shoe::new("c1", "Hoka", "Clifton 9");
        assert!(shoe.validate().is_ok());
        shoe.max_distance_km = Some(-5.0);
        assert!(shoe.validate().is_err());
    }

    #[test]
    fn test_parent_index_is_collection() {
        let shoe = Shoe::new("c1", "Asics", "Novablast");
        assert_eq!(shoe.parent_id(), Some("c1"));
    }
}
