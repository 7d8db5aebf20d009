//! Run model

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::entity::{new_local_id, require_text, Entity, Table};
use crate::error::{Error, Result};

/// A single run logged against a shoe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    /// Unique identifier
    pub id: String,
    /// Shoe worn for the run
    pub shoe_id: String,
    /// Calendar date (`YYYY-MM-DD`)
    pub date: String,
    pub distance_km: f64,
    #[serde(default)]
    pub duration_minutes: Option<f64>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl Run {
    /// Create a new run for the given shoe
    #[must_use]
    pub fn new(shoe_id: impl Into<String>, date: impl Into<String>, distance_km: f64) -> Self {
        Self {
            id: new_local_id(),
            shoe_id: shoe_id.into(),
            date: date.into(),
            distance_km,
            duration_minutes: None,
            notes: None,
        }
    }

    /// Average pace in minutes per kilometre, when a duration is known
    #[must_use]
    pub fn pace_min_per_km(&self) -> Option<f64> {
        let duration = self.duration_minutes?;
        if self.distance_km > 0.0 {
            Some(duration / self.distance_km)
        } else {
            None
        }
    }
}

impl Entity for Run {
    const TABLE: Table = Table::Runs;

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn parent_id(&self) -> Option<&str> {
        Some(&self.shoe_id)
    }

    fn date(&self) -> Option<&str> {
        Some(&self.date)
    }

    fn validate(&self) -> Result<()> {
        require_text(&self.id, "run id")?;
        require_text(&self.shoe_id, "run shoe_id")?;
        NaiveDate::parse_from_str(&self.date, "%Y-%m-%d")
            .map_err(|_| Error::InvalidInput(format!("invalid run date: {}", self.date)))?;
        if !self.distance_km.is_finite() || self.distance_km < 0.0 {
            return Err(Error::InvalidInput(
                "run distance_km must be zero or positive".to_string(),
            ));
        }
        Ok(())
    }
}
