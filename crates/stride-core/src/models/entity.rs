//! Shared entity plumbing: table names, sync bookkeeping, and the `Entity` trait.

use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// One of the three replicated entity tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Table {
    /// Shoe collections
    Collections,
    /// Shoes, each belonging to a collection
    Shoes,
    /// Runs, each logged against a shoe
    Runs,
}

impl Table {
    /// All tables, in pull/merge order (parents before children).
    pub const ALL: [Self; 3] = [Self::Collections, Self::Shoes, Self::Runs];

    /// SQL table name / wire name of this table.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Collections => "collections",
            Self::Shoes => "shoes",
            Self::Runs => "runs",
        }
    }

    /// JSON field holding the parent reference.
    #[must_use]
    pub const fn parent_field(self) -> Option<&'static str> {
        match self {
            Self::Collections => None,
            Self::Shoes => Some("collection_id"),
            Self::Runs => Some("shoe_id"),
        }
    }

    /// JSON field backing the date index.
    #[must_use]
    pub const fn date_field(self) -> Option<&'static str> {
        match self {
            Self::Collections => None,
            Self::Shoes => Some("purchase_date"),
            Self::Runs => Some("date"),
        }
    }

    /// Table whose rows reference this one as their parent.
    #[must_use]
    pub const fn child(self) -> Option<Self> {
        match self {
            Self::Collections => Some(Self::Shoes),
            Self::Shoes => Some(Self::Runs),
            Self::Runs => None,
        }
    }

    /// Extract `(parent_id, date)` index values from a JSON document.
    #[must_use]
    pub fn index_values(self, data: &serde_json::Value) -> (Option<String>, Option<String>) {
        let field = |name: Option<&str>| {
            name.and_then(|name| data.get(name))
                .and_then(serde_json::Value::as_str)
                .map(str::to_string)
        };
        (field(self.parent_field()), field(self.date_field()))
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Table {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "collections" => Ok(Self::Collections),
            "shoes" => Ok(Self::Shoes),
            "runs" => Ok(Self::Runs),
            other => Err(Error::InvalidInput(format!("unknown table: {other}"))),
        }
    }
}

/// Local sync bookkeeping status of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// Written locally while offline, not yet acknowledged by the remote
    Pending,
    /// Matches the last known remote state
    Synced,
    /// A push was rejected and the record awaits conflict resolution
    Conflict,
}

impl SyncStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Synced => "synced",
            Self::Conflict => "conflict",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "synced" => Ok(Self::Synced),
            "conflict" => Ok(Self::Conflict),
            other => Err(Error::InvalidInput(format!("unknown sync status: {other}"))),
        }
    }
}

/// Secondary indexes available on entity tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityIndex {
    /// Parent id (`collection_id` for shoes, `shoe_id` for runs)
    Parent,
    /// Calendar date (runs only)
    Date,
    /// Local sync status
    SyncStatus,
}

impl EntityIndex {
    pub(crate) const fn column(self) -> &'static str {
        match self {
            Self::Parent => "parent_id",
            Self::Date => "date",
            Self::SyncStatus => "sync_status",
        }
    }
}

/// A replicated domain record.
///
/// Implementors only describe their domain fields; bookkeeping (`last_modified`,
/// `offline`, `sync_status`, remote version) lives in the store and is never
/// part of the value handed back to consumers.
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Table this entity is stored in.
    const TABLE: Table;

    /// Stable identifier shared by the local and remote copies.
    fn id(&self) -> &str;

    /// Replace the identifier, used when the remote assigns a canonical id.
    fn set_id(&mut self, id: String);

    /// Value of the parent index, if this entity has a parent.
    fn parent_id(&self) -> Option<&str> {
        None
    }

    /// Value of the date index, if this entity is dated.
    fn date(&self) -> Option<&str> {
        None
    }

    /// Check domain invariants before the record is written.
    fn validate(&self) -> Result<()>;
}

/// Generate a fresh local identifier (UUID v7, time-sortable).
#[must_use]
pub fn new_local_id() -> String {
    Uuid::now_v7().to_string()
}

pub(crate) fn require_text(value: &str, field: &str) -> Result<()> {
    if value.trim().is_empty() {
        Err(Error::InvalidInput(format!("{field} must not be empty")))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_round_trips_through_str() {
        for table in Table::ALL {
            assert_eq!(table.as_str().parse::<Table>().unwrap(), table);
        }
        assert!("notes".parse::<Table>().is_err());
    }

    #[test]
    fn sync_status_serializes_lowercase() {
        let json = serde_json::to_string(&SyncStatus::Pending).unwrap();
        assert_eq!(json, "\"pending\"");
        assert_eq!("conflict".parse::<SyncStatus>().unwrap(), SyncStatus::Conflict);
    }

    #[test]
    fn index_values_follow_table_fields() {
        let run = serde_json::json!({ "id": "r1", "shoe_id": "s1", "date": "2024-05-01" });
        assert_eq!(
            Table::Runs.index_values(&run),
            (Some("s1".to_string()), Some("2024-05-01".to_string()))
        );
        assert_eq!(Table::Collections.index_values(&run), (None, None));
        assert_eq!(Table::Collections.child(), Some(Table::Shoes));
        assert_eq!(Table::Runs.child(), None);
    }

    #[test]
    fn local_ids_are_unique() {
        assert_ne!(new_local_id(), new_local_id());
    }
}
