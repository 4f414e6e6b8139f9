//! Identity and timestamps shared by every model

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{now, timestamp_format, Timestamp};

/// Identity and lifecycle timestamps of a domain object.
///
/// The id and creation time are fixed once assigned. `updated_at` only moves
/// through [`BaseModel::touch`], which the save lifecycle calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseModel {
    id: String,
    #[serde(with = "timestamp_format")]
    created_at: Timestamp,
    #[serde(with = "timestamp_format")]
    updated_at: Timestamp,
}

impl BaseModel {
    /// Fresh identity with a random UUID
    pub fn new() -> Self {
        Self::with_id(Uuid::new_v4().to_string())
    }

    /// Fresh identity with a caller-chosen id
    pub fn with_id(id: impl Into<String>) -> Self {
        let ts = now();
        Self {
            id: id.into(),
            created_at: ts,
            updated_at: ts,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    pub fn updated_at(&self) -> Timestamp {
        self.updated_at
    }

    /// Bump `updated_at` to now
    pub fn touch(&mut self) {
        self.updated_at = now();
    }
}

impl Default for BaseModel {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_ids_are_unique() {
        let a = BaseModel::new();
        let b = BaseModel::new();
        assert_ne!(a.id(), b.id());
        assert_eq!(a.created_at(), a.updated_at());
    }

    #[test]
    fn test_touch_moves_only_updated_at() {
        let mut base = BaseModel::with_id("fixed");
        let created = base.created_at();
        std::thread::sleep(std::time::Duration::from_millis(2));
        base.touch();

        assert_eq!(base.id(), "fixed");
        assert_eq!(base.created_at(), created);
        assert!(base.updated_at() > created);
    }
}
