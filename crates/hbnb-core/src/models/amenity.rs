//! Amenity model

use serde::{Deserialize, Serialize};

use super::BaseModel;

/// An amenity, linked to places many-to-many
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Amenity {
    #[serde(flatten)]
    pub base: BaseModel,
    pub name: String,
}

impl Amenity {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_base(BaseModel::new(), name)
    }

    pub fn with_base(base: BaseModel, name: impl Into<String>) -> Self {
        Self {
            base,
            name: name.into(),
        }
    }
}
