//! City model

use serde::{Deserialize, Serialize};

use super::BaseModel;

/// A city; belongs to exactly one state, parent of places
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct City {
    #[serde(flatten)]
    pub base: BaseModel,
    pub state_id: String,
    pub name: String,
}

impl City {
    pub fn new(state_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self::with_base(BaseModel::new(), state_id, name)
    }

    pub fn with_base(
        base: BaseModel,
        state_id: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            base,
            state_id: state_id.into(),
            name: name.into(),
        }
    }
}
