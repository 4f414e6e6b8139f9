//! State model

use serde::{Deserialize, Serialize};

use super::BaseModel;

/// A state; parent of cities
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct State {
    #[serde(flatten)]
    pub base: BaseModel,
    pub name: String,
}

impl State {
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
