//! User model

use serde::{Deserialize, Serialize};

use super::BaseModel;

/// A registered user; owns places and reviews
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(flatten)]
    pub base: BaseModel,
    pub email: String,
    pub password: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl User {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self::with_base(BaseModel::new(), email, password)
    }

    pub fn with_base(
        base: BaseModel,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            base,
            email: email.into(),
            password: password.into(),
            first_name: None,
            last_name: None,
        }
    }
}
