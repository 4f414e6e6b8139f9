//! Place model

use serde::{Deserialize, Serialize};

use super::BaseModel;

/// A rentable place in a city, owned by a user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Place {
    #[serde(flatten)]
    pub base: BaseModel,
    pub city_id: String,
    pub user_id: String,
    pub name: String,
    pub description: Option<String>,
    pub number_rooms: u32,
    pub number_bathrooms: u32,
    pub max_guest: u32,
    pub price_by_night: u32,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Linked amenities, in link order, without duplicates
    pub amenity_ids: Vec<String>,
}

impl Place {
    pub fn new(
        city_id: impl Into<String>,
        user_id: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self::with_base(BaseModel::new(), city_id, user_id, name)
    }

    pub fn with_base(
        base: BaseModel,
        city_id: impl Into<String>,
        user_id: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            base,
            city_id: city_id.into(),
            user_id: user_id.into(),
            name: name.into(),
            description: None,
            number_rooms: 0,
            number_bathrooms: 0,
            max_guest: 0,
            price_by_night: 0,
            latitude: None,
            longitude: None,
            amenity_ids: Vec::new(),
        }
    }

    /// Link an amenity; returns false if it was already linked
    pub fn add_amenity(&mut self, amenity_id: impl Into<String>) -> bool {
        let amenity_id = amenity_id.into();
        if self.amenity_ids.contains(&amenity_id) {
            return false;
        }
        self.amenity_ids.push(amenity_id);
        true
    }

    /// Unlink an amenity; returns false if it was not linked
    pub fn remove_amenity(&mut self, amenity_id: &str) -> bool {
        let before = self.amenity_ids.len();
        self.amenity_ids.retain(|id| id != amenity_id);
        self.amenity_ids.len() != before
    }
}
