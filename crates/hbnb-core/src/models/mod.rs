//! Domain models and the type catalog
//!
//! [`ModelKind`] is the closed catalog of types the storage layer knows how to
//! query. [`Model`] carries one object of any cataloged kind; its serialized
//! form is the dictionary form persisted by the file engine:
//!
//! ```text
//! {"__class__": "City", "id": "C1", "created_at": "...", "updated_at": "...",
//!  "state_id": "S1", "name": "SF"}
//! ```

pub mod amenity;
pub mod base;
pub mod city;
pub mod place;
pub mod relations;
pub mod review;
pub mod state;
pub mod user;

pub use amenity::Amenity;
pub use base::BaseModel;
pub use city::City;
pub use place::Place;
pub use review::Review;
pub use state::State;
pub use user::User;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use crate::error::{StorageError, StorageResult};
use crate::storage::Storage;

/// Attributes owned by the lifecycle, never taken from user input
const PROTECTED_ATTRS: &[&str] = &["__class__", "id", "created_at", "updated_at"];

/// The closed set of model types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ModelKind {
    User,
    Place,
    State,
    City,
    Amenity,
    Review,
}

impl ModelKind {
    /// Every cataloged kind
    pub const ALL: [ModelKind; 6] = [
        ModelKind::User,
        ModelKind::Place,
        ModelKind::State,
        ModelKind::City,
        ModelKind::Amenity,
        ModelKind::Review,
    ];

    /// Type name used in registry keys and `__class__`
    pub fn name(self) -> &'static str {
        match self {
            ModelKind::User => "User",
            ModelKind::Place => "Place",
            ModelKind::State => "State",
            ModelKind::City => "City",
            ModelKind::Amenity => "Amenity",
            ModelKind::Review => "Review",
        }
    }

    /// Relational table name
    pub fn table(self) -> &'static str {
        match self {
            ModelKind::User => "users",
            ModelKind::Place => "places",
            ModelKind::State => "states",
            ModelKind::City => "cities",
            ModelKind::Amenity => "amenities",
            ModelKind::Review => "reviews",
        }
    }

    /// Registry key for an object of this kind
    pub fn key(self, id: &str) -> String {
        format!("{}.{}", self.name(), id)
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ModelKind {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ModelKind::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| StorageError::UnknownType(s.to_string()))
    }
}

/// One domain object of any cataloged kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "__class__")]
pub enum Model {
    User(User),
    Place(Place),
    State(State),
    City(City),
    Amenity(Amenity),
    Review(Review),
}

impl Model {
    /// A new object of `kind` with a fresh id and empty attributes
    pub fn blank(kind: ModelKind) -> Model {
        match kind {
            ModelKind::User => User::new("", "").into(),
            ModelKind::Place => Place::new("", "", "").into(),
            ModelKind::State => State::new("").into(),
            ModelKind::City => City::new("", "").into(),
            ModelKind::Amenity => Amenity::new("").into(),
            ModelKind::Review => Review::new("", "", "").into(),
        }
    }

    pub fn kind(&self) -> ModelKind {
        match self {
            Model::User(_) => ModelKind::User,
            Model::Place(_) => ModelKind::Place,
            Model::State(_) => ModelKind::State,
            Model::City(_) => ModelKind::City,
            Model::Amenity(_) => ModelKind::Amenity,
            Model::Review(_) => ModelKind::Review,
        }
    }

    pub fn base(&self) -> &BaseModel {
        match self {
            Model::User(m) => &m.base,
            Model::Place(m) => &m.base,
            Model::State(m) => &m.base,
            Model::City(m) => &m.base,
            Model::Amenity(m) => &m.base,
            Model::Review(m) => &m.base,
        }
    }

    fn base_mut(&mut self) -> &mut BaseModel {
        match self {
            Model::User(m) => &mut m.base,
            Model::Place(m) => &mut m.base,
            Model::State(m) => &mut m.base,
            Model::City(m) => &mut m.base,
            Model::Amenity(m) => &mut m.base,
            Model::Review(m) => &mut m.base,
        }
    }

    pub fn id(&self) -> &str {
        self.base().id()
    }

    /// Registry key, `"<Type>.<id>"`
    pub fn key(&self) -> String {
        self.kind().key(self.id())
    }

    /// Bump `updated_at`
    pub fn touch(&mut self) {
        self.base_mut().touch();
    }

    /// Value of a declared foreign key column, if this kind has it
    pub fn foreign_key(&self, column: &str) -> Option<&str> {
        match (self, column) {
            (Model::City(c), "state_id") => Some(&c.state_id),
            (Model::Place(p), "city_id") => Some(&p.city_id),
            (Model::Place(p), "user_id") => Some(&p.user_id),
            (Model::Review(r), "place_id") => Some(&r.place_id),
            (Model::Review(r), "user_id") => Some(&r.user_id),
            _ => None,
        }
    }

    /// Dictionary form, including `__class__`
    pub fn to_dict(&self) -> StorageResult<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Rebuild a model from its dictionary form.
    ///
    /// A `__class__` outside the catalog is `UnknownType`; any other shape
    /// problem is `InvalidRecord`, never a half-built model.
    pub fn from_dict(value: Value) -> StorageResult<Model> {
        let class = value
            .get("__class__")
            .and_then(Value::as_str)
            .ok_or_else(|| StorageError::invalid_record("<unknown>", "missing __class__"))?;
        let kind: ModelKind = class.parse()?;
        let id = value
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or("<no id>")
            .to_string();

        serde_json::from_value(value)
            .map_err(|e| StorageError::invalid_record(kind.key(&id), e.to_string()))
    }

    /// Overwrite attributes from `attrs`, leaving identity and timestamps
    /// alone. On error `self` is unchanged.
    pub fn apply(&mut self, attrs: &Map<String, Value>) -> StorageResult<()> {
        let mut dict = self.to_dict()?;
        if let Value::Object(fields) = &mut dict {
            for (name, value) in attrs {
                if PROTECTED_ATTRS.contains(&name.as_str()) {
                    continue;
                }
                fields.insert(name.clone(), value.clone());
            }
        }
        *self = Model::from_dict(dict)?;
        Ok(())
    }

    /// Save lifecycle: bump `updated_at`, register with `storage`, commit.
    pub fn save_to(&mut self, storage: &mut dyn Storage) -> StorageResult<()> {
        self.touch();
        storage.new(self)?;
        storage.save()
    }
}

macro_rules! impl_from_model {
    ($($ty:ident),*) => {
        $(
            impl From<$ty> for Model {
                fn from(m: $ty) -> Self {
                    Model::$ty(m)
                }
            }
        )*
    };
}

impl_from_model!(User, Place, State, City, Amenity, Review);

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_kind_parse_rejects_unknown() {
        assert_eq!("City".parse::<ModelKind>().unwrap(), ModelKind::City);
        let err = "BaseModel".parse::<ModelKind>().unwrap_err();
        assert!(matches!(err, StorageError::UnknownType(name) if name == "BaseModel"));
    }

    #[test]
    fn test_registry_key() {
        let city = City::with_base(BaseModel::with_id("C1"), "S1", "SF");
        let model = Model::from(city);
        assert_eq!(model.key(), "City.C1");
        assert_eq!(model.foreign_key("state_id"), Some("S1"));
        assert_eq!(model.foreign_key("user_id"), None);
    }

    #[test]
    fn test_dict_form_carries_class() {
        let model = Model::from(State::with_base(BaseModel::with_id("S1"), "California"));
        let dict = model.to_dict().unwrap();

        assert_eq!(dict["__class__"], "State");
        assert_eq!(dict["id"], "S1");
        assert_eq!(dict["name"], "California");
        assert_eq!(Model::from_dict(dict).unwrap(), model);
    }

    #[test]
    fn test_from_dict_unknown_class() {
        let err = Model::from_dict(json!({"__class__": "Spaceship", "id": "X"})).unwrap_err();
        assert!(matches!(err, StorageError::UnknownType(_)));
    }

    #[test]
    fn test_from_dict_missing_field_is_invalid_record() {
        let err = Model::from_dict(json!({
            "__class__": "City",
            "id": "C1",
            "created_at": "2017-09-28T21:05:54.119427",
            "updated_at": "2017-09-28T21:05:54.119427",
            "name": "SF"
        }))
        .unwrap_err();
        assert!(matches!(err, StorageError::InvalidRecord { key, .. } if key == "City.C1"));
    }

    #[test]
    fn test_apply_keeps_identity() {
        let mut model = Model::blank(ModelKind::Place);
        let id = model.id().to_string();
        let attrs = json!({"id": "hijack", "name": "Loft", "number_rooms": 3});

        model.apply(attrs.as_object().unwrap()).unwrap();

        assert_eq!(model.id(), id);
        match &model {
            Model::Place(p) => {
                assert_eq!(p.name, "Loft");
                assert_eq!(p.number_rooms, 3);
            }
            other => panic!("unexpected model {:?}", other),
        }
    }

    #[test]
    fn test_apply_bad_type_leaves_model_unchanged() {
        let mut model = Model::blank(ModelKind::Place);
        let before = model.clone();
        let attrs = json!({"number_rooms": "many"});

        assert!(model.apply(attrs.as_object().unwrap()).is_err());
        assert_eq!(model, before);
    }
}
