//! Relationship declarations between model kinds
//!
//! Declared once. The relational schema derives its foreign keys and cascade
//! rules from [`RELATIONS`] and [`PLACE_AMENITY`]; the file engine walks the
//! same tables when cascading deletes are enabled.

use super::ModelKind;

/// A one-to-many relation: every `child` row points at one `parent` through
/// `foreign_key`. Deleting the parent deletes its children.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Relation {
    pub parent: ModelKind,
    pub child: ModelKind,
    pub foreign_key: &'static str,
}

/// A many-to-many link stored in its own table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Link {
    pub table: &'static str,
    pub owner: ModelKind,
    pub owner_column: &'static str,
    pub target: ModelKind,
    pub target_column: &'static str,
}

pub const RELATIONS: &[Relation] = &[
    Relation {
        parent: ModelKind::State,
        child: ModelKind::City,
        foreign_key: "state_id",
    },
    Relation {
        parent: ModelKind::City,
        child: ModelKind::Place,
        foreign_key: "city_id",
    },
    Relation {
        parent: ModelKind::User,
        child: ModelKind::Place,
        foreign_key: "user_id",
    },
    Relation {
        parent: ModelKind::Place,
        child: ModelKind::Review,
        foreign_key: "place_id",
    },
    Relation {
        parent: ModelKind::User,
        child: ModelKind::Review,
        foreign_key: "user_id",
    },
];

/// Place ↔ Amenity
pub const PLACE_AMENITY: Link = Link {
    table: "place_amenity",
    owner: ModelKind::Place,
    owner_column: "place_id",
    target: ModelKind::Amenity,
    target_column: "amenity_id",
};

/// Relations in which `kind` is the parent
pub fn children_of(kind: ModelKind) -> impl Iterator<Item = &'static Relation> {
    RELATIONS.iter().filter(move |r| r.parent == kind)
}

/// Relations in which `kind` is the child
pub fn parents_of(kind: ModelKind) -> impl Iterator<Item = &'static Relation> {
    RELATIONS.iter().filter(move |r| r.child == kind)
}

/// The relation linking `parent` to `child`, if one is declared
pub fn find(parent: ModelKind, child: ModelKind) -> Option<&'static Relation> {
    RELATIONS
        .iter()
        .find(|r| r.parent == parent && r.child == child)
}
