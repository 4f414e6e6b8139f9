//! Storage property tests
//!
//! Property-based checks of the storage contract over arbitrary object sets,
//! including hostile strings (quotes, SQL fragments, unicode).

use hbnb_core::models::{Amenity, BaseModel, State, User};
use hbnb_core::storage::{DbStorage, FileStorage, Storage};
use hbnb_core::{DbConfig, Model, ModelKind, ObjectMap};
use proptest::prelude::*;

fn arb_text() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-zA-Z0-9 _-]{0,40}",
        "\\PC{1,30}",
        Just("'; DROP TABLE states; --".to_string()),
        Just("\"quoted\"\n\ttabbed".to_string()),
    ]
}

/// An object of one of the parentless kinds; ids are unique per index
fn arb_model(index: usize) -> impl Strategy<Value = Model> {
    let id = format!("obj-{index:04}");
    (0..3u8, arb_text(), proptest::option::of(arb_text())).prop_map(move |(kind, text, extra)| {
        let base = BaseModel::with_id(id.clone());
        match kind {
            0 => State::with_base(base, text).into(),
            1 => Amenity::with_base(base, text).into(),
            _ => {
                let mut user = User::with_base(base, format!("{text}@hbnb.io"), "pwd");
                user.first_name = extra;
                user.into()
            }
        }
    })
}

fn arb_models() -> impl Strategy<Value = Vec<Model>> {
    (0..24usize).prop_flat_map(|n| (0..n).map(arb_model).collect::<Vec<_>>())
}

fn persist(storage: &mut dyn Storage, objects: &[Model]) {
    storage.reload().unwrap();
    for obj in objects {
        storage.new(obj).unwrap();
    }
    storage.save().unwrap();
    storage.reload().unwrap();
}

fn check_union(storage: &dyn Storage) -> Result<(), TestCaseError> {
    let everything = storage.all(None).unwrap();
    let mut union = ObjectMap::new();
    let mut total = 0;
    for kind in ModelKind::ALL {
        let part = storage.all(Some(kind)).unwrap();
        prop_assert!(part.values().all(|m| m.kind() == kind));
        total += part.len();
        union.extend(part);
    }
    prop_assert_eq!(total, union.len());
    prop_assert_eq!(everything, union);
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Saving an unchanged, freshly reloaded table rewrites identical bytes
    #[test]
    fn prop_file_round_trip_is_byte_stable(objects in arb_models()) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("file.json");

        let mut storage = FileStorage::open(&path);
        persist(&mut storage, &objects);
        let first = std::fs::read(&path).unwrap();

        storage.save().unwrap();
        let second = std::fs::read(&path).unwrap();

        prop_assert_eq!(first, second);
        prop_assert_eq!(storage.count(None).unwrap(), objects.len());
    }

    /// Whatever was saved comes back equal, on both engines
    #[test]
    fn prop_saved_objects_come_back_equal(objects in arb_models()) {
        let dir = tempfile::tempdir().unwrap();
        let mut file = FileStorage::open(dir.path().join("file.json"));
        let mut db = DbStorage::connect(DbConfig::in_memory()).unwrap();

        persist(&mut file, &objects);
        persist(&mut db, &objects);

        let expected: ObjectMap = objects.iter().map(|m| (m.key(), m.clone())).collect();
        prop_assert_eq!(&file.all(None).unwrap(), &expected);
        prop_assert_eq!(&db.all(None).unwrap(), &expected);
    }

    /// Unfiltered `all` is the disjoint union of the per-kind results
    #[test]
    fn prop_all_is_disjoint_union(objects in arb_models()) {
        let dir = tempfile::tempdir().unwrap();
        let mut file = FileStorage::open(dir.path().join("file.json"));
        let mut db = DbStorage::connect(DbConfig::in_memory()).unwrap();

        persist(&mut file, &objects);
        persist(&mut db, &objects);

        check_union(&file)?;
        check_union(&db)?;
    }

    /// Deleting any subset leaves exactly the complement after reload
    #[test]
    fn prop_delete_leaves_complement(
        objects in arb_models(),
        mask in prop::collection::vec(any::<bool>(), 24),
    ) {
        let dir = tempfile::tempdir().unwrap();
        let mut file = FileStorage::open(dir.path().join("file.json"));
        let mut db = DbStorage::connect(DbConfig::in_memory()).unwrap();

        for storage in [&mut file as &mut dyn Storage, &mut db] {
            persist(storage, &objects);
            for (obj, doomed) in objects.iter().zip(&mask) {
                if *doomed {
                    storage.delete(Some(obj)).unwrap();
                }
            }
            storage.save().unwrap();
            storage.reload().unwrap();

            let mut kept: Vec<String> = objects
                .iter()
                .zip(&mask)
                .filter(|(_, doomed)| !**doomed)
                .map(|(obj, _)| obj.key())
                .collect();
            kept.sort();
            let remaining: Vec<String> = storage.all(None).unwrap().into_keys().collect();
            prop_assert_eq!(remaining, kept);
        }
    }
}
