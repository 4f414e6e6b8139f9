//! Relational schema and row mapping
//!
//! One table per cataloged kind, primary key `id`. Foreign keys and their
//! cascade rules come from the relation declarations in
//! [`crate::models::relations`]; they are deferred so the order in which a
//! batch stages objects does not matter until commit.

use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::error::{StorageError, StorageResult};
use crate::models::relations::{self, PLACE_AMENITY};
use crate::models::{Model, ModelKind};

/// Tables in creation order, parents before children
const CREATE_ORDER: [ModelKind; 6] = [
    ModelKind::User,
    ModelKind::State,
    ModelKind::Amenity,
    ModelKind::City,
    ModelKind::Place,
    ModelKind::Review,
];

const BASE_COLUMNS: &[(&str, &str)] = &[
    ("id", "VARCHAR(60) NOT NULL PRIMARY KEY"),
    ("created_at", "TEXT NOT NULL"),
    ("updated_at", "TEXT NOT NULL"),
];

fn own_columns(kind: ModelKind) -> &'static [(&'static str, &'static str)] {
    match kind {
        ModelKind::User => &[
            ("email", "VARCHAR(128) NOT NULL"),
            ("password", "VARCHAR(128) NOT NULL"),
            ("first_name", "VARCHAR(128)"),
            ("last_name", "VARCHAR(128)"),
        ],
        ModelKind::State => &[("name", "VARCHAR(128) NOT NULL")],
        ModelKind::City => &[
            ("state_id", "VARCHAR(60) NOT NULL"),
            ("name", "VARCHAR(128) NOT NULL"),
        ],
        ModelKind::Amenity => &[("name", "VARCHAR(128) NOT NULL")],
        ModelKind::Place => &[
            ("city_id", "VARCHAR(60) NOT NULL"),
            ("user_id", "VARCHAR(60) NOT NULL"),
            ("name", "VARCHAR(128) NOT NULL"),
            ("description", "VARCHAR(1024)"),
            ("number_rooms", "INTEGER NOT NULL DEFAULT 0"),
            ("number_bathrooms", "INTEGER NOT NULL DEFAULT 0"),
            ("max_guest", "INTEGER NOT NULL DEFAULT 0"),
            ("price_by_night", "INTEGER NOT NULL DEFAULT 0"),
            ("latitude", "REAL"),
            ("longitude", "REAL"),
        ],
        ModelKind::Review => &[
            ("place_id", "VARCHAR(60) NOT NULL"),
            ("user_id", "VARCHAR(60) NOT NULL"),
            ("text", "VARCHAR(1024) NOT NULL"),
        ],
    }
}

fn column_names(kind: ModelKind) -> Vec<&'static str> {
    BASE_COLUMNS
        .iter()
        .chain(own_columns(kind))
        .map(|(name, _)| *name)
        .collect()
}

fn references(table: &str) -> String {
    format!(
        "REFERENCES {}(id) ON DELETE CASCADE DEFERRABLE INITIALLY DEFERRED",
        table
    )
}

fn create_table_sql(kind: ModelKind) -> String {
    let mut defs = Vec::new();
    for (name, ty) in BASE_COLUMNS.iter().chain(own_columns(kind)) {
        let mut def = format!("{} {}", name, ty);
        if let Some(rel) = relations::parents_of(kind).find(|r| r.foreign_key == *name) {
            def.push(' ');
            def.push_str(&references(rel.parent.table()));
        }
        defs.push(def);
    }
    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n    {}\n);",
        kind.table(),
        defs.join(",\n    ")
    )
}

fn create_link_sql() -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {table} (
    {owner} VARCHAR(60) NOT NULL {owner_ref},
    {target} VARCHAR(60) NOT NULL {target_ref},
    PRIMARY KEY ({owner}, {target})
);",
        table = PLACE_AMENITY.table,
        owner = PLACE_AMENITY.owner_column,
        owner_ref = references(PLACE_AMENITY.owner.table()),
        target = PLACE_AMENITY.target_column,
        target_ref = references(PLACE_AMENITY.target.table()),
    )
}

/// Create every missing table; a no-op on an up-to-date schema
pub(crate) fn create_all(conn: &Connection) -> StorageResult<()> {
    let mut ddl: Vec<String> = CREATE_ORDER.iter().map(|k| create_table_sql(*k)).collect();
    ddl.push(create_link_sql());
    conn.execute_batch(&ddl.join("\n"))?;
    Ok(())
}

/// Drop every known table, children first
pub(crate) fn drop_all(conn: &Connection) -> StorageResult<()> {
    let mut ddl = vec![format!("DROP TABLE IF EXISTS {};", PLACE_AMENITY.table)];
    ddl.extend(
        CREATE_ORDER
            .iter()
            .rev()
            .map(|k| format!("DROP TABLE IF EXISTS {};", k.table())),
    );
    conn.execute_batch(&ddl.join("\n"))?;
    Ok(())
}

fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => n.as_f64().map(SqlValue::Real).unwrap_or(SqlValue::Null),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

fn from_sql(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null | ValueRef::Blob(_) => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
    }
}

/// Insert or update `obj` and, for places, its amenity links
pub(crate) fn upsert(conn: &Connection, obj: &Model) -> StorageResult<()> {
    let kind = obj.kind();
    let dict = obj.to_dict()?;
    let columns = column_names(kind);

    let values: Vec<SqlValue> = columns
        .iter()
        .map(|col| dict.get(*col).map(to_sql).unwrap_or(SqlValue::Null))
        .collect();
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{}", i)).collect();
    let updates: Vec<String> = columns
        .iter()
        .filter(|c| **c != "id" && **c != "created_at")
        .map(|c| format!("{c} = excluded.{c}"))
        .collect();

    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT(id) DO UPDATE SET {}",
        kind.table(),
        columns.join(", "),
        placeholders.join(", "),
        updates.join(", ")
    );
    conn.prepare_cached(&sql)?.execute(params_from_iter(values))?;

    if let Model::Place(place) = obj {
        conn.prepare_cached(&format!(
            "DELETE FROM {} WHERE {} = ?1",
            PLACE_AMENITY.table, PLACE_AMENITY.owner_column
        ))?
        .execute(params![place.base.id()])?;

        let mut insert = conn.prepare_cached(&format!(
            "INSERT OR IGNORE INTO {} ({}, {}) VALUES (?1, ?2)",
            PLACE_AMENITY.table, PLACE_AMENITY.owner_column, PLACE_AMENITY.target_column
        ))?;
        for amenity_id in &place.amenity_ids {
            insert.execute(params![place.base.id(), amenity_id])?;
        }
    }
    Ok(())
}

/// Delete `obj`; dependents go through `ON DELETE CASCADE`
pub(crate) fn delete(conn: &Connection, obj: &Model) -> StorageResult<usize> {
    let sql = format!("DELETE FROM {} WHERE id = ?1", obj.kind().table());
    Ok(conn.prepare_cached(&sql)?.execute(params![obj.id()])?)
}

/// Amenity links grouped by place, in link order
fn amenity_links(
    conn: &Connection,
    place_id: Option<&str>,
) -> StorageResult<HashMap<String, Vec<String>>> {
    let base = format!(
        "SELECT {owner}, {target} FROM {table}",
        owner = PLACE_AMENITY.owner_column,
        target = PLACE_AMENITY.target_column,
        table = PLACE_AMENITY.table,
    );
    let mut links: HashMap<String, Vec<String>> = HashMap::new();
    let mut push = |row: &rusqlite::Row<'_>| -> rusqlite::Result<()> {
        let owner: String = row.get(0)?;
        let target: String = row.get(1)?;
        links.entry(owner).or_default().push(target);
        Ok(())
    };

    match place_id {
        Some(id) => {
            let sql = format!("{} WHERE {} = ?1 ORDER BY rowid", base, PLACE_AMENITY.owner_column);
            let mut stmt = conn.prepare_cached(&sql)?;
            let mut rows = stmt.query(params![id])?;
            while let Some(row) = rows.next()? {
                push(row)?;
            }
        }
        None => {
            let mut stmt = conn.prepare_cached(&format!("{} ORDER BY rowid", base))?;
            let mut rows = stmt.query([])?;
            while let Some(row) = rows.next()? {
                push(row)?;
            }
        }
    }
    Ok(links)
}

fn read_row(row: &rusqlite::Row<'_>, columns: &[&str]) -> rusqlite::Result<Map<String, Value>> {
    let mut fields = Map::new();
    for (i, col) in columns.iter().enumerate() {
        fields.insert((*col).to_string(), from_sql(row.get_ref(i)?));
    }
    Ok(fields)
}

fn into_model(
    kind: ModelKind,
    mut fields: Map<String, Value>,
    links: &mut HashMap<String, Vec<String>>,
) -> StorageResult<Model> {
    fields.insert("__class__".into(), Value::from(kind.name()));
    if kind == PLACE_AMENITY.owner {
        let id = fields.get("id").and_then(Value::as_str).unwrap_or_default();
        let amenity_ids = links.remove(id).unwrap_or_default();
        fields.insert("amenity_ids".into(), Value::from(amenity_ids));
    }
    Model::from_dict(Value::Object(fields))
}

/// Every row of `kind`, fully materialized
pub(crate) fn select_all(conn: &Connection, kind: ModelKind) -> StorageResult<Vec<Model>> {
    let columns = column_names(kind);
    let sql = format!("SELECT {} FROM {}", columns.join(", "), kind.table());
    let mut stmt = conn.prepare_cached(&sql)?;
    let rows = stmt
        .query_map([], |row| read_row(row, &columns))?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut links = if kind == PLACE_AMENITY.owner {
        amenity_links(conn, None)?
    } else {
        HashMap::new()
    };
    rows.into_iter()
        .map(|fields| into_model(kind, fields, &mut links))
        .collect()
}

/// One row of `kind` by id
pub(crate) fn select_one(
    conn: &Connection,
    kind: ModelKind,
    id: &str,
) -> StorageResult<Option<Model>> {
    let columns = column_names(kind);
    let sql = format!(
        "SELECT {} FROM {} WHERE id = ?1",
        columns.join(", "),
        kind.table()
    );
    let fields = conn
        .prepare_cached(&sql)?
        .query_row(params![id], |row| read_row(row, &columns))
        .optional()?;

    let Some(fields) = fields else {
        return Ok(None);
    };
    let mut links = if kind == PLACE_AMENITY.owner {
        amenity_links(conn, Some(id))?
    } else {
        HashMap::new()
    };
    into_model(kind, fields, &mut links).map(Some)
}

pub(crate) fn count(conn: &Connection, kind: ModelKind) -> StorageResult<usize> {
    let sql = format!("SELECT COUNT(*) FROM {}", kind.table());
    let n: i64 = conn.prepare_cached(&sql)?.query_row([], |row| row.get(0))?;
    usize::try_from(n).map_err(|_| StorageError::invalid_record(kind.table(), "negative count"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BaseModel, City, State};

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        create_all(&conn).unwrap();
        conn
    }

    #[test]
    fn test_city_table_references_states() {
        let sql = create_table_sql(ModelKind::City);
        assert!(sql.contains("state_id VARCHAR(60) NOT NULL REFERENCES states(id) ON DELETE CASCADE"));
        assert!(!create_table_sql(ModelKind::State).contains("REFERENCES"));
    }

    #[test]
    fn test_create_all_is_idempotent() {
        let conn = conn();
        create_all(&conn).unwrap();
        assert_eq!(count(&conn, ModelKind::State).unwrap(), 0);
    }

    #[test]
    fn test_upsert_updates_in_place() {
        let conn = conn();
        let mut state = State::with_base(BaseModel::with_id("S1"), "California");
        upsert(&conn, &state.clone().into()).unwrap();
        state.name = "Nevada".into();
        upsert(&conn, &state.clone().into()).unwrap();

        assert_eq!(count(&conn, ModelKind::State).unwrap(), 1);
        assert_eq!(
            select_one(&conn, ModelKind::State, "S1").unwrap(),
            Some(Model::from(state))
        );
    }

    #[test]
    fn test_update_of_parent_keeps_children() {
        let conn = conn();
        let state = Model::from(State::with_base(BaseModel::with_id("S1"), "California"));
        upsert(&conn, &state).unwrap();
        upsert(&conn, &City::with_base(BaseModel::with_id("C1"), "S1", "SF").into()).unwrap();

        upsert(&conn, &state).unwrap();
        assert_eq!(count(&conn, ModelKind::City).unwrap(), 1);
    }

    #[test]
    fn test_drop_all_removes_tables() {
        let conn = conn();
        drop_all(&conn).unwrap();
        assert!(count(&conn, ModelKind::State).is_err());
    }

    #[test]
    fn test_corrupt_row_is_invalid_record() {
        let conn = conn();
        conn.execute(
            "INSERT INTO states (id, created_at, updated_at, name) VALUES ('S1', 'never', 'never', 'X')",
            [],
        )
        .unwrap();

        let err = select_all(&conn, ModelKind::State).unwrap_err();
        assert!(matches!(err, StorageError::InvalidRecord { key, .. } if key == "State.S1"));
    }
}
