//! Entity capability trait and column descriptors.
//!
//! An entity is a plain `serde` struct that also describes its table: name,
//! columns with their logical types, primary key and optional update
//! timestamp. Values are extracted through `Serialize` and rows are decoded
//! through `Deserialize`, so the mapping is checked against the struct at
//! compile time and against the column list once per call.

use crate::error::{DbError, DbResult};
use crate::models::{DatabaseType, QueryParam, Record};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

/// Logical column type, used for parameter conversion and DDL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Float,
    Boolean,
    Text,
    Timestamp,
    Json,
}

impl ColumnType {
    /// Convert a serialized field value into a bound parameter.
    pub fn to_param(self, column: &str, value: JsonValue) -> DbResult<QueryParam> {
        if value.is_null() {
            return Ok(QueryParam::Null);
        }
        let mismatch = |value: &JsonValue| {
            DbError::invalid_input(format!(
                "Column '{}' expects {:?}, got {}",
                column, self, value
            ))
        };
        match self {
            Self::Integer => match &value {
                JsonValue::Number(n) => n.as_i64().map(QueryParam::Int).ok_or_else(|| mismatch(&value)),
                JsonValue::Bool(b) => Ok(QueryParam::Int(*b as i64)),
                _ => Err(mismatch(&value)),
            },
            Self::Float => value
                .as_f64()
                .map(QueryParam::Float)
                .ok_or_else(|| mismatch(&value)),
            Self::Boolean => value
                .as_bool()
                .map(QueryParam::Bool)
                .ok_or_else(|| mismatch(&value)),
            Self::Text => match value {
                JsonValue::String(s) => Ok(QueryParam::String(s)),
                other => Ok(QueryParam::String(other.to_string())),
            },
            Self::Timestamp => match &value {
                JsonValue::String(s) => parse_timestamp(s)
                    .map(QueryParam::Timestamp)
                    .ok_or_else(|| mismatch(&value)),
                _ => Err(mismatch(&value)),
            },
            Self::Json => Ok(QueryParam::Json(value)),
        }
    }
}

/// Parse RFC 3339 or a naive ISO timestamp (taken as UTC).
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Column descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: &'static str,
    pub column_type: ColumnType,
    pub primary_key: bool,
    /// Key generated by the database when inserted as NULL.
    pub auto_increment: bool,
    pub nullable: bool,
}

impl ColumnDef {
    pub const fn new(name: &'static str, column_type: ColumnType) -> Self {
        Self {
            name,
            column_type,
            primary_key: false,
            auto_increment: false,
            nullable: true,
        }
    }

    pub const fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    pub const fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    pub const fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }
}

/// Table descriptor handed to `auto_migrate`.
#[derive(Debug, Clone, Copy)]
pub struct TableDef {
    pub name: &'static str,
    pub type_name: &'static str,
    pub columns: &'static [ColumnDef],
}

impl TableDef {
    pub fn primary_key(&self) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.primary_key)
    }
}

/// A record type stored in one table.
///
/// # Example
///
/// ```ignore
/// #[derive(Serialize, Deserialize)]
/// struct Address {
///     id: Option<i64>,
///     content: String,
/// }
///
/// impl Entity for Address {
///     const TABLE: &'static str = "addresses";
///
///     fn columns() -> &'static [ColumnDef] {
///         const COLUMNS: &[ColumnDef] = &[
///             ColumnDef::new("id", ColumnType::Integer).primary_key().auto_increment(),
///             ColumnDef::new("content", ColumnType::Text),
///         ];
///         COLUMNS
///     }
///
///     fn set_generated_key(&mut self, key: i64) {
///         self.id = Some(key);
///     }
/// }
/// ```
pub trait Entity: Serialize + DeserializeOwned + Send + Sync + 'static {
    const TABLE: &'static str;
    const PRIMARY_KEY: &'static str = "id";
    /// Column `update` refreshes with the current time, if any.
    const UPDATED_AT: Option<&'static str> = None;

    fn columns() -> &'static [ColumnDef];

    /// Receive the key the database generated on insert.
    fn set_generated_key(&mut self, _key: i64) {}

    /// Short type name used in logs and error envelopes.
    fn type_name() -> &'static str {
        let full = std::any::type_name::<Self>();
        full.rsplit("::").next().unwrap_or(full)
    }

    fn table_def() -> TableDef {
        TableDef {
            name: Self::TABLE,
            type_name: Self::type_name(),
            columns: Self::columns(),
        }
    }
}

/// Serialized column values of an entity, in column order.
pub fn entity_values<E: Entity>(entity: &E) -> DbResult<Vec<(&'static ColumnDef, QueryParam)>> {
    let mut fields = match serde_json::to_value(entity)? {
        JsonValue::Object(map) => map,
        other => {
            return Err(DbError::invalid_input(format!(
                "{} must serialize to an object, got {}",
                E::type_name(),
                other
            )));
        }
    };
    E::columns()
        .iter()
        .map(|col| {
            let value = fields.remove(col.name).unwrap_or(JsonValue::Null);
            Ok((col, col.column_type.to_param(col.name, value)?))
        })
        .collect()
}

/// Value of the entity's primary key column, `Null` when unset.
pub fn primary_key_value<E: Entity>(entity: &E) -> DbResult<QueryParam> {
    Ok(entity_values(entity)?
        .into_iter()
        .find(|(col, _)| col.name == E::PRIMARY_KEY)
        .map(|(_, value)| value)
        .unwrap_or(QueryParam::Null))
}

/// Decode a row selected with `E::columns()` into the entity.
///
/// Drivers without native boolean or JSON storage return those columns as
/// integers or text; they are normalised by column type before decoding.
pub fn entity_from_record<E: Entity>(record: &Record, db: DatabaseType) -> DbResult<E> {
    let mut fields = record.to_json_map();
    for col in E::columns() {
        let Some(value) = fields.get_mut(col.name) else {
            continue;
        };
        match (col.column_type, &*value) {
            (ColumnType::Boolean, JsonValue::Number(n)) => {
                *value = JsonValue::Bool(n.as_i64().unwrap_or(0) != 0);
            }
            (ColumnType::Json, JsonValue::String(s)) if db == DatabaseType::SQLite => {
                if let Ok(parsed) = serde_json::from_str(s) {
                    *value = parsed;
                }
            }
            _ => {}
        }
    }
    serde_json::from_value(JsonValue::Object(fields)).map_err(|e| {
        DbError::invalid_input(format!("Cannot decode {} from row: {}", E::type_name(), e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Serialize, Deserialize)]
    struct Note {
        id: Option<i64>,
        body: String,
        pinned: bool,
        edited_at: Option<DateTime<Utc>>,
    }

    impl Entity for Note {
        const TABLE: &'static str = "notes";
        const UPDATED_AT: Option<&'static str> = Some("edited_at");

        fn columns() -> &'static [ColumnDef] {
            const COLUMNS: &[ColumnDef] = &[
                ColumnDef::new("id", ColumnType::Integer)
                    .primary_key()
                    .auto_increment(),
                ColumnDef::new("body", ColumnType::Text).not_null(),
                ColumnDef::new("pinned", ColumnType::Boolean),
                ColumnDef::new("edited_at", ColumnType::Timestamp),
            ];
            COLUMNS
        }
    }

    #[test]
    fn test_entity_values_follow_column_order() {
        let note = Note {
            id: None,
            body: "hi".into(),
            pinned: true,
            edited_at: None,
        };
        let values = entity_values(&note).unwrap();
        let names: Vec<_> = values.iter().map(|(c, _)| c.name).collect();
        assert_eq!(names, ["id", "body", "pinned", "edited_at"]);
        assert_eq!(values[0].1, QueryParam::Null);
        assert_eq!(values[2].1, QueryParam::Bool(true));
        assert_eq!(primary_key_value(&note).unwrap(), QueryParam::Null);
    }

    #[test]
    fn test_timestamp_column_binds_as_timestamp() {
        let at = Utc::now();
        let note = Note {
            id: Some(3),
            body: "x".into(),
            pinned: false,
            edited_at: Some(at),
        };
        let values = entity_values(&note).unwrap();
        assert_eq!(values[3].1, QueryParam::Timestamp(at));
        assert_eq!(primary_key_value(&note).unwrap(), QueryParam::Int(3));
    }

    #[test]
    fn test_type_mismatch_is_invalid_input() {
        let err = ColumnType::Integer.to_param("id", json!("abc")).unwrap_err();
        assert!(matches!(err, DbError::InvalidInput { .. }));
    }

    #[test]
    fn test_parse_naive_timestamp() {
        let ts = parse_timestamp("2024-03-01 10:20:30").unwrap();
        assert_eq!(ts.to_rfc3339(), "2024-03-01T10:20:30+00:00");
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn test_entity_from_record_normalises_booleans() {
        let record = Record::new(
            vec!["id".into(), "body".into(), "pinned".into(), "edited_at".into()],
            vec![json!(1), json!("b"), json!(1), json!("2024-03-01T10:20:30+00:00")],
        );
        let note: Note = entity_from_record(&record, DatabaseType::MySQL).unwrap();
        assert_eq!(note.id, Some(1));
        assert!(note.pinned);
        assert!(note.edited_at.is_some());
    }

    #[test]
    fn test_table_def() {
        let def = Note::table_def();
        assert_eq!(def.name, "notes");
        assert_eq!(def.type_name, "Note");
        assert_eq!(def.primary_key().map(|c| c.name), Some("id"));
    }
}
