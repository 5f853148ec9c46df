//! Driver-independent result rows.

use crate::error::{DbError, DbResult};
use serde::de::DeserializeOwned;
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value as JsonValue;

/// One result row with its columns in select order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    columns: Vec<String>,
    values: Vec<JsonValue>,
}

impl Record {
    pub fn new(columns: Vec<String>, values: Vec<JsonValue>) -> Self {
        debug_assert_eq!(columns.len(), values.len());
        Self { columns, values }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[JsonValue] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Raw value of the named column.
    pub fn value(&self, column: &str) -> Option<&JsonValue> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|idx| &self.values[idx])
    }

    /// Decode the named column.
    pub fn get<T: DeserializeOwned>(&self, column: &str) -> DbResult<T> {
        let value = self.value(column).ok_or_else(|| {
            DbError::database(
                format!("Column not found: {}", column),
                None,
                "Check the selected column names",
            )
        })?;
        serde_json::from_value(value.clone()).map_err(|e| {
            DbError::invalid_input(format!("Cannot decode column '{}': {}", column, e))
        })
    }

    /// Decode the column at `index`.
    pub fn get_at<T: DeserializeOwned>(&self, index: usize) -> DbResult<T> {
        let value = self.values.get(index).ok_or_else(|| {
            DbError::internal(format!(
                "Column index {} out of bounds (len: {})",
                index,
                self.values.len()
            ))
        })?;
        serde_json::from_value(value.clone())
            .map_err(|e| DbError::invalid_input(format!("Cannot decode column {}: {}", index, e)))
    }

    pub fn to_json_map(&self) -> serde_json::Map<String, JsonValue> {
        self.columns
            .iter()
            .cloned()
            .zip(self.values.iter().cloned())
            .collect()
    }

    /// Decode the row as a struct keyed by column name.
    pub fn decode<T: DeserializeOwned>(&self) -> DbResult<T> {
        Ok(serde_json::from_value(JsonValue::Object(self.to_json_map()))?)
    }

    /// Decode the row positionally, e.g. into a tuple.
    pub fn decode_tuple<T: DeserializeOwned>(&self) -> DbResult<T> {
        Ok(serde_json::from_value(JsonValue::Array(self.values.clone()))?)
    }

    /// Decode a single-column row as its bare value, anything else positionally.
    pub fn decode_values<T: DeserializeOwned>(&self) -> DbResult<T> {
        if let [single] = self.values.as_slice() {
            if let Ok(value) = serde_json::from_value(single.clone()) {
                return Ok(value);
            }
        }
        self.decode_tuple()
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (column, value) in self.columns.iter().zip(&self.values) {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    fn sample() -> Record {
        Record::new(
            vec!["id".into(), "content".into(), "deleted".into()],
            vec![json!(7), json!("hello"), JsonValue::Null],
        )
    }

    #[test]
    fn test_get_by_name_and_index() {
        let record = sample();
        assert_eq!(record.get::<i64>("id").unwrap(), 7);
        assert_eq!(record.get_at::<String>(1).unwrap(), "hello");
        assert_eq!(record.get::<Option<bool>>("deleted").unwrap(), None);
        assert!(record.get::<i64>("missing").is_err());
        assert!(record.get_at::<i64>(9).is_err());
    }

    #[test]
    fn test_decode_struct_and_tuple() {
        #[derive(Deserialize)]
        struct Row {
            id: i64,
            content: String,
        }
        let record = sample();
        let row: Row = record.decode().unwrap();
        assert_eq!((row.id, row.content.as_str()), (7, "hello"));

        let (id, content, deleted): (i64, String, Option<bool>) = record.decode_tuple().unwrap();
        assert_eq!((id, content.as_str(), deleted), (7, "hello", None));
    }

    #[test]
    fn test_decode_values_single_column() {
        let record = Record::new(vec!["n".into()], vec![json!(42)]);
        assert_eq!(record.decode_values::<i64>().unwrap(), 42);
        assert_eq!(record.decode_values::<(i64,)>().unwrap(), (42,));

        let (id, content): (i64, String) = Record::new(
            vec!["id".into(), "content".into()],
            vec![json!(1), json!("x")],
        )
        .decode_values()
        .unwrap();
        assert_eq!((id, content.as_str()), (1, "x"));
    }

    #[test]
    fn test_serialize_keeps_column_order() {
        let out = serde_json::to_string(&sample()).unwrap();
        assert_eq!(out, r#"{"id":7,"content":"hello","deleted":null}"#);
    }
}
