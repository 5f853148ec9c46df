//! Query-related data models.
//!
//! This module defines bound parameter values and the per-call search options
//! accepted by `find` and `first`.

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;

/// A parameter value for parameterized queries.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryParam {
    /// NULL value
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value (stored as i64 for maximum range)
    Int(i64),
    /// Floating point value
    Float(f64),
    /// String value
    String(String),
    /// Binary data
    Bytes(Vec<u8>),
    /// JSON document
    Json(JsonValue),
    /// UTC timestamp
    Timestamp(DateTime<Utc>),
}

impl QueryParam {
    /// Check if this parameter is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Get the type name of this parameter for debugging.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Bytes(_) => "bytes",
            Self::Json(_) => "json",
            Self::Timestamp(_) => "timestamp",
        }
    }

    /// Map a free-form JSON value onto the closest parameter type.
    ///
    /// Arrays and objects are bound as JSON documents.
    pub fn from_json(value: JsonValue) -> Self {
        match value {
            JsonValue::Null => Self::Null,
            JsonValue::Bool(v) => Self::Bool(v),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => Self::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            JsonValue::String(s) => Self::String(s),
            other => Self::Json(other),
        }
    }
}

impl From<bool> for QueryParam {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for QueryParam {
    fn from(v: i32) -> Self {
        Self::Int(v as i64)
    }
}

impl From<i64> for QueryParam {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for QueryParam {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for QueryParam {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for QueryParam {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<Vec<u8>> for QueryParam {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

impl From<DateTime<Utc>> for QueryParam {
    fn from(v: DateTime<Utc>) -> Self {
        Self::Timestamp(v)
    }
}

impl<T: Into<QueryParam>> From<Option<T>> for QueryParam {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Self::Null)
    }
}

/// Per-call options for `find` and `first`.
///
/// `limit` follows a three-way convention: `0` applies the connection's
/// default cap, a negative value means unlimited, anything else is the
/// explicit row limit.
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    pub limit: i64,
    pub offset: u64,
    /// Raw predicate; may be empty.
    pub where_clause: String,
    /// Raw ORDER BY expression; may be empty.
    pub order_clause: String,
    pub params: Vec<QueryParam>,
    /// When set, `find` also counts every row matching the predicate.
    pub count_total: bool,
}

impl SearchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the predicate and its bound values.
    pub fn filter(mut self, where_clause: impl Into<String>, params: Vec<QueryParam>) -> Self {
        self.where_clause = where_clause.into();
        self.params = params;
        self
    }

    pub fn order_by(mut self, order_clause: impl Into<String>) -> Self {
        self.order_clause = order_clause.into();
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    /// Shorthand for a negative limit.
    pub fn unlimited(self) -> Self {
        self.limit(-1)
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_total(mut self) -> Self {
        self.count_total = true;
        self
    }

    /// Resolve the row limit: `None` means no LIMIT clause.
    pub fn effective_limit(&self, default_cap: u32) -> Option<u64> {
        match self.limit {
            0 => Some(default_cap as u64),
            l if l < 0 => None,
            l => Some(l as u64),
        }
    }

    pub fn predicate(&self) -> &str {
        self.where_clause.trim()
    }

    pub fn ordering(&self) -> &str {
        self.order_clause.trim()
    }
}

/// Rows returned by `find`, plus the pre-pagination count when requested.
#[derive(Debug, Clone)]
pub struct Found<E> {
    pub rows: Vec<E>,
    pub total: Option<i64>,
}

impl<E> Found<E> {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_query_param_types() {
        assert!(QueryParam::Null.is_null());
        assert!(!QueryParam::Bool(true).is_null());
        assert_eq!(QueryParam::Int(42).type_name(), "int");
        assert_eq!(QueryParam::from("hello").type_name(), "string");
        assert_eq!(QueryParam::from(None::<i64>), QueryParam::Null);
        assert_eq!(QueryParam::from(Some(7)), QueryParam::Int(7));
    }

    #[test]
    fn test_query_param_from_json() {
        assert_eq!(QueryParam::from_json(json!(3)), QueryParam::Int(3));
        assert_eq!(QueryParam::from_json(json!(1.5)), QueryParam::Float(1.5));
        assert_eq!(QueryParam::from_json(json!("x")), QueryParam::from("x"));
        assert_eq!(
            QueryParam::from_json(json!({"a": 1})),
            QueryParam::Json(json!({"a": 1}))
        );
    }

    #[test]
    fn test_effective_limit() {
        let opts = SearchOptions::new();
        assert_eq!(opts.effective_limit(50), Some(50));
        assert_eq!(opts.clone().limit(5).effective_limit(50), Some(5));
        assert_eq!(opts.clone().limit(500).effective_limit(50), Some(500));
        assert_eq!(opts.unlimited().effective_limit(50), None);
    }

    #[test]
    fn test_clauses_are_trimmed() {
        let opts = SearchOptions::new()
            .filter("  id < ?  ", vec![10.into()])
            .order_by(" id DESC ");
        assert_eq!(opts.predicate(), "id < ?");
        assert_eq!(opts.ordering(), "id DESC");
        assert_eq!(opts.params, vec![QueryParam::Int(10)]);
    }
}
