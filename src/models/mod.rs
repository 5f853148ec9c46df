//! Data models for the access layer.
//!
//! This module re-exports all model types used throughout the crate.

pub mod connection;
pub mod entity;
pub mod query;
pub mod record;

// Re-export commonly used types
pub use connection::{ConnectionSpec, DEFAULT_FIND_LIMIT, DEFAULT_MAX_CONNECTIONS, DatabaseType};
pub use entity::{
    ColumnDef, ColumnType, Entity, TableDef, entity_from_record, entity_values, primary_key_value,
};
pub use query::{Found, QueryParam, SearchOptions};
pub use record::Record;
