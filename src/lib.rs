//! dbkit: a data-access layer over SQLite, PostgreSQL and MySQL.
//!
//! Named connections are registered once, and every operation runs through
//! a per-key [`Repository`] that bounds concurrency with an admission gate
//! and opens a fresh connection handle for the duration of the call.
//! Failures are reported to subscribers under a correlation identifier.

pub mod access;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod report;
pub mod response;

pub use access::DataAccess;
pub use config::Config;
pub use db::{Repository, RepositoryCache, Session, Tx};
pub use error::{DbError, OperationError};
pub use models::{ColumnDef, ColumnType, ConnectionSpec, Entity, QueryParam, SearchOptions};
pub use report::ErrorHub;
pub use response::ApiResponse;
