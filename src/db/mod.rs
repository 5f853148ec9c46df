//! Database abstraction layer.
//!
//! This module provides database access functionality:
//! - Connection registry and per-operation connection handles
//! - Statement rendering and execution
//! - Repositories with admission gating, and their process-wide cache
//! - Additive schema migration
//! - Type mappings
//! - Database dispatch macros for reducing code duplication

pub mod executor;
#[macro_use]
pub mod macros;
pub mod params;
pub mod pool;
pub mod registry;
pub mod repository;
pub mod schema;
pub mod session;
pub mod sql;
pub mod types;

pub use executor::WriteOutcome;
pub use pool::{ConnectionFactory, ConnectionHandle, DbPool};
pub use registry::ConnectionRegistry;
pub use repository::{Repository, RepositoryCache};
pub use schema::{MigrationReport, TableMigration};
pub use session::{DbTransaction, Session, Tx};
