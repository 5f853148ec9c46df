//! Process-level entry point tying the registry, repository cache and
//! error hub together.
//!
//! Applications normally use [`DataAccess::global`]; tests construct
//! independent instances with [`DataAccess::new`].

use crate::db::pool::ConnectionFactory;
use crate::db::registry::ConnectionRegistry;
use crate::db::repository::{Repository, RepositoryCache};
use crate::db::schema::{self, MigrationReport};
use crate::error::DbResult;
use crate::models::{ConnectionSpec, TableDef};
use crate::report::ErrorHub;
use std::error::Error as StdError;
use std::sync::{Arc, OnceLock};
use tracing::{info, warn};

#[derive(Debug)]
pub struct DataAccess {
    registry: Arc<ConnectionRegistry>,
    errors: Arc<ErrorHub>,
    factory: ConnectionFactory,
    cache: RepositoryCache,
}

impl Default for DataAccess {
    fn default() -> Self {
        Self::new()
    }
}

impl DataAccess {
    pub fn new() -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let errors = Arc::new(ErrorHub::new());
        let factory = ConnectionFactory::new(Arc::clone(&registry));
        let cache = RepositoryCache::new(factory.clone(), Arc::clone(&errors));
        Self {
            registry,
            errors,
            factory,
            cache,
        }
    }

    /// The process-wide instance, created on first call.
    pub fn global() -> &'static DataAccess {
        static GLOBAL: OnceLock<DataAccess> = OnceLock::new();
        GLOBAL.get_or_init(DataAccess::new)
    }

    /// Register `connection_string` under `key` with default pool options.
    ///
    /// Replaces any earlier registration. A repository already created for
    /// `key` keeps the gate capacity it was created with.
    pub fn set_connection(
        &self,
        key: impl Into<String>,
        driver_type: impl Into<String>,
        connection_string: impl Into<String>,
    ) {
        self.registry
            .register(key, ConnectionSpec::new(driver_type, connection_string));
    }

    pub fn set_connection_with_options(&self, key: impl Into<String>, spec: ConnectionSpec) {
        self.registry.register(key, spec);
    }

    /// The repository for `key`; the same instance on every call.
    pub fn choice(&self, key: &str) -> Arc<Repository> {
        self.cache.choice(key)
    }

    /// Receive `(correlation_id, error)` for every reported failure.
    pub fn subscribe<F>(&self, subscriber: F)
    where
        F: Fn(&str, &(dyn StdError + 'static)) + Send + Sync + 'static,
    {
        self.errors.subscribe(subscriber);
    }

    pub fn errors(&self) -> &Arc<ErrorHub> {
        &self.errors
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Create missing tables and columns for `tables` on `key`.
    ///
    /// Only opening the connection can fail the call; per-table failures
    /// are logged and recorded in the report.
    pub async fn auto_migrate(&self, key: &str, tables: &[TableDef]) -> DbResult<MigrationReport> {
        let handle = self.factory.open(key).await?;
        let report = schema::migrate(&handle.session(), tables).await;
        handle.release().await;

        for failure in report.failures() {
            warn!(
                database_key = %key,
                entity = %failure.entity,
                error = failure.error.as_deref().unwrap_or_default(),
                "Auto-migration failed for entity"
            );
        }
        info!(
            database_key = %key,
            tables = report.tables.len(),
            failed = report.failures().count(),
            "Auto-migration finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ColumnDef, ColumnType};

    const COLUMNS: &[ColumnDef] = &[
        ColumnDef::new("id", ColumnType::Integer)
            .primary_key()
            .auto_increment(),
        ColumnDef::new("body", ColumnType::Text),
    ];

    #[test]
    fn test_global_is_singleton() {
        assert!(std::ptr::eq(DataAccess::global(), DataAccess::global()));
    }

    #[test]
    fn test_set_connection_overwrites() {
        let access = DataAccess::new();
        access.set_connection("main", "sqlite", "sqlite:one.db");
        access.set_connection_with_options(
            "main",
            ConnectionSpec::new("sqlite", "sqlite:two.db").with_max_open_connections(4),
        );

        let spec = access.registry().resolve("main").unwrap();
        assert_eq!(spec.connection_string, "sqlite:two.db");
        assert_eq!(access.choice("main").capacity(), 4);
    }

    #[test]
    fn test_instances_are_isolated() {
        let a = DataAccess::new();
        let b = DataAccess::new();
        a.set_connection("only_a", "sqlite", "sqlite:a.db");
        a.subscribe(|_, _| {});

        assert!(!b.registry().contains("only_a"));
        assert_eq!(b.errors().subscriber_count(), 0);
        assert_eq!(a.errors().subscriber_count(), 1);
    }

    #[tokio::test]
    async fn test_auto_migrate_unknown_key() {
        let access = DataAccess::new();
        let table = TableDef {
            name: "notes",
            type_name: "Note",
            columns: COLUMNS,
        };
        let err = access.auto_migrate("ghost", &[table]).await.unwrap_err();
        assert!(matches!(err, crate::error::DbError::UnknownConnection { .. }));
    }

    #[tokio::test]
    async fn test_auto_migrate_creates_table() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite:{}", dir.path().join("notes.db").display());
        let access = DataAccess::new();
        access.set_connection("notes", "sqlite", url);

        let table = TableDef {
            name: "notes",
            type_name: "Note",
            columns: COLUMNS,
        };
        let report = access.auto_migrate("notes", &[table]).await.unwrap();
        assert!(report.is_success());
        assert!(report.tables[0].created);
    }
}
