//! Schema migration from entity descriptors.
//!
//! Migration is additive only: a missing table is created from its column
//! list and missing columns are added to an existing table. Nothing is ever
//! altered or dropped.
//!
//! # Architecture
//!
//! Column introspection queries live in the `queries` submodule, one per
//! database type. DDL is rendered by `create_table_sql` / `add_column_sql`.

use crate::db::session::Session;
use crate::db::sql::{quote_ident, sql_type};
use crate::error::DbResult;
use crate::models::{ColumnDef, DatabaseType, TableDef};
use serde::Serialize;
use tracing::{debug, info, warn};

mod queries {
    pub mod postgres {
        pub const LIST_COLUMNS: &str = r#"
            SELECT column_name AS name
            FROM information_schema.columns
            WHERE table_schema = current_schema() AND table_name = $1
            ORDER BY ordinal_position
            "#;
    }

    pub mod mysql {
        pub const LIST_COLUMNS: &str = r#"
            SELECT column_name AS name
            FROM information_schema.columns
            WHERE table_schema = DATABASE() AND table_name = ?
            ORDER BY ordinal_position
            "#;
    }

    pub mod sqlite {
        pub const LIST_COLUMNS: &str = "SELECT name FROM pragma_table_info(?) ORDER BY cid";
    }
}

/// Outcome of migrating one table.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TableMigration {
    pub table: String,
    pub entity: String,
    pub created: bool,
    pub added_columns: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MigrationReport {
    pub tables: Vec<TableMigration>,
}

impl MigrationReport {
    pub fn is_success(&self) -> bool {
        self.tables.iter().all(|t| t.error.is_none())
    }

    pub fn failures(&self) -> impl Iterator<Item = &TableMigration> {
        self.tables.iter().filter(|t| t.error.is_some())
    }
}

/// Bring every table up to its descriptor.
///
/// A failing table is logged and recorded in the report; the remaining
/// tables are still migrated.
pub async fn migrate(session: &Session, tables: &[TableDef]) -> MigrationReport {
    let mut report = MigrationReport::default();
    for table in tables {
        let mut outcome = TableMigration {
            table: table.name.to_string(),
            entity: table.type_name.to_string(),
            ..TableMigration::default()
        };
        if let Err(e) = migrate_table(session, table, &mut outcome).await {
            warn!(
                table = %table.name,
                entity = %table.type_name,
                error = %e,
                "Migration failed"
            );
            outcome.error = Some(e.to_string());
        }
        report.tables.push(outcome);
    }
    report
}

async fn migrate_table(
    session: &Session,
    table: &TableDef,
    outcome: &mut TableMigration,
) -> DbResult<()> {
    let db = session.db_type();
    let existing = existing_columns(session, table.name).await?;

    if existing.is_empty() {
        session.execute(&create_table_sql(db, table), &[]).await?;
        outcome.created = true;
        info!(table = %table.name, entity = %table.type_name, "Created table");
        return Ok(());
    }

    for column in table.columns {
        if existing.iter().any(|name| name.eq_ignore_ascii_case(column.name)) {
            continue;
        }
        session
            .execute(&add_column_sql(db, table.name, column), &[])
            .await?;
        outcome.added_columns.push(column.name.to_string());
        info!(table = %table.name, column = %column.name, "Added column");
    }
    debug!(table = %table.name, added = outcome.added_columns.len(), "Table up to date");
    Ok(())
}

/// Column names of `table`; empty when the table does not exist.
pub async fn existing_columns(session: &Session, table: &str) -> DbResult<Vec<String>> {
    let sql = match session.db_type() {
        DatabaseType::PostgreSQL => queries::postgres::LIST_COLUMNS,
        DatabaseType::MySQL => queries::mysql::LIST_COLUMNS,
        DatabaseType::SQLite => queries::sqlite::LIST_COLUMNS,
    };
    session
        .fetch_all(sql, &[table.into()])
        .await?
        .iter()
        .map(|record| record.get_at::<String>(0))
        .collect()
}

fn column_sql(db: DatabaseType, column: &ColumnDef) -> String {
    let name = quote_ident(db, column.name);
    match (db, column.primary_key, column.auto_increment) {
        (DatabaseType::SQLite, true, true) => format!("{} INTEGER PRIMARY KEY AUTOINCREMENT", name),
        (DatabaseType::PostgreSQL, true, true) => format!("{} BIGSERIAL PRIMARY KEY", name),
        (DatabaseType::MySQL, true, true) => format!(
            "{} {} NOT NULL AUTO_INCREMENT PRIMARY KEY",
            name,
            sql_type(db, column)
        ),
        (_, true, false) => format!("{} {} NOT NULL PRIMARY KEY", name, sql_type(db, column)),
        _ if !column.nullable => format!("{} {} NOT NULL", name, sql_type(db, column)),
        _ => format!("{} {}", name, sql_type(db, column)),
    }
}

pub fn create_table_sql(db: DatabaseType, table: &TableDef) -> String {
    let columns: Vec<String> = table.columns.iter().map(|c| column_sql(db, c)).collect();
    format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        quote_ident(db, table.name),
        columns.join(", ")
    )
}

/// Added columns are always nullable so existing rows stay valid.
pub fn add_column_sql(db: DatabaseType, table: &str, column: &ColumnDef) -> String {
    format!(
        "ALTER TABLE {} ADD COLUMN {} {}",
        quote_ident(db, table),
        quote_ident(db, column.name),
        sql_type(db, column)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::pool::DbPool;
    use crate::models::ColumnType;
    use sqlx::sqlite::SqlitePoolOptions;

    const V1: &[ColumnDef] = &[
        ColumnDef::new("id", ColumnType::Integer)
            .primary_key()
            .auto_increment(),
        ColumnDef::new("name", ColumnType::Text).not_null(),
    ];

    const V2: &[ColumnDef] = &[
        ColumnDef::new("id", ColumnType::Integer)
            .primary_key()
            .auto_increment(),
        ColumnDef::new("name", ColumnType::Text).not_null(),
        ColumnDef::new("meta", ColumnType::Json),
        ColumnDef::new("seen_at", ColumnType::Timestamp),
    ];

    fn table(columns: &'static [ColumnDef]) -> TableDef {
        TableDef {
            name: "users",
            type_name: "User",
            columns,
        }
    }

    #[test]
    fn test_create_table_sql_per_dialect() {
        assert_eq!(
            create_table_sql(DatabaseType::SQLite, &table(V1)),
            "CREATE TABLE IF NOT EXISTS \"users\" (\"id\" INTEGER PRIMARY KEY AUTOINCREMENT, \"name\" TEXT NOT NULL)"
        );
        assert_eq!(
            create_table_sql(DatabaseType::PostgreSQL, &table(V1)),
            "CREATE TABLE IF NOT EXISTS \"users\" (\"id\" BIGSERIAL PRIMARY KEY, \"name\" TEXT NOT NULL)"
        );
        assert_eq!(
            create_table_sql(DatabaseType::MySQL, &table(V1)),
            "CREATE TABLE IF NOT EXISTS `users` (`id` BIGINT NOT NULL AUTO_INCREMENT PRIMARY KEY, `name` TEXT NOT NULL)"
        );
    }

    #[test]
    fn test_add_column_sql() {
        assert_eq!(
            add_column_sql(DatabaseType::PostgreSQL, "users", &V2[2]),
            "ALTER TABLE \"users\" ADD COLUMN \"meta\" JSONB"
        );
    }

    #[tokio::test]
    async fn test_migrate_creates_then_adds_columns() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let session = Session::new(DbPool::SQLite(pool));

        let report = migrate(&session, &[table(V1)]).await;
        assert!(report.is_success());
        assert!(report.tables[0].created);

        let report = migrate(&session, &[table(V2)]).await;
        assert!(report.is_success());
        assert!(!report.tables[0].created);
        assert_eq!(report.tables[0].added_columns, vec!["meta", "seen_at"]);

        let columns = existing_columns(&session, "users").await.unwrap();
        assert_eq!(columns, vec!["id", "name", "meta", "seen_at"]);

        let report = migrate(&session, &[table(V2)]).await;
        assert!(report.tables[0].added_columns.is_empty());
    }

    #[tokio::test]
    async fn test_migrate_records_failures() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let session = Session::new(DbPool::SQLite(pool));

        const BROKEN: &[ColumnDef] = &[
            ColumnDef::new("a", ColumnType::Integer).primary_key(),
            ColumnDef::new("a", ColumnType::Integer),
        ];
        let broken = TableDef {
            name: "broken",
            type_name: "Broken",
            columns: BROKEN,
        };
        let report = migrate(&session, &[broken, table(V1)]).await;
        assert!(!report.is_success());
        assert_eq!(report.failures().count(), 1);
        assert!(report.tables[1].created);
    }
}
