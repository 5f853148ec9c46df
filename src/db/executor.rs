//! Statement execution.
//!
//! Each driver gets a module with the same four entry points:
//! - `execute`: run a statement, report affected rows and the generated key
//! - `fetch_all`: buffer every row as a [`Record`]
//! - `fetch_optional`: first row, if any
//! - `for_each`: stream rows into a callback, stopping at its first error
//!
//! The functions are generic over `sqlx::Executor`, so the same code runs
//! against a pool and against an open transaction.

use crate::db::params::{bind_mysql_param, bind_postgres_param, bind_sqlite_param};
use crate::db::types::RowToRecord;
use crate::error::{BoxError, DbError, DbResult};
use crate::models::{QueryParam, Record};
use futures_util::TryStreamExt;

/// Result of a write statement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteOutcome {
    pub rows_affected: u64,
    /// Key generated by the last insert, where the driver reports one.
    pub last_insert_id: Option<i64>,
}

// The modules below differ only in driver types, the bind function and how
// the generated key is read back from the driver's query result.
macro_rules! driver_executor {
    ($module:ident, $db:ty, $bind:path, |$result:ident| $last_insert_id:expr) => {
        pub(crate) mod $module {
            use super::*;
            use sqlx::Executor;

            type Db = $db;

            fn build<'q>(
                sql: &'q str,
                params: &'q [QueryParam],
            ) -> sqlx::query::Query<'q, Db, <Db as sqlx::Database>::Arguments<'q>> {
                let mut query = sqlx::query(sql);
                for param in params {
                    query = $bind(query, param);
                }
                query
            }

            pub async fn execute<'c, X>(
                executor: X,
                sql: &str,
                params: &[QueryParam],
            ) -> DbResult<WriteOutcome>
            where
                X: Executor<'c, Database = Db>,
            {
                // Unprepared when there is nothing to bind; some DDL refuses
                // the prepared protocol.
                let $result = if params.is_empty() {
                    executor.execute(sql).await?
                } else {
                    build(sql, params).execute(executor).await?
                };
                Ok(WriteOutcome {
                    rows_affected: $result.rows_affected(),
                    last_insert_id: $last_insert_id,
                })
            }

            pub async fn fetch_all<'c, X>(
                executor: X,
                sql: &str,
                params: &[QueryParam],
            ) -> DbResult<Vec<Record>>
            where
                X: Executor<'c, Database = Db>,
            {
                let rows = build(sql, params).fetch_all(executor).await?;
                Ok(rows.iter().map(RowToRecord::to_record).collect())
            }

            pub async fn fetch_optional<'c, X>(
                executor: X,
                sql: &str,
                params: &[QueryParam],
            ) -> DbResult<Option<Record>>
            where
                X: Executor<'c, Database = Db>,
            {
                let row = build(sql, params).fetch_optional(executor).await?;
                Ok(row.as_ref().map(RowToRecord::to_record))
            }

            pub async fn for_each<'c, X, F>(
                executor: X,
                sql: &str,
                params: &[QueryParam],
                mut on_row: F,
            ) -> DbResult<u64>
            where
                X: Executor<'c, Database = Db>,
                F: FnMut(&Record) -> Result<(), BoxError> + Send,
            {
                let mut rows = build(sql, params).fetch(executor);
                let mut seen = 0u64;
                while let Some(row) = rows.try_next().await? {
                    seen += 1;
                    on_row(&row.to_record()).map_err(DbError::callback)?;
                }
                Ok(seen)
            }
        }
    };
}

driver_executor!(mysql, sqlx::MySql, bind_mysql_param, |result| Some(
    result.last_insert_id() as i64
));
driver_executor!(postgres, sqlx::Postgres, bind_postgres_param, |result| None);
driver_executor!(sqlite, sqlx::Sqlite, bind_sqlite_param, |result| Some(
    result.last_insert_rowid()
));
