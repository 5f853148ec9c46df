//! Statement execution over an open handle.
//!
//! A [`Session`] runs statements on the handle's pool; [`Tx`] pins one
//! connection inside a transaction. Both speak raw SQL with the driver's
//! native placeholders and return driver-independent [`Record`]s.

use crate::db::executor::{self, WriteOutcome};
use crate::db::pool::DbPool;
use crate::db::sql::{self, Statement};
use crate::error::{BoxError, DbError, DbResult};
use crate::models::{DatabaseType, Entity, QueryParam, Record, entity_values};
use sqlx::{MySql, Postgres, Sqlite, Transaction};
use tracing::debug;

/// Statement runner bound to one connection handle.
///
/// Cloning is cheap; clones share the handle and stop working once the
/// owning operation releases it.
#[derive(Debug, Clone)]
pub struct Session {
    pool: DbPool,
}

impl Session {
    pub(crate) fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn db_type(&self) -> DatabaseType {
        self.pool.db_type()
    }

    /// Run a statement that returns no rows.
    pub async fn execute(&self, sql: &str, params: &[QueryParam]) -> DbResult<WriteOutcome> {
        debug!(sql = %sql, params = params.len(), "Executing statement");
        impl_db_dispatch!(&self.pool, {
            MySql(p) => executor::mysql::execute(p, sql, params).await,
            Postgres(p) => executor::postgres::execute(p, sql, params).await,
            SQLite(p) => executor::sqlite::execute(p, sql, params).await,
        })
    }

    pub async fn fetch_all(&self, sql: &str, params: &[QueryParam]) -> DbResult<Vec<Record>> {
        debug!(sql = %sql, params = params.len(), "Executing query");
        impl_db_dispatch!(&self.pool, {
            MySql(p) => executor::mysql::fetch_all(p, sql, params).await,
            Postgres(p) => executor::postgres::fetch_all(p, sql, params).await,
            SQLite(p) => executor::sqlite::fetch_all(p, sql, params).await,
        })
    }

    pub async fn fetch_optional(
        &self,
        sql: &str,
        params: &[QueryParam],
    ) -> DbResult<Option<Record>> {
        debug!(sql = %sql, params = params.len(), "Executing query");
        impl_db_dispatch!(&self.pool, {
            MySql(p) => executor::mysql::fetch_optional(p, sql, params).await,
            Postgres(p) => executor::postgres::fetch_optional(p, sql, params).await,
            SQLite(p) => executor::sqlite::fetch_optional(p, sql, params).await,
        })
    }

    /// Stream rows into `on_row`, stopping at the first error it returns.
    ///
    /// Returns the number of rows delivered.
    pub async fn for_each<F>(&self, sql: &str, params: &[QueryParam], on_row: F) -> DbResult<u64>
    where
        F: FnMut(&Record) -> Result<(), BoxError> + Send,
    {
        debug!(sql = %sql, params = params.len(), "Streaming query");
        impl_db_dispatch!(&self.pool, {
            MySql(p) => executor::mysql::for_each(p, sql, params, on_row).await,
            Postgres(p) => executor::postgres::for_each(p, sql, params, on_row).await,
            SQLite(p) => executor::sqlite::for_each(p, sql, params, on_row).await,
        })
    }

    pub(crate) async fn run(&self, statement: &Statement) -> DbResult<WriteOutcome> {
        self.execute(&statement.sql, &statement.params).await
    }

    /// Insert `entity`, storing a generated key back into it.
    pub async fn insert<E: Entity>(&self, entity: &mut E) -> DbResult<u64> {
        let plan = InsertPlan::new(self.db_type(), &*entity)?;
        let (rows, key) = if plan.returning {
            let record = self
                .fetch_optional(&plan.statement.sql, &plan.statement.params)
                .await?;
            (1, generated_key(record)?)
        } else {
            let outcome = self.run(&plan.statement).await?;
            (outcome.rows_affected, outcome.last_insert_id)
        };
        plan.apply(entity, key);
        Ok(rows)
    }

    /// Insert `entity`, or overwrite the row that already has its key.
    pub async fn upsert<E: Entity>(&self, entity: &mut E) -> DbResult<u64> {
        match upsert_statement(self.db_type(), &*entity)? {
            Some(statement) => Ok(self.run(&statement).await?.rows_affected),
            None => self.insert(entity).await,
        }
    }

    /// Start a transaction on a dedicated connection.
    pub async fn begin(&self) -> DbResult<Tx> {
        let inner = impl_db_dispatch!(&self.pool, {
            MySql(p) => DbTransaction::MySql(p.begin().await?),
            Postgres(p) => DbTransaction::Postgres(p.begin().await?),
            SQLite(p) => DbTransaction::SQLite(p.begin().await?),
        });
        debug!(db_type = %inner.db_type(), "Transaction started");
        Ok(Tx { inner })
    }
}

/// Database-specific transaction wrapper.
pub enum DbTransaction {
    MySql(Transaction<'static, MySql>),
    Postgres(Transaction<'static, Postgres>),
    SQLite(Transaction<'static, Sqlite>),
}

impl DbTransaction {
    pub fn db_type(&self) -> DatabaseType {
        match self {
            DbTransaction::MySql(_) => DatabaseType::MySQL,
            DbTransaction::Postgres(_) => DatabaseType::PostgreSQL,
            DbTransaction::SQLite(_) => DatabaseType::SQLite,
        }
    }
}

/// An open transaction.
///
/// Dropping a `Tx` without [`commit`](Self::commit) rolls it back.
pub struct Tx {
    inner: DbTransaction,
}

impl std::fmt::Debug for Tx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tx")
            .field("db_type", &self.inner.db_type())
            .finish_non_exhaustive()
    }
}

impl Tx {
    pub fn db_type(&self) -> DatabaseType {
        self.inner.db_type()
    }

    pub async fn execute(&mut self, sql: &str, params: &[QueryParam]) -> DbResult<WriteOutcome> {
        debug!(sql = %sql, params = params.len(), "Executing statement in transaction");
        impl_tx_dispatch!(&mut self.inner, {
            MySql(tx) => executor::mysql::execute(&mut **tx, sql, params).await,
            Postgres(tx) => executor::postgres::execute(&mut **tx, sql, params).await,
            SQLite(tx) => executor::sqlite::execute(&mut **tx, sql, params).await,
        })
    }

    pub async fn fetch_all(&mut self, sql: &str, params: &[QueryParam]) -> DbResult<Vec<Record>> {
        debug!(sql = %sql, params = params.len(), "Executing query in transaction");
        impl_tx_dispatch!(&mut self.inner, {
            MySql(tx) => executor::mysql::fetch_all(&mut **tx, sql, params).await,
            Postgres(tx) => executor::postgres::fetch_all(&mut **tx, sql, params).await,
            SQLite(tx) => executor::sqlite::fetch_all(&mut **tx, sql, params).await,
        })
    }

    pub async fn fetch_optional(
        &mut self,
        sql: &str,
        params: &[QueryParam],
    ) -> DbResult<Option<Record>> {
        debug!(sql = %sql, params = params.len(), "Executing query in transaction");
        impl_tx_dispatch!(&mut self.inner, {
            MySql(tx) => executor::mysql::fetch_optional(&mut **tx, sql, params).await,
            Postgres(tx) => executor::postgres::fetch_optional(&mut **tx, sql, params).await,
            SQLite(tx) => executor::sqlite::fetch_optional(&mut **tx, sql, params).await,
        })
    }

    pub async fn insert<E: Entity>(&mut self, entity: &mut E) -> DbResult<u64> {
        let plan = InsertPlan::new(self.db_type(), &*entity)?;
        let (rows, key) = if plan.returning {
            let record = self
                .fetch_optional(&plan.statement.sql, &plan.statement.params)
                .await?;
            (1, generated_key(record)?)
        } else {
            let outcome = self
                .execute(&plan.statement.sql, &plan.statement.params)
                .await?;
            (outcome.rows_affected, outcome.last_insert_id)
        };
        plan.apply(entity, key);
        Ok(rows)
    }

    pub async fn upsert<E: Entity>(&mut self, entity: &mut E) -> DbResult<u64> {
        match upsert_statement(self.db_type(), &*entity)? {
            Some(statement) => Ok(self
                .execute(&statement.sql, &statement.params)
                .await?
                .rows_affected),
            None => self.insert(entity).await,
        }
    }

    pub async fn commit(self) -> DbResult<()> {
        impl_tx_dispatch!(self.inner, {
            MySql(tx) => tx.commit().await.map_err(DbError::from),
            Postgres(tx) => tx.commit().await.map_err(DbError::from),
            SQLite(tx) => tx.commit().await.map_err(DbError::from),
        })
    }

    pub async fn rollback(self) -> DbResult<()> {
        impl_tx_dispatch!(self.inner, {
            MySql(tx) => tx.rollback().await.map_err(DbError::from),
            Postgres(tx) => tx.rollback().await.map_err(DbError::from),
            SQLite(tx) => tx.rollback().await.map_err(DbError::from),
        })
    }
}

struct InsertPlan {
    statement: Statement,
    /// The primary key is database-generated and unset on the entity.
    wants_key: bool,
    /// The key comes back as a row (`RETURNING`) rather than in the result.
    returning: bool,
}

impl InsertPlan {
    fn new<E: Entity>(db: DatabaseType, entity: &E) -> DbResult<Self> {
        let values = entity_values(entity)?;
        let wants_key = values
            .iter()
            .any(|(col, value)| col.name == E::PRIMARY_KEY && col.auto_increment && value.is_null());
        let statement = sql::insert(db, E::TABLE, E::PRIMARY_KEY, &values, wants_key);
        Ok(Self {
            statement,
            wants_key,
            returning: wants_key && db == DatabaseType::PostgreSQL,
        })
    }

    fn apply<E: Entity>(&self, entity: &mut E, key: Option<i64>) {
        if let (true, Some(key)) = (self.wants_key, key) {
            entity.set_generated_key(key);
        }
    }
}

fn generated_key(record: Option<Record>) -> DbResult<Option<i64>> {
    record.map(|r| r.get_at::<i64>(0)).transpose()
}

/// `None` when the key is unset and the row must be inserted instead.
fn upsert_statement<E: Entity>(db: DatabaseType, entity: &E) -> DbResult<Option<Statement>> {
    let values = entity_values(entity)?;
    let key_set = values
        .iter()
        .any(|(col, value)| col.name == E::PRIMARY_KEY && !value.is_null());
    if !key_set {
        return Ok(None);
    }
    Ok(Some(sql::upsert(db, E::TABLE, E::PRIMARY_KEY, &values)))
}
