//! Repositories: the operation surface for one database key.
//!
//! Every operation follows the same protocol:
//! 1. Await a permit from the key's admission gate (no timeout)
//! 2. Open a fresh connection handle; on failure give the permit back
//! 3. Run the operation against the handle
//! 4. Release the handle, then the permit, on every exit path
//! 5. Wrap failures in an [`OperationError`]; anything other than a
//!    not-found outcome is logged and reported under a new correlation id
//!
//! Handles and permits are scoped values, so a panicking callback or a
//! cancelled future still releases both.

use crate::db::pool::ConnectionFactory;
use crate::db::session::{Session, Tx};
use crate::db::sql::{self, quote_ident};
use crate::error::{BoxError, DbError, DbResult, OpResult, OperationError};
use crate::models::{
    ColumnDef, DEFAULT_FIND_LIMIT, Entity, Found, QueryParam, Record, SearchOptions,
    entity_from_record, primary_key_value,
};
use crate::report::{ErrorHub, new_correlation_id};
use chrono::Utc;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// Target name used in error envelopes for SQL passthrough calls.
const RAW_TARGET: &str = "raw";

/// Admission-gated operations against one logical database.
#[derive(Debug)]
pub struct Repository {
    key: String,
    capacity: usize,
    default_limit: u32,
    gate: Semaphore,
    factory: ConnectionFactory,
    errors: Arc<ErrorHub>,
}

impl Repository {
    /// A repository admitting at most `capacity` concurrent operations
    /// (raised to 1 if zero).
    pub fn new(
        key: impl Into<String>,
        capacity: usize,
        default_limit: u32,
        factory: ConnectionFactory,
        errors: Arc<ErrorHub>,
    ) -> Self {
        let capacity = capacity.max(1);
        Self {
            key: key.into(),
            capacity,
            default_limit,
            gate: Semaphore::new(capacity),
            factory,
            errors,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Admission gate capacity, fixed at creation.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Free admission slots right now.
    pub fn available_permits(&self) -> usize {
        self.gate.available_permits()
    }

    // =========================================================================
    // Entity operations
    // =========================================================================

    /// Insert `entity`. A database-generated key is written back into it.
    pub async fn create<E: Entity>(&self, entity: &mut E) -> OpResult<()> {
        self.run("create", E::type_name(), String::new(), |session| async move {
            session.insert(entity).await.map(drop)
        })
        .await
    }

    /// Insert `entity`, or overwrite the row with the same primary key.
    pub async fn save<E: Entity>(&self, entity: &mut E) -> OpResult<()> {
        self.run("save", E::type_name(), String::new(), |session| async move {
            session.upsert(entity).await.map(drop)
        })
        .await
    }

    /// Save every entity in one transaction.
    ///
    /// The first failure rolls back the whole batch and becomes the
    /// operation's error; otherwise the batch commits once.
    pub async fn save_many<E: Entity>(&self, entities: &mut [E]) -> OpResult<()> {
        let message = format!("{} entities", entities.len());
        self.run("save_many", E::type_name(), message, |session| async move {
            let mut tx = session.begin().await?;
            for entity in entities.iter_mut() {
                if let Err(err) = tx.upsert(entity).await {
                    if let Err(rollback_err) = tx.rollback().await {
                        warn!(error = %rollback_err, "Rollback after failed batch save failed");
                    }
                    return Err(err);
                }
            }
            tx.commit().await
        })
        .await
    }

    /// Set `changes` on rows matching `predicate`, refreshing the entity's
    /// `UPDATED_AT` column unless the caller sets it.
    ///
    /// Returns the number of rows affected.
    pub async fn update<E: Entity>(
        &self,
        predicate: &str,
        params: &[QueryParam],
        changes: &[(&str, QueryParam)],
    ) -> OpResult<u64> {
        self.update_rows::<E>("update", true, predicate, params, changes)
            .await
    }

    /// Like [`update`](Self::update) but writes exactly the given columns.
    pub async fn update_column<E: Entity>(
        &self,
        predicate: &str,
        params: &[QueryParam],
        changes: &[(&str, QueryParam)],
    ) -> OpResult<u64> {
        self.update_rows::<E>("update_column", false, predicate, params, changes)
            .await
    }

    async fn update_rows<E: Entity>(
        &self,
        operation: &'static str,
        touch: bool,
        predicate: &str,
        params: &[QueryParam],
        changes: &[(&str, QueryParam)],
    ) -> OpResult<u64> {
        let predicate = predicate.trim();
        let changes = match column_changes::<E>(predicate, changes, touch) {
            Ok(changes) => changes,
            Err(source) => {
                return Err(self.fail(operation, E::type_name(), predicate.to_string(), source));
            }
        };
        self.run(operation, E::type_name(), predicate.to_string(), |session| async move {
            let statement = sql::update(session.db_type(), E::TABLE, &changes, predicate, params);
            Ok(session.run(&statement).await?.rows_affected)
        })
        .await
    }

    /// Delete rows matching `predicate`, or `entity`'s own row when the
    /// predicate is empty.
    pub async fn delete<E: Entity>(
        &self,
        entity: &E,
        predicate: &str,
        params: &[QueryParam],
    ) -> OpResult<u64> {
        let predicate = predicate.trim();
        let key = if predicate.is_empty() {
            match identity(entity) {
                Ok(key) => Some(key),
                Err(source) => {
                    return Err(self.fail("delete", E::type_name(), String::new(), source));
                }
            }
        } else {
            None
        };
        self.run("delete", E::type_name(), predicate.to_string(), |session| async move {
            let db = session.db_type();
            let statement = match key {
                Some(key) => sql::delete_by_key(db, E::TABLE, E::PRIMARY_KEY, key),
                None => sql::delete(db, E::TABLE, predicate, params),
            };
            Ok(session.run(&statement).await?.rows_affected)
        })
        .await
    }

    /// Rows matching `options`, with the pre-pagination total when
    /// requested.
    pub async fn find<E: Entity>(&self, options: &SearchOptions) -> OpResult<Found<E>> {
        let limit = options.effective_limit(self.default_limit);
        let predicate = options.predicate();
        self.run("find", E::type_name(), predicate.to_string(), |session| async move {
            let db = session.db_type();
            let total = if options.count_total {
                Some(count_matching::<E>(&session, predicate, &options.params).await?)
            } else {
                None
            };
            let statement = sql::select(
                db,
                E::TABLE,
                E::columns(),
                predicate,
                options.ordering(),
                limit,
                options.offset,
                &options.params,
            );
            let records = session.fetch_all(&statement.sql, &statement.params).await?;
            let rows = records
                .iter()
                .map(|record| entity_from_record::<E>(record, db))
                .collect::<DbResult<Vec<E>>>()?;
            Ok(Found { rows, total })
        })
        .await
    }

    /// First row matching `options`, ordered by primary key unless an
    /// ordering is given. Zero rows is the not-found outcome.
    pub async fn first<E: Entity>(&self, options: &SearchOptions) -> OpResult<E> {
        let predicate = options.predicate();
        self.run("first", E::type_name(), predicate.to_string(), |session| async move {
            let db = session.db_type();
            let ordering = match options.ordering() {
                "" => quote_ident(db, E::PRIMARY_KEY),
                explicit => explicit.to_string(),
            };
            let statement = sql::select(
                db,
                E::TABLE,
                E::columns(),
                predicate,
                &ordering,
                Some(1),
                options.offset,
                &options.params,
            );
            match session.fetch_optional(&statement.sql, &statement.params).await? {
                Some(record) => entity_from_record::<E>(&record, db),
                None => Err(DbError::not_found(format!(
                    "{} where '{}'",
                    E::type_name(),
                    predicate
                ))),
            }
        })
        .await
    }

    /// Rows in `E`'s table matching `predicate` (all rows when empty).
    ///
    /// A failure is returned as the error rather than a `-1` count; there is
    /// no sentinel value.
    pub async fn count<E: Entity>(&self, predicate: &str, params: &[QueryParam]) -> OpResult<i64> {
        let predicate = predicate.trim();
        self.run("count", E::type_name(), predicate.to_string(), |session| async move {
            count_matching::<E>(&session, predicate, params).await
        })
        .await
    }

    // =========================================================================
    // Raw SQL
    // =========================================================================

    /// Run a statement that returns no rows; returns the rows affected.
    pub async fn exec_raw(&self, sql: &str, params: &[QueryParam]) -> OpResult<u64> {
        self.run("exec_raw", RAW_TARGET, sql.to_string(), |session| async move {
            Ok(session.execute(sql, params).await?.rows_affected)
        })
        .await
    }

    /// Stream every result row to `on_row`.
    ///
    /// An error from the callback stops the iteration and becomes the
    /// operation's error. Returns the number of rows delivered.
    pub async fn raw_select<F>(&self, sql: &str, params: &[QueryParam], on_row: F) -> OpResult<u64>
    where
        F: FnMut(&Record) -> Result<(), BoxError> + Send,
    {
        self.run("raw_select", RAW_TARGET, sql.to_string(), |session| async move {
            session.for_each(sql, params, on_row).await
        })
        .await
    }

    /// Decode the first result row, ignoring the rest.
    ///
    /// A single-column row decodes as the bare value, wider rows as a
    /// tuple. Returns `None` when the query yields no rows.
    pub async fn scalar_select<T: DeserializeOwned>(
        &self,
        sql: &str,
        params: &[QueryParam],
    ) -> OpResult<Option<T>> {
        self.run("scalar_select", RAW_TARGET, sql.to_string(), |session| async move {
            session
                .fetch_optional(sql, params)
                .await?
                .map(|record| record.decode_values())
                .transpose()
        })
        .await
    }

    /// Hand `callback` an open transaction.
    ///
    /// The callback owns commit or rollback; a transaction it drops
    /// unfinished is rolled back by the driver. A transaction moved out of
    /// the callback does not hold the admission slot: the handle is closed
    /// in the background once that transaction ends.
    pub async fn invoke_transaction<T, F, Fut>(&self, callback: F) -> OpResult<T>
    where
        F: FnOnce(Tx) -> Fut,
        Fut: Future<Output = Result<T, BoxError>>,
    {
        self.run("invoke_transaction", RAW_TARGET, String::new(), |session| async move {
            let tx = session.begin().await?;
            callback(tx).await.map_err(DbError::callback)
        })
        .await
    }

    // =========================================================================
    // Execution protocol
    // =========================================================================

    async fn run<T, F, Fut>(
        &self,
        operation: &'static str,
        target: &str,
        message: String,
        op: F,
    ) -> OpResult<T>
    where
        F: FnOnce(Session) -> Fut,
        Fut: Future<Output = DbResult<T>>,
    {
        self.admit(op)
            .await
            .map_err(|source| self.fail(operation, target, message, source))
    }

    async fn admit<T, F, Fut>(&self, op: F) -> DbResult<T>
    where
        F: FnOnce(Session) -> Fut,
        Fut: Future<Output = DbResult<T>>,
    {
        let _permit = self
            .gate
            .acquire()
            .await
            .map_err(|_| DbError::internal("Admission gate closed"))?;
        let handle = self.factory.open(&self.key).await?;
        let result = op(handle.session()).await;
        handle.release().await;
        result
    }

    fn fail(
        &self,
        operation: &'static str,
        target: &str,
        message: String,
        source: DbError,
    ) -> OperationError {
        let mut err = OperationError::new(operation, &self.key, target, message, source);
        if err.is_not_found() {
            debug!(
                database_key = %self.key,
                operation,
                entity = %target,
                "No matching row"
            );
            return err;
        }

        let correlation_id = new_correlation_id();
        warn!(
            database_key = %self.key,
            operation,
            entity = %target,
            message = %err.message,
            correlation_id = %correlation_id,
            error = %err.source,
            "Database operation failed"
        );
        err.correlation_id = Some(correlation_id.clone());
        self.errors.report(&correlation_id, &err);
        err
    }
}

async fn count_matching<E: Entity>(
    session: &Session,
    predicate: &str,
    params: &[QueryParam],
) -> DbResult<i64> {
    let statement = sql::count(session.db_type(), E::TABLE, predicate, params);
    match session.fetch_optional(&statement.sql, &statement.params).await? {
        Some(record) => record.get_at(0),
        None => Ok(0),
    }
}

/// Resolve update targets against the entity's columns.
fn column_changes<E: Entity>(
    predicate: &str,
    changes: &[(&str, QueryParam)],
    touch: bool,
) -> DbResult<Vec<(&'static ColumnDef, QueryParam)>> {
    if predicate.is_empty() {
        return Err(DbError::invalid_input(
            "Update requires a predicate; use exec_raw to update every row",
        ));
    }
    if changes.is_empty() {
        return Err(DbError::invalid_input("No columns to update"));
    }

    let mut resolved = changes
        .iter()
        .map(|(name, value)| {
            column::<E>(name)
                .map(|col| (col, value.clone()))
                .ok_or_else(|| {
                    DbError::invalid_input(format!("{} has no column '{}'", E::type_name(), name))
                })
        })
        .collect::<DbResult<Vec<_>>>()?;

    if let (true, Some(stamp)) = (touch, E::UPDATED_AT) {
        if !resolved.iter().any(|(col, _)| col.name == stamp) {
            if let Some(col) = column::<E>(stamp) {
                resolved.push((col, QueryParam::Timestamp(Utc::now())));
            }
        }
    }
    Ok(resolved)
}

fn column<E: Entity>(name: &str) -> Option<&'static ColumnDef> {
    E::columns().iter().find(|col| col.name == name)
}

fn identity<E: Entity>(entity: &E) -> DbResult<QueryParam> {
    let key = primary_key_value(entity)?;
    if key.is_null() {
        return Err(DbError::invalid_input(format!(
            "{} has no primary key value to delete by",
            E::type_name()
        )));
    }
    Ok(key)
}

/// One repository per database key, created on first use.
#[derive(Debug)]
pub struct RepositoryCache {
    factory: ConnectionFactory,
    errors: Arc<ErrorHub>,
    repositories: Mutex<HashMap<String, Arc<Repository>>>,
}

impl RepositoryCache {
    pub fn new(factory: ConnectionFactory, errors: Arc<ErrorHub>) -> Self {
        Self {
            factory,
            errors,
            repositories: Mutex::new(HashMap::new()),
        }
    }

    /// The repository for `key`.
    ///
    /// Gate capacity and default find cap come from the spec registered at
    /// first use; an unregistered key gets capacity 1 and its operations
    /// fail with `UnknownConnection`.
    pub fn choice(&self, key: &str) -> Arc<Repository> {
        let mut repositories = self
            .repositories
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(repository) = repositories.get(key) {
            return Arc::clone(repository);
        }

        let (capacity, default_limit) = match self.factory.registry().resolve(key) {
            Ok(spec) => (spec.admission_capacity(), spec.default_limit_or_default()),
            Err(_) => (1, DEFAULT_FIND_LIMIT),
        };
        let repository = Arc::new(Repository::new(
            key,
            capacity,
            default_limit,
            self.factory.clone(),
            Arc::clone(&self.errors),
        ));
        debug!(database_key = %key, capacity, "Created repository");
        repositories.insert(key.to_string(), Arc::clone(&repository));
        repository
    }

    pub fn len(&self) -> usize {
        self.repositories
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::registry::ConnectionRegistry;
    use crate::models::{ColumnType, ConnectionSpec};
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize)]
    struct Post {
        id: Option<i64>,
        title: String,
        updated_at: Option<chrono::DateTime<Utc>>,
    }

    impl Entity for Post {
        const TABLE: &'static str = "posts";
        const UPDATED_AT: Option<&'static str> = Some("updated_at");

        fn columns() -> &'static [ColumnDef] {
            const COLUMNS: &[ColumnDef] = &[
                ColumnDef::new("id", ColumnType::Integer)
                    .primary_key()
                    .auto_increment(),
                ColumnDef::new("title", ColumnType::Text),
                ColumnDef::new("updated_at", ColumnType::Timestamp),
            ];
            COLUMNS
        }
    }

    fn cache(registry: ConnectionRegistry) -> RepositoryCache {
        RepositoryCache::new(
            ConnectionFactory::new(Arc::new(registry)),
            Arc::new(ErrorHub::new()),
        )
    }

    #[test]
    fn test_update_touches_timestamp() {
        let changes = [("title", QueryParam::from("x"))];
        let touched = column_changes::<Post>("id = 1", &changes, true).unwrap();
        assert_eq!(touched.len(), 2);
        assert_eq!(touched[1].0.name, "updated_at");
        assert!(matches!(touched[1].1, QueryParam::Timestamp(_)));

        let plain = column_changes::<Post>("id = 1", &changes, false).unwrap();
        assert_eq!(plain.len(), 1);
    }

    #[test]
    fn test_explicit_timestamp_is_kept() {
        let changes = [("updated_at", QueryParam::Null)];
        let resolved = column_changes::<Post>("id = 1", &changes, true).unwrap();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].1, QueryParam::Null);
    }

    #[test]
    fn test_update_rejects_bad_input() {
        let changes = [("title", QueryParam::from("x"))];
        assert!(column_changes::<Post>("", &changes, true).is_err());
        assert!(column_changes::<Post>("id = 1", &[], true).is_err());
        let err = column_changes::<Post>("id = 1", &[("nope", QueryParam::Null)], true).unwrap_err();
        assert!(err.to_string().contains("no column 'nope'"));
    }

    #[test]
    fn test_delete_needs_identity() {
        let post = Post {
            id: None,
            title: "t".into(),
            updated_at: None,
        };
        assert!(identity(&post).is_err());
    }

    #[test]
    fn test_choice_reuses_instance() {
        let registry = ConnectionRegistry::new();
        registry.register(
            "main",
            ConnectionSpec::new("sqlite", "sqlite:unused.db").with_max_open_connections(3),
        );
        let cache = cache(registry);

        let first = cache.choice("main");
        let second = cache.choice("main");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.capacity(), 3);
        assert_eq!(first.available_permits(), 3);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_choice_unregistered_key_gets_single_slot() {
        let cache = cache(ConnectionRegistry::new());
        let repository = cache.choice("ghost");
        assert_eq!(repository.key(), "ghost");
        assert_eq!(repository.capacity(), 1);
    }

    #[tokio::test]
    async fn test_unknown_key_reports_and_frees_slot() {
        let errors = Arc::new(ErrorHub::new());
        let seen = Arc::new(Mutex::new(Vec::<String>::new()));
        let sink = Arc::clone(&seen);
        errors.subscribe(move |id, _| sink.lock().unwrap().push(id.to_string()));

        let cache = RepositoryCache::new(
            ConnectionFactory::new(Arc::new(ConnectionRegistry::new())),
            Arc::clone(&errors),
        );
        let repository = cache.choice("ghost");
        let err = repository.count::<Post>("", &[]).await.unwrap_err();

        assert!(err.is_unknown_connection());
        assert!(!err.is_not_found());
        assert_eq!(err.operation, "count");
        assert_eq!(err.code, crate::error::DB_ERROR_CODE);
        assert_eq!(repository.available_permits(), 1);
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(err.correlation_id.as_deref(), Some(seen[0].as_str()));
    }
}
