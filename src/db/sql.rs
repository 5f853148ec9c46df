//! SQL statement rendering.
//!
//! Statements combine generated fragments (column lists, SET clauses, keys)
//! with caller-supplied raw predicates. Caller predicates use the driver's
//! native placeholder style (`?` for MySQL/SQLite, `$n` for PostgreSQL) and
//! refer to the caller's parameters only, so generated placeholders are
//! numbered after them on PostgreSQL and bound in text order elsewhere.

use crate::models::{ColumnDef, ColumnType, DatabaseType, QueryParam};

/// A rendered statement with its parameters in binding order.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<QueryParam>,
}

impl Statement {
    pub fn new(sql: impl Into<String>, params: Vec<QueryParam>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }
}

/// Quote an identifier for the given dialect.
pub fn quote_ident(db: DatabaseType, name: &str) -> String {
    match db {
        DatabaseType::MySQL => format!("`{}`", name.replace('`', "``")),
        _ => format!("\"{}\"", name.replace('"', "\"\"")),
    }
}

/// Column type as written in DDL, without key or nullability modifiers.
pub fn sql_type(db: DatabaseType, column: &ColumnDef) -> &'static str {
    match (db, column.column_type) {
        (DatabaseType::PostgreSQL, ColumnType::Integer) => "BIGINT",
        (DatabaseType::MySQL, ColumnType::Integer) => "BIGINT",
        (DatabaseType::SQLite, ColumnType::Integer) => "INTEGER",
        (DatabaseType::PostgreSQL, ColumnType::Float) => "DOUBLE PRECISION",
        (DatabaseType::MySQL, ColumnType::Float) => "DOUBLE",
        (DatabaseType::SQLite, ColumnType::Float) => "REAL",
        (_, ColumnType::Boolean) => "BOOLEAN",
        // MySQL cannot index an unbounded TEXT key
        (DatabaseType::MySQL, ColumnType::Text) if column.primary_key => "VARCHAR(255)",
        (_, ColumnType::Text) => "TEXT",
        (DatabaseType::PostgreSQL, ColumnType::Timestamp) => "TIMESTAMPTZ",
        (DatabaseType::MySQL, ColumnType::Timestamp) => "DATETIME(6)",
        (DatabaseType::SQLite, ColumnType::Timestamp) => "DATETIME",
        (DatabaseType::PostgreSQL, ColumnType::Json) => "JSONB",
        (_, ColumnType::Json) => "JSON",
    }
}

/// Collects generated parameters alongside a caller predicate's parameters.
struct Binder {
    db: DatabaseType,
    caller_len: usize,
    generated: Vec<QueryParam>,
}

impl Binder {
    fn new(db: DatabaseType, caller_len: usize) -> Self {
        Self {
            db,
            caller_len,
            generated: Vec::new(),
        }
    }

    fn push(&mut self, param: QueryParam) -> String {
        self.generated.push(param);
        match self.db {
            DatabaseType::PostgreSQL => format!("${}", self.caller_len + self.generated.len()),
            _ => "?".to_string(),
        }
    }

    /// Placeholder for a column value. PostgreSQL types a bare NULL as
    /// text, so NULLs are cast to the column's type there.
    fn push_column(&mut self, column: &ColumnDef, param: QueryParam) -> String {
        let typed_null = self.db == DatabaseType::PostgreSQL && param.is_null();
        let placeholder = self.push(param);
        if typed_null {
            format!("CAST({} AS {})", placeholder, sql_type(self.db, column))
        } else {
            placeholder
        }
    }

    /// Generated fragments always precede the caller predicate in the text.
    fn finish(self, sql: String, caller: &[QueryParam]) -> Statement {
        let params = match self.db {
            DatabaseType::PostgreSQL => caller.iter().cloned().chain(self.generated).collect(),
            _ => self.generated.into_iter().chain(caller.iter().cloned()).collect(),
        };
        Statement { sql, params }
    }
}

fn where_clause(predicate: &str) -> String {
    let predicate = predicate.trim();
    if predicate.is_empty() {
        String::new()
    } else {
        format!(" WHERE ({})", predicate)
    }
}

fn limit_clause(db: DatabaseType, limit: Option<u64>, offset: u64) -> String {
    match (limit, offset) {
        (Some(l), 0) => format!(" LIMIT {}", l),
        (Some(l), o) => format!(" LIMIT {} OFFSET {}", l, o),
        (None, 0) => String::new(),
        // MySQL and SQLite need a LIMIT before OFFSET
        (None, o) => match db {
            DatabaseType::SQLite => format!(" LIMIT -1 OFFSET {}", o),
            DatabaseType::MySQL => format!(" LIMIT {} OFFSET {}", u64::MAX, o),
            DatabaseType::PostgreSQL => format!(" OFFSET {}", o),
        },
    }
}

/// INSERT of one row. Auto-increment columns bound to NULL are left to the
/// database; `returning_key` appends `RETURNING` on PostgreSQL.
pub fn insert(
    db: DatabaseType,
    table: &str,
    primary_key: &str,
    values: &[(&ColumnDef, QueryParam)],
    returning_key: bool,
) -> Statement {
    let mut binder = Binder::new(db, 0);
    let mut columns = Vec::new();
    let mut placeholders = Vec::new();
    for (col, value) in values {
        if col.auto_increment && value.is_null() {
            continue;
        }
        columns.push(quote_ident(db, col.name));
        placeholders.push(binder.push_column(col, value.clone()));
    }

    let table = quote_ident(db, table);
    let mut sql = if columns.is_empty() {
        match db {
            DatabaseType::MySQL => format!("INSERT INTO {} () VALUES ()", table),
            _ => format!("INSERT INTO {} DEFAULT VALUES", table),
        }
    } else {
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table,
            columns.join(", "),
            placeholders.join(", ")
        )
    };
    if returning_key && db == DatabaseType::PostgreSQL {
        sql.push_str(&format!(" RETURNING {}", quote_ident(db, primary_key)));
    }
    binder.finish(sql, &[])
}

/// INSERT that overwrites the existing row with the same primary key.
pub fn upsert(
    db: DatabaseType,
    table: &str,
    primary_key: &str,
    values: &[(&ColumnDef, QueryParam)],
) -> Statement {
    let mut binder = Binder::new(db, 0);
    let mut columns = Vec::new();
    let mut placeholders = Vec::new();
    for (col, value) in values {
        columns.push(quote_ident(db, col.name));
        placeholders.push(binder.push_column(col, value.clone()));
    }

    let updates: Vec<String> = values
        .iter()
        .filter(|(col, _)| col.name != primary_key)
        .map(|(col, _)| {
            let name = quote_ident(db, col.name);
            match db {
                DatabaseType::MySQL => format!("{} = VALUES({})", name, name),
                _ => format!("{} = excluded.{}", name, name),
            }
        })
        .collect();
    let pk = quote_ident(db, primary_key);
    let conflict = match (db, updates.is_empty()) {
        (DatabaseType::MySQL, true) => format!(" ON DUPLICATE KEY UPDATE {} = {}", pk, pk),
        (DatabaseType::MySQL, false) => format!(" ON DUPLICATE KEY UPDATE {}", updates.join(", ")),
        (_, true) => format!(" ON CONFLICT ({}) DO NOTHING", pk),
        (_, false) => format!(" ON CONFLICT ({}) DO UPDATE SET {}", pk, updates.join(", ")),
    };

    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({}){}",
        quote_ident(db, table),
        columns.join(", "),
        placeholders.join(", "),
        conflict
    );
    binder.finish(sql, &[])
}

/// UPDATE of the given columns on rows matching the caller predicate.
pub fn update(
    db: DatabaseType,
    table: &str,
    changes: &[(&ColumnDef, QueryParam)],
    predicate: &str,
    params: &[QueryParam],
) -> Statement {
    let mut binder = Binder::new(db, params.len());
    let sets: Vec<String> = changes
        .iter()
        .map(|(col, value)| {
            format!(
                "{} = {}",
                quote_ident(db, col.name),
                binder.push_column(col, value.clone())
            )
        })
        .collect();
    let sql = format!(
        "UPDATE {} SET {}{}",
        quote_ident(db, table),
        sets.join(", "),
        where_clause(predicate)
    );
    binder.finish(sql, params)
}

/// DELETE of rows matching the caller predicate.
pub fn delete(db: DatabaseType, table: &str, predicate: &str, params: &[QueryParam]) -> Statement {
    let sql = format!("DELETE FROM {}{}", quote_ident(db, table), where_clause(predicate));
    Statement::new(sql, params.to_vec())
}

/// DELETE of the single row identified by its primary key.
pub fn delete_by_key(db: DatabaseType, table: &str, primary_key: &str, key: QueryParam) -> Statement {
    let mut binder = Binder::new(db, 0);
    let sql = format!(
        "DELETE FROM {} WHERE {} = {}",
        quote_ident(db, table),
        quote_ident(db, primary_key),
        binder.push(key)
    );
    binder.finish(sql, &[])
}

/// SELECT with optional predicate, ordering and pagination.
#[allow(clippy::too_many_arguments)]
pub fn select(
    db: DatabaseType,
    table: &str,
    columns: &[ColumnDef],
    predicate: &str,
    order: &str,
    limit: Option<u64>,
    offset: u64,
    params: &[QueryParam],
) -> Statement {
    let columns: Vec<String> = columns.iter().map(|c| quote_ident(db, c.name)).collect();
    let order = order.trim();
    let order = if order.is_empty() {
        String::new()
    } else {
        format!(" ORDER BY {}", order)
    };
    let sql = format!(
        "SELECT {} FROM {}{}{}{}",
        columns.join(", "),
        quote_ident(db, table),
        where_clause(predicate),
        order,
        limit_clause(db, limit, offset)
    );
    Statement::new(sql, params.to_vec())
}

/// COUNT(*) of rows matching the caller predicate.
pub fn count(db: DatabaseType, table: &str, predicate: &str, params: &[QueryParam]) -> Statement {
    let sql = format!(
        "SELECT COUNT(*) AS total FROM {}{}",
        quote_ident(db, table),
        where_clause(predicate)
    );
    Statement::new(sql, params.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    const COLUMNS: &[ColumnDef] = &[
        ColumnDef::new("id", ColumnType::Integer)
            .primary_key()
            .auto_increment(),
        ColumnDef::new("content", ColumnType::Text),
    ];

    fn values(id: QueryParam) -> Vec<(&'static ColumnDef, QueryParam)> {
        vec![(&COLUMNS[0], id), (&COLUMNS[1], QueryParam::from("hi"))]
    }

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident(DatabaseType::MySQL, "a`b"), "`a``b`");
        assert_eq!(quote_ident(DatabaseType::PostgreSQL, "users"), "\"users\"");
    }

    #[test]
    fn test_insert_skips_null_auto_increment_key() {
        let stmt = insert(DatabaseType::SQLite, "notes", "id", &values(QueryParam::Null), true);
        assert_eq!(stmt.sql, "INSERT INTO \"notes\" (\"content\") VALUES (?)");
        assert_eq!(stmt.params, vec![QueryParam::from("hi")]);

        let stmt = insert(DatabaseType::PostgreSQL, "notes", "id", &values(QueryParam::Null), true);
        assert_eq!(
            stmt.sql,
            "INSERT INTO \"notes\" (\"content\") VALUES ($1) RETURNING \"id\""
        );
    }

    #[test]
    fn test_insert_with_no_columns() {
        let stmt = insert(DatabaseType::MySQL, "t", "id", &values(QueryParam::Null)[..1], false);
        assert_eq!(stmt.sql, "INSERT INTO `t` () VALUES ()");
        assert!(stmt.params.is_empty());
    }

    #[test]
    fn test_upsert_per_dialect() {
        let stmt = upsert(DatabaseType::SQLite, "notes", "id", &values(QueryParam::Int(4)));
        assert_eq!(
            stmt.sql,
            "INSERT INTO \"notes\" (\"id\", \"content\") VALUES (?, ?) \
             ON CONFLICT (\"id\") DO UPDATE SET \"content\" = excluded.\"content\""
        );
        assert_eq!(stmt.params.len(), 2);

        let stmt = upsert(DatabaseType::MySQL, "notes", "id", &values(QueryParam::Int(4)));
        assert!(stmt.sql.ends_with("ON DUPLICATE KEY UPDATE `content` = VALUES(`content`)"));
    }

    #[test]
    fn test_update_orders_params_by_dialect() {
        let changes = vec![(&COLUMNS[1], QueryParam::from("new"))];
        let caller = vec![QueryParam::Int(10)];

        let stmt = update(DatabaseType::SQLite, "notes", &changes, "id < ?", &caller);
        assert_eq!(stmt.sql, "UPDATE \"notes\" SET \"content\" = ? WHERE (id < ?)");
        assert_eq!(stmt.params, vec![QueryParam::from("new"), QueryParam::Int(10)]);

        let stmt = update(DatabaseType::PostgreSQL, "notes", &changes, "id < $1", &caller);
        assert_eq!(stmt.sql, "UPDATE \"notes\" SET \"content\" = $2 WHERE (id < $1)");
        assert_eq!(stmt.params, vec![QueryParam::Int(10), QueryParam::from("new")]);
    }

    #[test]
    fn test_postgres_null_is_typed() {
        let changes = vec![(&COLUMNS[1], QueryParam::Null)];
        let stmt = update(DatabaseType::PostgreSQL, "notes", &changes, "", &[]);
        assert_eq!(stmt.sql, "UPDATE \"notes\" SET \"content\" = CAST($1 AS TEXT)");

        let stmt = update(DatabaseType::SQLite, "notes", &changes, "", &[]);
        assert_eq!(stmt.sql, "UPDATE \"notes\" SET \"content\" = ?");
    }

    #[test]
    fn test_sql_type_per_dialect() {
        let key = ColumnDef::new("code", ColumnType::Text).primary_key();
        assert_eq!(sql_type(DatabaseType::MySQL, &key), "VARCHAR(255)");
        assert_eq!(sql_type(DatabaseType::SQLite, &key), "TEXT");
        assert_eq!(sql_type(DatabaseType::PostgreSQL, &COLUMNS[0]), "BIGINT");
    }

    #[test]
    fn test_select_pagination() {
        let stmt = select(DatabaseType::SQLite, "notes", COLUMNS, "", "", Some(10), 0, &[]);
        assert_eq!(stmt.sql, "SELECT \"id\", \"content\" FROM \"notes\" LIMIT 10");

        let stmt = select(DatabaseType::SQLite, "notes", COLUMNS, "id < ?", "id DESC", None, 2, &[QueryParam::Int(10)]);
        assert_eq!(
            stmt.sql,
            "SELECT \"id\", \"content\" FROM \"notes\" WHERE (id < ?) ORDER BY id DESC LIMIT -1 OFFSET 2"
        );

        let stmt = select(DatabaseType::PostgreSQL, "notes", COLUMNS, "", "", None, 3, &[]);
        assert!(stmt.sql.ends_with("FROM \"notes\" OFFSET 3"));

        let stmt = select(DatabaseType::MySQL, "notes", COLUMNS, "", "", None, 0, &[]);
        assert_eq!(stmt.sql, "SELECT `id`, `content` FROM `notes`");
    }

    #[test]
    fn test_delete_and_count() {
        let stmt = delete_by_key(DatabaseType::PostgreSQL, "notes", "id", QueryParam::Int(1));
        assert_eq!(stmt.sql, "DELETE FROM \"notes\" WHERE \"id\" = $1");

        let stmt = delete(DatabaseType::MySQL, "notes", "  ", &[]);
        assert_eq!(stmt.sql, "DELETE FROM `notes`");

        let stmt = count(DatabaseType::SQLite, "notes", "content = ?", &[QueryParam::from("a")]);
        assert_eq!(
            stmt.sql,
            "SELECT COUNT(*) AS total FROM \"notes\" WHERE (content = ?)"
        );
    }
}
