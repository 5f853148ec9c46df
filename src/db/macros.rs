//! Database dispatch macros for reducing code duplication.
//!
//! Handles and transactions are per-driver enums. These macros expand to the
//! match over their variants so call sites read as one arm per driver.

/// Match over `DbPool` variants.
///
/// # Example
///
/// ```ignore
/// impl_db_dispatch!(&pool, {
///     MySql(p) => executor::mysql::execute(p, sql, params).await,
///     Postgres(p) => executor::postgres::execute(p, sql, params).await,
///     SQLite(p) => executor::sqlite::execute(p, sql, params).await,
/// });
/// ```
#[macro_export]
macro_rules! impl_db_dispatch {
    ($pool:expr, { $($variant:ident($p:ident) => $body:expr),+ $(,)? }) => {
        match $pool {
            $(
                $crate::db::pool::DbPool::$variant($p) => $body,
            )+
        }
    };
}

/// Match over `DbTransaction` variants.
#[macro_export]
macro_rules! impl_tx_dispatch {
    ($tx:expr, { $($variant:ident($t:ident) => $body:expr),+ $(,)? }) => {
        match $tx {
            $(
                $crate::db::session::DbTransaction::$variant($t) => $body,
            )+
        }
    };
}

pub use impl_db_dispatch;
pub use impl_tx_dispatch;
