//! Error types for the data-access layer.
//!
//! `DbError` is the low-level taxonomy produced by the registry, the
//! connection factory and the drivers. `OperationError` is the envelope every
//! repository operation returns: it tags the failure with the operation name,
//! the logical database key and a fixed error code, and carries the
//! correlation identifier under which the failure was reported.

use std::error::Error as StdError;
use thiserror::Error;

/// Fixed numeric code identifying database errors.
pub const DB_ERROR_CODE: i32 = 121;

/// Boxed error returned by caller-supplied callbacks.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("No connection registered under key '{key}'")]
    UnknownConnection { key: String },

    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("Database error: {message}")]
    Database {
        message: String,
        /// e.g., "42P01" for undefined table
        sql_state: Option<String>,
        suggestion: String,
    },

    #[error("Record not found: {target}")]
    NotFound { target: String },

    #[error("Callback failed: {0}")]
    Callback(BoxError),

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DbError {
    /// Create an unknown connection error.
    pub fn unknown_connection(key: impl Into<String>) -> Self {
        Self::UnknownConnection { key: key.into() }
    }

    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a database error with optional SQL state.
    pub fn database(
        message: impl Into<String>,
        sql_state: Option<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Database {
            message: message.into(),
            sql_state,
            suggestion: suggestion.into(),
        }
    }

    pub fn not_found(target: impl Into<String>) -> Self {
        Self::NotFound {
            target: target.into(),
        }
    }

    /// Wrap an error returned by a row or transaction callback.
    ///
    /// A `DbError` raised inside the callback is passed through unchanged so
    /// `?` on repository primitives keeps its original classification.
    pub fn callback(err: BoxError) -> Self {
        match err.downcast::<DbError>() {
            Ok(db_err) => *db_err,
            Err(other) => Self::Callback(other),
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::Database { suggestion, .. } => Some(suggestion),
            Self::UnknownConnection { .. } => {
                Some("Register the connection with set_connection before using it")
            }
            _ => None,
        }
    }

    /// True for the zero-row outcome of a single-row fetch.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Convert sqlx errors to DbError.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => DbError::connection(
                msg.to_string(),
                "Check the connection string format and credentials",
            ),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                DbError::database(
                    db_err.message(),
                    code,
                    "Check the SQL syntax and referenced objects",
                )
            }
            sqlx::Error::RowNotFound => DbError::not_found("no rows returned"),
            sqlx::Error::PoolTimedOut => DbError::connection(
                "Timed out acquiring a connection from the driver pool",
                "Raise max_open_connections or reduce concurrent load",
            ),
            sqlx::Error::PoolClosed => {
                DbError::connection("Connection handle is closed", "Open a new handle")
            }
            sqlx::Error::Io(io_err) => DbError::connection(
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => DbError::connection(
                format!("TLS error: {}", tls_err),
                "Verify TLS configuration and certificates",
            ),
            sqlx::Error::Protocol(msg) => DbError::connection(
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
            sqlx::Error::TypeNotFound { type_name } => DbError::database(
                format!("Type not found: {}", type_name),
                None,
                "Check the column types declared by the entity",
            ),
            sqlx::Error::ColumnNotFound(col) => DbError::database(
                format!("Column not found: {}", col),
                None,
                "Run auto_migrate or check the entity's column list",
            ),
            sqlx::Error::ColumnIndexOutOfBounds { index, len } => DbError::internal(format!(
                "Column index {} out of bounds (len: {})",
                index, len
            )),
            sqlx::Error::ColumnDecode { index, source } => {
                DbError::internal(format!("Failed to decode column {}: {}", index, source))
            }
            sqlx::Error::Decode(source) => DbError::internal(format!("Decode error: {}", source)),
            sqlx::Error::WorkerCrashed => DbError::internal("Database worker crashed"),
            _ => DbError::internal(format!("Unknown database error: {}", err)),
        }
    }
}

impl From<serde_json::Error> for DbError {
    fn from(err: serde_json::Error) -> Self {
        DbError::invalid_input(format!("Entity mapping failed: {}", err))
    }
}

/// Result type alias for low-level database calls.
pub type DbResult<T> = Result<T, DbError>;

/// Error envelope returned by every repository operation.
#[derive(Error, Debug)]
#[error("{operation} failed on '{database_key}' [{target}] (code {code}): {source}")]
pub struct OperationError {
    pub operation: &'static str,
    pub database_key: String,
    /// Type name of the entity or "raw" for SQL passthrough calls.
    pub target: String,
    /// Diagnostic context such as the predicate or SQL text.
    pub message: String,
    pub code: i32,
    /// Set when the failure was forwarded to error subscribers.
    pub correlation_id: Option<String>,
    #[source]
    pub source: DbError,
}

impl OperationError {
    pub fn new(
        operation: &'static str,
        database_key: impl Into<String>,
        target: impl Into<String>,
        message: impl Into<String>,
        source: DbError,
    ) -> Self {
        Self {
            operation,
            database_key: database_key.into(),
            target: target.into(),
            message: message.into(),
            code: DB_ERROR_CODE,
            correlation_id: None,
            source,
        }
    }

    /// True when the operation matched zero rows where one was expected.
    pub fn is_not_found(&self) -> bool {
        self.source.is_not_found()
    }

    /// True when the key was never registered.
    pub fn is_unknown_connection(&self) -> bool {
        matches!(self.source, DbError::UnknownConnection { .. })
    }

    pub fn cause(&self) -> &DbError {
        &self.source
    }
}

/// Result type alias for repository operations.
pub type OpResult<T> = Result<T, OperationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Error)]
    #[error("quota exceeded")]
    struct QuotaError;

    #[test]
    fn test_error_display() {
        let err = DbError::connection("Failed to connect", "Check credentials");
        assert!(err.to_string().contains("Connection failed"));
    }

    #[test]
    fn test_error_suggestion() {
        let err = DbError::database(
            "Syntax error",
            Some("42601".to_string()),
            "Check SQL syntax",
        );
        assert_eq!(err.suggestion(), Some("Check SQL syntax"));
        assert!(DbError::internal("x").suggestion().is_none());
    }

    #[test]
    fn test_row_not_found_maps_to_not_found() {
        let err: DbError = sqlx::Error::RowNotFound.into();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_pool_closed_maps_to_connection() {
        let err: DbError = sqlx::Error::PoolClosed.into();
        assert!(matches!(err, DbError::Connection { .. }));
    }

    #[test]
    fn test_callback_keeps_db_error_classification() {
        let boxed: BoxError = Box::new(DbError::not_found("users"));
        assert!(DbError::callback(boxed).is_not_found());

        let boxed: BoxError = Box::new(QuotaError);
        let err = DbError::callback(boxed);
        assert!(matches!(err, DbError::Callback(_)));
        assert_eq!(err.to_string(), "Callback failed: quota exceeded");
    }

    #[test]
    fn test_operation_error_envelope() {
        let err = OperationError::new(
            "DB.First",
            "main",
            "Address",
            "WHERE id < 1",
            DbError::not_found("Address"),
        );
        assert_eq!(err.code, DB_ERROR_CODE);
        assert!(err.is_not_found());
        assert!(!err.is_unknown_connection());
        assert!(err.to_string().contains("DB.First"));
        assert!(err.to_string().contains("'main'"));
        assert!(StdError::source(&err).is_some());
    }

    #[test]
    fn test_unknown_connection_predicate() {
        let err = OperationError::new(
            "DB.Create",
            "nope",
            "Address",
            "",
            DbError::unknown_connection("nope"),
        );
        assert!(err.is_unknown_connection());
        assert!(!err.is_not_found());
    }
}
