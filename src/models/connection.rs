//! Connection-related data models.
//!
//! This module defines the driver type and the per-key connection
//! parameters stored in the registry.

use serde::{Deserialize, Serialize};

/// Default row cap applied by `find` when the caller passes `limit == 0`.
pub const DEFAULT_FIND_LIMIT: u32 = 1000;

/// Pool size used for a handle whose spec leaves `max_open_connections` at 0.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;

/// Supported database types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    PostgreSQL,
    /// Includes MariaDB
    MySQL,
    SQLite,
}

impl DatabaseType {
    /// Parse database type from a connection string.
    pub fn from_connection_string(connection_string: &str) -> Option<Self> {
        let lower = connection_string.to_lowercase();
        if lower.starts_with("postgres://") || lower.starts_with("postgresql://") {
            Some(Self::PostgreSQL)
        } else if lower.starts_with("mysql://") || lower.starts_with("mariadb://") {
            Some(Self::MySQL)
        } else if lower.starts_with("sqlite://") || lower.starts_with("sqlite:") {
            Some(Self::SQLite)
        } else {
            None
        }
    }

    /// Parse database type from a driver name such as `"sqlite3"` or `"postgres"`.
    pub fn from_driver_name(driver: &str) -> Option<Self> {
        match driver.trim().to_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Some(Self::PostgreSQL),
            "mysql" | "mariadb" => Some(Self::MySQL),
            "sqlite" | "sqlite3" => Some(Self::SQLite),
            _ => None,
        }
    }

    /// Get the display name for this database type.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::PostgreSQL => "PostgreSQL",
            Self::MySQL => "MySQL",
            Self::SQLite => "SQLite",
        }
    }

    /// Canonical driver name, the inverse of `from_driver_name`.
    pub fn driver_name(&self) -> &'static str {
        match self {
            Self::PostgreSQL => "postgres",
            Self::MySQL => "mysql",
            Self::SQLite => "sqlite",
        }
    }
}

impl std::fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Connection parameters registered under a logical database key.
///
/// Nothing here is validated at registration time; an unknown driver or a
/// malformed connection string surfaces as a connection failure on first use.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionSpec {
    pub driver_type: String,
    /// Contains sensitive data - never log
    #[serde(skip_serializing)]
    pub connection_string: String,
    /// 0 leaves the driver's pool at its default size.
    #[serde(default)]
    pub max_open_connections: u32,
    /// Upper bound on idle connections. Handles live for one operation and
    /// keep no connections warm, so this never raises the pool's floor.
    #[serde(default)]
    pub max_idle_connections: u32,
    /// Row cap for `find` with `limit == 0`. Default: 1000
    #[serde(default)]
    pub default_limit: Option<u32>,
}

impl ConnectionSpec {
    pub fn new(driver_type: impl Into<String>, connection_string: impl Into<String>) -> Self {
        Self {
            driver_type: driver_type.into(),
            connection_string: connection_string.into(),
            ..Self::default()
        }
    }

    pub fn with_max_open_connections(mut self, max_open: u32) -> Self {
        self.max_open_connections = max_open;
        self
    }

    pub fn with_max_idle_connections(mut self, max_idle: u32) -> Self {
        self.max_idle_connections = max_idle;
        self
    }

    pub fn with_default_limit(mut self, limit: u32) -> Self {
        self.default_limit = Some(limit);
        self
    }

    /// Capacity of the admission gate guarding this connection: never below 1.
    pub fn admission_capacity(&self) -> usize {
        self.max_open_connections.max(1) as usize
    }

    pub fn default_limit_or_default(&self) -> u32 {
        self.default_limit.unwrap_or(DEFAULT_FIND_LIMIT)
    }

    /// Pool size for a freshly opened handle.
    pub fn handle_max_connections(&self) -> u32 {
        if self.max_open_connections > 0 {
            self.max_open_connections
        } else {
            DEFAULT_MAX_CONNECTIONS
        }
    }

    pub fn database_type(&self) -> Option<DatabaseType> {
        DatabaseType::from_driver_name(&self.driver_type)
    }

    /// Get a display-safe version of the connection string (credentials masked).
    pub fn masked_connection_string(&self) -> String {
        if let Some(at_pos) = self.connection_string.find('@') {
            if let Some(colon_pos) = self.connection_string[..at_pos].rfind(':') {
                let prefix = &self.connection_string[..colon_pos + 1];
                let suffix = &self.connection_string[at_pos..];
                return format!("{}****{}", prefix, suffix);
            }
        }
        self.connection_string.clone()
    }
}
