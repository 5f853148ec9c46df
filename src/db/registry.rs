//! Named connection specifications.

use crate::error::{DbError, DbResult};
use crate::models::ConnectionSpec;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use tracing::info;

/// Map from logical database key to its connection parameters.
///
/// Registration replaces any earlier spec under the same key. Readers get a
/// clone, so a concurrent re-registration never tears a spec in flight.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    specs: RwLock<HashMap<String, ConnectionSpec>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, key: impl Into<String>, spec: ConnectionSpec) {
        let key = key.into();
        info!(
            database_key = %key,
            driver = %spec.driver_type,
            connection = %spec.masked_connection_string(),
            max_open = spec.max_open_connections,
            max_idle = spec.max_idle_connections,
            "Registered connection"
        );
        self.specs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, spec);
    }

    /// Look up the spec for `key`.
    pub fn resolve(&self, key: &str) -> DbResult<ConnectionSpec> {
        self.specs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
            .ok_or_else(|| DbError::unknown_connection(key))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.specs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    /// Registered keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .specs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        keys.sort();
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_unknown_key() {
        let registry = ConnectionRegistry::new();
        let err = registry.resolve("missing").unwrap_err();
        assert!(matches!(err, DbError::UnknownConnection { ref key } if key == "missing"));
        assert!(!registry.contains("missing"));
    }

    #[test]
    fn test_register_replaces_spec() {
        let registry = ConnectionRegistry::new();
        registry.register("main", ConnectionSpec::new("sqlite", "sqlite:a.db"));
        registry.register(
            "main",
            ConnectionSpec::new("sqlite", "sqlite:b.db").with_max_open_connections(4),
        );
        let spec = registry.resolve("main").unwrap();
        assert_eq!(spec.connection_string, "sqlite:b.db");
        assert_eq!(spec.max_open_connections, 4);
        assert_eq!(registry.keys(), vec!["main".to_string()]);
    }

    #[test]
    fn test_keys_sorted() {
        let registry = ConnectionRegistry::new();
        registry.register("zeta", ConnectionSpec::new("sqlite", "sqlite:z.db"));
        registry.register("alpha", ConnectionSpec::new("mysql", "mysql://u:p@h/db"));
        assert_eq!(registry.keys(), vec!["alpha", "zeta"]);
    }
}
