//! Error reporting.
//!
//! Failed repository operations are forwarded to every registered subscriber
//! together with a correlation identifier, so an application can log or
//! alert on them in one place while the caller still receives the error.

use std::error::Error as StdError;
use std::sync::{Arc, PoisonError, RwLock};
use uuid::Uuid;

/// Callback invoked with `(correlation_id, error)` for each reported failure.
pub type Subscriber = Arc<dyn Fn(&str, &(dyn StdError + 'static)) + Send + Sync>;

/// Fan-out point for operation failures.
#[derive(Default)]
pub struct ErrorHub {
    subscribers: RwLock<Vec<Subscriber>>,
}

impl std::fmt::Debug for ErrorHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorHub")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl ErrorHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber. Subscribers are never removed.
    pub fn subscribe<F>(&self, subscriber: F)
    where
        F: Fn(&str, &(dyn StdError + 'static)) + Send + Sync + 'static,
    {
        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(subscriber));
    }

    /// Deliver `error` to every subscriber in registration order.
    ///
    /// Subscribers run on the caller's task, outside the registry lock, so
    /// one may subscribe further callbacks; those see later reports only.
    pub fn report(&self, correlation_id: &str, error: &(dyn StdError + 'static)) {
        let subscribers: Vec<Subscriber> = self
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for subscriber in &subscribers {
            subscriber(correlation_id, error);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Fresh random correlation identifier (UUID v4, hyphenated).
pub fn new_correlation_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;

    #[derive(Debug)]
    struct Boom;

    impl std::fmt::Display for Boom {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str("boom")
        }
    }

    impl StdError for Boom {}

    #[test]
    fn test_report_reaches_subscribers_in_order() {
        let hub = ErrorHub::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for name in ["first", "second"] {
            let seen = Arc::clone(&seen);
            hub.subscribe(move |id, err| {
                seen.lock().unwrap().push(format!("{}:{}:{}", name, id, err));
            });
        }

        hub.report("abc", &Boom);
        assert_eq!(
            *seen.lock().unwrap(),
            vec!["first:abc:boom".to_string(), "second:abc:boom".to_string()]
        );
        assert_eq!(hub.subscriber_count(), 2);
    }

    #[test]
    fn test_report_without_subscribers_is_noop() {
        ErrorHub::new().report("id", &Boom);
    }

    #[test]
    fn test_subscriber_may_subscribe_during_report() {
        let hub = Arc::new(ErrorHub::new());
        let inner = Arc::clone(&hub);
        hub.subscribe(move |_, _| inner.subscribe(|_, _| {}));
        hub.report("id", &Boom);
        assert_eq!(hub.subscriber_count(), 2);
    }

    #[test]
    fn test_correlation_ids_are_unique() {
        let ids: HashSet<String> = (0..1000).map(|_| new_correlation_id()).collect();
        assert_eq!(ids.len(), 1000);
        let id = new_correlation_id();
        assert_eq!(id.len(), 36);
        assert!(Uuid::parse_str(&id).is_ok());
    }
}
