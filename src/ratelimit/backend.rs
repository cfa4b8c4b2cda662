//! Log backends for abstracting in-process and shared invocation logs.

use parking_lot::Mutex;
use tracing::{debug, warn};

use super::log::InvocationLog;
use crate::error::{LimiterError, Result};
use crate::store::SharedLog;

/// Default identifier of the shared log document.
pub const DEFAULT_DATABASE_NAME: &str = "call-limiter";

/// Storage for a limiter's invocation log.
///
/// `transact` runs `f` with exclusive access to the current log, so an evaluation
/// and the recording that follows it cannot interleave with another call made
/// through the same backend.
pub trait LogBackend: Send + Sync {
    /// Run `f` against the log, persisting any change it makes.
    fn transact<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut InvocationLog) -> R;
}

/// A log held in process memory.
#[derive(Debug, Default)]
pub struct LocalBackend {
    log: Mutex<InvocationLog>,
}

impl LocalBackend {
    /// Create a backend with an empty log.
    pub fn new() -> Self {
        Self::default()
    }
}

impl LogBackend for LocalBackend {
    fn transact<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut InvocationLog) -> R,
    {
        let mut log = self.log.lock();
        let result = f(&mut *log);
        log.mark_clean();
        Ok(result)
    }
}

/// A log kept as one JSON document in a [`SharedLog`] store.
///
/// Every transaction reads the whole document, and writes it back if the log
/// changed. The process-local guard serializes transactions from this process
/// only; callers in other processes sharing the store are not excluded.
pub struct SharedBackend<S> {
    store: S,
    database: String,
    guard: Mutex<()>,
}

impl<S: SharedLog> SharedBackend<S> {
    /// Attach to `database` in `store`.
    ///
    /// A missing document is created empty. A document that cannot be parsed is
    /// replaced with an empty one here, and only here.
    pub fn new(store: S, database: impl Into<String>) -> Result<Self> {
        let database = database.into();

        if !store.exists(&database)? {
            debug!(database = %database, "Creating shared invocation log");
            store.set(&database, "{}")?;
        } else if let Some(document) = store.get(&database)? {
            if let Err(e) = InvocationLog::from_json(&document) {
                warn!(database = %database, error = %e, "Replacing unreadable shared invocation log");
                store.set(&database, "{}")?;
            }
        }

        Ok(Self {
            store,
            database,
            guard: Mutex::new(()),
        })
    }

    /// Identifier of the document holding the log.
    pub fn database(&self) -> &str {
        &self.database
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    fn load(&self) -> Result<InvocationLog> {
        match self.store.get(&self.database)? {
            Some(document) => {
                InvocationLog::from_json(&document).map_err(|source| LimiterError::CorruptLog {
                    database: self.database.clone(),
                    source,
                })
            }
            // evicted by the store since construction
            None => Ok(InvocationLog::new()),
        }
    }

    fn flush(&self, log: &InvocationLog) -> Result<()> {
        let document = log.to_json().map_err(|source| LimiterError::CorruptLog {
            database: self.database.clone(),
            source,
        })?;
        self.store.set(&self.database, &document)
    }
}

impl<S: SharedLog> LogBackend for SharedBackend<S> {
    fn transact<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut InvocationLog) -> R,
    {
        let _guard = self.guard.lock();

        let mut log = self.load()?;
        let result = f(&mut log);
        if log.is_dirty() {
            self.flush(&log)?;
        }
        Ok(result)
    }
}

impl<S> std::fmt::Debug for SharedBackend<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedBackend")
            .field("database", &self.database)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemorySharedLog;

    #[test]
    fn test_local_transactions_see_previous_writes() {
        let backend = LocalBackend::new();

        backend.transact(|log| log.record("k", 1.0)).unwrap();
        let len = backend
            .transact(|log| log.get("k").map(<[f64]>::len))
            .unwrap();

        assert_eq!(len, Some(1));
    }

    #[test]
    fn test_shared_backend_creates_document() {
        let store = MemorySharedLog::new();
        let backend = SharedBackend::new(store.clone(), DEFAULT_DATABASE_NAME).unwrap();

        assert_eq!(backend.database(), "call-limiter");
        assert_eq!(store.get("call-limiter").unwrap().as_deref(), Some("{}"));
    }

    #[test]
    fn test_shared_backend_keeps_existing_document() {
        let store = MemorySharedLog::new();
        store.set("db", r#"{"k":[5.0]}"#).unwrap();

        let backend = SharedBackend::new(store, "db").unwrap();
        let ticks = backend
            .transact(|log| log.get("k").map(<[f64]>::to_vec))
            .unwrap();

        assert_eq!(ticks, Some(vec![5.0]));
    }

    #[test]
    fn test_shared_backend_replaces_malformed_document_at_construction() {
        let store = MemorySharedLog::new();
        store.set("db", "not json").unwrap();

        SharedBackend::new(store.clone(), "db").unwrap();

        assert_eq!(store.get("db").unwrap().as_deref(), Some("{}"));
    }

    #[test]
    fn test_shared_backend_does_not_repair_later_corruption() {
        let store = MemorySharedLog::new();
        let backend = SharedBackend::new(store.clone(), "db").unwrap();

        store.set("db", "[1, 2").unwrap();
        let result = backend.transact(|log| log.record("k", 1.0));

        assert!(matches!(result, Err(LimiterError::CorruptLog { .. })));
        assert_eq!(store.get("db").unwrap().as_deref(), Some("[1, 2"));
    }

    #[test]
    fn test_shared_backend_flushes_only_changes() {
        let store = MemorySharedLog::new();
        let backend = SharedBackend::new(store.clone(), "db").unwrap();

        // left as written when nothing changes
        store.set("db", r#"{ "k" : [] }"#).unwrap();
        backend.transact(|log| log.contains_key("k")).unwrap();
        assert_eq!(store.get("db").unwrap().as_deref(), Some(r#"{ "k" : [] }"#));

        backend.transact(|log| log.record("k", 2.0)).unwrap();
        assert_eq!(store.get("db").unwrap().as_deref(), Some(r#"{"k":[2.0]}"#));
    }

    #[test]
    fn test_shared_backend_treats_evicted_document_as_empty() {
        let store = MemorySharedLog::new();
        let backend = SharedBackend::new(store.clone(), "db").unwrap();
        backend.transact(|log| log.record("k", 1.0)).unwrap();

        store.evict("db");
        let len = backend.transact(|log| log.len()).unwrap();

        assert_eq!(len, 0);
    }
}
