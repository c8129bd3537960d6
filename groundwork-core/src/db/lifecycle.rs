/// Client lifecycle management
///
/// Produces the two pool handles the system uses and enforces the cardinality
/// rules around them:
///
/// - the *query pool*, shared by application request handlers. In production
///   every call constructs a fresh pool (the caller is expected to call once
///   and hold the handle for the process lifetime). In development the pool
///   is cached in a slot so repeated in-process reinitialization reuses the
///   same pool instead of leaking one per reload.
/// - the *migration pool*, always freshly constructed with a single
///   connection and never cached. Migrations must not share a pool with
///   query traffic, and a single connection keeps migration statements from
///   interleaving.
///
/// The manager is an explicit value callers construct and pass around; there
/// is no ambient process-global behind it.

use crate::config::{AppConfig, DatabaseSettings, Environment};
use crate::db::pool::{create_pool, DbError};
use sqlx::PgPool;
use std::sync::Mutex;
use tracing::{debug, info};

/// A process-lifetime slot holding at most one handle
///
/// The check-then-set runs under a lock, so re-entrant initialization cannot
/// construct twice: the second caller observes the first caller's handle.
/// The slot holds a clone of what it hands out, which for pool handles means
/// every caller shares the same underlying pool.
#[derive(Debug, Default)]
pub struct HandleSlot<T> {
    inner: Mutex<Option<T>>,
}

impl<T: Clone> HandleSlot<T> {
    /// Creates an empty slot
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(None),
        }
    }

    /// Returns the stored handle, constructing and storing it on first use
    ///
    /// `make` runs at most once for the lifetime of the slot; if it fails the
    /// slot stays empty and the next call retries.
    pub fn get_or_create<E>(&self, make: impl FnOnce() -> Result<T, E>) -> Result<T, E> {
        let mut slot = self.inner.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(existing) = slot.as_ref() {
            return Ok(existing.clone());
        }

        let created = make()?;
        *slot = Some(created.clone());
        Ok(created)
    }

    /// Whether a handle has been stored
    pub fn is_set(&self) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }
}

/// Mode-aware constructor for the process's database pools
///
/// # Example
///
/// ```no_run
/// use groundwork_core::config::AppConfig;
/// use groundwork_core::db::lifecycle::ClientManager;
///
/// # fn example() -> anyhow::Result<()> {
/// let config = AppConfig::from_env()?;
/// let manager = ClientManager::from_config(&config);
///
/// // In development, both calls share one pool.
/// let first = manager.query_pool()?;
/// let second = manager.query_pool()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ClientManager {
    environment: Environment,
    settings: DatabaseSettings,
    cached: HandleSlot<PgPool>,
}

impl ClientManager {
    /// Creates a manager for the given mode and settings
    pub fn new(environment: Environment, settings: DatabaseSettings) -> Self {
        Self {
            environment,
            settings,
            cached: HandleSlot::new(),
        }
    }

    /// Creates a manager from a loaded configuration
    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.environment, config.database.clone())
    }

    /// The execution mode this manager was built for
    pub fn environment(&self) -> Environment {
        self.environment
    }

    /// Returns the query pool
    ///
    /// Production constructs a fresh pool on every call. Development caches
    /// the first pool and returns it unchanged on subsequent calls.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] when the underlying pool cannot be constructed.
    pub fn query_pool(&self) -> Result<PgPool, DbError> {
        match self.environment {
            Environment::Production => create_pool(&self.settings),
            Environment::Development => self.cached.get_or_create(|| {
                info!("Caching development query pool for reuse across reinitialization");
                create_pool(&self.settings)
            }),
        }
    }

    /// Returns a fresh single-connection pool for migration use
    ///
    /// Never cached and never shared with the query pool.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] when the underlying pool cannot be constructed.
    pub fn migration_pool(&self) -> Result<PgPool, DbError> {
        debug!("Creating dedicated single-connection migration pool");

        let settings = DatabaseSettings {
            max_connections: 1,
            ..self.settings.clone()
        };
        create_pool(&settings)
    }

    /// Whether the development slot currently holds a pool
    pub fn has_cached_pool(&self) -> bool {
        self.cached.is_set()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_slot_returns_identical_handle() {
        let slot: HandleSlot<Arc<u32>> = HandleSlot::new();

        let first = slot
            .get_or_create(|| Ok::<_, std::convert::Infallible>(Arc::new(7)))
            .unwrap();
        let second = slot
            .get_or_create(|| Ok::<_, std::convert::Infallible>(Arc::new(8)))
            .unwrap();

        // Reference equality: the second call must not have constructed.
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(*second, 7);
    }

    #[test]
    fn test_slot_constructs_at_most_once() {
        let slot: HandleSlot<Arc<()>> = HandleSlot::new();
        let mut constructions = 0;

        for _ in 0..3 {
            slot.get_or_create(|| {
                constructions += 1;
                Ok::<_, std::convert::Infallible>(Arc::new(()))
            })
            .unwrap();
        }

        assert_eq!(constructions, 1);
    }

    #[test]
    fn test_slot_stays_empty_on_failure() {
        let slot: HandleSlot<Arc<()>> = HandleSlot::new();

        let result: Result<Arc<()>, &str> = slot.get_or_create(|| Err("boom"));
        assert!(result.is_err());
        assert!(!slot.is_set());

        // A later successful call still populates the slot.
        slot.get_or_create(|| Ok::<_, &str>(Arc::new(()))).unwrap();
        assert!(slot.is_set());
    }
}
