//! Bounded pool of viewer connections

use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Caps the number of viewer connections served at once
///
/// Event streams hold their slot for as long as the viewer stays
/// connected.
#[derive(Clone)]
pub struct ConnectionPool {
    semaphore: Arc<Semaphore>,
    max_connections: usize,
}

impl ConnectionPool {
    /// Create a new connection pool
    ///
    /// # Panics
    ///
    /// Panics if `max_connections` is 0
    #[must_use]
    pub fn new(max_connections: usize) -> Self {
        assert!(max_connections > 0, "max_connections must be > 0");

        Self {
            semaphore: Arc::new(Semaphore::new(max_connections)),
            max_connections,
        }
    }

    /// Take a slot for a new connection, or `None` when the pool is full
    pub fn try_acquire(&self) -> Option<ConnectionGuard> {
        Arc::clone(&self.semaphore)
            .try_acquire_owned()
            .ok()
            .map(|permit| ConnectionGuard { _permit: permit })
    }

    /// Number of connections currently holding a slot
    #[must_use]
    pub fn active_connections(&self) -> usize {
        self.max_connections - self.semaphore.available_permits()
    }
}

/// Slot held by one connection; released on drop
pub struct ConnectionGuard {
    _permit: OwnedSemaphorePermit,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_limits_connections() {
        let pool = ConnectionPool::new(2);

        let first = pool.try_acquire();
        let second = pool.try_acquire();
        assert!(first.is_some());
        assert!(second.is_some());
        assert_eq!(pool.active_connections(), 2);

        assert!(pool.try_acquire().is_none());
    }

    #[test]
    fn test_pool_release_on_drop() {
        let pool = ConnectionPool::new(1);

        {
            let _guard = pool.try_acquire().unwrap();
            assert_eq!(pool.active_connections(), 1);
        }

        assert_eq!(pool.active_connections(), 0);
        assert!(pool.try_acquire().is_some());
    }

    #[test]
    #[should_panic(expected = "max_connections must be > 0")]
    fn test_pool_zero_panic() {
        let _ = ConnectionPool::new(0);
    }
}
