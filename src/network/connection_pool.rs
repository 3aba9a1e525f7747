//! Bounded connection admission for the stub listener

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Admits at most `max_connections` concurrent connections
#[derive(Clone)]
pub struct ConnectionPool {
    semaphore: Arc<Semaphore>,
    active_count: Arc<AtomicUsize>,
    max_connections: usize,
}

impl ConnectionPool {
    /// Create a new connection pool
    ///
    /// # Panics
    ///
    /// Panics if `max_connections` is 0 or exceeds the semaphore limit
    #[must_use]
    pub fn new(max_connections: usize) -> Self {
        assert!(max_connections > 0, "max_connections must be > 0");
        assert!(
            u32::try_from(max_connections).is_ok(),
            "max_connections must fit in u32"
        );

        Self {
            semaphore: Arc::new(Semaphore::new(max_connections)),
            active_count: Arc::new(AtomicUsize::new(0)),
            max_connections,
        }
    }

    /// Admit a connection, or `None` when the pool is full
    pub fn try_acquire(&self) -> Option<ConnectionGuard> {
        let permit = Arc::clone(&self.semaphore).try_acquire_owned().ok()?;
        self.active_count.fetch_add(1, Ordering::Relaxed);

        Some(ConnectionGuard {
            _permit: permit,
            active_count: Arc::clone(&self.active_count),
        })
    }

    /// Wait until every admitted connection has finished
    ///
    /// Returns `false` if connections were still open after `timeout`.
    pub async fn drain(&self, timeout: Duration) -> bool {
        // Holding every permit means no connection is in flight
        let all = u32::try_from(self.max_connections).unwrap_or(u32::MAX);
        match tokio::time::timeout(timeout, self.semaphore.acquire_many(all)).await {
            Ok(Ok(permits)) => {
                drop(permits);
                true
            }
            _ => false,
        }
    }

    /// Get the current number of active connections
    #[must_use]
    pub fn active_connections(&self) -> usize {
        self.active_count.load(Ordering::Relaxed)
    }
}

/// Guard that releases a connection slot when dropped
pub struct ConnectionGuard {
    _permit: OwnedSemaphorePermit,
    active_count: Arc<AtomicUsize>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.active_count.fetch_sub(1, Ordering::Relaxed);
    }
}
