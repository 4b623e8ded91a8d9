//! Memory accounting for aggregation state

use crate::error::{QueryError, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Memory pool for tracking bytes held by live aggregation state
#[derive(Debug)]
pub struct MemoryPool {
    /// Maximum memory allowed
    max_memory: usize,
    /// Current memory usage
    used: AtomicUsize,
}

impl MemoryPool {
    pub fn new(max_memory: usize) -> Self {
        Self {
            max_memory,
            used: AtomicUsize::new(0),
        }
    }

    /// Create a pool with no limit
    pub fn unbounded() -> Self {
        Self::new(usize::MAX)
    }

    /// Current memory usage
    pub fn used(&self) -> usize {
        self.used.load(Ordering::Relaxed)
    }

    /// Maximum memory
    pub fn max(&self) -> usize {
        self.max_memory
    }

    /// Available memory
    pub fn available(&self) -> usize {
        self.max_memory.saturating_sub(self.used())
    }

    fn try_acquire(&self, size: usize) -> bool {
        let mut current = self.used.load(Ordering::Relaxed);
        loop {
            let new_usage = match current.checked_add(size) {
                Some(n) if n <= self.max_memory => n,
                _ => return false,
            };

            match self.used.compare_exchange_weak(
                current,
                new_usage,
                Ordering::SeqCst,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    fn release(&self, size: usize) {
        self.used.fetch_sub(size, Ordering::SeqCst);
    }
}

/// Shared memory pool
pub type SharedMemoryPool = Arc<MemoryPool>;

/// Create a shared memory pool
pub fn create_memory_pool(max_memory: usize) -> SharedMemoryPool {
    Arc::new(MemoryPool::new(max_memory))
}

/// Growable reservation against a shared pool, released on drop
#[derive(Debug)]
pub struct MemoryReservation {
    pool: SharedMemoryPool,
    size: usize,
}

impl MemoryReservation {
    pub fn new(pool: SharedMemoryPool) -> Self {
        Self { pool, size: 0 }
    }

    /// Size of this reservation
    pub fn size(&self) -> usize {
        self.size
    }

    /// Grow the reservation, failing if the pool limit would be exceeded
    pub fn try_grow(&mut self, bytes: usize) -> Result<()> {
        if bytes == 0 {
            return Ok(());
        }
        if !self.pool.try_acquire(bytes) {
            return Err(QueryError::ResourcesExhausted(format!(
                "aggregation memory budget of {} bytes exceeded ({} in use, {} requested)",
                self.pool.max(),
                self.pool.used(),
                bytes
            )));
        }
        self.size += bytes;
        Ok(())
    }

    /// Shrink the reservation by up to `bytes`
    pub fn shrink(&mut self, bytes: usize) {
        let bytes = bytes.min(self.size);
        self.pool.release(bytes);
        self.size -= bytes;
    }

    /// Release everything held by this reservation
    pub fn free(&mut self) {
        self.shrink(self.size);
    }
}

impl Drop for MemoryReservation {
    fn drop(&mut self) {
        self.free();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reservation_limits() {
        let pool = create_memory_pool(1000);
        let mut r1 = MemoryReservation::new(pool.clone());
        let mut r2 = MemoryReservation::new(pool.clone());

        r1.try_grow(500).unwrap();
        assert_eq!(pool.used(), 500);
        assert_eq!(pool.available(), 500);

        r2.try_grow(400).unwrap();
        assert_eq!(pool.used(), 900);

        let err = r2.try_grow(200).unwrap_err();
        assert!(matches!(err, QueryError::ResourcesExhausted(_)));
        assert_eq!(r2.size(), 400);

        drop(r1);
        assert_eq!(pool.used(), 400);

        r2.shrink(150);
        assert_eq!(pool.used(), 250);
        r2.free();
        assert_eq!(pool.used(), 0);
    }

    #[test]
    fn test_shrink_saturates() {
        let pool = create_memory_pool(100);
        let mut r = MemoryReservation::new(pool.clone());
        r.try_grow(10).unwrap();
        r.shrink(50);
        assert_eq!(r.size(), 0);
        assert_eq!(pool.used(), 0);
    }

    #[test]
    fn test_unbounded_pool() {
        let pool = Arc::new(MemoryPool::unbounded());
        let mut r = MemoryReservation::new(pool.clone());
        r.try_grow(usize::MAX / 2).unwrap();
        assert_eq!(pool.used(), usize::MAX / 2);
    }
}
