//! Cross-thread pool handle

use core::ops::Deref;
use std::sync::Arc;

use super::allocator::MemoryPool;
use super::config::ThreadSafety;
use crate::error::{PoolError, PoolResult, reported};

/// Cloneable cross-thread handle for a pool created with
/// [`ThreadSafety::Required`].
///
/// [`MemoryPool`] itself is not `Sync`: a pool created with
/// [`ThreadSafety::NotRequired`] skips the list mutexes, so a shared
/// reference to it must never cross threads. `SharedPool` restores sharing
/// for the pools that do lock — construction checks the mode and refuses
/// everything else. Clones hand out the same underlying pool; it is torn
/// down when the last clone drops.
///
/// # Example
/// ```
/// use std::thread;
///
/// use mempool::{KILOBYTE, MemoryPool};
///
/// let pool = MemoryPool::thread_safe(4 * KILOBYTE, 64)?.into_shared()?;
///
/// let handles: Vec<_> = (0..4)
///     .map(|_| {
///         let pool = pool.clone();
///         thread::spawn(move || {
///             let p = pool.alloc(64).unwrap();
///             unsafe { pool.free(p.as_ptr()) };
///         })
///     })
///     .collect();
///
/// for handle in handles {
///     handle.join().unwrap();
/// }
/// # Ok::<(), mempool::PoolError>(())
/// ```
pub struct SharedPool {
    inner: Arc<MemoryPool>,
}

// SAFETY: SharedPool is Send and Sync because:
// - `new` refuses every pool except ThreadSafety::Required ones, and a
//   Required pool engages the owning mutex on every list access
// - The coalesced counter is atomic
// - Bytes of the backing region are only reachable through vended
//   pointers, and vended regions are disjoint by construction
unsafe impl Send for SharedPool {}
unsafe impl Sync for SharedPool {}

impl SharedPool {
    /// Wraps a pool for cross-thread sharing.
    ///
    /// # Errors
    /// Refused with a diagnostic when the pool was created with
    /// [`ThreadSafety::NotRequired`], since its operations run
    /// unsynchronised.
    pub fn new(pool: MemoryPool) -> PoolResult<Self> {
        match pool.thread_safety() {
            ThreadSafety::Required => Ok(Self {
                inner: Arc::new(pool),
            }),
            ThreadSafety::NotRequired => Err(reported(PoolError::NotThreadSafe)),
        }
    }
}

impl Clone for SharedPool {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Deref for SharedPool {
    type Target = MemoryPool;

    fn deref(&self) -> &MemoryPool {
        &self.inner
    }
}
