//! Pool configuration

use crate::error::{PoolError, PoolResult};
use crate::utils::align_up;

/// Alignment of the vending base and of every block boundary, in bytes.
pub(crate) const BLOCK_ALIGN: usize = 8;

/// Whether a pool must tolerate concurrent callers.
///
/// The mode is fixed at initialization and decides how the pool's two
/// list mutexes are engaged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadSafety {
    /// The pool will be called from multiple threads. Every list access
    /// takes the owning mutex, and the handle can be converted into a
    /// [`SharedPool`](crate::SharedPool) for cross-thread use.
    Required,
    /// The pool stays on one thread and every operation runs
    /// unsynchronised, never touching the mutexes. The handle cannot be
    /// shared: [`MemoryPool`](crate::MemoryPool) is not `Sync`, and
    /// [`SharedPool`](crate::SharedPool) refuses this mode.
    NotRequired,
}

/// Configuration for a memory pool
///
/// Carries the pool geometry handed to [`MemoryPool::init`]: the total byte
/// count, the block size (rounded up to a multiple of 8 at initialization),
/// and the thread-safety mode.
///
/// Choosing the block size is the caller's trade-off: too small a block
/// leads to excessive coalescing, too large a block wastes memory on small
/// requests.
///
/// [`MemoryPool::init`]: crate::MemoryPool::init
#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    /// Total pool size in bytes.
    pub pool_size: u32,
    /// Requested block size in bytes, before rounding.
    pub block_size: u32,
    /// Thread-safety mode.
    pub thread_safety: ThreadSafety,
}

impl PoolConfig {
    /// Creates a single-threaded pool configuration.
    pub fn new(pool_size: u32, block_size: u32) -> Self {
        Self {
            pool_size,
            block_size,
            thread_safety: ThreadSafety::NotRequired,
        }
    }

    /// Switches the configuration to the given thread-safety mode.
    pub fn with_thread_safety(mut self, thread_safety: ThreadSafety) -> Self {
        self.thread_safety = thread_safety;
        self
    }

    /// The block size actually used by the pool: the requested size rounded
    /// up to the next multiple of 8, so every block boundary stays 8-byte
    /// aligned.
    pub fn rounded_block_size(&self) -> u32 {
        align_up(self.block_size as usize, BLOCK_ALIGN) as u32
    }

    /// Validates the pool geometry.
    ///
    /// Rejects a zero total size, a zero block size, and a block size not
    /// strictly less than the total size.
    pub(crate) fn validate(&self) -> PoolResult<()> {
        if self.pool_size == 0 {
            return Err(PoolError::InvalidPoolSize);
        }
        if self.block_size == 0 || self.block_size >= self.pool_size {
            return Err(PoolError::InvalidBlockSize);
        }
        Ok(())
    }
}
