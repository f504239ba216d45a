//! Pool statistics

use super::config::ThreadSafety;

/// Point-in-time statistics for a memory pool
///
/// Gathered under the pool's own locking discipline: the free list and the
/// allocated list are counted one after the other, never under both locks
/// at once, so the two counts may straddle a concurrent operation.
#[derive(Debug, Clone, Copy)]
pub struct PoolStats {
    /// Total pool size in bytes.
    pub pool_size: u32,
    /// Block size in bytes, after rounding.
    pub block_size: u32,
    /// Number of blocks carved at initialization.
    pub block_count: u32,
    /// Descriptors currently on the free list.
    pub free_blocks: u32,
    /// Descriptors currently on the allocated list.
    pub allocated_blocks: u32,
    /// Coalescing allocations served so far. Monotonic; never decremented
    /// when a coalesced region is split back apart.
    pub coalesced_blocks: u32,
    /// Thread-safety mode the pool was created with.
    pub thread_safety: ThreadSafety,
}
