//! Error types for pool operations
//!
//! Every failure a pool operation can detect maps to one [`PoolError`]
//! variant. Errors are reported at the site of detection: a single
//! human-readable line prefixed `MEMPOOL_ERROR:` is written to stderr and a
//! `tracing` event is emitted, then the error is handed back to the caller
//! through the operation's result. Nothing is retried or escalated.

use thiserror::Error;

/// Result type for pool operations.
pub type PoolResult<T> = Result<T, PoolError>;

/// Errors detected by pool operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PoolError {
    /// Total size of zero passed to `init`.
    #[error("Invalid size for memory pool, memory pool will not be initialized")]
    InvalidPoolSize,

    /// Block size of zero, or block size not strictly less than the total
    /// size, passed to `init`.
    #[error(
        "Invalid default block size. Block size must be strictly less than overall size. \
         Memory pool will not be initialized"
    )]
    InvalidBlockSize,

    /// The free list is empty.
    #[error(
        "No available memory. You either have a memory leak, or you gave the memory pool \
         too small an amount of memory on creation"
    )]
    Exhausted,

    /// Enough free bytes exist, but no address-contiguous run of blocks is
    /// long enough to cover the request.
    #[error(
        "Unable to allocate block of {requested} bytes due to insufficient space. \
         Either make the mempool larger, or free more space"
    )]
    Fragmented {
        /// The request that could not be satisfied, in bytes.
        requested: u32,
    },

    /// The request exceeds the total pool size and can never succeed.
    #[error("Requested allocation of {requested} bytes exceeds the pool size of {pool_size} bytes")]
    RequestTooLarge {
        /// The request, in bytes.
        requested: u32,
        /// The pool's total size, in bytes.
        pool_size: u32,
    },

    /// `calloc` was asked for zero bytes.
    #[error("Attempt to allocate 0 bytes")]
    ZeroAlloc,

    /// `calloc` member count times member size overflowed.
    #[error("Allocation size overflow: {members} members of {member_size} bytes each")]
    SizeOverflow {
        /// Requested member count.
        members: u32,
        /// Requested member size, in bytes.
        member_size: u32,
    },

    /// `free` was handed a null pointer.
    #[error("Attempt to free a null pointer")]
    FreeNull,

    /// `free` was handed a pointer that is not on the allocated list.
    #[error("Attempt to free a nonexistent pointer. Potential double free detected")]
    FreeUnknown,

    /// `realloc` was handed a null pointer.
    #[error("Attempt to realloc a null pointer. Potential use after free detected")]
    ReallocNull,

    /// `realloc` was asked for zero bytes.
    #[error("Attempt to realloc with size of 0 bytes. Invalid input")]
    ReallocZero,

    /// `realloc` was handed a pointer that is not on the allocated list.
    #[error("Attempt to realloc a nonexistent pointer. Potential use after free detected")]
    ReallocUnknown,

    /// `realloc` was called while nothing is allocated from the pool.
    #[error("Nothing from the mempool was allocated, realloc is impossible")]
    NothingAllocated,

    /// A pool created without thread safety was handed to `SharedPool`.
    #[error("Attempt to share a memory pool that was created without thread safety")]
    NotThreadSafe,
}

/// Emits the diagnostic line for `error` on the standard diagnostic stream.
pub(crate) fn report(error: &PoolError) {
    tracing::error!(%error, "pool operation failed");
    eprintln!("MEMPOOL_ERROR: {error}");
}

/// Emits the diagnostic for `error` and hands it back, for use at `return`
/// sites.
pub(crate) fn reported(error: PoolError) -> PoolError {
    report(&error);
    error
}
