//! # mempool
//!
//! A block-based memory sub-allocator. One contiguous backing region is
//! obtained from the host allocator at initialization and carved into
//! fixed-size blocks; allocation and release are then served entirely from
//! that region until the pool is destroyed.
//!
//! Requests larger than one block are satisfied by *coalescing*: the
//! address-ordered free list is searched for the first run of
//! address-contiguous blocks long enough to cover the request, and the run
//! is merged into a single multi-block region. Releasing such a region
//! *uncoalesces* it back into per-block bookkeeping so the free list
//! returns to block-size granularity.
//!
//! # Example
//!
//! ```
//! use mempool::{MemoryPool, ThreadSafety, KILOBYTE};
//!
//! let pool = MemoryPool::init(KILOBYTE, 64, ThreadSafety::NotRequired).unwrap();
//!
//! let ptr = pool.alloc(32).unwrap();
//! unsafe {
//!     std::ptr::write_bytes(ptr.as_ptr(), 0x42, 32);
//!     pool.free(ptr.as_ptr());
//! }
//!
//! assert!(pool.destroy());
//! ```
//!
//! # Concurrency
//!
//! A pool created with [`ThreadSafety::Required`] guards its free and
//! allocated lists with two independent mutexes that are never held
//! simultaneously, so release-side and allocation-side critical sections
//! do not serialise each other; convert it with
//! [`MemoryPool::into_shared`] and clone the resulting [`SharedPool`] to
//! call it from several threads. A pool created with
//! [`ThreadSafety::NotRequired`] runs every operation unsynchronised and
//! stays on one thread (the handle is not `Sync`). Migration of a block
//! between the two lists is not atomic as seen by an outside observer;
//! see [`pool::MemoryPool`] for the exact guarantees.

// The descriptor lists and region vending are raw-pointer machinery; each
// unsafe block carries its SAFETY argument in place.
#![allow(unsafe_code)]

pub mod error;
pub mod pool;
pub mod utils;

pub use error::{PoolError, PoolResult};
pub use pool::{MemoryPool, PoolConfig, PoolStats, SharedPool, ThreadSafety};
pub use utils::{GIGABYTE, KILOBYTE, MEGABYTE};
