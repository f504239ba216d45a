//! Block-based memory pool
//!
//! A pool carves one contiguous backing region into fixed-size blocks at
//! initialization and serves every later request from that region. Requests
//! larger than one block coalesce a run of address-contiguous free blocks;
//! releasing such a region splits it back into per-block bookkeeping.
//!
//! ## Modules
//! - `allocator` - Main [`MemoryPool`] implementation with the coalescing core
//! - `block` - Block descriptors and the singly-linked descriptor lists
//! - `config` - Pool geometry and thread-safety configuration
//! - `shared` - Cloneable cross-thread handle for thread-safe pools
//! - `stats` - Point-in-time pool statistics

pub mod allocator;
mod block;
pub mod config;
pub mod shared;
pub mod stats;

pub use allocator::MemoryPool;
pub use config::{PoolConfig, ThreadSafety};
pub use shared::SharedPool;
pub use stats::PoolStats;
